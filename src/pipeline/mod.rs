//! Pipeline stages for document-to-quiz generation.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and backends can be swapped without touching the
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ chunk ──▶ backend ──▶ parse ──▶ validate ──▶ aggregate
//! (path/URL) (pdfium)   (text)   (mock/LLM)  (repair)   (schema)   (dedup, cut)
//! ```
//!
//! 1. [`input`]    — resolve a path or URL to PDF bytes, with size and magic checks
//! 2. [`extract`]  — pull page text out with pdfium; runs in `spawn_blocking`
//! 3. [`chunk`]    — split text into bounded, overlapping chunks at natural breaks
//! 4. [`backend`]  — the generation seam plus retry/timeout policy;
//!    [`mock`] and [`llm`] implement it
//! 5. [`parse`]    — turn raw model text into candidate items, using the
//!    cleanup rules in [`repair`]
//! 6. [`validate`] — accept or reject each candidate against its `QuestionSpec`
//! 7. [`aggregate`] — merge in chunk order, deduplicate, truncate to counts

pub mod aggregate;
pub mod backend;
pub mod chunk;
pub mod extract;
pub mod input;
pub mod llm;
pub mod mock;
pub mod parse;
pub mod repair;
pub mod validate;
