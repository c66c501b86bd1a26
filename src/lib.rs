//! # edgequake-quizgen
//!
//! Generate quizzes (multiple choice, short answer, fill in the blank) from
//! documents using LLMs.
//!
//! A document's text is split into overlapping chunks, every chunk is sent
//! to a generation backend once per requested question kind, and the
//! loosely-structured replies are repaired, parsed, and validated against a
//! strict schema. The survivors are merged in document order, deduplicated,
//! and cut down to the requested counts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / text
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   page text via pdfium (spawn_blocking)
//!  ├─ 3. Chunk     ≤ max_chunk_chars, paragraph > sentence > word breaks
//!  ├─ 4. Generate  concurrent (chunk × kind) calls: mock, Ollama, or hosted LLM
//!  ├─ 5. Parse     repair fences / prose / trailing commas, coerce fields
//!  ├─ 6. Validate  option counts, answer letters, exactly one blank, …
//!  └─ 7. Assemble  chunk order → dedup → truncate → QuizDocument
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_quizgen::{generate_quiz, BackendSelection, GenerationConfig, QuestionSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = GenerationConfig::builder()
//!         .backend(BackendSelection::Remote)
//!         .build()?;
//!     let specs = [QuestionSpec::mcq(5), QuestionSpec::short_answer(3), QuestionSpec::fill_blank(3)];
//!     let text = std::fs::read_to_string("lecture.txt")?;
//!     let output = generate_quiz(&text, &specs, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.document)?);
//!     for s in &output.diagnostics.shortfalls {
//!         eprintln!("only {}/{} {}", s.delivered, s.requested, s.kind);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `quizgen` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-quizgen = { version = "0.1", default-features = false }
//! ```
//!
//! ## Backends
//!
//! | Backend | Needs | Notes |
//! |---------|-------|-------|
//! | `Mock`   | nothing | deterministic, offline; the library default |
//! | `Local`  | Ollama on localhost | `llama3.2` unless `model` is set |
//! | `Remote` | an API key | `gpt-4.1-nano` with `OPENAI_API_KEY`, else auto-detect |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod quiz;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BackendSelection, GenerationConfig, GenerationConfigBuilder, SelectionPolicy};
pub use diagnostics::{
    AbandonedCall, BackendFailure, Diagnostics, FailureCounts, ParseFailure, Shortfall,
    ValidationFailure,
};
pub use error::{BackendError, ErrorResponse, QuizGenError};
pub use generate::{
    extract_document_text, generate_from_bytes, generate_from_pdf, generate_quiz, generate_sync,
    generate_to_file, write_quiz, CallOutcome,
};
pub use output::{GenerationStats, QuizOutput};
pub use pipeline::backend::{QuestionBackend, RawOutput};
pub use pipeline::chunk::Chunk;
pub use pipeline::extract::ExtractedText;
pub use pipeline::llm::LlmBackend;
pub use pipeline::mock::MockBackend;
pub use pipeline::parse::ParseError;
pub use pipeline::validate::ValidationError;
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use quiz::{
    FillBlankItem, McqItem, QuestionKind, QuestionSpec, QuizDocument, QuizItem, ShortAnswerItem,
    SpecConstraints,
};
pub use stream::{generate_stream, generate_stream_from_pdf, CallStream};
