//! Eager (whole-quiz) generation entry points.
//!
//! This module provides the simpler API: wait for every call, then return
//! the assembled [`QuizOutput`]. Use [`crate::stream::generate_stream`]
//! instead to receive per-call results as they complete.
//!
//! ## Flow
//!
//! ```text
//! text ─▶ chunk ─▶ (chunk × kind) calls ─▶ parse ─▶ validate ─▶ slot vector
//!                  buffer_unordered(N)                          │
//!                                   dedup ◀─ chunk order ◀──────┘
//!                                     │
//!                                     ▼
//!                        truncate ─▶ QuizDocument + Diagnostics + Stats
//! ```
//!
//! Results land in a slot vector indexed by (chunk ordinal, kind), so the
//! output never depends on which call finished first.

use crate::config::{BackendSelection, GenerationConfig};
use crate::diagnostics::{
    snippet, AbandonedCall, BackendFailure, Diagnostics, ParseFailure, ValidationFailure,
};
use crate::error::QuizGenError;
use crate::output::{GenerationStats, QuizOutput};
use crate::pipeline::aggregate::{self, SourcedItem};
use crate::pipeline::backend::{generate_with_retry, QuestionBackend};
use crate::pipeline::chunk::{self, Chunk};
use crate::pipeline::extract::{self, ExtractedText};
use crate::pipeline::llm::LlmBackend;
use crate::pipeline::mock::MockBackend;
use crate::pipeline::{input, parse, validate};
use crate::quiz::{validate_specs, QuestionKind, QuestionSpec, QuizItem};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Characters of raw output kept in a [`ParseFailure`].
const SNIPPET_CHARS: usize = 200;

/// Everything one (chunk, kind) call produced.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub chunk_id: usize,
    pub ordinal: usize,
    pub kind: QuestionKind,
    /// Items that passed validation, in the order the backend emitted them.
    pub accepted: Vec<QuizItem>,
    pub candidates: usize,
    pub parse_failure: Option<ParseFailure>,
    pub validation_failures: Vec<ValidationFailure>,
    pub backend_failure: Option<BackendFailure>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub retries: u32,
    /// The call was still in flight when the request deadline expired.
    pub abandoned: bool,
}

impl CallOutcome {
    fn new(chunk: &Chunk, kind: QuestionKind, retries: u32) -> Self {
        Self {
            chunk_id: chunk.id,
            ordinal: chunk.ordinal,
            kind,
            accepted: Vec::new(),
            candidates: 0,
            parse_failure: None,
            validation_failures: Vec::new(),
            backend_failure: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            retries,
            abandoned: false,
        }
    }

    /// Placeholder for a call cut off by the request deadline.
    pub(crate) fn abandoned(chunk: &Chunk, kind: QuestionKind) -> Self {
        Self {
            abandoned: true,
            ..Self::new(chunk, kind, 0)
        }
    }

    /// `true` when the backend returned output (whatever its quality).
    pub fn succeeded(&self) -> bool {
        self.backend_failure.is_none() && !self.abandoned
    }
}

/// Generate a quiz from raw document text.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(QuizOutput)` whenever at least one backend call returned output,
/// even if some kinds came up short (check `output.diagnostics.shortfalls`).
///
/// # Errors
/// Returns `Err(QuizGenError)` only for fatal errors:
/// - empty (or too short) text
/// - invalid question specs or chunk configuration
/// - the backend cannot be constructed
/// - every backend call failed
pub async fn generate_quiz(
    text: &str,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let total_start = Instant::now();

    // ── Step 1: Validate request ─────────────────────────────────────────
    check_text(text, config.min_text_chars)?;
    validate_specs(specs)?;

    // ── Step 2: Chunk ────────────────────────────────────────────────────
    let chunks = chunk::chunk(text, config.max_chunk_chars, config.overlap_chars)?;
    info!(
        "Split {} chars into {} chunks (max {}, overlap {})",
        text.chars().count(),
        chunks.len(),
        config.max_chunk_chars,
        config.overlap_chars
    );

    // ── Step 3: Backend ──────────────────────────────────────────────────
    let backend = resolve_backend(config)?;

    // ── Step 4: Generate, parse, validate, assemble ──────────────────────
    let mut output = run_pipeline(&chunks, specs, &backend, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Quiz complete: {} questions ({} mcq, {} short answer, {} fill-in), {}ms total",
        output.total_questions(),
        output.document.mcq.len(),
        output.document.short_answer.len(),
        output.document.fill_in_the_blanks.len(),
        output.stats.total_duration_ms
    );
    Ok(output)
}

/// Generate a quiz from a PDF file path or HTTP/HTTPS URL.
pub async fn generate_from_pdf(
    input_str: impl AsRef<str>,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let total_start = Instant::now();
    let extracted = extract_document_text(input_str, config).await?;
    let mut output = generate_quiz(&extracted.text, specs, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Generate a quiz from PDF bytes already in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_quizgen::{generate_from_bytes, GenerationConfig, QuestionSpec};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("lecture.pdf")?;
/// let specs = [QuestionSpec::mcq(5), QuestionSpec::fill_blank(3)];
/// let output = generate_from_bytes(&bytes, &specs, &GenerationConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&output.document)?);
/// # Ok(())
/// # }
/// ```
pub async fn generate_from_bytes(
    bytes: &[u8],
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let total_start = Instant::now();
    input::check_pdf("<bytes>", bytes, config.max_file_bytes)?;
    let extracted = extract::extract_text(bytes.to_vec(), config.password.clone()).await?;
    let mut output = generate_quiz(&extracted.text, specs, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Extract the text of a PDF without generating anything.
///
/// Does not require a backend or API key.
pub async fn extract_document_text(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<ExtractedText, QuizGenError> {
    let input_str = input_str.as_ref();
    info!("Reading document: {}", input_str);
    let source =
        input::resolve_input(input_str, config.download_timeout_secs, config.max_file_bytes).await?;
    let extracted = extract::extract_text(source.bytes, config.password.clone()).await?;
    info!(
        "Extracted {} chars from {} pages",
        extracted.text.chars().count(),
        extracted.page_count
    );
    Ok(extracted)
}

/// Generate a quiz from a PDF and write the quiz JSON to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn generate_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let output = generate_from_pdf(input_str, specs, config).await?;
    write_quiz(&output, output_path).await?;
    Ok(output)
}

/// Write the quiz document of `output` as pretty JSON.
///
/// Parent directories are created; the file is replaced atomically.
pub async fn write_quiz(output: &QuizOutput, path: impl AsRef<Path>) -> Result<(), QuizGenError> {
    let json = serde_json::to_string_pretty(&output.document)
        .map_err(|e| QuizGenError::Internal(format!("Failed to serialise quiz: {e}")))?;
    write_atomic(path.as_ref(), &json).await
}

/// Synchronous wrapper around [`generate_from_pdf`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    input_str: impl AsRef<str>,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| QuizGenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_from_pdf(input_str, specs, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), QuizGenError> {
    let write_failed = |source| QuizGenError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

/// Reject empty text, and text shorter than `min_chars` when set.
pub(crate) fn check_text(text: &str, min_chars: usize) -> Result<(), QuizGenError> {
    let chars = text.trim().chars().count();
    if chars == 0 {
        return Err(QuizGenError::EmptyDocument);
    }
    if chars < min_chars {
        return Err(QuizGenError::TextTooShort { chars, min: min_chars });
    }
    Ok(())
}

/// Resolve the backend, most specific first: a pre-built backend in
/// `config.backend_impl`, then the one named by `config.backend`.
pub(crate) fn resolve_backend(config: &GenerationConfig) -> Result<Arc<dyn QuestionBackend>, QuizGenError> {
    if let Some(ref backend) = config.backend_impl {
        return Ok(Arc::clone(backend));
    }
    match config.backend {
        BackendSelection::Mock => Ok(Arc::new(MockBackend::new())),
        selection => Ok(Arc::new(LlmBackend::from_config(selection, config)?)),
    }
}

/// One backend call followed by parse and validation. Never fails: every
/// problem is recorded in the outcome.
pub(crate) async fn run_call(
    backend: &Arc<dyn QuestionBackend>,
    chunk: &Chunk,
    spec: &QuestionSpec,
    config: &GenerationConfig,
) -> CallOutcome {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_call_start(chunk.id, spec.kind);
    }

    let (result, retries) = generate_with_retry(backend, chunk, spec, config).await;
    let mut outcome = CallOutcome::new(chunk, spec.kind, retries);

    let raw = match result {
        Ok(raw) => raw,
        Err(error) => {
            warn!("Chunk {} / {}: giving up: {}", chunk.id, spec.kind, error);
            if let Some(cb) = cb {
                cb.on_call_error(chunk.id, spec.kind, &error.to_string());
            }
            outcome.backend_failure = Some(BackendFailure {
                chunk_id: chunk.id,
                kind: spec.kind,
                error,
                retries,
            });
            return outcome;
        }
    };
    outcome.prompt_tokens = raw.prompt_tokens;
    outcome.completion_tokens = raw.completion_tokens;

    match parse::parse(&raw.text, spec.kind) {
        Err(error) => {
            debug!("Chunk {} / {}: unparseable output: {}", chunk.id, spec.kind, error);
            outcome.parse_failure = Some(ParseFailure {
                chunk_id: chunk.id,
                kind: spec.kind,
                error,
                snippet: snippet(&raw.text, SNIPPET_CHARS),
            });
        }
        Ok(candidates) => {
            outcome.candidates = candidates.len();
            for candidate in candidates {
                match validate::validate(&candidate, spec) {
                    Ok(item) => outcome.accepted.push(item),
                    Err(reason) => {
                        debug!("Chunk {} / {}: rejected item: {}", chunk.id, spec.kind, reason);
                        outcome.validation_failures.push(ValidationFailure {
                            chunk_id: chunk.id,
                            kind: spec.kind,
                            reason,
                            candidate,
                        });
                    }
                }
            }
        }
    }

    if let Some(cb) = cb {
        cb.on_call_complete(
            chunk.id,
            spec.kind,
            outcome.accepted.len(),
            outcome.validation_failures.len(),
        );
    }
    outcome
}

/// Every (chunk, spec) pair, chunk-major, as indices.
pub(crate) fn call_slots(chunks: usize, specs: usize) -> Vec<(usize, usize)> {
    (0..chunks)
        .flat_map(|c| (0..specs).map(move |s| (c, s)))
        .collect()
}

/// Dispatch every call with bounded concurrency, honour the request
/// deadline, then assemble.
async fn run_pipeline(
    chunks: &[Chunk],
    specs: &[QuestionSpec],
    backend: &Arc<dyn QuestionBackend>,
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let slots = call_slots(chunks.len(), specs.len());
    let total_calls = slots.len();
    info!(
        "Dispatching {} calls to {} (concurrency {})",
        total_calls,
        backend.name(),
        config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(chunks.len(), total_calls);
    }

    let gen_start = Instant::now();
    let deadline = config
        .request_deadline_ms
        .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));

    let mut results: Vec<Option<CallOutcome>> = (0..total_calls).map(|_| None).collect();
    let mut deadline_exceeded = false;
    {
        let calls = stream::iter(slots.iter().enumerate().map(|(slot, &(c, s))| {
            let chunk = &chunks[c];
            let spec = &specs[s];
            async move { (slot, run_call(backend, chunk, spec, config).await) }
        }))
        .buffer_unordered(config.concurrency);
        let mut calls = std::pin::pin!(calls);

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, calls.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline_exceeded = true;
                        break;
                    }
                },
                None => calls.next().await,
            };
            match next {
                Some((slot, outcome)) => results[slot] = Some(outcome),
                None => break,
            }
        }
        // dropping the stream here cancels whatever is still in flight
    }
    let generation_duration_ms = gen_start.elapsed().as_millis() as u64;

    if deadline_exceeded {
        let done = results.iter().filter(|r| r.is_some()).count();
        warn!(
            "Request deadline expired after {}ms: {}/{} calls completed",
            generation_duration_ms, done, total_calls
        );
    }

    let mut output = assemble_output(chunks, specs, &slots, results, deadline_exceeded, config)?;
    output.stats.generation_duration_ms = generation_duration_ms;

    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(total_calls, output.stats.calls_succeeded);
    }
    Ok(output)
}

/// Fold per-call outcomes (in slot order) into the final output.
fn assemble_output(
    chunks: &[Chunk],
    specs: &[QuestionSpec],
    slots: &[(usize, usize)],
    results: Vec<Option<CallOutcome>>,
    deadline_exceeded: bool,
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    let mut diagnostics = Diagnostics {
        deadline_exceeded,
        ..Default::default()
    };
    let mut stats = GenerationStats {
        chunks: chunks.len(),
        calls_dispatched: slots.len(),
        ..Default::default()
    };
    let mut items: Vec<SourcedItem> = Vec::new();
    let mut first_error: Option<String> = None;
    let mut failed_per_kind: BTreeMap<QuestionKind, usize> = BTreeMap::new();

    for (&(c, s), result) in slots.iter().zip(results) {
        let Some(outcome) = result else {
            stats.calls_abandoned += 1;
            diagnostics.abandoned_calls.push(AbandonedCall {
                chunk_id: chunks[c].id,
                kind: specs[s].kind,
            });
            continue;
        };

        stats.prompt_tokens += outcome.prompt_tokens as u64;
        stats.completion_tokens += outcome.completion_tokens as u64;
        stats.total_retries += outcome.retries as u64;

        if let Some(failure) = outcome.backend_failure {
            stats.calls_failed += 1;
            *failed_per_kind.entry(failure.kind).or_default() += 1;
            first_error.get_or_insert_with(|| failure.error.to_string());
            diagnostics.backend_failures.push(failure);
            continue;
        }

        stats.calls_succeeded += 1;
        stats.candidates_parsed += outcome.candidates;
        stats.items_accepted += outcome.accepted.len();
        diagnostics.parse_failures.extend(outcome.parse_failure);
        diagnostics.validation_failures.extend(outcome.validation_failures);

        let ordinal = outcome.ordinal;
        items.extend(
            outcome
                .accepted
                .into_iter()
                .map(|item| SourcedItem { ordinal, item }),
        );
    }

    if stats.calls_dispatched > 0
        && stats.calls_failed == stats.calls_dispatched
        && stats.calls_abandoned == 0
    {
        return Err(QuizGenError::AllBackendCallsFailed {
            total: stats.calls_dispatched,
            first_error: first_error.unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    for (kind, failed) in &failed_per_kind {
        if *failed == chunks.len() {
            warn!("Every {} call failed at the backend", kind);
        }
    }

    let assembly = aggregate::assemble(specs, items, config.dedup_threshold, config.selection);
    stats.duplicates_removed = assembly.duplicates_removed.values().sum();
    diagnostics.duplicates_removed = assembly.duplicates_removed;
    for shortfall in &assembly.shortfalls {
        warn!(
            "Only {}/{} {} could be generated",
            shortfall.delivered,
            shortfall.requested,
            shortfall.kind.label()
        );
    }
    diagnostics.shortfalls = assembly.shortfalls;
    diagnostics.sort();

    Ok(QuizOutput {
        document: assembly.document,
        diagnostics,
        stats,
    })
}
