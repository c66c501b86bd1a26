//! Error types for the edgequake-quizgen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`QuizGenError`] — **Fatal**: the request cannot produce a quiz at all
//!   (unreadable PDF, empty text, invalid chunking, every backend call
//!   failed). Returned as `Err(QuizGenError)` from the top-level
//!   `generate*` functions.
//!
//! * [`BackendError`] — **Non-fatal**: one (chunk, kind) generation call
//!   failed at the transport level. Recorded in
//!   [`crate::diagnostics::Diagnostics`] while the remaining calls carry on.
//!
//! Malformed *content* is not an error at this level at all: parse and
//! validation problems live in [`crate::diagnostics`] as recoverable
//! failures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-quizgen library.
#[derive(Debug, Error)]
pub enum QuizGenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document is larger than the configured upload limit.
    #[error("Document is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The PDF is corrupt, encrypted without a usable password, or otherwise
    /// unreadable.
    #[error("Could not extract text from PDF: {reason}")]
    Extraction { reason: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs libpdfium. Either install it system-wide or\n\
set PDFIUM_LIB_PATH to the directory that contains it.\n"
    )]
    PdfiumBindingFailed(String),

    /// Extracted (or supplied) text is empty after trimming.
    #[error("Document contains no text to generate questions from")]
    EmptyDocument,

    /// Extracted text is shorter than the configured minimum.
    #[error("Document text too short: {chars} chars (need at least {min})")]
    TextTooShort { chars: usize, min: usize },

    // ── Request / config errors ───────────────────────────────────────────
    /// Chunk size / overlap combination cannot produce chunks.
    #[error("Invalid chunk configuration (max_chunk_chars={max_chunk_chars}, overlap_chars={overlap_chars}): {reason}")]
    InvalidChunkConfig {
        max_chunk_chars: usize,
        overlap_chars: usize,
        reason: String,
    },

    /// A requested question spec is unusable.
    #[error("Invalid question spec: {0}")]
    InvalidQuestionSpec(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected generation backend could not be initialised.
    #[error("Generation backend '{backend}' is not configured.\n{hint}")]
    BackendNotConfigured { backend: String, hint: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// Every dispatched backend call failed; there is nothing to assemble.
    #[error("All {total} generation calls failed.\nFirst error: {first_error}")]
    AllBackendCallsFailed { total: usize, first_error: String },

    /// At least one kind was under-filled.
    ///
    /// Only returned by [`crate::output::QuizOutput::into_result`] when the
    /// caller wants to treat a partial quiz as an error.
    #[error("Quiz is incomplete: {missing} requested questions could not be generated")]
    IncompleteQuiz { missing: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuizGenError {
    /// Stable, machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            QuizGenError::FileNotFound { .. } => "file_not_found",
            QuizGenError::PermissionDenied { .. } => "permission_denied",
            QuizGenError::InvalidInput { .. } => "invalid_input",
            QuizGenError::DownloadFailed { .. } => "download_failed",
            QuizGenError::DownloadTimeout { .. } => "download_timeout",
            QuizGenError::FileTooLarge { .. } => "file_too_large",
            QuizGenError::NotAPdf { .. } => "not_a_pdf",
            QuizGenError::Extraction { .. } => "extraction_error",
            QuizGenError::PdfiumBindingFailed(_) => "pdfium_binding_failed",
            QuizGenError::EmptyDocument => "empty_document",
            QuizGenError::TextTooShort { .. } => "text_too_short",
            QuizGenError::InvalidChunkConfig { .. } => "invalid_chunk_config",
            QuizGenError::InvalidQuestionSpec(_) => "invalid_question_spec",
            QuizGenError::InvalidConfig(_) => "invalid_config",
            QuizGenError::BackendNotConfigured { .. } => "backend_not_configured",
            QuizGenError::AllBackendCallsFailed { .. } => "backend_unavailable",
            QuizGenError::IncompleteQuiz { .. } => "incomplete_quiz",
            QuizGenError::OutputWriteFailed { .. } => "output_write_failed",
            QuizGenError::Internal(_) => "internal",
        }
    }
}

/// Structured error body for callers that expose the pipeline over a wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: String,
    pub message: String,
}

impl From<&QuizGenError> for ErrorResponse {
    fn from(e: &QuizGenError) -> Self {
        Self {
            success: false,
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// A non-fatal transport failure for a single generation call.
///
/// Backends never return this for malformed *content*; that is the
/// parser's concern.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendError {
    /// The call did not finish within `backend_timeout_ms`.
    #[error("backend call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Connection refused, DNS failure, 5xx, …
    #[error("backend unavailable: {detail}")]
    Unavailable { detail: String },

    /// HTTP 429 or an exhausted quota.
    #[error("backend quota or rate limit exceeded: {detail}")]
    Quota {
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other provider-side rejection (auth, bad request). Not retried.
    #[error("backend API error: {detail}")]
    Api { detail: String },
}

impl BackendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Api { .. })
    }
}
