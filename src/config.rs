//! Configuration types for quiz generation.
//!
//! All generation behaviour is controlled through [`GenerationConfig`], built
//! via its [`GenerationConfigBuilder`]. What to generate (kinds and counts)
//! is not configuration: it travels with each request as a slice of
//! [`crate::quiz::QuestionSpec`]s.

use crate::error::QuizGenError;
use crate::pipeline::backend::QuestionBackend;
use crate::pipeline::chunk;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a quiz-generation request.
///
/// Built via [`GenerationConfig::builder()`] or using
/// [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_quizgen::{BackendSelection, GenerationConfig};
///
/// let config = GenerationConfig::builder()
///     .backend(BackendSelection::Remote)
///     .model("gpt-4.1-nano")
///     .max_chunk_chars(3000)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Which backend family generates questions. Default: [`BackendSelection::Mock`].
    pub backend: BackendSelection,

    /// Pre-constructed backend. Takes precedence over `backend`.
    pub backend_impl: Option<Arc<dyn QuestionBackend>>,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "llama3.2".
    /// If None, uses the backend's default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// Only consulted by the Local and Remote backends.
    pub provider_name: Option<String>,

    /// Sampling temperature. Default: 0.7.
    ///
    /// Question writing benefits from some variety; transcription-grade
    /// determinism would make every chunk's questions look alike.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 3000.
    pub max_tokens: usize,

    /// Upper bound on chunk length in characters. Default: 4000.
    pub max_chunk_chars: usize,

    /// Trailing context of the previous chunk re-included at the start of
    /// the next one, in characters. Default: 200. Must be < `max_chunk_chars`.
    pub overlap_chars: usize,

    /// Per-attempt backend timeout in milliseconds. Default: 60 000.
    pub backend_timeout_ms: u64,

    /// Wall-clock budget for the whole generation phase. Default: None.
    ///
    /// When it expires, in-flight calls are cancelled and the quiz is
    /// assembled from whatever completed.
    pub request_deadline_ms: Option<u64>,

    /// Number of concurrent backend calls. Default: 10.
    ///
    /// Dispatches beyond this bound are queued, never failed.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient backend failure. Default: 3.
    ///
    /// Timeouts, connection failures and 429s are retried; provider
    /// rejections (bad API key, 400) surface immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Similarity at or above which two questions count as duplicates.
    /// `1.0` means "identical after normalisation". Default: 1.0.
    pub dedup_threshold: f64,

    /// Which unique items survive truncation. Default: earliest chunk first.
    pub selection: SelectionPolicy,

    /// Reject documents whose text is shorter than this. Default: 0 (off).
    pub min_text_chars: usize,

    /// Reject PDFs larger than this many bytes. Default: 10 MiB.
    pub max_file_bytes: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Optional per-call progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendSelection::default(),
            backend_impl: None,
            model: None,
            provider_name: None,
            temperature: 0.7,
            max_tokens: 3000,
            max_chunk_chars: 4000,
            overlap_chars: 200,
            backend_timeout_ms: 60_000,
            request_deadline_ms: None,
            concurrency: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
            dedup_threshold: 1.0,
            selection: SelectionPolicy::default(),
            min_text_chars: 0,
            max_file_bytes: 10 * 1024 * 1024,
            download_timeout_secs: 120,
            password: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("backend", &self.backend)
            .field("backend_impl", &self.backend_impl.as_ref().map(|b| b.name().to_string()))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("overlap_chars", &self.overlap_chars)
            .field("backend_timeout_ms", &self.backend_timeout_ms)
            .field("request_deadline_ms", &self.request_deadline_ms)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("dedup_threshold", &self.dedup_threshold)
            .field("selection", &self.selection)
            .field("min_text_chars", &self.min_text_chars)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn backend(mut self, backend: BackendSelection) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn backend_impl(mut self, backend: Arc<dyn QuestionBackend>) -> Self {
        self.config.backend_impl = Some(backend);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn overlap_chars(mut self, n: usize) -> Self {
        self.config.overlap_chars = n;
        self
    }

    pub fn backend_timeout_ms(mut self, ms: u64) -> Self {
        self.config.backend_timeout_ms = ms;
        self
    }

    pub fn request_deadline_ms(mut self, ms: u64) -> Self {
        self.config.request_deadline_ms = Some(ms);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn dedup_threshold(mut self, t: f64) -> Self {
        self.config.dedup_threshold = t;
        self
    }

    pub fn selection(mut self, policy: SelectionPolicy) -> Self {
        self.config.selection = policy;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn max_file_bytes(mut self, n: u64) -> Self {
        self.config.max_file_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, QuizGenError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(QuizGenError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.backend_timeout_ms == 0 {
            return Err(QuizGenError::InvalidConfig("Backend timeout must be ≥ 1 ms".into()));
        }
        if !(0.0..=1.0).contains(&c.dedup_threshold) || c.dedup_threshold == 0.0 {
            return Err(QuizGenError::InvalidConfig(format!(
                "Dedup threshold must be in (0, 1], got {}",
                c.dedup_threshold
            )));
        }
        chunk::validate_chunk_config(c.max_chunk_chars, c.overlap_chars)?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which family of backend generates questions.
///
/// | Backend | Needs | Use case |
/// |---------|-------|----------|
/// | `Mock`   | nothing | tests, demos, offline runs (library default) |
/// | `Local`  | a running Ollama (or `provider_name`) | on-box inference |
/// | `Remote` | an API key in the environment | hosted models (CLI default) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSelection {
    #[default]
    Mock,
    Local,
    Remote,
}

impl FromStr for BackendSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown backend '{other}' (expected mock, local or remote)")),
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mock => "mock",
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// How the aggregator picks `count` items out of the unique candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Items from earlier chunks win. (default)
    #[default]
    EarliestChunk,
    /// One item per chunk in turn, so later parts of the document are
    /// represented even when early chunks are prolific.
    RoundRobin,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "earliest_chunk" | "earliest" => Ok(Self::EarliestChunk),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(format!(
                "unknown selection policy '{other}' (expected earliest-chunk or round-robin)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = GenerationConfig::default();
        assert_eq!(c.backend, BackendSelection::Mock);
        assert_eq!(c.max_chunk_chars, 4000);
        assert_eq!(c.overlap_chars, 200);
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.max_file_bytes, 10 * 1024 * 1024);
        assert!(c.request_deadline_ms.is_none());
    }

    #[test]
    fn build_rejects_zero_concurrency() {
        let err = GenerationConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, QuizGenError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_bad_chunk_config() {
        let err = GenerationConfig::builder()
            .max_chunk_chars(100)
            .overlap_chars(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, QuizGenError::InvalidChunkConfig { .. }));
    }

    #[test]
    fn build_rejects_bad_threshold() {
        assert!(GenerationConfig::builder().dedup_threshold(1.5).build().is_err());
        assert!(GenerationConfig::builder().dedup_threshold(0.0).build().is_err());
        assert!(GenerationConfig::builder().dedup_threshold(0.8).build().is_ok());
    }

    #[test]
    fn parse_enums() {
        assert_eq!("Remote".parse::<BackendSelection>(), Ok(BackendSelection::Remote));
        assert!("cloud".parse::<BackendSelection>().is_err());
        assert_eq!("round-robin".parse::<SelectionPolicy>(), Ok(SelectionPolicy::RoundRobin));
        assert_eq!("earliest".parse::<SelectionPolicy>(), Ok(SelectionPolicy::EarliestChunk));
    }

    #[test]
    fn debug_hides_backend_object() {
        let c = GenerationConfig::builder()
            .backend_impl(Arc::new(crate::pipeline::mock::MockBackend::new()))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("Some(\"mock\")"));
    }
}
