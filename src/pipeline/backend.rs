//! The generation backend seam.
//!
//! Every backend turns one [`Chunk`] plus one [`QuestionSpec`] into raw,
//! unvalidated text. Backends only fail on transport problems; whatever
//! they return is handed to [`crate::pipeline::parse`] as-is.
//!
//! ## Retry Strategy
//!
//! Timeouts, connection failures and 429s are transient under concurrent
//! load. [`generate_with_retry`] bounds every attempt with
//! `backend_timeout_ms` and backs off exponentially between attempts
//! (`retry_backoff_ms * 2^attempt`): with 500 ms base and 3 retries the waits
//! are 500 ms → 1 s → 2 s. A quota error's `retry-after` hint raises the
//! wait when it is longer than the backoff. Provider rejections ([`BackendError::Api`]) are
//! returned immediately.

use crate::config::GenerationConfig;
use crate::error::BackendError;
use crate::pipeline::chunk::Chunk;
use crate::quiz::QuestionSpec;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Unstructured backend output plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl RawOutput {
    /// Output from a backend that does not meter tokens.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A question generator.
///
/// Implementations must be `Send + Sync`: the pipeline shares one instance
/// across all concurrent calls of a request.
#[async_trait]
pub trait QuestionBackend: Send + Sync {
    /// Short name used in logs and diagnostics (`"mock"`, `"remote:openai"`, …).
    fn name(&self) -> &str;

    /// Generate raw question text for one chunk and one question kind.
    async fn generate(&self, chunk: &Chunk, spec: &QuestionSpec) -> Result<RawOutput, BackendError>;
}

/// Call the backend with a per-attempt timeout and exponential backoff.
///
/// Returns the raw output of the first successful attempt, the number of
/// retries used, or the last error once retries are exhausted.
pub async fn generate_with_retry(
    backend: &Arc<dyn QuestionBackend>,
    chunk: &Chunk,
    spec: &QuestionSpec,
    config: &GenerationConfig,
) -> (Result<RawOutput, BackendError>, u32) {
    let limit = Duration::from_millis(config.backend_timeout_ms);
    let mut last_err = BackendError::Unavailable {
        detail: "no attempt made".into(),
    };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let mut backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            if let BackendError::Quota {
                retry_after_secs: Some(secs),
                ..
            } = &last_err
            {
                backoff = backoff.max(secs.saturating_mul(1_000));
            }
            warn!(
                "Chunk {} / {}: retry {}/{} after {}ms",
                chunk.id, spec.kind, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let start = Instant::now();
        let result = match timeout(limit, backend.generate(chunk, spec)).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        };

        match result {
            Ok(raw) => {
                debug!(
                    "Chunk {} / {}: {} chars from {} in {:?}",
                    chunk.id,
                    spec.kind,
                    raw.text.len(),
                    backend.name(),
                    start.elapsed()
                );
                return (Ok(raw), attempt);
            }
            Err(e) => {
                warn!("Chunk {} / {}: attempt {} failed: {}", chunk.id, spec.kind, attempt + 1, e);
                let retryable = e.is_retryable();
                last_err = e;
                if !retryable {
                    return (Err(last_err), attempt);
                }
            }
        }
    }

    (Err(last_err), config.max_retries)
}
