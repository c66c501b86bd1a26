//! Progress-callback trait for per-call generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each (chunk, kind) call.
//!
//! # Example
//!
//! ```rust
//! use edgequake_quizgen::{GenerationConfig, GenerationProgressCallback, QuestionKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     accepted: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_call_complete(&self, chunk_id: usize, kind: QuestionKind, accepted: usize, rejected: usize) {
//!         self.accepted.fetch_add(accepted, Ordering::SeqCst);
//!         eprintln!("chunk {chunk_id} / {kind}: +{accepted} ({rejected} rejected)");
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { accepted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::quiz::QuestionKind;
use std::sync::Arc;

/// Called by the pipeline as it processes each (chunk, kind) call.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Calls run concurrently, so `on_call_start`, `on_call_complete` and
/// `on_call_error` may fire from different tasks at once. Protect shared
/// mutable state with `Mutex` or atomics.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once after chunking, before any backend call.
    ///
    /// # Arguments
    /// * `chunks`      — number of chunks the text was split into
    /// * `total_calls` — chunks × requested kinds
    fn on_generation_start(&self, chunks: usize, total_calls: usize) {
        let _ = (chunks, total_calls);
    }

    /// Called just before the backend is invoked for a call.
    fn on_call_start(&self, chunk_id: usize, kind: QuestionKind) {
        let _ = (chunk_id, kind);
    }

    /// Called when a call's output has been parsed and validated.
    ///
    /// # Arguments
    /// * `accepted` — items that passed validation
    /// * `rejected` — items that failed validation (0 when parsing failed)
    fn on_call_complete(&self, chunk_id: usize, kind: QuestionKind, accepted: usize, rejected: usize) {
        let _ = (chunk_id, kind, accepted, rejected);
    }

    /// Called when a call fails at the backend after all retries.
    fn on_call_error(&self, chunk_id: usize, kind: QuestionKind, error: &str) {
        let _ = (chunk_id, kind, error);
    }

    /// Called once after the generation phase ends (all calls finished or
    /// the deadline expired).
    ///
    /// # Arguments
    /// * `total_calls` — calls that were scheduled
    /// * `succeeded`   — calls whose backend request succeeded
    fn on_generation_complete(&self, total_calls: usize, succeeded: usize) {
        let _ = (total_calls, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
