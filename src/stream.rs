//! Streaming generation API: emit per-call results as they complete.
//!
//! Unlike the eager [`crate::generate::generate_quiz`], which returns only
//! after every call finishes and then deduplicates and truncates,
//! [`generate_stream`] yields one [`CallOutcome`] per (chunk, kind) call in
//! completion order. Items are validated but not deduplicated across
//! chunks; sort by `(ordinal, kind)` if order matters.

use crate::config::GenerationConfig;
use crate::error::QuizGenError;
use crate::generate::{call_slots, check_text, extract_document_text, resolve_backend, run_call, CallOutcome};
use crate::pipeline::chunk;
use crate::quiz::{validate_specs, QuestionSpec};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of per-call outcomes.
pub type CallStream = Pin<Box<dyn Stream<Item = CallOutcome> + Send>>;

/// Generate questions from text, streaming each call's outcome as it is ready.
///
/// With `request_deadline_ms` set, calls still in flight when the deadline
/// expires (counted from this call) are dropped, and the stream ends with
/// one outcome per unfinished call with `abandoned` set.
///
/// # Returns
/// - `Ok(CallStream)` — one [`CallOutcome`] per (chunk, kind) call
/// - `Err(QuizGenError)` — fatal error (empty text, bad specs, no backend)
///
/// # Example
/// ```rust,no_run
/// use edgequake_quizgen::{generate_stream, GenerationConfig, QuestionSpec};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let text = std::fs::read_to_string("notes.txt")?;
/// let specs = [QuestionSpec::short_answer(3)];
/// let mut stream = generate_stream(&text, &specs, &GenerationConfig::default()).await?;
/// while let Some(call) = stream.next().await {
///     println!("chunk {} / {}: {} items", call.chunk_id, call.kind, call.accepted.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn generate_stream(
    text: &str,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<CallStream, QuizGenError> {
    check_text(text, config.min_text_chars)?;
    validate_specs(specs)?;
    let chunks = Arc::new(chunk::chunk(text, config.max_chunk_chars, config.overlap_chars)?);
    let backend = resolve_backend(config)?;
    let slots = call_slots(chunks.len(), specs.len());
    info!(
        "Streaming {} calls over {} chunks to {}",
        slots.len(),
        chunks.len(),
        backend.name()
    );

    let specs: Arc<[QuestionSpec]> = specs.into();
    let config = Arc::new(config.clone());
    let concurrency = config.concurrency;
    let deadline = config.request_deadline_ms;
    let finished: Arc<[AtomicBool]> = slots.iter().map(|_| AtomicBool::new(false)).collect();

    let calls = {
        let chunks = Arc::clone(&chunks);
        let specs = Arc::clone(&specs);
        let finished = Arc::clone(&finished);
        stream::iter(slots.clone().into_iter().enumerate().map(move |(slot, (c, s))| {
            let chunks = Arc::clone(&chunks);
            let specs = Arc::clone(&specs);
            let backend = Arc::clone(&backend);
            let config = Arc::clone(&config);
            let finished = Arc::clone(&finished);
            async move {
                let outcome = run_call(&backend, &chunks[c], &specs[s], &config).await;
                finished[slot].store(true, Ordering::Release);
                outcome
            }
        }))
        .buffer_unordered(concurrency)
    };

    let Some(ms) = deadline else {
        return Ok(Box::pin(calls));
    };

    // Polled after the call stream ends; empty unless the deadline cut it short.
    let leftovers = stream::once(async move {
        let unfinished: Vec<CallOutcome> = slots
            .iter()
            .enumerate()
            .filter(|(slot, _)| !finished[*slot].load(Ordering::Acquire))
            .map(|(_, &(c, s))| CallOutcome::abandoned(&chunks[c], specs[s].kind))
            .collect();
        if !unfinished.is_empty() {
            warn!("Request deadline expired: {} calls abandoned", unfinished.len());
        }
        stream::iter(unfinished)
    })
    .flatten();

    Ok(Box::pin(
        calls
            .take_until(tokio::time::sleep(Duration::from_millis(ms)))
            .chain(leftovers),
    ))
}

/// Extract a PDF (path or URL) and stream question generation over its text.
pub async fn generate_stream_from_pdf(
    input_str: impl AsRef<str>,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<CallStream, QuizGenError> {
    let extracted = extract_document_text(input_str, config).await?;
    generate_stream(&extracted.text, specs, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::MockBackend;
    use crate::quiz::QuestionKind;

    const TEXT: &str = "Paris is the capital of France. The Seine flows through Paris.\n\n\
        Berlin is the capital of Germany. The Spree flows through Berlin.";

    #[tokio::test]
    async fn yields_one_outcome_per_call() {
        let config = GenerationConfig::builder()
            .max_chunk_chars(70)
            .overlap_chars(0)
            .build()
            .unwrap();
        let specs = [QuestionSpec::fill_blank(1), QuestionSpec::short_answer(1)];
        let outcomes: Vec<CallOutcome> = generate_stream(TEXT, &specs, &config).await.unwrap().collect().await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert_eq!(
            outcomes.iter().filter(|o| o.kind == QuestionKind::FillBlank).count(),
            2
        );
    }

    #[tokio::test]
    async fn deadline_ends_the_stream() {
        let config = GenerationConfig::builder()
            .backend_impl(Arc::new(MockBackend::new().with_latency(Duration::from_millis(500))))
            .request_deadline_ms(20)
            .build()
            .unwrap();
        let outcomes: Vec<CallOutcome> = generate_stream(TEXT, &[QuestionSpec::mcq(1)], &config)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].abandoned);
        assert!(!outcomes[0].succeeded());
        assert!(outcomes[0].accepted.is_empty());
    }

    #[tokio::test]
    async fn only_unfinished_calls_are_reported_abandoned() {
        let config = GenerationConfig::builder()
            .max_chunk_chars(70)
            .overlap_chars(0)
            .request_deadline_ms(2_000)
            .build()
            .unwrap();
        let outcomes: Vec<CallOutcome> = generate_stream(TEXT, &[QuestionSpec::mcq(1)], &config)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.abandoned && o.succeeded()));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_up_front() {
        let err = generate_stream("   ", &[QuestionSpec::mcq(1)], &GenerationConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, QuizGenError::EmptyDocument));
    }
}
