//! LLM-backed question generation (the Local and Remote backends).
//!
//! Both backends are the same code over different `edgequake-llm`
//! providers: Local defaults to an on-box Ollama, Remote to a hosted API
//! found through the environment. All prompt wording lives in
//! [`crate::prompts`]; retry and timeout policy lives in
//! [`crate::pipeline::backend::generate_with_retry`]. This module only
//! builds the messages, makes one call, and classifies failures.

use crate::config::{BackendSelection, GenerationConfig};
use crate::error::{BackendError, QuizGenError};
use crate::pipeline::backend::{QuestionBackend, RawOutput};
use crate::pipeline::chunk::Chunk;
use crate::prompts::{question_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::quiz::QuestionSpec;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Default model for the Local backend when none is configured.
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2";

/// Default model for the Remote backend when the OpenAI key is used.
pub const DEFAULT_REMOTE_MODEL: &str = "gpt-4.1-nano";

/// A [`QuestionBackend`] that prompts an `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmBackend {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build the Local or Remote backend described by `config`.
    pub fn from_config(selection: BackendSelection, config: &GenerationConfig) -> Result<Self, QuizGenError> {
        let (provider, label) = match selection {
            BackendSelection::Local => resolve_local_provider(config)?,
            BackendSelection::Remote => resolve_remote_provider(config)?,
            BackendSelection::Mock => {
                return Err(QuizGenError::Internal(
                    "the mock backend is not LLM-backed".into(),
                ))
            }
        };
        info!("Using {} backend ({})", selection, label);
        Ok(Self::new(provider, label, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl QuestionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, chunk: &Chunk, spec: &QuestionSpec) -> Result<RawOutput, BackendError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(question_prompt(spec, &chunk.text)),
        ];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_llm_error(&e))?;

        debug!(
            "Chunk {} / {}: {} prompt tokens, {} completion tokens",
            chunk.id, spec.kind, response.prompt_tokens, response.completion_tokens
        );

        Ok(RawOutput {
            text: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, QuizGenError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        QuizGenError::BackendNotConfigured {
            backend: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Local: `provider_name` (default `ollama`) with `model` (default
/// [`DEFAULT_LOCAL_MODEL`]).
fn resolve_local_provider(config: &GenerationConfig) -> Result<(Arc<dyn LLMProvider>, String), QuizGenError> {
    let name = config.provider_name.as_deref().unwrap_or("ollama");
    let model = config.model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL);
    Ok((create_provider(name, model)?, format!("local:{name}/{model}")))
}

/// Remote, from most-specific to least-specific:
///
/// 1. **Named provider** (`config.provider_name`) with `config.model`.
/// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before auto-detection so the model choice is honoured even
///    when several API keys are present.
/// 3. **OpenAI** when `OPENAI_API_KEY` is set.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_remote_provider(config: &GenerationConfig) -> Result<(Arc<dyn LLMProvider>, String), QuizGenError> {
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_REMOTE_MODEL);
        return Ok((create_provider(name, model)?, format!("remote:{name}/{model}")));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let model = config.model.clone().unwrap_or(model);
            return Ok((create_provider(&prov, &model)?, format!("remote:{prov}/{model}")));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_REMOTE_MODEL);
            return Ok((create_provider("openai", model)?, format!("remote:openai/{model}")));
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| QuizGenError::BackendNotConfigured {
            backend: "remote".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or use --backend local / mock.\n\
                Error: {}",
                e
            ),
        })?;
    Ok((provider, "remote:auto".to_string()))
}

// ── Error classification ─────────────────────────────────────────────────

static RE_RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry[\s_-]*after\D{0,5}(\d+)").unwrap());

/// Map a provider error onto the transport taxonomy.
///
/// Typed variants map directly. `ApiError`, `ProviderError` and `Unknown`
/// carry HTTP status only as text and go through
/// [`classify_provider_error`].
pub fn classify_llm_error(err: &LlmError) -> BackendError {
    match err {
        LlmError::RateLimited(msg) => BackendError::Quota {
            detail: msg.clone(),
            retry_after_secs: retry_after(msg),
        },
        LlmError::Timeout => BackendError::Timeout { elapsed_ms: 0 },
        LlmError::NetworkError(msg) => BackendError::Unavailable { detail: msg.clone() },
        LlmError::AuthError(_)
        | LlmError::InvalidRequest(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ModelNotFound(_)
        | LlmError::SerializationError(_)
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_) => BackendError::Api {
            detail: err.to_string(),
        },
        LlmError::ApiError(msg) | LlmError::ProviderError(msg) | LlmError::Unknown(msg) => {
            classify_provider_error(msg)
        }
    }
}

fn retry_after(message: &str) -> Option<u64> {
    RE_RETRY_AFTER
        .captures(message)
        .and_then(|c| c[1].parse().ok())
}

/// Map an untyped provider error message onto the transport taxonomy by
/// matching on the lowercased text. Unrecognised failures are treated as
/// non-retryable API errors.
pub fn classify_provider_error(message: &str) -> BackendError {
    let lower = message.to_lowercase();
    let detail = message.to_string();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["429", "rate limit", "rate_limit", "ratelimit", "quota", "too many requests"]) {
        BackendError::Quota {
            detail,
            retry_after_secs: retry_after(message),
        }
    } else if has(&["timeout", "timed out", "deadline"]) {
        // elapsed time is unknown; the per-attempt timer reports real timeouts
        BackendError::Timeout { elapsed_ms: 0 }
    } else if has(&[
        "connection",
        "connect",
        "dns",
        "unreachable",
        "network",
        "500",
        "502",
        "503",
        "504",
        "overloaded",
        "unavailable",
        "broken pipe",
    ]) {
        BackendError::Unavailable { detail }
    } else {
        BackendError::Api { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_are_quota_errors() {
        let e = classify_provider_error("HTTP 429 Too Many Requests: retry after 20 seconds");
        assert_eq!(
            e,
            BackendError::Quota {
                detail: "HTTP 429 Too Many Requests: retry after 20 seconds".into(),
                retry_after_secs: Some(20),
            }
        );
        assert!(matches!(
            classify_provider_error("You exceeded your current quota"),
            BackendError::Quota { retry_after_secs: None, .. }
        ));
    }

    #[test]
    fn timeouts_and_transport_failures() {
        assert!(matches!(
            classify_provider_error("request timed out"),
            BackendError::Timeout { .. }
        ));
        assert!(matches!(
            classify_provider_error("error sending request: Connection refused (os error 111)"),
            BackendError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_provider_error("API error 503: model overloaded"),
            BackendError::Unavailable { .. }
        ));
    }

    #[test]
    fn other_errors_are_not_retryable() {
        let e = classify_provider_error("401 Unauthorized: invalid api key");
        assert!(matches!(e, BackendError::Api { .. }));
        assert!(!e.is_retryable());
    }

    #[test]
    fn typed_provider_errors_map_by_variant() {
        assert_eq!(
            classify_llm_error(&LlmError::RateLimited("retry after 7s".into())),
            BackendError::Quota {
                detail: "retry after 7s".into(),
                retry_after_secs: Some(7),
            }
        );
        assert!(matches!(
            classify_llm_error(&LlmError::Timeout),
            BackendError::Timeout { .. }
        ));
        assert!(matches!(
            classify_llm_error(&LlmError::NetworkError("reset".into())),
            BackendError::Unavailable { .. }
        ));
    }

    #[test]
    fn requests_that_cannot_succeed_are_not_retried() {
        let hopeless = [
            LlmError::AuthError("bad key".into()),
            LlmError::InvalidRequest("bad field".into()),
            LlmError::TokenLimitExceeded { max: 4096, got: 5000 },
            LlmError::ModelNotFound("gpt-500".into()),
            LlmError::ConfigError("missing".into()),
            LlmError::NotSupported("vision".into()),
        ];
        for err in &hopeless {
            let mapped = classify_llm_error(err);
            assert!(matches!(mapped, BackendError::Api { .. }), "{err}: {mapped:?}");
            assert!(!mapped.is_retryable(), "{err}");
        }
    }

    #[test]
    fn untyped_variants_fall_back_to_message_text() {
        assert!(matches!(
            classify_llm_error(&LlmError::ApiError("503 Service Unavailable".into())),
            BackendError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_llm_error(&LlmError::ProviderError("429 too many requests".into())),
            BackendError::Quota { .. }
        ));
        assert!(matches!(
            classify_llm_error(&LlmError::Unknown("something odd".into())),
            BackendError::Api { .. }
        ));
    }

    #[test]
    fn local_defaults_to_ollama_label() {
        // construction may fail without a reachable daemon; only the
        // label derivation is checked when it succeeds
        let config = GenerationConfig::default();
        if let Ok((_, label)) = resolve_local_provider(&config) {
            assert_eq!(label, format!("local:ollama/{DEFAULT_LOCAL_MODEL}"));
        }
    }

    #[test]
    fn mock_selection_is_not_llm_backed() {
        let err = LlmBackend::from_config(BackendSelection::Mock, &GenerationConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, QuizGenError::Internal(_)));
    }
}
