//! Vision-model analysis: send the normalised batch plus the job posting to
//! an LLM and return its text untouched.
//!
//! All prompt wording lives in [`crate::prompts`]; this module owns provider
//! resolution, retries and timeouts.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`) spaces the
//! retries out: with 500 ms base and 3 retries the waits are
//! 500 ms → 1 s → 2 s. Each attempt is also bounded by `api_timeout_secs`, so
//! a hung connection counts as a failed attempt instead of stalling the
//! request forever.

use crate::config::AnalysisConfig;
use crate::error::RankError;
use crate::output::EncodedImage;
use crate::pipeline::encode::to_image_data;
use crate::prompts::{ranking_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// The role a batch is being ranked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPosting {
    pub description: String,
    pub post_id: String,
}

impl JobPosting {
    pub fn new(description: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            post_id: post_id.into(),
        }
    }
}

/// Ranks a batch of résumé images against a job posting.
///
/// Implementations receive the images in submission order and return the
/// model's answer as free-form text. Nothing downstream parses it.
#[async_trait]
pub trait CandidateAnalyzer: Send + Sync {
    async fn analyze(&self, images: &[EncodedImage], job: &JobPosting)
        -> Result<String, RankError>;
}

/// [`CandidateAnalyzer`] backed by an `edgequake-llm` vision provider.
pub struct VisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    config: AnalysisConfig,
}

impl std::fmt::Debug for VisionAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionAnalyzer")
            .field("provider", &"<dyn LLMProvider>")
            .field("config", &self.config)
            .finish()
    }
}

impl VisionAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: AnalysisConfig) -> Self {
        Self { provider, config }
    }

    /// Resolve a provider from `config` (and the environment) and wrap it.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, RankError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::new(provider, config))
    }

    fn build_messages(&self, images: &[EncodedImage], job: &JobPosting) -> Vec<ChatMessage> {
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let attachments = images.iter().map(to_image_data).collect();
        let text = ranking_prompt(job);
        vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(&text, attachments),
        ]
    }
}

#[async_trait]
impl CandidateAnalyzer for VisionAnalyzer {
    async fn analyze(
        &self,
        images: &[EncodedImage],
        job: &JobPosting,
    ) -> Result<String, RankError> {
        let messages = self.build_messages(images, job);
        let options = build_options(&self.config);
        let start = Instant::now();
        info!(
            images = images.len(),
            job_post_id = %job.post_id,
            "Sending batch to vision model"
        );

        let (provider, messages, options) = (&self.provider, &messages, &options);
        let response = call_with_retries(&self.config, move |_attempt| async move {
            provider
                .chat(messages, Some(options))
                .await
                .map(|r| {
                    debug!(
                        input_tokens = r.prompt_tokens,
                        output_tokens = r.completion_tokens,
                        "Model responded"
                    );
                    r.content
                })
                .map_err(|e| e.to_string())
        })
        .await?;

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = response.len(),
            "Analysis complete"
        );
        Ok(response)
    }
}

enum LastFailure {
    Error(String),
    Timeout,
}

/// Run `call` until it succeeds, retrying with exponential backoff.
///
/// Every attempt is bounded by `api_timeout_secs`. A timeout on the final
/// attempt surfaces as [`RankError::AnalysisTimeout`]; any other exhaustion
/// as [`RankError::AnalysisFailed`].
async fn call_with_retries<F, Fut>(config: &AnalysisConfig, mut call: F) -> Result<String, RankError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String, String>>,
{
    let per_attempt = Duration::from_secs(config.api_timeout_secs);
    let mut last = LastFailure::Error("no attempt was made".to_string());

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(attempt, max_retries = config.max_retries, backoff_ms = backoff, "Retrying model call");
            sleep(Duration::from_millis(backoff)).await;
        }

        match tokio::time::timeout(per_attempt, call(attempt)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(detail)) => {
                warn!(attempt = attempt + 1, error = %detail, "Model call failed");
                last = LastFailure::Error(detail);
            }
            Err(_) => {
                warn!(attempt = attempt + 1, secs = config.api_timeout_secs, "Model call timed out");
                last = LastFailure::Timeout;
            }
        }
    }

    Err(match last {
        LastFailure::Timeout => RankError::AnalysisTimeout {
            secs: config.api_timeout_secs,
        },
        LastFailure::Error(detail) => RankError::AnalysisFailed {
            retries: config.max_retries,
            detail,
        },
    })
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, RankError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RankError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Pick the `(provider, model)` to build, most specific source first:
/// `config.provider_name`, then the `EDGEQUAKE_LLM_PROVIDER` /
/// `EDGEQUAKE_MODEL` pair, then OpenAI when `OPENAI_API_KEY` is present.
///
/// `None` means nothing was named and auto-detection should take over.
fn provider_choice(config: &AnalysisConfig) -> Option<(String, String)> {
    let model = || config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if let Some(ref name) = config.provider_name {
        return Some((name.clone(), model()));
    }
    if let (Some(provider), Some(env_model)) =
        (non_empty_env("EDGEQUAKE_LLM_PROVIDER"), non_empty_env("EDGEQUAKE_MODEL"))
    {
        return Some((provider, env_model));
    }
    non_empty_env("OPENAI_API_KEY").map(|_| ("openai".to_string(), model()))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// A pre-built `config.provider` wins; otherwise build what
/// [`provider_choice`] names, or fall back to `ProviderFactory::from_env`.
fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, RankError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    if let Some((provider, model)) = provider_choice(config) {
        debug!(%provider, %model, "Using configured vision provider");
        return create_vision_provider(&provider, &model);
    }

    ProviderFactory::from_env()
        .map(|(llm, _embedding)| llm)
        .map_err(|e| RankError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "set OPENAI_API_KEY, pass --provider/--model, or export \
                 EDGEQUAKE_LLM_PROVIDER and EDGEQUAKE_MODEL ({e})"
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(retries: u32) -> AnalysisConfig {
        AnalysisConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&AnalysisConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = call_with_retries(&fast(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err("429 Too Many Requests".to_string())
                } else {
                    Ok("{\"candidates\": []}".to_string())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "{\"candidates\": []}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let err = call_with_retries(&fast(2), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<String, _>(format!("boom {attempt}")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RankError::AnalysisFailed { retries, detail } => {
                assert_eq!(retries, 2);
                assert_eq!(detail, "boom 2");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_final_attempt_is_a_timeout() {
        let err = call_with_retries(&fast(0), |_| async {
            sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(String::new())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RankError::AnalysisTimeout { secs: 1 }));
    }

    #[test]
    fn named_provider_uses_configured_or_default_model() {
        let config = AnalysisConfig::builder().provider_name("ollama").build().unwrap();
        assert_eq!(
            provider_choice(&config),
            Some(("ollama".to_string(), DEFAULT_MODEL.to_string()))
        );

        let config = AnalysisConfig::builder()
            .provider_name("anthropic")
            .model("claude-sonnet-4")
            .build()
            .unwrap();
        assert_eq!(
            provider_choice(&config),
            Some(("anthropic".to_string(), "claude-sonnet-4".to_string()))
        );
    }

    #[test]
    fn job_posting_new() {
        let job = JobPosting::new("Backend engineer", "17");
        assert_eq!(job.post_id, "17");
        assert_eq!(job.description, "Backend engineer");
    }
}
