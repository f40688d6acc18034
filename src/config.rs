//! Configuration types for normalisation and model analysis.
//!
//! Two structs, both built through builders:
//!
//! * [`PipelineConfig`] — everything the file-normalisation pipeline needs:
//!   the size ceiling, rendering cap, fan-out width, timeouts and the
//!   external tools to call.
//! * [`AnalysisConfig`] — how the ranked batch is sent to the vision model.
//!
//! Nothing here is process-global. Each [`crate::rank::Ranker`] owns its own
//! copies, so tests and per-environment deployments can run with different
//! limits side by side.

use crate::error::RankError;
use crate::pipeline::size::DEFAULT_MAX_FILE_SIZE;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for the file-normalisation pipeline.
///
/// # Example
/// ```rust
/// use resume_rank::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_file_size(5 * 1024 * 1024)
///     .concurrency(2)
///     .verify_content(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Byte ceiling applied to decoded uploads and intermediate PDFs. Default: 10 MiB.
    pub max_file_size: usize,

    /// Longest edge of the rendered first page, in pixels. Default: 2000.
    ///
    /// Résumés are A4/Letter; 2000 px on the long edge keeps small print
    /// legible to the model without blowing up the request size.
    pub max_rendered_pixels: u32,

    /// Number of files normalised at once. Default: 4. `1` is strictly sequential.
    pub concurrency: usize,

    /// Wall-clock budget for converting or rasterising one file. Default: 120.
    pub file_timeout_secs: u64,

    /// Program (plus leading arguments) used for DOC/DOCX → PDF. Default: `["soffice"]`.
    pub converter_command: Vec<String>,

    /// Root directory for per-call temp directories. Default: system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Explicit pdfium shared library. Default: working directory, then system.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Check magic bytes against the declared type before dispatch. Default: false.
    pub verify_content: bool,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_rendered_pixels: 2000,
            concurrency: 4,
            file_timeout_secs: 120,
            converter_command: vec!["soffice".to_string()],
            temp_dir: None,
            pdfium_lib_path: None,
            verify_content: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_file_size", &self.max_file_size)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("file_timeout_secs", &self.file_timeout_secs)
            .field("converter_command", &self.converter_command)
            .field("temp_dir", &self.temp_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("verify_content", &self.verify_content)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn file_timeout_secs(mut self, secs: u64) -> Self {
        self.config.file_timeout_secs = secs;
        self
    }

    pub fn converter_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn verify_content(mut self, v: bool) -> Self {
        self.config.verify_content = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, RankError> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(RankError::InvalidConfig(
                "max_file_size must be > 0".into(),
            ));
        }
        if c.file_timeout_secs == 0 {
            return Err(RankError::InvalidConfig(
                "file_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.converter_command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(RankError::InvalidConfig(
                "converter_command must name a program".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for the vision-model call that ranks a batch.
///
/// # Example
/// ```rust
/// use resume_rank::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4.1-mini")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.model.as_deref(), Some("gpt-4.1-mini"));
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// LLM model identifier. If None, `gpt-4.1-nano` or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Ranking should be repeatable: the same résumés against the same job
    /// description ought to come back in the same order.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed model call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt timeout in seconds. Default: 120.
    ///
    /// A batch carries up to a few dozen page images, so a ranking call runs
    /// much longer than a single-page transcription.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in ranking prompt.
    pub system_prompt: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, RankError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(RankError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(RankError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
