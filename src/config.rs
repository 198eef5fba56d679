//! Configuration types for image-to-invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`] or read from the process environment
//! with [`ExtractionConfig::from_env`]. The candidate model list lives here
//! and is handed to the invoker explicitly; nothing in the pipeline reads
//! environment variables on its own.

use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use crate::prompts::EXTRACTION_PROMPT;
use chrono::{DateTime, FixedOffset, Local};
use std::fmt;
use std::sync::Arc;

/// Built-in ordered fallback list, tried when no single-model override is set.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-pro-vision",
    "gemini-1.0-pro-vision",
];

/// Default Generative Language API root.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upload size cap: 5 MiB.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Source of "now" for invoice numbers and dates.
///
/// Injected so invoices can be asserted byte-for-byte in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use invoice_generator::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("AIza-test")
///     .model("gemini-1.5-pro")
///     .build()
///     .unwrap();
/// assert_eq!(config.candidates, vec!["gemini-1.5-pro".to_string()]);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Google API key. `None` is only detected when a model call is needed.
    pub api_key: Option<String>,

    /// Ordered candidate model identifiers. Default: [`DEFAULT_CANDIDATES`].
    pub candidates: Vec<String>,

    /// Generative Language API root, without trailing slash.
    pub api_base_url: String,

    /// Transport timeout per upstream call, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Maximum accepted upload size in bytes. Default: 5 MiB.
    pub max_upload_bytes: usize,

    /// Extraction prompt. Default: [`EXTRACTION_PROMPT`].
    ///
    /// The normaliser relies on the field names this prompt asks for, so an
    /// override must keep the same JSON shape.
    pub prompt: String,

    /// Development mode: error bodies include the error source chain.
    pub development: bool,

    /// Clock used to stamp invoices.
    pub clock: Arc<dyn Clock>,

    /// Optional candidate-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 120,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            prompt: EXTRACTION_PROMPT.to_string(),
            development: false,
            clock: Arc::new(SystemClock),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("candidates", &self.candidates)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("development", &self.development)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read `GOOGLE_API_KEY`, `GEMINI_MODEL`, `GEMINI_API_BASE_URL` and
    /// `APP_ENV` / `ENVIRONMENT` from the process environment.
    pub fn from_env() -> Result<Self, InvoiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InvoiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = Self::builder();
        if let Some(key) = non_blank("GOOGLE_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(model) = non_blank("GEMINI_MODEL") {
            builder = builder.model(model);
        }
        if let Some(url) = non_blank("GEMINI_API_BASE_URL") {
            builder = builder.api_base_url(url);
        }
        let env = non_blank("APP_ENV").or_else(|| non_blank("ENVIRONMENT"));
        let development = env
            .map(|e| matches!(e.to_lowercase().as_str(), "development" | "dev"))
            .unwrap_or(false);

        builder.development(development).build()
    }

    /// The API key, or [`InvoiceError::MissingApiKey`].
    pub fn require_api_key(&self) -> Result<&str, InvoiceError> {
        self.api_key.as_deref().ok_or(InvoiceError::MissingApiKey)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Force a single model, bypassing the fallback list.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.candidates = vec![model.into()];
        self
    }

    pub fn candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn development(mut self, v: bool) -> Self {
        self.config.development = v;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceError> {
        let c = &self.config;
        if c.candidates.is_empty() {
            return Err(InvoiceError::InvalidConfig(
                "at least one candidate model is required".into(),
            ));
        }
        if c.candidates.iter().any(|m| m.trim().is_empty()) {
            return Err(InvoiceError::InvalidConfig(
                "candidate model names must not be blank".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(InvoiceError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_builtin_candidates() {
        let config = ExtractionConfig::default();
        assert_eq!(config.candidates.len(), 4);
        assert_eq!(config.candidates[0], "gemini-1.5-flash");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn env_override_bypasses_fallback_list() {
        let config = ExtractionConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "AIza-test"),
            ("GEMINI_MODEL", "  gemini-2.0-flash "),
        ]))
        .unwrap();
        assert_eq!(config.candidates, vec!["gemini-2.0-flash".to_string()]);
        assert_eq!(config.api_key.as_deref(), Some("AIza-test"));
    }

    #[test]
    fn blank_override_is_ignored() {
        let config = ExtractionConfig::from_lookup(lookup(&[("GEMINI_MODEL", "   ")])).unwrap();
        assert_eq!(config.candidates.len(), DEFAULT_CANDIDATES.len());
    }

    #[test]
    fn development_mode_from_app_env() {
        let dev = ExtractionConfig::from_lookup(lookup(&[("APP_ENV", "Development")])).unwrap();
        assert!(dev.development);
        let prod = ExtractionConfig::from_lookup(lookup(&[("ENVIRONMENT", "production")])).unwrap();
        assert!(!prod.development);
    }

    #[test]
    fn missing_key_is_reported_on_demand() {
        let config = ExtractionConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(InvoiceError::MissingApiKey)
        ));
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        let err = ExtractionConfig::builder()
            .candidates(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let config = ExtractionConfig::builder()
            .api_base_url("http://127.0.0.1:1234/")
            .build()
            .unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:1234");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ExtractionConfig::builder().api_key("secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
