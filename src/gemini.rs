//! Google Generative Language API client.
//!
//! Implements [`VisionModel`] (`models/{model}:generateContent` with one
//! inline image part and one text part) and [`ModelCatalog`] (`models`).
//! The API key travels in the `x-goog-api-key` header, never in the URL, and
//! transport errors are stripped of their URL before being reported.
//!
//! Failed generation calls are reported as `"[<status>] <message>"`, e.g.
//! `"[404 Not Found] models/gemini-pro-vision is not found for API version
//! v1beta"`, so the fallback classifier sees both the status and the
//! upstream wording.

use crate::config::ExtractionConfig;
use crate::error::{InvoiceError, ModelCallError};
use crate::output::ModelInfo;
use crate::pipeline::encode::ImagePayload;
use crate::pipeline::llm::{ModelCatalog, VisionModel};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

fn transport_error(e: reqwest::Error) -> String {
    e.without_url().to_string()
}

/// HTTP client bound to one API key and base URL.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InvoiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvoiceError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the key, base URL and timeout in `config`.
    ///
    /// # Errors
    /// [`InvoiceError::MissingApiKey`] when no key is configured.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, InvoiceError> {
        let key = config.require_api_key()?;
        Self::new(
            key,
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    name: String,
    display_name: Option<String>,
    description: Option<String>,
    supported_generation_methods: Option<Vec<String>>,
    supported_methods: Option<Vec<String>>,
}

impl From<RawModel> for ModelInfo {
    fn from(m: RawModel) -> Self {
        ModelInfo {
            name: m.name,
            display_name: m.display_name,
            description: m.description,
            supported_methods: m.supported_generation_methods.or(m.supported_methods),
        }
    }
}

/// Pull `error.message` out of a Google error body, else return the body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Concatenated text of the first candidate.
fn answer_text(response: GenerateResponse) -> Result<String, ModelCallError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("blocked: {r}"))
            .unwrap_or_else(|| "empty response".to_string());
        return Err(ModelCallError::new(format!("Model returned no text ({reason})")));
    }
    Ok(text)
}

// ── Trait impls ──────────────────────────────────────────────────────────────

#[async_trait]
impl VisionModel for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        image: &ImagePayload,
        prompt: &str,
    ) -> Result<String, ModelCallError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": image.mime_type, "data": image.data } },
                    { "text": prompt }
                ]
            }]
        });

        debug!(model, image_b64_len = image.data.len(), "Sending generateContent request");

        let response = self
            .http
            .post(self.generate_url(model))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelCallError::new(transport_error(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelCallError::with_status(
                status.as_u16(),
                format!("[{}] {}", status, upstream_message(&text)),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                ModelCallError::new(format!(
                    "Invalid generateContent response: {}",
                    transport_error(e)
                ))
            })?;
        answer_text(parsed)
    }
}

#[async_trait]
impl ModelCatalog for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, InvoiceError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header(API_KEY_HEADER, self.api_key.as_str())
            .send()
            .await
            .map_err(|e| InvoiceError::Http(transport_error(e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InvoiceError::Http(transport_error(e)))?;
        if !status.is_success() {
            return Err(InvoiceError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ListModelsResponse = serde_json::from_str(&text)
            .map_err(|e| InvoiceError::Http(format!("Invalid models response: {e}")))?;
        debug!(count = parsed.models.len(), "Listed upstream models");
        Ok(parsed.models.into_iter().map(ModelInfo::from).collect())
    }
}
