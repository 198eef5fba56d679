//! Model invocation: send the image and prompt to each candidate model in
//! turn until one answers.
//!
//! ## Fallback policy
//!
//! Candidates are tried strictly one after another. A failure whose message
//! says the model is unknown or unsupported for this key advances to the next
//! candidate; any other failure (quota, auth, malformed request) aborts the
//! whole run at once. There is no retry or backoff beyond the candidate list.
//!
//! The "unknown model" test is a substring match on free text, kept in
//! [`is_model_unavailable`] so it is the single place to change if the
//! upstream ever returns a structured code.

use crate::error::{InvoiceError, ModelCallError};
use crate::output::ModelInfo;
use crate::pipeline::encode::ImagePayload;
use crate::progress::ExtractionProgressCallback;
use async_trait::async_trait;
use tracing::{info, warn};

/// A multimodal model endpoint: one image plus one text prompt in, text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Issue a single generation call against `model`.
    async fn generate(
        &self,
        model: &str,
        image: &ImagePayload,
        prompt: &str,
    ) -> Result<String, ModelCallError>;
}

/// Lists the models the configured key can see.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, InvoiceError>;
}

/// Everything the HTTP surface needs from an upstream: generation and listing.
pub trait InvoiceBackend: VisionModel + ModelCatalog {}

impl<T: VisionModel + ModelCatalog> InvoiceBackend for T {}

/// The answer of the first candidate that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub model: String,
    pub text: String,
}

/// True when `message` means "this model does not exist / cannot do this",
/// i.e. the next candidate is worth trying.
pub fn is_model_unavailable(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("404") || m.contains("not found") || m.contains("not supported")
}

/// Try `candidates` in order and return the first successful answer.
///
/// # Errors
/// - [`InvoiceError::InvalidConfig`] for an empty candidate list
/// - [`InvoiceError::ModelCallFailed`] on the first non-"unavailable" failure
/// - [`InvoiceError::NoModelAvailable`] when every candidate was unavailable
pub async fn invoke_with_fallback<M: VisionModel + ?Sized>(
    model: &M,
    candidates: &[String],
    image: &ImagePayload,
    prompt: &str,
    progress: Option<&dyn ExtractionProgressCallback>,
) -> Result<ModelResponse, InvoiceError> {
    if candidates.is_empty() {
        return Err(InvoiceError::InvalidConfig(
            "no candidate model configured".into(),
        ));
    }

    if let Some(cb) = progress {
        cb.on_extraction_start(candidates.len());
    }

    let mut last_err: Option<ModelCallError> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        info!("Trying model: {}", candidate);
        if let Some(cb) = progress {
            cb.on_candidate_start(candidate, index, candidates.len());
        }

        match model.generate(candidate, image, prompt).await {
            Ok(text) => {
                info!("Model succeeded: {}", candidate);
                if let Some(cb) = progress {
                    cb.on_candidate_success(candidate, text.len());
                }
                return Ok(ModelResponse {
                    model: candidate.clone(),
                    text,
                });
            }
            Err(e) => {
                let falls_back = is_model_unavailable(&e.message);
                warn!("Model {} failed: {}", candidate, e.message);
                if let Some(cb) = progress {
                    cb.on_candidate_error(candidate, &e.message, falls_back);
                }
                if !falls_back {
                    return Err(InvoiceError::ModelCallFailed {
                        model: candidate.clone(),
                        message: e.message,
                    });
                }
                last_err = Some(e);
            }
        }
    }

    let last_error = last_err
        .map(|e| e.message)
        .unwrap_or_else(|| "Aucun modèle disponible pour votre clé/API.".to_string());
    Err(InvoiceError::NoModelAvailable { last_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted model: each name maps to a canned outcome, every call is logged.
    struct ScriptedModel {
        outcomes: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(outcomes: &[(&str, Result<&str, &str>)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(name, r)| {
                        (
                            name.to_string(),
                            r.map(str::to_string).map_err(str::to_string),
                        )
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn generate(
            &self,
            model: &str,
            _image: &ImagePayload,
            _prompt: &str,
        ) -> Result<String, ModelCallError> {
            self.calls.lock().unwrap().push(model.to_string());
            match self.outcomes.get(model) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(msg)) => Err(ModelCallError::new(msg.clone())),
                None => Err(ModelCallError::new("unscripted model")),
            }
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn image() -> ImagePayload {
        ImagePayload::new("AAAA", "image/png")
    }

    #[test]
    fn classifier_matches_unavailable_messages() {
        assert!(is_model_unavailable("[404 Not Found] models/x is not found"));
        assert!(is_model_unavailable(
            "models/gemini-pro is not supported for generateContent"
        ));
        assert!(is_model_unavailable("model not found"));
        assert!(!is_model_unavailable("[429 Too Many Requests] quota exceeded"));
        assert!(!is_model_unavailable("API key not valid"));
    }

    #[tokio::test]
    async fn falls_back_past_not_found_and_stops_at_first_success() {
        let model = ScriptedModel::new(&[
            ("a", Err("model not found")),
            ("b", Ok("{\"customerName\":\"Ana\"}")),
            ("c", Ok("never used")),
        ]);
        let res = invoke_with_fallback(&model, &names(&["a", "b", "c"]), &image(), "p", None)
            .await
            .unwrap();
        assert_eq!(res.model, "b");
        assert_eq!(res.text, "{\"customerName\":\"Ana\"}");
        assert_eq!(model.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn fatal_error_aborts_without_fallback() {
        let model = ScriptedModel::new(&[
            ("a", Err("[429 Too Many Requests] quota exceeded")),
            ("b", Ok("{}")),
        ]);
        let err = invoke_with_fallback(&model, &names(&["a", "b"]), &image(), "p", None)
            .await
            .unwrap_err();
        match err {
            InvoiceError::ModelCallFailed { model: m, message } => {
                assert_eq!(m, "a");
                assert!(message.contains("quota"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(model.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn all_unavailable_reports_last_message_with_hint() {
        let model = ScriptedModel::new(&[
            ("a", Err("a is not found")),
            ("b", Err("b is not supported for generateContent")),
        ]);
        let err = invoke_with_fallback(&model, &names(&["a", "b"]), &image(), "p", None)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, InvoiceError::NoModelAvailable { .. }));
        assert!(msg.starts_with("b is not supported"), "got: {msg}");
        assert!(msg.contains("Generative Language API"), "got: {msg}");
    }

    #[tokio::test]
    async fn empty_candidate_list_is_config_error() {
        let model = ScriptedModel::new(&[]);
        let err = invoke_with_fallback(&model, &[], &image(), "p", None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
        assert!(model.calls().is_empty());
    }
}
