//! Error types for the invoice-generator library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`] is **fatal**: the request cannot produce an invoice at all
//!   (missing API key, rejected upload, upstream quota error). Returned as
//!   `Err(InvoiceError)` from the top-level `process*` functions.
//!
//! * [`ModelCallError`] is **per candidate**: a single model identifier failed.
//!   The invoker decides whether the failure means "try the next candidate"
//!   or "abort", see [`crate::pipeline::llm::is_model_unavailable`].
//!
//! Parsing the model's answer never fails: the normaliser always recovers a
//! usable order, so there is no error variant for it.

use std::path::PathBuf;
use thiserror::Error;

/// Remediation text appended when no candidate model is reachable.
pub const NO_MODEL_HINT: &str = "Essayez d'activer la Generative Language API dans Google Cloud, \
vérifier la clé API, ou utiliser un projet avec accès aux modèles Gemini.";

/// All fatal errors returned by the invoice-generator library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// `GOOGLE_API_KEY` is not set.
    #[error("GOOGLE_API_KEY is not set in environment variables")]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Upload validation errors ──────────────────────────────────────────
    /// The upload is not an image.
    #[error("Veuillez sélectionner un fichier image valide (JPG, PNG, etc.). Type reçu : '{mime}'")]
    UnsupportedMediaType { mime: String },

    /// The upload exceeds the size cap.
    #[error("L'image est trop grande ({size} octets). Veuillez utiliser une image de moins de {} MB.", .max / (1024 * 1024))]
    ImageTooLarge { size: usize, max: usize },

    /// The `image` field of the request body is not valid base64.
    #[error("Image data is not valid base64: {0}")]
    InvalidBase64(String),

    /// The request body is not the expected JSON shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Upstream / model errors ───────────────────────────────────────────
    /// A candidate failed with an error that is not "model unavailable".
    /// Fallback stops immediately.
    #[error("Model '{model}' failed: {message}")]
    ModelCallFailed { model: String, message: String },

    /// Every candidate reported "not found" / "not supported".
    #[error("{last_error}. {hint}", hint = NO_MODEL_HINT)]
    NoModelAvailable { last_error: String },

    /// A non-2xx answer from an upstream endpoint that is reported verbatim.
    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus { status: u16, body: String },

    /// Transport-level failure talking to the upstream API.
    #[error("HTTP error: {0}")]
    Http(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The PDF document could not be produced.
    #[error("PDF rendering failed: {0}")]
    RenderFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    /// True for errors caused by the caller's input rather than by the
    /// service or its upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InvoiceError::UnsupportedMediaType { .. }
                | InvoiceError::ImageTooLarge { .. }
                | InvoiceError::InvalidBase64(_)
                | InvoiceError::InvalidRequest(_)
                | InvoiceError::FileNotFound { .. }
        )
    }

    /// HTTP status used when this error is reported by the server.
    pub fn http_status(&self) -> u16 {
        match self {
            e if e.is_client_error() => 400,
            _ => 500,
        }
    }
}

/// A failed generation call for one candidate model.
///
/// `message` is the upstream's free-text message; callers classify it
/// rather than matching on `status`, since the upstream does not return a
/// stable error code for "unknown model".
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{message}")]
pub struct ModelCallError {
    /// HTTP status of the failed call, when there was one.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl ModelCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}
