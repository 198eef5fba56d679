//! HTTP surface.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET  /api/list-models` | models visible to the configured key |
//! | `POST /api/process-image` | `{image, mimeType}` → `{success, extractedText, invoiceData}` |
//! | `POST /api/invoice-pdf` | invoice JSON → `application/pdf` attachment |
//!
//! Every failure is answered with a JSON body; handlers never panic. Each
//! request is independent: the only shared state is the read-only config
//! and the upstream client.

use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use crate::gemini::GeminiClient;
use crate::output::{Invoice, ModelInfo};
use crate::pipeline::invoice::recalculate;
use crate::pipeline::llm::InvoiceBackend;
use crate::pipeline::render::{download_filename, render_invoice_pdf};
use crate::pipeline::input::decode_upload;
use crate::process;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Request body cap. A 5 MiB image is about 6.7 MiB once base64-encoded.
pub const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

pub const MISSING_KEY_MESSAGE: &str = "GOOGLE_API_KEY manquant dans .env (ou dans l'environnement)";
pub const LIST_MODELS_HINT: &str = "Vérifiez que la clé provient de Google AI Studio (aistudio.google.com) et que l’API Generative Language est activée.";
pub const PROCESS_ERROR_MESSAGE: &str = "Erreur lors du traitement de l'image";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ExtractionConfig>,
    /// `None` when no API key is configured; model routes then report it.
    pub backend: Option<Arc<dyn InvoiceBackend>>,
}

impl AppState {
    /// State backed by the Gemini API when a key is configured.
    pub fn new(config: ExtractionConfig) -> Result<Self, InvoiceError> {
        let backend = match config.api_key {
            Some(_) => Some(Arc::new(GeminiClient::from_config(&config)?) as Arc<dyn InvoiceBackend>),
            None => None,
        };
        Ok(Self {
            config: Arc::new(config),
            backend,
        })
    }

    pub fn with_backend(config: ExtractionConfig, backend: Arc<dyn InvoiceBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend: Some(backend),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn InvoiceBackend>, InvoiceError> {
        self.backend.as_ref().ok_or(InvoiceError::MissingApiKey)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/list-models", get(list_models))
        .route("/api/process-image", post(process_image))
        .route("/api/invoice-pdf", post(invoice_pdf))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), InvoiceError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| InvoiceError::Http(format!("cannot bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| InvoiceError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── GET /api/list-models ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ListModelsResponse {
    success: bool,
    models: Vec<ModelInfo>,
}

async fn list_models(State(state): State<AppState>) -> Response {
    let Some(backend) = state.backend.as_ref() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": MISSING_KEY_MESSAGE })),
        )
            .into_response();
    };

    match backend.list_models().await {
        Ok(models) => Json(ListModelsResponse {
            success: true,
            models,
        })
        .into_response(),
        Err(InvoiceError::UpstreamStatus { status, body }) => {
            error!("Model listing failed with HTTP {}", status);
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                code,
                Json(json!({
                    "error": format!("Impossible de lister les modèles (HTTP {status})."),
                    "details": body,
                    "hint": LIST_MODELS_HINT,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Model listing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Erreur interne lors de la récupération des modèles",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

// ── POST /api/process-image ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageRequest {
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessImageResponse {
    success: bool,
    extracted_text: String,
    invoice_data: Invoice,
}

#[derive(Debug, Serialize)]
struct ProcessErrorBody {
    success: bool,
    error: &'static str,
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

async fn process_image(
    State(state): State<AppState>,
    body: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Response {
    let result = match body {
        Ok(Json(request)) => run_process_image(&state, request).await,
        Err(rejection) => Err(InvoiceError::InvalidRequest(rejection.body_text())),
    };

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("Error processing image: {}", e);
            let status = StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = ProcessErrorBody {
                success: false,
                error: PROCESS_ERROR_MESSAGE,
                details: e.to_string(),
                stack: state.config.development.then(|| error_chain(&e)),
            };
            (status, Json(body)).into_response()
        }
    }
}

async fn run_process_image(
    state: &AppState,
    request: ProcessImageRequest,
) -> Result<ProcessImageResponse, InvoiceError> {
    let upload = decode_upload(
        &request.image,
        request.mime_type.as_deref(),
        state.config.max_upload_bytes,
    )?;
    let backend = state.backend()?;
    let output = process::process_image(backend.as_ref(), &upload, &state.config).await?;
    Ok(ProcessImageResponse {
        success: true,
        extracted_text: output.extracted_text,
        invoice_data: output.invoice,
    })
}

/// Debug form of the error followed by its `source()` chain.
fn error_chain(e: &InvoiceError) -> String {
    let mut out = format!("{e:?}");
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        out.push_str(&format!("\ncaused by: {cause}"));
        source = cause.source();
    }
    out
}

// ── POST /api/invoice-pdf ────────────────────────────────────────────────────

async fn invoice_pdf(body: Result<Json<Invoice>, JsonRejection>) -> Response {
    let invoice = match body {
        Ok(Json(invoice)) => recalculate(invoice),
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "Facture invalide",
                    "details": rejection.body_text(),
                })),
            )
                .into_response();
        }
    };

    let file_name = download_filename(&invoice);
    let rendered = tokio::task::spawn_blocking(move || render_invoice_pdf(&invoice))
        .await
        .map_err(|e| InvoiceError::Internal(format!("render task panicked: {e}")))
        .and_then(|r| r);

    match rendered {
        Ok(bytes) => {
            let disposition = content_disposition(&file_name);
            (
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("PDF generation error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Erreur lors de la génération du PDF",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// `attachment` disposition with an ASCII `filename` and the exact UTF-8 name
/// in `filename*`.
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' { c } else { '_' })
        .collect();
    let encoded: String = file_name
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect();
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"facture.pdf\""))
}
