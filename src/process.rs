//! Top-level entry points: image → [`ProcessOutput`], invoice → PDF file.
//!
//! ```text
//! Upload ──validate──► ImagePayload ──invoke_with_fallback──► raw text
//!        ──normalize_response──► ExtractedOrder ──build_invoice──► Invoice
//! ```
//!
//! The functions taking a `model` argument run against any [`VisionModel`];
//! the ones without build a [`GeminiClient`] from the config.

use crate::config::ExtractionConfig;
use crate::error::InvoiceError;
use crate::gemini::GeminiClient;
use crate::output::{Invoice, ModelInfo, ProcessOutput};
use crate::pipeline::encode::encode_upload;
use crate::pipeline::input::{decode_upload, read_upload, validate_upload, Upload};
use crate::pipeline::invoice::build_invoice;
use crate::pipeline::llm::{invoke_with_fallback, ModelCatalog, VisionModel};
use crate::pipeline::normalize::normalize_response;
use crate::pipeline::render::{download_filename, render_invoice_pdf};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Run the full pipeline on one validated upload.
///
/// Validation is repeated here so no caller can reach the network with a
/// non-image or oversized payload.
pub async fn process_image<M: VisionModel + ?Sized>(
    model: &M,
    upload: &Upload,
    config: &ExtractionConfig,
) -> Result<ProcessOutput, InvoiceError> {
    validate_upload(&upload.mime_type, upload.bytes.len(), config.max_upload_bytes)?;
    let start = Instant::now();
    info!(
        "Processing image: {} bytes, {}",
        upload.bytes.len(),
        upload.mime_type
    );

    let payload = encode_upload(upload);
    let response = invoke_with_fallback(
        model,
        &config.candidates,
        &payload,
        &config.prompt,
        config.progress_callback.as_deref(),
    )
    .await?;
    debug!("Raw model response ({}): {}", response.model, response.text);

    let order = normalize_response(&response.text);
    let invoice = build_invoice(&order, config.clock.now());

    info!(
        "Invoice {} built: {} item(s), total {} ({} ms)",
        invoice.invoice_number,
        invoice.items.len(),
        invoice.total,
        start.elapsed().as_millis()
    );

    Ok(ProcessOutput {
        model: response.model,
        extracted_text: order.raw_extracted_text.clone(),
        raw_response: response.text,
        order,
        invoice,
    })
}

/// Decode a base64 (or data-URI) image and process it.
pub async fn process_base64<M: VisionModel + ?Sized>(
    model: &M,
    data: &str,
    mime_type: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ProcessOutput, InvoiceError> {
    let upload = decode_upload(data, mime_type, config.max_upload_bytes)?;
    process_image(model, &upload, config).await
}

/// Read an image file and process it with the Gemini API.
///
/// The file is validated before the API key is checked, so a bad file is
/// reported as such even without credentials.
pub async fn process_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ProcessOutput, InvoiceError> {
    let upload = read_upload(path, config.max_upload_bytes).await?;
    let client = GeminiClient::from_config(config)?;
    process_image(&client, &upload, config).await
}

/// List the models visible to the configured key.
pub async fn list_models(config: &ExtractionConfig) -> Result<Vec<ModelInfo>, InvoiceError> {
    GeminiClient::from_config(config)?.list_models().await
}

/// Render `invoice` and write it to `output`.
///
/// When `output` is an existing directory the file is named with
/// [`download_filename`]. The write goes through a temporary file and a
/// rename so a failed render never leaves a partial PDF behind. Returns the
/// path written.
pub async fn write_invoice_pdf(
    invoice: &Invoice,
    output: impl AsRef<Path>,
) -> Result<PathBuf, InvoiceError> {
    let output = output.as_ref();
    let path = if tokio::fs::metadata(output)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        output.join(download_filename(invoice))
    } else {
        output.to_path_buf()
    };

    let owned = invoice.clone();
    let bytes = tokio::task::spawn_blocking(move || render_invoice_pdf(&owned))
        .await
        .map_err(|e| InvoiceError::Internal(format!("render task panicked: {e}")))??;
    let write_err = |source| InvoiceError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    let written = match tokio::fs::write(&tmp_path, &bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
        Err(e) => Err(e),
    };
    if let Err(source) = written {
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), e);
        }
        return Err(write_err(source));
    }

    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
