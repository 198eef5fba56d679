//! Input validation: reject anything that is not a reasonably sized image
//! before a single byte goes to the network.
//!
//! Two entry shapes exist: the HTTP API receives base64 text plus a declared
//! MIME type, the CLI receives a path. Both end as an [`Upload`] that has
//! already passed [`validate_upload`].

use crate::error::InvoiceError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// MIME type assumed when the caller did not send one.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A validated image upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Display name (file name for CLI uploads).
    pub name: Option<String>,
}

/// Check MIME type and size.
///
/// The MIME check is a prefix match on `image/`, the size check is
/// `len > max_bytes`.
pub fn validate_upload(mime_type: &str, size: usize, max_bytes: usize) -> Result<(), InvoiceError> {
    if !mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(InvoiceError::UnsupportedMediaType {
            mime: mime_type.to_string(),
        });
    }
    if size > max_bytes {
        return Err(InvoiceError::ImageTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// Decode a base64 image sent by a client and validate it.
///
/// Accepts both bare base64 and a `data:<mime>;base64,` URI; an empty
/// `mime_type` falls back to the data URI's type, then to
/// [`DEFAULT_MIME_TYPE`].
pub fn decode_upload(
    data: &str,
    mime_type: Option<&str>,
    max_bytes: usize,
) -> Result<Upload, InvoiceError> {
    let (uri_mime, payload) = split_data_uri(data.trim());
    let mime_type = mime_type
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .or(uri_mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| InvoiceError::InvalidBase64(e.to_string()))?;
    validate_upload(&mime_type, bytes.len(), max_bytes)?;
    debug!("Decoded upload: {} bytes, {}", bytes.len(), mime_type);

    Ok(Upload {
        bytes,
        mime_type,
        name: None,
    })
}

/// Read an image file from disk, sniffing its MIME type from the content.
///
/// Size is checked from metadata first so oversized files are never read.
pub async fn read_upload(path: impl AsRef<Path>, max_bytes: usize) -> Result<Upload, InvoiceError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    let size = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(InvoiceError::ImageTooLarge {
            size,
            max: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    let mime_type = sniff_mime_type(&bytes, path);
    validate_upload(&mime_type, bytes.len(), max_bytes)?;

    Ok(Upload {
        bytes,
        mime_type,
        name: file_name(path),
    })
}

/// Content-based MIME detection, falling back to the file extension.
pub fn sniff_mime_type(bytes: &[u8], path: &Path) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg".into(),
        Some("png") => "image/png".into(),
        Some("webp") => "image/webp".into(),
        Some("gif") => "image/gif".into(),
        Some("heic") => "image/heic".into(),
        _ => "application/octet-stream".into(),
    }
}

fn split_data_uri(data: &str) -> (Option<&str>, &str) {
    if let Some(rest) = data.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(',') {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            return (mime, payload);
        }
    }
    (None, data)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Human-readable size as shown in the chat log (`123 KB`).
pub fn display_size(bytes: usize) -> String {
    format!("{:.0} KB", bytes as f64 / 1024.0)
}
