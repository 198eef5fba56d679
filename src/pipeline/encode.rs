//! Image encoding: raw upload bytes → base64 payload for the VLM request.
//!
//! Gemini accepts images inline as `{ inline_data: { mime_type, data } }`
//! where `data` is standard base64. The upload is forwarded as-is; there is
//! no re-encoding, the model reads JPEG and PNG equally well.

use crate::pipeline::input::Upload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// An image ready to be embedded in a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Standard base64, no data-URI prefix.
    pub data: String,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Base64-encode a validated upload.
pub fn encode_upload(upload: &Upload) -> ImagePayload {
    let b64 = STANDARD.encode(&upload.bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImagePayload::new(b64, upload.mime_type.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_keeps_mime_and_round_trips() {
        let upload = Upload {
            bytes: vec![1, 2, 3, 4, 5],
            mime_type: "image/webp".into(),
            name: Some("note.webp".into()),
        };
        let payload = encode_upload(&upload);
        assert_eq!(payload.mime_type, "image/webp");
        let decoded = STANDARD.decode(&payload.data).expect("valid base64");
        assert_eq!(decoded, upload.bytes);
    }
}
