//! Transport encoding: base64 text ↔ raw bytes.
//!
//! Uploads arrive as base64 inside JSON and leave the same way, as image
//! attachments on the multimodal request. Decoding is lenient about
//! the two things browsers and CLI tools commonly add (a `data:` URI prefix
//! and line wrapping); encoding is always canonical standard base64.

use crate::error::FileError;
use crate::output::{EncodedImage, NormalizedImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Decode an upload payload.
///
/// Accepts `data:<mime>;base64,` prefixes and embedded ASCII whitespace.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, FileError> {
    let body = strip_data_uri(payload.trim());
    let decoded = if body.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(body)
    };
    decoded.map_err(|e| FileError::DecodeError {
        detail: e.to_string(),
    })
}

/// Re-encode a normalised image for transport.
pub fn encode_image(image: &NormalizedImage) -> EncodedImage {
    let data = STANDARD.encode(&image.bytes);
    debug!("Encoded {} → {} bytes base64", image.mime_type, data.len());
    EncodedImage {
        mime_type: image.mime_type.clone(),
        data,
    }
}

/// Wrap an encoded image for the VLM API.
///
/// `detail: "high"` keeps small print on a résumé legible to GPT-4-class
/// models; the low-detail single tile loses it.
pub fn to_image_data(image: &EncodedImage) -> ImageData {
    ImageData::new(image.data.clone(), image.mime_type.as_str()).with_detail("high")
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, rest)) = payload.split_once(";base64,") {
            return rest;
        }
    }
    payload
}
