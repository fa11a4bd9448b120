//! Image payload decoding: [`ImageData`] → raw bytes.
//!
//! Converters may hand images over as raw bytes, bare base64 or a full
//! `data:<mime>;base64,<payload>` URL. Everything is decoded once, right
//! before the bytes hit the disk, so the base64 copy is never held longer
//! than needed.

use crate::output::ImageData;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Decode an image payload into bytes.
pub fn decode_image_data(data: &ImageData) -> Result<Vec<u8>, base64::DecodeError> {
    match data {
        ImageData::Bytes(bytes) => Ok(bytes.clone()),
        ImageData::Encoded(text) => {
            let payload = match split_data_url(text) {
                Some((_, payload)) => payload,
                None => text.as_str(),
            };
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact.as_bytes())?;
            debug!("Decoded image payload → {} bytes", bytes.len());
            Ok(bytes)
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into `(mime, payload)`.
///
/// Returns `None` for anything that is not a base64 data URL.
pub fn split_data_url(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// File extension for an image MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        _ => "png",
    }
}
