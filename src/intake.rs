//! Source photo intake.
//!
//! Normalizes whatever the host hands us (a file on disk, raw bytes from a
//! capture device, or base64 text from a browser) into an [`ImagePayload`].

use crate::error::{FeedError, Result};
use crate::image::{ImageFormat, ImagePayload};
use base64::Engine;
use std::path::Path;

/// Decodes a base64 string that may be imperfectly formatted.
///
/// Accepts a data URI prefix (`data:image/png;base64,...`), embedded
/// whitespace, and missing `=` padding.
pub fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)
}

/// Encodes raw image bytes, detecting the format from magic bytes.
pub fn from_bytes(bytes: &[u8]) -> Result<ImagePayload> {
    if bytes.is_empty() {
        return Err(FeedError::Intake("image is empty".into()));
    }
    let format = ImageFormat::from_magic_bytes(bytes)
        .ok_or_else(|| FeedError::Intake("unrecognized image format".into()))?;
    Ok(ImagePayload::encode(bytes, format))
}

/// Reads and encodes an image file.
///
/// Magic bytes win over the extension; the extension is only consulted
/// when the content is not recognized.
pub fn from_path(path: impl AsRef<Path>) -> Result<ImagePayload> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(FeedError::Intake(format!("{} is empty", path.display())));
    }

    let format = ImageFormat::from_magic_bytes(&bytes)
        .or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(ImageFormat::from_extension)
        })
        .ok_or_else(|| {
            FeedError::Intake(format!("{} is not a supported image", path.display()))
        })?;

    tracing::debug!(path = %path.display(), format = format.extension(), bytes = bytes.len(), "read source image");
    Ok(ImagePayload::encode(&bytes, format))
}

/// Validates host-supplied base64 and MIME type, re-encoding canonically.
///
/// Browser hosts hand over data URIs or unpadded text; the generation
/// sources want standard padded base64.
pub fn from_encoded(payload: &str, mime_type: &str) -> Result<ImagePayload> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    if !mime_type.starts_with("image/") {
        return Err(FeedError::Intake(format!(
            "expected an image MIME type, got {:?}",
            mime_type
        )));
    }

    let bytes =
        decode_base64_lenient(payload).map_err(|e| FeedError::Intake(format!("bad base64: {e}")))?;
    if bytes.is_empty() {
        return Err(FeedError::Intake("image is empty".into()));
    }

    Ok(ImagePayload::new(
        base64::engine::general_purpose::STANDARD.encode(&bytes),
        mime_type,
    ))
}

/// Reports a capture device failure.
///
/// Capture problems never reach the feed: the caller surfaces the error
/// and leaves any existing session alone.
pub fn capture_failed(reason: impl Into<String>) -> FeedError {
    let reason = reason.into();
    tracing::warn!(%reason, "capture aborted");
    FeedError::Capture(reason)
}
