//! Image inspection for pulled photos.

use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, ImageReader};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DeviceError;

/// A photo retrieved from one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedImage {
    pub serial: String,
    pub position: String,
    /// Lowercase format name (e.g. "jpeg").
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl CapturedImage {
    /// Standard base64 of the raw bytes, as sent over HTTP.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Identify the format and dimensions of pulled bytes.
///
/// Only the header is decoded; pixel data is left untouched.
pub fn inspect(serial: &str, position: &str, bytes: Vec<u8>) -> Result<CapturedImage, DeviceError> {
    if bytes.is_empty() {
        return Err(DeviceError::DecodeFailed("pulled file is empty".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| DeviceError::DecodeFailed(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| DeviceError::DecodeFailed("unrecognized image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| DeviceError::DecodeFailed(e.to_string()))?;

    let sha256 = hex::encode(Sha256::digest(&bytes));

    Ok(CapturedImage {
        serial: serial.to_string(),
        position: position.to_string(),
        format: format_name(format),
        width,
        height,
        sha256,
        bytes,
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        other => other.extensions_str().first().map_or_else(
            || format!("{other:?}").to_lowercase(),
            |ext| (*ext).to_string(),
        ),
    }
}
