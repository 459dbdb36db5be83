//! Image normalisation shared by every capability that ships pixels to a backend.

use crate::{Error, Result, config::ImageConfig};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use tracing::debug;

pub const JPEG_MIME: &str = "image/jpeg";

/// An image ready to be sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Decodes any supported format, flattens to RGB, caps the longer side at
/// `max_dimension` and re-encodes as JPEG.
pub fn prepare_image(raw: &[u8], config: &ImageConfig) -> Result<EncodedImage> {
    if raw.is_empty() {
        return Err(Error::validation("Image file is empty"));
    }

    let mut img = image::load_from_memory(raw)
        .map_err(|e| Error::validation(format!("Unreadable image: {e}")))?;

    let max = config.max_dimension;
    if img.width() > max || img.height() > max {
        debug!(
            "Downscaling image from {}x{} to fit {}",
            img.width(),
            img.height(),
            max
        );
        img = img.resize(max, max, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality).encode_image(&rgb)?;

    Ok(EncodedImage::new(JPEG_MIME, bytes))
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
pub fn decode_base64_image(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| Error::validation("image data URL must be base64 encoded"))?,
        None => trimmed,
    };
    BASE64
        .decode(payload)
        .map_err(|e| Error::validation(format!("Invalid base64 image: {e}")))
}
