//! Image encoding: `DynamicImage` → maximally compressed PNG, and PNG →
//! base64 `ImageData` for the multimodal API request body.
//!
//! PNG is lossless, so the only size lever besides resolution is the
//! deflate effort; `CompressionType::Best` with adaptive row filters gives
//! the smallest file the encoder can produce. Output size is deterministic
//! for a given pixel buffer, which the compressor's search relies on.

use crate::error::GeoRefError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use tracing::debug;

/// Encode an image as PNG with maximum lossless compression.
pub fn encode_png_best(img: &DynamicImage) -> Result<Vec<u8>, GeoRefError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| GeoRefError::EncodeFailed {
            detail: e.to_string(),
        })?;
    debug!(
        "Encoded {}x{} → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap PNG bytes as a base64 image attachment for the vision model.
pub fn encode_for_model(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}
