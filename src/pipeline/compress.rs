//! Size-targeted PNG compression.
//!
//! A scanned map TIFF is typically 50–300 MB; vision APIs accept a few MB.
//! PNG keeps the hand lettering crisp, so the only way to hit a byte budget
//! is to reduce resolution. Encoded size is not a closed-form function of
//! scale (it depends on image content), hence a bounded binary search:
//!
//! 1. Decode and flatten to 8-bit RGB so alpha or 16-bit channels never
//!    inflate the encoding.
//! 2. Encode at full resolution. Under budget → done, no resize.
//! 3. Otherwise search the scale in `[0.1, 1.0]` for [`SEARCH_ITERATIONS`]
//!    steps, keeping the largest scale whose PNG fits. If none fits, return
//!    the full-size encode rather than failing.
//!
//! Decoding and resizing are CPU-bound; [`compress_blocking`] moves the
//! work onto tokio's blocking pool.

use crate::error::GeoRefError;
use crate::pipeline::encode::encode_png_best;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Lower bound of the scale search.
pub const MIN_SCALE: f64 = 0.1;

/// Upper bound of the scale search.
pub const MAX_SCALE: f64 = 1.0;

/// Number of halvings of the search interval.
pub const SEARCH_ITERATIONS: usize = 8;

/// A PNG produced by the compressor.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    pub fn size_bytes(&self) -> u64 {
        self.png.len() as u64
    }
}

/// One probe of the binary search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchStep {
    pub scale: f64,
    pub size_bytes: u64,
    pub accepted: bool,
}

/// Outcome of a compression, with enough detail to audit the search.
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub image: CompressedImage,
    pub original_width: u32,
    pub original_height: u32,
    /// Size of the full-resolution re-encode.
    pub initial_size_bytes: u64,
    /// Scale of the returned image (1.0 when not resized).
    pub scale: f64,
    /// Search probes in order; empty when the short-circuit applied.
    pub steps: Vec<SearchStep>,
    /// Whether the returned image is within the target.
    pub within_target: bool,
}

/// Compress `bytes` to a PNG of at most `target_bytes` where achievable.
///
/// `name` is used only in error messages and logs.
pub fn compress(name: &str, bytes: &[u8], target_bytes: u64) -> Result<CompressionReport, GeoRefError> {
    let img = decode_rgb(name, bytes)?;
    let (width, height) = (img.width(), img.height());

    let full = encode_png_best(&img)?;
    let initial_size = full.len() as u64;
    info!(
        "{}: {}x{} re-encodes to {} bytes (target {})",
        name, width, height, initial_size, target_bytes
    );

    if initial_size <= target_bytes {
        return Ok(CompressionReport {
            image: CompressedImage {
                png: full,
                width,
                height,
            },
            original_width: width,
            original_height: height,
            initial_size_bytes: initial_size,
            scale: MAX_SCALE,
            steps: Vec::new(),
            within_target: true,
        });
    }

    let (best, steps) = search_scale(target_bytes, |scale| {
        let (w, h) = scaled_dimensions(width, height, scale);
        let resized = img.resize_exact(w, h, FilterType::Lanczos3);
        Ok(CompressedImage {
            png: encode_png_best(&resized)?,
            width: w,
            height: h,
        })
    })?;

    let report = match best {
        Some((scale, image)) => {
            info!(
                "{}: scaled by {:.4} to {}x{}, {} bytes",
                name,
                scale,
                image.width,
                image.height,
                image.size_bytes()
            );
            CompressionReport {
                image,
                original_width: width,
                original_height: height,
                initial_size_bytes: initial_size,
                scale,
                steps,
                within_target: true,
            }
        }
        None => {
            warn!(
                "{}: no scale ≥ {} fits {} bytes; keeping full-size encode ({} bytes)",
                name, MIN_SCALE, target_bytes, initial_size
            );
            CompressionReport {
                image: CompressedImage {
                    png: full,
                    width,
                    height,
                },
                original_width: width,
                original_height: height,
                initial_size_bytes: initial_size,
                scale: MAX_SCALE,
                steps,
                within_target: false,
            }
        }
    };

    Ok(report)
}

/// Run [`compress`] on tokio's blocking pool.
pub async fn compress_blocking(
    name: String,
    bytes: Vec<u8>,
    target_bytes: u64,
) -> Result<CompressionReport, GeoRefError> {
    tokio::task::spawn_blocking(move || compress(&name, &bytes, target_bytes))
        .await
        .map_err(|e| GeoRefError::Internal(format!("Compression task panicked: {}", e)))?
}

/// Binary search over the scale factor.
///
/// Returns the largest accepted `(scale, candidate)` and every probe made.
/// After each probe the accepted bound only grows and the rejected bound
/// only shrinks, so every accepted scale is below every rejected one.
fn search_scale<F>(
    target_bytes: u64,
    mut encode_at: F,
) -> Result<(Option<(f64, CompressedImage)>, Vec<SearchStep>), GeoRefError>
where
    F: FnMut(f64) -> Result<CompressedImage, GeoRefError>,
{
    let (mut low, mut high) = (MIN_SCALE, MAX_SCALE);
    let mut best: Option<(f64, CompressedImage)> = None;
    let mut steps = Vec::with_capacity(SEARCH_ITERATIONS);

    for _ in 0..SEARCH_ITERATIONS {
        let mid = (low + high) / 2.0;
        let candidate = encode_at(mid)?;
        let size = candidate.size_bytes();
        let accepted = size <= target_bytes;
        debug!(
            "scale {:.4} → {}x{} = {} bytes ({})",
            mid,
            candidate.width,
            candidate.height,
            size,
            if accepted { "fits" } else { "too large" }
        );
        steps.push(SearchStep {
            scale: mid,
            size_bytes: size,
            accepted,
        });

        if accepted {
            low = mid;
            best = Some((mid, candidate));
        } else {
            high = mid;
        }
    }

    Ok((best, steps))
}

fn decode_rgb(name: &str, bytes: &[u8]) -> Result<DynamicImage, GeoRefError> {
    let decode_err = |detail: String| GeoRefError::DecodeFailed {
        name: name.to_string(),
        detail,
    };
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?;
    // Archival scans routinely exceed the default allocation limit.
    reader.no_limits();
    let img = reader.decode().map_err(|e| decode_err(e.to_string()))?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}
