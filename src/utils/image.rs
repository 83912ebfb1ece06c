// src/utils/image.rs

use std::{io::Cursor, path::Path};

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::error::AppError;

/// Bounds an uploaded image is shrunk into before storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy encoder quality between 0 and 1.
    pub quality: f32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 1024,
            quality: 0.7,
        }
    }
}

/// An uploaded file as received from the admin console.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn extension(&self) -> &str {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
    }
}

/// Target size preserving aspect ratio that fits both bounds.
/// Images already within them keep their size.
pub fn scaled_dimensions(width: u32, height: u32, limits: ImageLimits) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let ratio = (limits.max_width as f64 / w)
        .min(limits.max_height as f64 / h)
        .min(1.0);
    if ratio >= 1.0 {
        return (width.max(1), height.max(1));
    }
    let scaled = |side: f64, bound: u32| ((side * ratio).round() as u32).clamp(1, bound.max(1));
    (scaled(w, limits.max_width), scaled(h, limits.max_height))
}

/// Shrinks and re-encodes an image.
///
/// Non-image uploads come back untouched. Undecodable images are an error.
/// PNG sources and images with an alpha channel stay PNG; everything else
/// becomes JPEG at `limits.quality`. If encoding fails the original is kept.
pub fn normalize_image(upload: ImageUpload, limits: ImageLimits) -> Result<ImageUpload, AppError> {
    if !upload.content_type.starts_with("image/") {
        return Ok(upload);
    }

    let decoded = image::load_from_memory(&upload.bytes)?;
    let (width, height) = scaled_dimensions(decoded.width(), decoded.height(), limits);
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Triangle)
    };

    let keep_transparency = upload.content_type == "image/png" || resized.color().has_alpha();
    let encoded = if keep_transparency {
        encode_png(&resized).map(|bytes| (bytes, "image/png", "png"))
    } else {
        encode_jpeg(&resized, limits.quality).map(|bytes| (bytes, "image/jpeg", "jpg"))
    };

    match encoded {
        Ok((bytes, content_type, extension)) => {
            tracing::debug!(
                "Normalized {} to {}x{} ({} -> {} bytes)",
                upload.file_name,
                width,
                height,
                upload.bytes.len(),
                bytes.len()
            );
            Ok(ImageUpload {
                file_name: with_extension(&upload.file_name, extension),
                content_type: content_type.to_string(),
                bytes,
            })
        }
        Err(e) => {
            tracing::warn!("Re-encoding {} failed, keeping original: {}", upload.file_name, e);
            Ok(upload)
        }
    }
}

/// Runs `normalize_image` off the async executor.
pub async fn normalize(upload: ImageUpload, limits: ImageLimits) -> Result<ImageUpload, AppError> {
    tokio::task::spawn_blocking(move || normalize_image(upload, limits))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, image::ImageError> {
    let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

fn with_extension(file_name: &str, extension: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{}.{}", stem, extension)
}
