//! Mask image preparation before upload.
//!
//! The detector reads the mask as a single-channel image where white marks the
//! region of interest. Whatever the operator picks (JPEG, PNG, WebP...) is
//! decoded, flattened to grayscale and re-encoded as PNG.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::info;

/// Largest mask we accept on either side. Camera frames are nowhere near this.
pub const MAX_MASK_DIMENSION: u32 = 8192;

/// Decode `bytes` and return a grayscale PNG.
///
/// # Errors
/// - Image cannot be decoded
/// - Image is empty or larger than [`MAX_MASK_DIMENSION`]
pub fn prepare_mask(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| format!("Failed to load mask image: {}. Ensure it's a valid PNG/JPEG.", e))?;

    let (width, height) = (img.width(), img.height());
    info!("Loaded mask: {}x{}", width, height);

    if width == 0 || height == 0 {
        return Err("Mask image is empty".to_string());
    }
    if width.max(height) > MAX_MASK_DIMENSION {
        return Err(format!(
            "Mask image too large: {}x{}. Maximum dimension is {}px.",
            width, height, MAX_MASK_DIMENSION
        ));
    }

    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let png = encode_to_png(&gray)?;
    info!("Encoded mask to PNG: {} bytes", png.len());
    Ok(png)
}

fn encode_to_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| format!("Failed to encode mask to PNG: {}", e))?;
    Ok(buffer.into_inner())
}
