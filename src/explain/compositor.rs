//! Heatmap colorization and blending
//!
//! The heatmap is quantized to bytes, mapped through a jet color ramp at its
//! native resolution, upsampled bilinearly to the original image size and
//! alpha-blended over the original pixels.

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageBuffer, ImageEncoder, Rgb, RgbImage};

use crate::explain::heatmap::RawHeatmap;
use crate::utils::error::{CarXplainError, Result};

/// Weight of the color map in the blend
pub const DEFAULT_BLEND_STRENGTH: f32 = 0.4;

/// Jet color ramp: dark blue at 0, through cyan, yellow, to dark red at 255
pub fn jet(value: u8) -> [u8; 3] {
    let v = value as f32 / 255.0;
    let channel = |offset: f32| {
        let c = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Color map at the heatmap's own resolution
pub fn colorize(heatmap: &RawHeatmap) -> RgbImage {
    let bytes = heatmap.to_bytes();
    ImageBuffer::from_fn(heatmap.width() as u32, heatmap.height() as u32, |x, y| {
        let i = y as usize * heatmap.width() + x as usize;
        Rgb(jet(bytes[i]))
    })
}

/// Validate a blend strength; it must lie strictly inside (0, 1)
pub fn check_blend_strength(blend_strength: f32) -> Result<()> {
    if blend_strength > 0.0 && blend_strength < 1.0 {
        Ok(())
    } else {
        Err(CarXplainError::InvalidParameter(format!(
            "blend strength {} must be in (0, 1)",
            blend_strength
        )))
    }
}

/// Blend the colorized heatmap over `original`.
///
/// Output has the original's dimensions; each channel is
/// `color * blend + original * (1 - blend)`, clipped to `[0, 255]`.
pub fn overlay(heatmap: &RawHeatmap, original: &RgbImage, blend_strength: f32) -> Result<RgbImage> {
    check_blend_strength(blend_strength)?;

    let (width, height) = original.dimensions();
    if width == 0 || height == 0 {
        return Err(CarXplainError::InvalidParameter(format!(
            "cannot overlay onto a {}x{} image",
            width, height
        )));
    }

    let colors = imageops::resize(&colorize(heatmap), width, height, FilterType::Triangle);

    let mut out = RgbImage::new(width, height);
    for ((dst, src), color) in out.pixels_mut().zip(original.pixels()).zip(colors.pixels()) {
        for c in 0..3 {
            let blended =
                color[c] as f32 * blend_strength + src[c] as f32 * (1.0 - blend_strength);
            dst[c] = blended.clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Encode an RGB image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new(Cursor::new(&mut bytes))
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| CarXplainError::ImageDecode("<png>".into(), e.to_string()))?;
    Ok(bytes)
}
