//! Image preprocessing for each architecture family

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::model::architecture::{ModelProfile, Normalization};
use crate::utils::error::{CarXplainError, Result};

/// Open and decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| CarXplainError::ImageDecode(path.to_path_buf(), e.to_string()))
}

/// Resize to a square of `size` pixels with bicubic filtering
pub fn resize_for(image: &DynamicImage, size: u32) -> RgbImage {
    image
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8()
}

/// Normalize every pixel and lay the result out as CHW
pub fn normalize_chw(rgb: &RgbImage, normalization: Normalization) -> Vec<f32> {
    let num_pixels = (rgb.width() * rgb.height()) as usize;
    let mut data = vec![0.0f32; 3 * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        let [c0, c1, c2] = normalization.apply(pixel.0);
        data[i] = c0;
        data[num_pixels + i] = c1;
        data[2 * num_pixels + i] = c2;
    }

    data
}

/// Resize, normalize and batch an image: `[1, 3, size, size]`
pub fn preprocess<B: Backend>(
    image: &DynamicImage,
    profile: &ModelProfile,
    device: &B::Device,
) -> Tensor<B, 4> {
    let size = profile.input_size as usize;
    let rgb = resize_for(image, profile.input_size);
    let data = normalize_chw(&rgb, profile.normalization);
    Tensor::from_data(TensorData::new(data, [1, 3, size, size]), device)
}
