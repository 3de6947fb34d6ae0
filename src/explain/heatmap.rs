//! Normalized class-activation map

use serde::{Deserialize, Serialize};

use crate::utils::error::{CarXplainError, Result};

/// Grad-CAM output at the feature-map resolution, every value in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHeatmap {
    width: usize,
    height: usize,
    /// Row-major values
    values: Vec<f32>,
    /// Class the map explains
    pub class_index: usize,
    /// Layer the activations were captured from
    pub layer: String,
    /// Spatially averaged gradient per channel
    pub channel_weights: Vec<f32>,
}

impl RawHeatmap {
    /// Build a heatmap, rejecting mismatched sizes and out-of-range values
    pub fn new(
        width: usize,
        height: usize,
        values: Vec<f32>,
        class_index: usize,
        layer: impl Into<String>,
        channel_weights: Vec<f32>,
    ) -> Result<Self> {
        if width == 0 || height == 0 || values.len() != width * height {
            return Err(CarXplainError::InvalidParameter(format!(
                "heatmap of {}x{} cannot hold {} values",
                width,
                height,
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(CarXplainError::InvalidParameter(format!(
                "heatmap value {} outside [0, 1]",
                bad
            )));
        }

        Ok(Self {
            width,
            height,
            values,
            class_index,
            layer: layer.into(),
            channel_weights,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.values[y * self.width + x])
        } else {
            None
        }
    }

    /// Map values to bytes with `u8(255 * v)`
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().map(|v| (255.0 * v) as u8).collect()
    }

    /// Grid position of the hottest cell
    pub fn peak(&self) -> (usize, usize) {
        let index = self
            .values
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        (index % self.width, index / self.width)
    }

    /// Fraction of cells at or above `threshold`
    pub fn coverage(&self, threshold: f32) -> f32 {
        let hot = self.values.iter().filter(|&&v| v >= threshold).count();
        hot as f32 / self.values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawHeatmap {
        RawHeatmap::new(2, 2, vec![0.0, 0.25, 0.5, 1.0], 3, "conv", vec![1.0]).unwrap()
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(RawHeatmap::new(3, 2, vec![0.0; 5], 0, "conv", vec![]).is_err());
        assert!(RawHeatmap::new(0, 0, vec![], 0, "conv", vec![]).is_err());
    }

    #[test]
    fn test_rejects_nan_and_out_of_range() {
        assert!(RawHeatmap::new(1, 1, vec![f32::NAN], 0, "conv", vec![]).is_err());
        assert!(RawHeatmap::new(1, 1, vec![1.5], 0, "conv", vec![]).is_err());
    }

    #[test]
    fn test_accessors() {
        let map = sample();
        assert_eq!(map.get(1, 1), Some(1.0));
        assert_eq!(map.get(2, 0), None);
        assert_eq!(map.peak(), (1, 1));
        assert_eq!(map.to_bytes(), vec![0, 63, 127, 255]);
        assert!((map.coverage(0.5) - 0.5).abs() < 1e-6);
    }
}
