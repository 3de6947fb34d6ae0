//! Architecture families and their preprocessing recipes
//!
//! Each supported network family expects a fixed input resolution and a
//! family-specific normalization. The recipe is resolved once, when a model is
//! loaded, and carried alongside the classifier as a [`ModelProfile`].

use serde::{Deserialize, Serialize};

/// Per-channel means subtracted by the caffe-style recipe, in BGR order
pub const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Known classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    InceptionV3,
    ResNet50,
    EfficientNetB4,
}

impl Architecture {
    /// All supported families, in catalog order
    pub const ALL: [Architecture; 3] = [
        Architecture::EfficientNetB4,
        Architecture::ResNet50,
        Architecture::InceptionV3,
    ];

    /// Square input resolution expected by the family
    pub fn input_size(&self) -> u32 {
        match self {
            Architecture::InceptionV3 => 299,
            Architecture::ResNet50 => 224,
            Architecture::EfficientNetB4 => 384,
        }
    }

    /// Normalization applied after resizing
    pub fn normalization(&self) -> Normalization {
        match self {
            Architecture::InceptionV3 => Normalization::Inception,
            Architecture::ResNet50 => Normalization::Caffe,
            Architecture::EfficientNetB4 => Normalization::Passthrough,
        }
    }

    /// Display label used in the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            Architecture::InceptionV3 => "Inception-V3",
            Architecture::ResNet50 => "ResNet-50",
            Architecture::EfficientNetB4 => "EfficientNet-B4",
        }
    }

    /// Parse a free-form label such as "ResNet-50" or "efficientnetb4".
    ///
    /// Case, dashes and other punctuation are ignored. Returns `None` for
    /// unknown families.
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if key.contains("inception") {
            Some(Architecture::InceptionV3)
        } else if key.contains("efficientnet") {
            Some(Architecture::EfficientNetB4)
        } else if key.contains("resnet") {
            Some(Architecture::ResNet50)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Pixel normalization recipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// Scale to [-1, 1]: `x / 127.5 - 1`
    Inception,
    /// Reorder RGB to BGR and subtract [`CAFFE_MEAN_BGR`], no scaling
    Caffe,
    /// Raw [0, 255] values; the network rescales internally
    Passthrough,
}

impl Normalization {
    /// Normalize one RGB pixel, returning the three channel values in the
    /// order the network consumes them.
    pub fn apply(&self, rgb: [u8; 3]) -> [f32; 3] {
        let [r, g, b] = rgb.map(|v| v as f32);
        match self {
            Normalization::Inception => [r / 127.5 - 1.0, g / 127.5 - 1.0, b / 127.5 - 1.0],
            Normalization::Caffe => [
                b - CAFFE_MEAN_BGR[0],
                g - CAFFE_MEAN_BGR[1],
                r - CAFFE_MEAN_BGR[2],
            ],
            Normalization::Passthrough => [r, g, b],
        }
    }
}

/// Preprocessing configuration resolved at model-load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub architecture: Architecture,
    pub input_size: u32,
    pub normalization: Normalization,
}

impl ModelProfile {
    /// Profile for a known family
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            input_size: architecture.input_size(),
            normalization: architecture.normalization(),
        }
    }

    /// Profile for a free-form label, falling back to ResNet50 for unknown labels
    pub fn for_label(label: &str) -> Self {
        match Architecture::from_label(label) {
            Some(arch) => Self::new(arch),
            None => {
                tracing::warn!(
                    "Unknown architecture label '{}', using the ResNet50 recipe",
                    label
                );
                Self::new(Architecture::ResNet50)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_ignores_case_and_punctuation() {
        assert_eq!(Architecture::from_label("ResNet-50"), Some(Architecture::ResNet50));
        assert_eq!(
            Architecture::from_label("EfficientNet-B4"),
            Some(Architecture::EfficientNetB4)
        );
        assert_eq!(
            Architecture::from_label("1-inceptionv3-training-code"),
            Some(Architecture::InceptionV3)
        );
        assert_eq!(Architecture::from_label("vgg16"), None);
    }

    #[test]
    fn test_input_sizes() {
        assert_eq!(Architecture::InceptionV3.input_size(), 299);
        assert_eq!(Architecture::ResNet50.input_size(), 224);
        assert_eq!(Architecture::EfficientNetB4.input_size(), 384);
    }

    #[test]
    fn test_unknown_label_falls_back_to_resnet() {
        let profile = ModelProfile::for_label("mobilenet");
        assert_eq!(profile.architecture, Architecture::ResNet50);
        assert_eq!(profile.input_size, 224);
        assert_eq!(profile.normalization, Normalization::Caffe);
    }

    #[test]
    fn test_inception_range() {
        let low = Normalization::Inception.apply([0, 0, 0]);
        let high = Normalization::Inception.apply([255, 255, 255]);
        assert_eq!(low, [-1.0, -1.0, -1.0]);
        assert!(high.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_caffe_swaps_channels_and_centers() {
        let out = Normalization::Caffe.apply([200, 100, 50]);
        assert!((out[0] - (50.0 - 103.939)).abs() < 1e-4);
        assert!((out[1] - (100.0 - 116.779)).abs() < 1e-4);
        assert!((out[2] - (200.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_passthrough_keeps_raw_values() {
        assert_eq!(Normalization::Passthrough.apply([1, 2, 255]), [1.0, 2.0, 255.0]);
    }
}
