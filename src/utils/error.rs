//! Error Handling Module
//!
//! Defines the error taxonomy shared by the explanation pipeline, the model
//! cache and the dashboard modes. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CarXplain operations
#[derive(Error, Debug)]
pub enum CarXplainError {
    /// A classifier could not be loaded from disk
    #[error("Failed to load model '{path}': {reason}")]
    ModelLoadFailure { path: PathBuf, reason: String },

    /// The classifier exposes no rank-4 feature map
    #[error("Model '{model}' has no spatial (rank-4) layer to explain")]
    NoSpatialLayer { model: String },

    /// Differentiation produced no gradient for the captured activation
    #[error("No gradient reached layer '{layer}' for class {class_index}")]
    GradientUnavailable { layer: String, class_index: usize },

    /// The clipped class activation map has no positive maximum
    #[error("Heatmap for layer '{layer}' and class {class_index} has no salient region")]
    DegenerateHeatmap { layer: String, class_index: usize },

    /// Out-of-range argument or malformed dimensions
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error decoding or encoding an image
    #[error("Failed to process image '{0}': {1}")]
    ImageDecode(PathBuf, String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report generation error
    #[error("Report error: {0}")]
    Report(String),

    /// Live session error
    #[error("Session error: {0}")]
    Session(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CarXplainError {
    /// Whether this failure only affects the visual explanation.
    ///
    /// The classification result is still delivered for these.
    pub fn is_explanation_failure(&self) -> bool {
        matches!(
            self,
            CarXplainError::NoSpatialLayer { .. }
                | CarXplainError::GradientUnavailable { .. }
                | CarXplainError::DegenerateHeatmap { .. }
        )
    }
}

impl From<serde_json::Error> for CarXplainError {
    fn from(e: serde_json::Error) -> Self {
        CarXplainError::Serialization(e.to_string())
    }
}

/// Convenience Result type for CarXplain operations
pub type Result<T> = std::result::Result<T, CarXplainError>;
