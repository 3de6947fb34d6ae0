//! Inference module: preprocessing, prediction and the dashboard modes
//!
//! This module provides:
//! - Per-family preprocessing into `[1, 3, H, W]` tensors
//! - Labelled, timed, top-k predictions
//! - Image analysis (prediction + Grad-CAM heatmap)
//! - Side-by-side comparison of every catalogued model

pub mod analysis;
pub mod comparison;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use analysis::{analyze_image, AnalysisResult, HeatmapOutcome};
pub use comparison::{compare_models, ComparisonEntry, ComparisonResult};
pub use predictor::{PredictionResult, Predictor, RankedClass};
pub use preprocess::{load_image, preprocess};
