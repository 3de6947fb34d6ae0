//! # CarXplain
//!
//! Vehicle classification with visual explanations, built on the Burn framework.
//!
//! ## Features
//!
//! - **Grad-CAM explanations**: locate the deepest spatial layer, weight its
//!   channels by the class-score gradient and blend the map over the input
//! - **Three model families** (EfficientNet-B4, ResNet-50, Inception-V3), each
//!   with its own input size and normalization
//! - **Live sessions** over a frame source, with best-shot capture and history
//! - **PDF reports** for analyses, live sessions and model comparisons
//!
//! ## Modules
//!
//! - `explain`: layer locator, saliency computer and heatmap compositor
//! - `model`: classifier capability set, CNN, model cache and catalog
//! - `inference`: preprocessing, prediction, analysis and comparison
//! - `session`: live video mode and session history
//! - `report`: PDF report generation
//! - `utils`: logging, errors, SVG charts and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use carxplain::inference::{analyze_image, load_image, Predictor};
//! use carxplain::model::{ClassLabels, ModelCache, ModelRegistry};
//!
//! let registry = ModelRegistry::new("models", default_catalog(), Arc::new(ModelCache::new()), device);
//! let model = registry.get("ResNet-50")?;
//! let predictor = Predictor::new(ClassLabels::load_or_generic("models/labels.txt".as_ref()));
//! let result = analyze_image(&model, &predictor, &load_image("car.jpg".as_ref())?, 0.4)?;
//! println!("{}", result.explanation_text());
//! ```

pub mod backend;
pub mod config;
pub mod explain;
pub mod inference;
pub mod model;
pub mod report;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used items for convenience
pub use config::AppConfig;
pub use explain::{compute_heatmap, find_last_spatial_layer, overlay, RawHeatmap};
pub use inference::{AnalysisResult, ComparisonResult, PredictionResult, Predictor};
pub use model::{Architecture, Classifier, LoadedModel, ModelCache, ModelRegistry};
pub use session::{LiveSession, LiveSessionConfig, SessionHistory};
pub use utils::error::{CarXplainError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
