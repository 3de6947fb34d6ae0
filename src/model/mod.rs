//! Model module: classifiers, their preprocessing profiles and loading
//!
//! This module provides:
//! - The [`Classifier`] capability set used by the explanation pipeline
//! - Architecture families with explicit preprocessing recipes
//! - A Burn CNN implementation of the classifier
//! - An at-most-once model cache and the model catalog

pub mod architecture;
pub mod cache;
pub mod classifier;
pub mod cnn;
pub mod labels;
pub mod registry;

// Re-export main types for convenience
pub use architecture::{Architecture, ModelProfile, Normalization};
pub use cache::ModelCache;
pub use classifier::{Classifier, LayerHandle, LayerInfo, LayerOutput};
pub use cnn::{CarClassifier, CarClassifierConfig, CnnClassifier};
pub use labels::ClassLabels;
pub use registry::{LoadedModel, ModelEntry, ModelRegistry};
