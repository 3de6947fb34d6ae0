//! Inference Predictor Module
//!
//! Runs a loaded classifier on an image and packages the probability vector
//! into a ranked, labelled, timed result.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use burn::tensor::{backend::Backend, Tensor};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::inference::preprocess::preprocess;
use crate::model::labels::ClassLabels;
use crate::model::registry::LoadedModel;
use crate::utils::error::{CarXplainError, Result};

/// Number of ranked classes shown by the dashboard
pub const DEFAULT_TOP_K: usize = 3;

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Display name of the model that produced this result
    pub model_name: String,

    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub predicted_class: usize,

    /// Predicted class name
    pub class_name: String,

    /// Confidence score (probability) for the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Highest-probability classes, best first
    pub top_k: Vec<RankedClass>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Create a new prediction result
    pub fn new(
        model_name: &str,
        probabilities: Vec<f32>,
        labels: &ClassLabels,
        inference_time: Duration,
        top_k: usize,
    ) -> Self {
        let mut indexed: Vec<(usize, f32)> = probabilities
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .map(|(i, &p)| (i, p))
            .collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top_k: Vec<RankedClass> = indexed
            .iter()
            .take(top_k.max(1))
            .map(|&(class_index, confidence)| RankedClass {
                class_index,
                class_name: labels.name(class_index),
                confidence,
            })
            .collect();

        let (predicted_class, confidence) = indexed.first().copied().unwrap_or((0, 0.0));

        Self {
            model_name: model_name.to_string(),
            image_path: None,
            predicted_class,
            class_name: labels.name(predicted_class),
            confidence,
            probabilities,
            top_k,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        }
    }

    /// Attach the source image path
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Check if the prediction reaches a confidence threshold
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Confidence as a percentage string, e.g. `87.42%`
    pub fn confidence_label(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }

        output.push_str(&format!("Model: {}\n", self.model_name));
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.predicted_class
        ));
        output.push_str(&format!("Confidence: {}\n", self.confidence_label()));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str(&format!("\nTop-{} predictions:\n", self.top_k.len()));
        for (i, ranked) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                ranked.class_name,
                ranked.class_index,
                ranked.confidence * 100.0
            ));
        }

        output
    }
}

/// Runs loaded models and labels their output
#[derive(Debug, Clone)]
pub struct Predictor {
    labels: ClassLabels,
    top_k: usize,
}

impl Predictor {
    /// Create a predictor with the dashboard's top-3 ranking
    pub fn new(labels: ClassLabels) -> Self {
        Self {
            labels,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set the number of ranked classes
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Classify an already preprocessed `[1, 3, H, W]` tensor
    pub fn predict_tensor<B: Backend>(
        &self,
        model: &LoadedModel<B>,
        input: Tensor<B, 4>,
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let probs = model.classifier.predict(input)?;
        let probabilities: Vec<f32> = probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| CarXplainError::Inference(format!("{:?}", e)))?;
        let elapsed = start.elapsed();

        let result = PredictionResult::new(
            &model.name,
            probabilities,
            &self.labels,
            elapsed,
            self.top_k,
        );
        tracing::debug!(
            "{}: {} ({}) in {:.1} ms",
            model.name,
            result.class_name,
            result.confidence_label(),
            result.inference_time_ms
        );
        Ok(result)
    }

    /// Preprocess with the model's profile, then classify
    pub fn predict<B: Backend>(
        &self,
        model: &LoadedModel<B>,
        image: &DynamicImage,
    ) -> Result<PredictionResult> {
        let input = preprocess(image, &model.profile, &model.device);
        self.predict_tensor(model, input)
    }
}
