//! Benchmark mode: every catalogued model on the same image

use std::path::PathBuf;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::inference::predictor::{PredictionResult, Predictor};
use crate::model::architecture::Architecture;
use crate::model::registry::{LoadedModel, ModelRegistry};
use crate::utils::error::{CarXplainError, Result};

/// One model's answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub architecture: Architecture,
    pub prediction: PredictionResult,
}

/// A model that could not take part, and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub entries: Vec<ComparisonEntry>,
    pub skipped: Vec<SkippedModel>,
}

impl ComparisonResult {
    /// Entry with the highest confidence; earlier entries win ties
    pub fn winner(&self) -> Option<&ComparisonEntry> {
        self.entries.iter().fold(None, |best: Option<&ComparisonEntry>, entry| match best {
            Some(b) if b.prediction.confidence >= entry.prediction.confidence => Some(b),
            _ => Some(entry),
        })
    }

    /// Whether all models agree on the predicted class
    pub fn is_unanimous(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].prediction.predicted_class == w[1].prediction.predicted_class)
    }
}

/// Run each candidate; load or prediction failures are skipped and logged
pub fn compare_candidates<B, I>(
    candidates: I,
    predictor: &Predictor,
    image: &DynamicImage,
) -> Result<ComparisonResult>
where
    B: Backend,
    I: IntoIterator<Item = (String, Result<Arc<LoadedModel<B>>>)>,
{
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for (name, loaded) in candidates {
        let outcome = loaded.and_then(|model| {
            predictor
                .predict(&model, image)
                .map(|prediction| ComparisonEntry {
                    architecture: model.profile.architecture,
                    prediction,
                })
        });

        match outcome {
            Ok(entry) => {
                tracing::info!(
                    "{}: {} ({})",
                    name,
                    entry.prediction.class_name,
                    entry.prediction.confidence_label()
                );
                entries.push(entry);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", name, e);
                skipped.push(SkippedModel {
                    model_name: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    if entries.is_empty() {
        let reasons: Vec<String> = skipped
            .iter()
            .map(|s| format!("{}: {}", s.model_name, s.reason))
            .collect();
        return Err(CarXplainError::ModelLoadFailure {
            path: PathBuf::from("<catalog>"),
            reason: format!("no model available ({})", reasons.join("; ")),
        });
    }

    Ok(ComparisonResult { entries, skipped })
}

/// Compare every model in the registry's catalog
pub fn compare_models<B: Backend>(
    registry: &ModelRegistry<B>,
    predictor: &Predictor,
    image: &DynamicImage,
) -> Result<ComparisonResult> {
    let candidates = registry
        .entries()
        .iter()
        .map(|entry| (entry.name.clone(), registry.get(&entry.name)));
    compare_candidates(candidates, predictor, image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::labels::ClassLabels;
    use crate::testing::tiny_model;
    use burn_ndarray::NdArray;
    use image::RgbImage;
    use std::time::Duration;

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(20, 20))
    }

    fn entry(model: &str, class: usize, confidence: f32) -> ComparisonEntry {
        let mut probs = vec![0.0; 4];
        probs[class] = confidence;
        ComparisonEntry {
            architecture: Architecture::ResNet50,
            prediction: PredictionResult::new(model, probs, &ClassLabels::default(), Duration::ZERO, 3),
        }
    }

    #[test]
    fn test_winner_is_highest_confidence() {
        let result = ComparisonResult {
            entries: vec![entry("a", 0, 0.5), entry("b", 1, 0.9), entry("c", 0, 0.7)],
            skipped: vec![],
        };
        assert_eq!(result.winner().unwrap().prediction.model_name, "b");
        assert!(!result.is_unanimous());
    }

    #[test]
    fn test_missing_models_are_skipped() {
        let predictor = Predictor::new(ClassLabels::default());
        let candidates = vec![
            ("ResNet-50".to_string(), Ok(Arc::new(tiny_model::<NdArray>("ResNet-50", 4)))),
            (
                "Inception-V3".to_string(),
                Err(CarXplainError::ModelLoadFailure {
                    path: PathBuf::from("inceptionv3_best.mpk"),
                    reason: "weight file not found".to_string(),
                }),
            ),
        ];

        let result = compare_candidates(candidates, &predictor, &image()).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].model_name, "Inception-V3");
        assert_eq!(result.winner().unwrap().prediction.model_name, "ResNet-50");
    }

    #[test]
    fn test_no_models_is_load_failure() {
        let predictor = Predictor::new(ClassLabels::default());
        let candidates: Vec<(String, Result<Arc<LoadedModel<NdArray>>>)> = vec![];
        assert!(matches!(
            compare_candidates(candidates, &predictor, &image()),
            Err(CarXplainError::ModelLoadFailure { .. })
        ));
    }
}
