//! Grad-CAM saliency computation
//!
//! The forward pass is split at the explained layer. Its activation is
//! detached and re-entered as a gradient leaf, the rest of the network runs on
//! the autodiff backend, and the target class probability is back-propagated
//! to that leaf only.

use burn::tensor::{backend::AutodiffBackend, backend::Backend, Tensor};

use crate::explain::heatmap::RawHeatmap;
use crate::model::classifier::{Classifier, LayerHandle, LayerOutput};
use crate::utils::error::{CarXplainError, Result};

/// Spatial mean of the gradients: `[1, C, H, W]` to `[1, C, 1, 1]`
pub fn channel_weights<B: Backend>(gradients: Tensor<B, 4>) -> Tensor<B, 4> {
    gradients.mean_dim(3).mean_dim(2)
}

/// Channel-weighted sum of activations with negatives clipped: `[1, 1, H, W]`
pub fn weighted_activation_map<B: Backend>(
    activations: Tensor<B, 4>,
    weights: Tensor<B, 4>,
) -> Tensor<B, 4> {
    (activations * weights).sum_dim(1).clamp_min(0.0)
}

/// Index of the largest probability; the lowest index wins ties and NaN never wins
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CarXplainError::Inference(format!("tensor readback failed: {:?}", e)))
}

/// Compute the Grad-CAM heatmap for one input.
///
/// `target_class` defaults to the model's own top prediction. Errors:
/// - `InvalidParameter` if `layer` is not a rank-4 layer of this classifier
///   or `target_class` is out of range
/// - `GradientUnavailable` if no gradient reaches the captured activation
/// - `DegenerateHeatmap` if the clipped map has no positive finite maximum
pub fn compute_heatmap<B: AutodiffBackend, C: Classifier<B> + ?Sized>(
    classifier: &C,
    input: Tensor<B, 4>,
    layer: &LayerHandle,
    target_class: Option<usize>,
) -> Result<RawHeatmap> {
    let info = classifier.layers().get(layer.index).ok_or_else(|| {
        CarXplainError::InvalidParameter(format!(
            "layer {} does not belong to '{}'",
            layer,
            classifier.name()
        ))
    })?;
    if !info.is_spatial() || info.name != layer.name {
        return Err(CarXplainError::InvalidParameter(format!(
            "layer {} of '{}' is not the rank-4 layer '{}'",
            layer,
            classifier.name(),
            info.name
        )));
    }

    // 1. forward to the explained layer and capture its activation
    let captured = classifier
        .forward_until(input, layer.index)?
        .into_spatial()
        .ok_or_else(|| {
            CarXplainError::InvalidParameter(format!("layer {} did not produce a feature map", layer))
        })?;
    let leaf = captured.detach().require_grad();

    // 1b. the rest of the network, tracked
    let probs = classifier.forward_after(LayerOutput::Spatial(leaf.clone()), layer.index)?;
    let [_, num_classes] = probs.dims();

    // 2. target class
    let class_index = match target_class {
        Some(index) if index < num_classes => index,
        Some(index) => {
            return Err(CarXplainError::InvalidParameter(format!(
                "target class {} out of range for {} classes",
                index, num_classes
            )))
        }
        None => argmax(&to_vec(probs.clone().inner())?).ok_or_else(|| {
            CarXplainError::Inference("probability vector is empty or NaN".to_string())
        })?,
    };

    // 3. d(prob[class]) / d(activation)
    let score = probs.slice([0..1, class_index..class_index + 1]).sum();
    let grads = score.backward();
    let gradient = leaf
        .grad(&grads)
        .ok_or_else(|| CarXplainError::GradientUnavailable {
            layer: layer.name.clone(),
            class_index,
        })?;

    // 4-6. channel weights, weighted sum, clip
    let weights = channel_weights(gradient);
    let [_, channels, _, _] = weights.dims();
    let cam = weighted_activation_map(leaf.inner(), weights.clone());
    let [_, _, height, width] = cam.dims();

    let channel_weights = to_vec(weights.reshape([channels]))?;
    let raw = to_vec(cam)?;

    // 7. normalize
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if raw.iter().any(|v| !v.is_finite()) || !(max > 0.0) {
        tracing::debug!(
            "Degenerate heatmap at {} for class {} (max = {})",
            layer,
            class_index,
            max
        );
        return Err(CarXplainError::DegenerateHeatmap {
            layer: layer.name.clone(),
            class_index,
        });
    }

    let values = raw.iter().map(|v| (v / max).clamp(0.0, 1.0)).collect();
    RawHeatmap::new(width, height, values, class_index, layer.name.clone(), channel_weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::locator::find_last_spatial_layer;
    use crate::model::architecture::Architecture;
    use crate::model::classifier::LayerInfo;
    use crate::model::cnn::{CarClassifierConfig, CnnClassifier};
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    /// Two layers: a fixed 2x2x2 activation, then `sum(activation * G)`.
    ///
    /// The gradient of the single output with respect to the activation is
    /// exactly `G`, so every Grad-CAM quantity can be computed by hand.
    struct Synthetic {
        layers: Vec<LayerInfo>,
        activation: Vec<f32>,
        gradient: Vec<f32>,
        disconnected: bool,
    }

    impl Synthetic {
        fn new(activation: Vec<f32>, gradient: Vec<f32>) -> Self {
            Self {
                layers: vec![
                    LayerInfo::new("features", vec![1, 2, 2, 2]),
                    LayerInfo::new("score", vec![1, 1]),
                ],
                activation,
                gradient,
                disconnected: false,
            }
        }

        fn tensor(values: &[f32]) -> Tensor<TestBackend, 4> {
            Tensor::from_data(TensorData::new(values.to_vec(), [1, 2, 2, 2]), &Default::default())
        }
    }

    impl Classifier<TestBackend> for Synthetic {
        fn name(&self) -> &str {
            "synthetic"
        }

        fn num_classes(&self) -> usize {
            1
        }

        fn layers(&self) -> &[LayerInfo] {
            &self.layers
        }

        fn run_layer(
            &self,
            index: usize,
            input: LayerOutput<TestBackend>,
        ) -> Result<LayerOutput<TestBackend>> {
            match (index, input) {
                (0, _) => Ok(LayerOutput::Spatial(Self::tensor(&self.activation))),
                (1, LayerOutput::Spatial(x)) => {
                    let x = if self.disconnected {
                        Self::tensor(&self.activation).require_grad()
                    } else {
                        x
                    };
                    let g = Self::tensor(&self.gradient);
                    Ok(LayerOutput::Flat((x * g).reshape([1, 8]).sum_dim(1)))
                }
                _ => Err(CarXplainError::Inference("bad layer".to_string())),
            }
        }
    }

    // channel 0 = [[1, 2], [3, 4]], channel 1 = [[4, 3], [2, 1]]
    const ACTIVATION: [f32; 8] = [1.0, 2.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0];

    fn handle() -> LayerHandle {
        LayerHandle {
            index: 0,
            name: "features".to_string(),
        }
    }

    fn dummy_input() -> Tensor<TestBackend, 4> {
        Tensor::zeros([1, 3, 4, 4], &Default::default())
    }

    #[test]
    fn test_hand_computed_heatmap() {
        // G channel 0 = 1, channel 1 = -0.5
        let gradient = vec![1.0, 1.0, 1.0, 1.0, -0.5, -0.5, -0.5, -0.5];
        let model = Synthetic::new(ACTIVATION.to_vec(), gradient);

        let map = compute_heatmap(&model, dummy_input(), &handle(), None).unwrap();

        assert_eq!(map.class_index, 0);
        assert_eq!((map.width(), map.height()), (2, 2));
        assert!((map.channel_weights[0] - 1.0).abs() < 1e-6);
        assert!((map.channel_weights[1] + 0.5).abs() < 1e-6);

        // [1-2, 2-1.5, 3-1, 4-0.5] = [-1, 0.5, 2, 3.5] -> clip -> / 3.5
        let expected = [0.0, 1.0 / 7.0, 4.0 / 7.0, 1.0];
        for (got, want) in map.values().iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_uniform_zero_map_is_degenerate() {
        let model = Synthetic::new(ACTIVATION.to_vec(), vec![0.0; 8]);
        let result = compute_heatmap(&model, dummy_input(), &handle(), None);
        assert!(matches!(
            result,
            Err(CarXplainError::DegenerateHeatmap { class_index: 0, .. })
        ));
    }

    #[test]
    fn test_all_negative_contributions_are_degenerate() {
        let model = Synthetic::new(ACTIVATION.to_vec(), vec![-1.0; 8]);
        assert!(matches!(
            compute_heatmap(&model, dummy_input(), &handle(), None),
            Err(CarXplainError::DegenerateHeatmap { .. })
        ));
    }

    #[test]
    fn test_disconnected_layer_has_no_gradient() {
        let mut model = Synthetic::new(ACTIVATION.to_vec(), vec![1.0; 8]);
        model.disconnected = true;
        assert!(matches!(
            compute_heatmap(&model, dummy_input(), &handle(), None),
            Err(CarXplainError::GradientUnavailable { .. })
        ));
    }

    #[test]
    fn test_rejects_non_spatial_or_foreign_layer() {
        let model = Synthetic::new(ACTIVATION.to_vec(), vec![1.0; 8]);
        let dense = LayerHandle {
            index: 1,
            name: "score".to_string(),
        };
        assert!(matches!(
            compute_heatmap(&model, dummy_input(), &dense, None),
            Err(CarXplainError::InvalidParameter(_))
        ));
        assert!(compute_heatmap(&model, dummy_input(), &handle(), Some(3)).is_err());
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[0.1, f32::NAN, 0.7, 0.2]), Some(2));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ties_match_reported_class() {
        let probs = vec![0.25f32; 4];
        let reported = crate::inference::predictor::PredictionResult::new(
            "tiny",
            probs.clone(),
            &crate::model::labels::ClassLabels::default(),
            std::time::Duration::ZERO,
            3,
        );
        assert_eq!(argmax(&probs), Some(0));
        assert_eq!(argmax(&probs), Some(reported.predicted_class));
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some(1));
    }

    fn tiny_cnn() -> CnnClassifier<TestBackend> {
        let config = CarClassifierConfig {
            architecture: Architecture::ResNet50,
            num_classes: 4,
            in_channels: 3,
            stage_filters: vec![4, 6],
            kernel_size: 3,
            hidden_units: 8,
        };
        CnnClassifier::new("tiny", &config, config.init(&Default::default()))
    }

    fn random_input(seed: u64) -> Tensor<TestBackend, 4> {
        TestBackend::seed(seed);
        Tensor::random([1, 3, 224, 224], Distribution::Uniform(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_cnn_heatmap_in_unit_range_or_explicit_error() {
        let model = tiny_cnn();
        let layer = find_last_spatial_layer::<TestBackend, _>(&model).unwrap();

        let mut rendered = 0;
        for class in 0..4 {
            match compute_heatmap(&model, random_input(7), &layer, Some(class)) {
                Ok(map) => {
                    assert_eq!((map.width(), map.height()), (56, 56));
                    assert_eq!(map.channel_weights.len(), 6);
                    assert!(map.values().iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
                    let max = map.values().iter().copied().fold(0.0f32, f32::max);
                    assert!((max - 1.0).abs() < 1e-6);
                    rendered += 1;
                }
                Err(e) => assert!(e.is_explanation_failure(), "{}", e),
            }
        }
        // softmax gradients sum to zero over classes, so the per-class maps
        // cannot all be non-positive
        assert!(rendered > 0, "no class produced a heatmap");
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let model = tiny_cnn();
        let layer = find_last_spatial_layer::<TestBackend, _>(&model).unwrap();
        let input = random_input(11);

        let first = compute_heatmap(&model, input.clone(), &layer, None);
        let second = compute_heatmap(&model, input, &layer, None);
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            _ => panic!("one call failed and the other did not"),
        }
    }
}
