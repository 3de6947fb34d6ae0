//! Shared fixtures for unit tests

use std::path::PathBuf;

use burn::backend::Autodiff;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;

use crate::model::architecture::{Architecture, ModelProfile};
use crate::model::classifier::{Classifier, LayerInfo, LayerOutput};
use crate::model::cnn::{CarClassifierConfig, CnnClassifier};
use crate::model::registry::LoadedModel;
use crate::utils::error::{CarXplainError, Result};

pub type AutodiffTestBackend = Autodiff<NdArray>;

/// Small ResNet-profile CNN with random weights
pub fn tiny_model<B: Backend>(name: &str, num_classes: usize) -> LoadedModel<B> {
    let device = B::Device::default();
    let config = CarClassifierConfig {
        num_classes,
        stage_filters: vec![4],
        hidden_units: 8,
        ..CarClassifierConfig::for_architecture(Architecture::ResNet50)
    };
    let classifier = CnnClassifier::new(name, &config, config.init(&device));
    LoadedModel::from_classifier(
        PathBuf::from(format!("{}.mpk", name)),
        ModelProfile::new(Architecture::ResNet50),
        Box::new(classifier),
        device,
    )
}

/// Channel means followed by a dense softmax layer; no spatial output
pub struct DenseOnly<B: Backend> {
    layers: Vec<LayerInfo>,
    linear: Linear<B>,
}

impl<B: Backend> Classifier<B> for DenseOnly<B> {
    fn name(&self) -> &str {
        "dense-only"
    }

    fn num_classes(&self) -> usize {
        self.layers[1].output_shape[1]
    }

    fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    fn run_layer(&self, index: usize, input: LayerOutput<B>) -> Result<LayerOutput<B>> {
        match (index, input) {
            (0, LayerOutput::Spatial(x)) => {
                let [batch, channels, _, _] = x.dims();
                Ok(LayerOutput::Flat(x.mean_dim(3).mean_dim(2).reshape([batch, channels])))
            }
            (1, LayerOutput::Flat(x)) => Ok(LayerOutput::Flat(burn::tensor::activation::softmax(
                self.linear.forward(x),
                1,
            ))),
            _ => Err(CarXplainError::Inference("unexpected layer input".to_string())),
        }
    }
}

pub fn dense_only_model<B: Backend>(num_classes: usize) -> LoadedModel<B> {
    let device = B::Device::default();
    let classifier = DenseOnly {
        layers: vec![
            LayerInfo::new("channel_mean", vec![1, 3]),
            LayerInfo::new("predictions", vec![1, num_classes]),
        ],
        linear: LinearConfig::new(3, num_classes).init(&device),
    };
    LoadedModel::from_classifier(
        PathBuf::from("dense-only.mpk"),
        ModelProfile::new(Architecture::ResNet50),
        Box::new(classifier),
        device,
    )
}
