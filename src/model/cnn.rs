//! Sequential CNN used for vehicle classification
//!
//! A stack of convolutional stages followed by global average pooling and a
//! two-layer classifier head. The stage widths depend on the architecture
//! family so that each family keeps its own input resolution and feature-map
//! size. Batch normalization is folded into the convolution weights when a
//! model is exported, so inference and gradient passes are deterministic.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::model::architecture::Architecture;
use crate::model::classifier::{Classifier, LayerInfo, LayerOutput};
use crate::utils::error::{CarXplainError, Result};

/// Number of classes in the Stanford Cars label set
pub const DEFAULT_NUM_CLASSES: usize = 196;

/// Configuration for the CarClassifier CNN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarClassifierConfig {
    /// Family the weights were exported from; selects preprocessing
    pub architecture: Architecture,

    /// Number of output classes
    pub num_classes: usize,

    /// Number of input channels (3 for RGB)
    pub in_channels: usize,

    /// Filters per convolutional stage; each stage halves the resolution
    pub stage_filters: Vec<usize>,

    /// Kernel size for every convolution
    pub kernel_size: usize,

    /// Width of the hidden dense layer
    pub hidden_units: usize,
}

impl Default for CarClassifierConfig {
    fn default() -> Self {
        Self::for_architecture(Architecture::ResNet50)
    }
}

impl CarClassifierConfig {
    /// Default layout for a family
    pub fn for_architecture(architecture: Architecture) -> Self {
        let stage_filters = match architecture {
            // 384 -> 12 after five stages
            Architecture::EfficientNetB4 => vec![24, 48, 96, 192, 384],
            // 224 -> 14
            Architecture::ResNet50 => vec![32, 64, 128, 256],
            // 299 -> 18
            Architecture::InceptionV3 => vec![32, 64, 128, 288],
        };

        Self {
            architecture,
            num_classes: DEFAULT_NUM_CLASSES,
            in_channels: 3,
            stage_filters,
            kernel_size: 3,
            hidden_units: 256,
        }
    }

    /// Set the number of classes
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be positive".to_string());
        }
        if self.in_channels == 0 {
            return Err("in_channels must be positive".to_string());
        }
        if self.stage_filters.is_empty() {
            return Err("at least one convolutional stage is required".to_string());
        }
        if self.stage_filters.iter().any(|&f| f == 0) {
            return Err("stage filters must be positive".to_string());
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err("kernel_size must be odd".to_string());
        }
        if self.hidden_units == 0 {
            return Err("hidden_units must be positive".to_string());
        }
        if self.spatial_size(self.stage_filters.len()) == 0 {
            return Err(format!(
                "{} stages reduce a {}px input to nothing",
                self.stage_filters.len(),
                self.architecture.input_size()
            ));
        }
        Ok(())
    }

    /// Feature-map side length after `stages` pooling steps
    fn spatial_size(&self, stages: usize) -> usize {
        (0..stages).fold(self.architecture.input_size() as usize, |size, _| size / 2)
    }

    /// Layer table with batch-1 output shapes, in execution order
    pub fn layer_infos(&self) -> Vec<LayerInfo> {
        let mut layers: Vec<LayerInfo> = self
            .stage_filters
            .iter()
            .enumerate()
            .map(|(i, &filters)| {
                let size = self.spatial_size(i + 1);
                LayerInfo::new(format!("conv_stage_{}", i + 1), vec![1, filters, size, size])
            })
            .collect();

        let features = self.stage_filters.last().copied().unwrap_or(0);
        layers.push(LayerInfo::new("global_pool", vec![1, features]));
        layers.push(LayerInfo::new("dense", vec![1, self.hidden_units]));
        layers.push(LayerInfo::new("predictions", vec![1, self.num_classes]));
        layers
    }

    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> CarClassifier<B> {
        CarClassifier::new(self, device)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate().map_err(CarXplainError::Config)?;
        Ok(config)
    }
}

/// Convolution, ReLU and 2x2 max-pool
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Vehicle classifier CNN
///
/// Architecture:
/// - N convolutional stages (conv + ReLU + max-pool)
/// - Global Average Pooling
/// - Dense + ReLU
/// - Dense + softmax over the class set
#[derive(Module, Debug)]
pub struct CarClassifier<B: Backend> {
    pub stages: Vec<ConvStage<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub dense: Linear<B>,
    pub predictions: Linear<B>,
}

impl<B: Backend> CarClassifier<B> {
    /// Create a new CarClassifier from configuration
    pub fn new(config: &CarClassifierConfig, device: &B::Device) -> Self {
        let mut in_channels = config.in_channels;
        let mut stages = Vec::with_capacity(config.stage_filters.len());
        for &filters in &config.stage_filters {
            stages.push(ConvStage::new(in_channels, filters, config.kernel_size, device));
            in_channels = filters;
        }

        Self {
            stages,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dense: LinearConfig::new(in_channels, config.hidden_units).init(device),
            predictions: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
        }
    }

    /// Pool `[B, C, H, W]` to `[B, C]`
    fn pool_flatten(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    fn dense_forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        Relu::new().forward(self.dense.forward(x))
    }

    fn predictions_forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.predictions.forward(x), 1)
    }

    /// Forward pass returning class probabilities of shape `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        let x = self.pool_flatten(x);
        let x = self.dense_forward(x);
        self.predictions_forward(x)
    }
}

/// [`Classifier`] adapter over a loaded [`CarClassifier`]
#[derive(Debug)]
pub struct CnnClassifier<B: Backend> {
    name: String,
    num_classes: usize,
    layers: Vec<LayerInfo>,
    model: CarClassifier<B>,
}

impl<B: Backend> CnnClassifier<B> {
    pub fn new(name: impl Into<String>, config: &CarClassifierConfig, model: CarClassifier<B>) -> Self {
        Self {
            name: name.into(),
            num_classes: config.num_classes,
            layers: config.layer_infos(),
            model,
        }
    }

    pub fn model(&self) -> &CarClassifier<B> {
        &self.model
    }

    fn mismatch(&self, index: usize, got: &LayerOutput<B>) -> CarXplainError {
        CarXplainError::Inference(format!(
            "layer '{}' of '{}' cannot take a rank-{} input",
            self.layers
                .get(index)
                .map(|l| l.name.as_str())
                .unwrap_or("?"),
            self.name,
            got.rank()
        ))
    }
}

impl<B: Backend> Classifier<B> for CnnClassifier<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    fn run_layer(&self, index: usize, input: LayerOutput<B>) -> Result<LayerOutput<B>> {
        let stages = self.model.stages.len();

        match input {
            LayerOutput::Spatial(x) if index < stages => {
                Ok(LayerOutput::Spatial(self.model.stages[index].forward(x)))
            }
            LayerOutput::Spatial(x) if index == stages => {
                Ok(LayerOutput::Flat(self.model.pool_flatten(x)))
            }
            LayerOutput::Flat(x) if index == stages + 1 => {
                Ok(LayerOutput::Flat(self.model.dense_forward(x)))
            }
            LayerOutput::Flat(x) if index == stages + 2 => {
                Ok(LayerOutput::Flat(self.model.predictions_forward(x)))
            }
            other => Err(self.mismatch(index, &other)),
        }
    }
}
