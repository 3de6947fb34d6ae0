//! Classifier capability set
//!
//! Every model the dashboard can explain is seen through the [`Classifier`]
//! trait: an ordered list of layers with known output shapes, and a way to run
//! one layer at a time. Running the layers in two halves is what lets the
//! saliency computation capture an intermediate activation and differentiate
//! the class score with respect to it.

use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::{CarXplainError, Result};

/// Static description of one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    /// Output shape including the batch axis, e.g. `[1, 64, 28, 28]`
    pub output_shape: Vec<usize>,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>, output_shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            output_shape,
        }
    }

    /// Number of axes in the output tensor
    pub fn rank(&self) -> usize {
        self.output_shape.len()
    }

    /// Whether the layer produces a spatial feature map
    pub fn is_spatial(&self) -> bool {
        self.rank() == 4
    }
}

/// Resolved reference to a layer of a specific classifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    pub index: usize,
    pub name: String,
}

impl std::fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (#{})", self.name, self.index)
    }
}

/// Value flowing between layers
#[derive(Debug, Clone)]
pub enum LayerOutput<B: Backend> {
    /// `[batch, channels, height, width]`
    Spatial(Tensor<B, 4>),
    /// `[batch, features]`
    Flat(Tensor<B, 2>),
}

impl<B: Backend> LayerOutput<B> {
    pub fn rank(&self) -> usize {
        match self {
            LayerOutput::Spatial(_) => 4,
            LayerOutput::Flat(_) => 2,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            LayerOutput::Spatial(t) => t.dims().to_vec(),
            LayerOutput::Flat(t) => t.dims().to_vec(),
        }
    }

    pub fn into_spatial(self) -> Option<Tensor<B, 4>> {
        match self {
            LayerOutput::Spatial(t) => Some(t),
            LayerOutput::Flat(_) => None,
        }
    }

    pub fn into_flat(self) -> Option<Tensor<B, 2>> {
        match self {
            LayerOutput::Flat(t) => Some(t),
            LayerOutput::Spatial(_) => None,
        }
    }
}

/// A trained image classifier with introspectable, steppable layers.
///
/// Implementors only provide [`Classifier::run_layer`]; the split forward
/// passes and plain prediction are derived from it.
pub trait Classifier<B: Backend> {
    /// Human-readable model name
    fn name(&self) -> &str;

    /// Size of the probability vector
    fn num_classes(&self) -> usize;

    /// Layers in topological order, input to output
    fn layers(&self) -> &[LayerInfo];

    /// Run the layer at `index` on the output of the previous layer
    /// (or the image tensor for index 0).
    fn run_layer(&self, index: usize, input: LayerOutput<B>) -> Result<LayerOutput<B>>;

    /// Run layers `0..=layer` and return that layer's output
    fn forward_until(&self, input: Tensor<B, 4>, layer: usize) -> Result<LayerOutput<B>> {
        if layer >= self.layers().len() {
            return Err(CarXplainError::InvalidParameter(format!(
                "layer index {} out of range for '{}' ({} layers)",
                layer,
                self.name(),
                self.layers().len()
            )));
        }

        let mut x = LayerOutput::Spatial(input);
        for index in 0..=layer {
            x = self.run_layer(index, x)?;
        }
        Ok(x)
    }

    /// Run the layers after `layer` on its output, returning class
    /// probabilities of shape `[1, num_classes]`
    fn forward_after(&self, activation: LayerOutput<B>, layer: usize) -> Result<Tensor<B, 2>> {
        let mut x = activation;
        for index in (layer + 1)..self.layers().len() {
            x = self.run_layer(index, x)?;
        }

        let dims = x.dims();
        let probs = x.into_flat().ok_or_else(|| {
            CarXplainError::Inference(format!(
                "'{}' ended with a spatial output {:?} instead of probabilities",
                self.name(),
                dims
            ))
        })?;

        let [batch, classes] = probs.dims();
        if batch != 1 || classes != self.num_classes() {
            return Err(CarXplainError::Inference(format!(
                "'{}' produced shape [{}, {}], expected [1, {}]",
                self.name(),
                batch,
                classes,
                self.num_classes()
            )));
        }
        Ok(probs)
    }

    /// Full forward pass: `[1, 3, H, W]` image to `[1, num_classes]` probabilities
    fn predict(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let last = self.layers().len().checked_sub(1).ok_or_else(|| {
            CarXplainError::Inference(format!("'{}' has no layers", self.name()))
        })?;
        let output = self.forward_until(input, last)?;
        self.forward_after(output, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    /// Doubles the input, then averages it to a single probability.
    struct Doubler {
        layers: Vec<LayerInfo>,
    }

    impl Doubler {
        fn new() -> Self {
            Self {
                layers: vec![
                    LayerInfo::new("double", vec![1, 1, 2, 2]),
                    LayerInfo::new("mean", vec![1, 1]),
                ],
            }
        }
    }

    impl Classifier<TestBackend> for Doubler {
        fn name(&self) -> &str {
            "doubler"
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
                (0, LayerOutput::Spatial(x)) => Ok(LayerOutput::Spatial(x.mul_scalar(2.0))),
                (1, LayerOutput::Spatial(x)) => {
                    Ok(LayerOutput::Flat(x.reshape([1, 4]).mean_dim(1)))
                }
                (i, other) => Err(CarXplainError::Inference(format!(
                    "unexpected rank {} at layer {}",
                    other.rank(),
                    i
                ))),
            }
        }
    }

    fn input() -> Tensor<TestBackend, 4> {
        Tensor::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &Default::default(),
        )
    }

    #[test]
    fn test_layer_info_rank() {
        assert_eq!(LayerInfo::new("conv", vec![1, 8, 4, 4]).rank(), 4);
        assert!(!LayerInfo::new("dense", vec![1, 10]).is_spatial());
    }

    #[test]
    fn test_split_forward_matches_predict() {
        let model = Doubler::new();
        let direct: Vec<f32> = model.predict(input()).unwrap().into_data().to_vec().unwrap();

        let mid = model.forward_until(input(), 0).unwrap();
        assert_eq!(mid.dims(), vec![1, 1, 2, 2]);
        let split: Vec<f32> = model.forward_after(mid, 0).unwrap().into_data().to_vec().unwrap();

        assert_eq!(direct, split);
        assert!((direct[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_forward_until_rejects_out_of_range_layer() {
        let model = Doubler::new();
        assert!(matches!(
            model.forward_until(input(), 5),
            Err(CarXplainError::InvalidParameter(_))
        ));
    }
}
