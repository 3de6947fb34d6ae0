//! Selection of the layer to explain

use burn::tensor::backend::Backend;

use crate::model::classifier::{Classifier, LayerHandle};
use crate::utils::error::{CarXplainError, Result};

/// Return the last layer, in topological order, whose output has rank 4.
///
/// Scans from the output back towards the input so the first hit is the
/// deepest spatial feature map. Fails with `NoSpatialLayer` for models that
/// never produce one.
pub fn find_last_spatial_layer<B: Backend, C: Classifier<B> + ?Sized>(
    classifier: &C,
) -> Result<LayerHandle> {
    classifier
        .layers()
        .iter()
        .enumerate()
        .rev()
        .find(|(_, layer)| layer.is_spatial())
        .map(|(index, layer)| LayerHandle {
            index,
            name: layer.name.clone(),
        })
        .ok_or_else(|| CarXplainError::NoSpatialLayer {
            model: classifier.name().to_string(),
        })
}
