//! Model loading and the catalog of available classifiers
//!
//! A model on disk is a pair of files sharing a stem: `<stem>.mpk` holds the
//! weights (burn `CompactRecorder`) and `<stem>.json` the
//! [`CarClassifierConfig`]. Loading resolves the preprocessing profile and the
//! explainable layer once, so per-request code never re-dispatches on names.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::explain::locator::find_last_spatial_layer;
use crate::model::architecture::{Architecture, ModelProfile};
use crate::model::cache::ModelCache;
use crate::model::classifier::{Classifier, LayerHandle};
use crate::model::cnn::{CarClassifier, CarClassifierConfig, CnnClassifier};
use crate::utils::error::{CarXplainError, Result};

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Display name, e.g. "ResNet-50"
    pub name: String,
    /// Architecture label; unknown labels fall back to ResNet50
    pub architecture: String,
    /// Weight file relative to the models directory
    pub file: String,
}

impl ModelEntry {
    pub fn new(name: &str, architecture: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            architecture: architecture.to_string(),
            file: file.to_string(),
        }
    }

    /// Preprocessing profile implied by the architecture label
    pub fn profile(&self) -> ModelProfile {
        ModelProfile::for_label(&self.architecture)
    }
}

/// The three dashboard models
pub fn default_catalog() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new("EfficientNet-B4", "EfficientNetB4", "efficientnetb4_best_model.mpk"),
        ModelEntry::new("ResNet-50", "ResNet50", "resnet50_best.mpk"),
        ModelEntry::new("Inception-V3", "InceptionV3", "inceptionv3_best.mpk"),
    ]
}

/// A classifier ready for prediction and explanation
pub struct LoadedModel<B: Backend> {
    pub name: String,
    pub path: PathBuf,
    pub profile: ModelProfile,
    pub classifier: Box<dyn Classifier<B>>,
    /// Last rank-4 layer, `None` when the model cannot be explained
    pub spatial_layer: Option<LayerHandle>,
    pub device: B::Device,
}

impl<B: Backend> LoadedModel<B> {
    /// Wrap an in-memory classifier, resolving its explainable layer
    pub fn from_classifier(
        path: PathBuf,
        profile: ModelProfile,
        classifier: Box<dyn Classifier<B>>,
        device: B::Device,
    ) -> Self {
        let spatial_layer = match find_last_spatial_layer(classifier.as_ref()) {
            Ok(handle) => {
                tracing::debug!("'{}': explaining layer {}", classifier.name(), handle);
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("{}; heatmaps disabled for this model", e);
                None
            }
        };

        Self {
            name: classifier.name().to_string(),
            path,
            profile,
            classifier,
            spatial_layer,
            device,
        }
    }

    /// The explainable layer, or `NoSpatialLayer`
    pub fn spatial_layer(&self) -> Result<&LayerHandle> {
        self.spatial_layer
            .as_ref()
            .ok_or_else(|| CarXplainError::NoSpatialLayer {
                model: self.name.clone(),
            })
    }
}

fn load_failure(path: &Path, reason: impl Into<String>) -> CarXplainError {
    CarXplainError::ModelLoadFailure {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Load a model from `<stem>.mpk` + `<stem>.json`
pub fn load_model<B: Backend>(name: &str, path: &Path, device: &B::Device) -> Result<LoadedModel<B>> {
    let weights = path.with_extension("mpk");
    let config_path = path.with_extension("json");

    if !weights.exists() {
        return Err(load_failure(path, "weight file not found"));
    }

    let config = CarClassifierConfig::load(&config_path)
        .map_err(|e| load_failure(path, format!("config {:?}: {}", config_path, e)))?;

    tracing::info!(
        "Loading {} ({}, {} classes) from {:?}",
        name,
        config.architecture,
        config.num_classes,
        weights
    );

    let model: CarClassifier<B> = config
        .init(device)
        .load_file(weights.clone(), &CompactRecorder::new(), device)
        .map_err(|e| load_failure(path, format!("{:?}", e)))?;

    let classifier = CnnClassifier::new(name, &config, model);
    Ok(LoadedModel::from_classifier(
        weights,
        ModelProfile::new(config.architecture),
        Box::new(classifier),
        device.clone(),
    ))
}

/// Write weights and config for a model under `path`'s stem
pub fn save_model<B: Backend>(
    model: CarClassifier<B>,
    config: &CarClassifierConfig,
    path: &Path,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save(&path.with_extension("json"))?;
    let weights = path.with_extension("mpk");
    model
        .save_file(weights.clone(), &CompactRecorder::new())
        .map_err(|e| CarXplainError::Serialization(format!("{:?}", e)))?;
    Ok(weights)
}

/// Write freshly initialized weights for a catalog entry
pub fn init_model_files<B: Backend>(
    entry: &ModelEntry,
    models_dir: &Path,
    num_classes: usize,
    device: &B::Device,
) -> Result<PathBuf> {
    let architecture: Architecture = entry.profile().architecture;
    let config = CarClassifierConfig::for_architecture(architecture).with_num_classes(num_classes);
    let model: CarClassifier<B> = config.init(device);
    save_model(model, &config, &models_dir.join(&entry.file))
}

/// Catalog of models with a shared at-most-once cache
pub struct ModelRegistry<B: Backend> {
    models_dir: PathBuf,
    entries: Vec<ModelEntry>,
    cache: Arc<ModelCache<LoadedModel<B>>>,
    device: B::Device,
}

impl<B: Backend> ModelRegistry<B> {
    pub fn new(
        models_dir: impl Into<PathBuf>,
        entries: Vec<ModelEntry>,
        cache: Arc<ModelCache<LoadedModel<B>>>,
        device: B::Device,
    ) -> Self {
        Self {
            models_dir: models_dir.into(),
            entries,
            cache,
            device,
        }
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Find an entry by display name, ignoring case and punctuation
    pub fn entry(&self, name: &str) -> Option<&ModelEntry> {
        let key = normalize(name);
        self.entries.iter().find(|e| normalize(&e.name) == key)
    }

    pub fn path_for(&self, entry: &ModelEntry) -> PathBuf {
        self.models_dir.join(&entry.file)
    }

    /// Load (once) and return the named model
    pub fn get(&self, name: &str) -> Result<Arc<LoadedModel<B>>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| load_failure(Path::new(name), "model is not in the catalog"))?;
        let path = self.path_for(entry);
        let display = entry.name.clone();
        self.cache
            .get_or_load(&path, || load_model(&display, &path, &self.device))
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_entry() -> (ModelEntry, CarClassifierConfig) {
        let entry = ModelEntry::new("ResNet-50", "ResNet50", "tiny.mpk");
        let config = CarClassifierConfig {
            num_classes: 3,
            stage_filters: vec![2, 2],
            hidden_units: 4,
            ..CarClassifierConfig::for_architecture(Architecture::ResNet50)
        };
        (entry, config)
    }

    #[test]
    fn test_missing_model_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_model::<TestBackend>("x", &dir.path().join("absent.mpk"), &Default::default());
        assert!(matches!(result, Err(CarXplainError::ModelLoadFailure { .. })));
    }

    #[test]
    fn test_save_then_load_resolves_layer_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let (entry, config) = tiny_entry();
        let path = dir.path().join(&entry.file);
        save_model::<TestBackend>(config.init(&device), &config, &path).unwrap();

        let loaded = load_model::<TestBackend>("ResNet-50", &path, &device).unwrap();
        assert_eq!(loaded.profile.input_size, 224);
        assert_eq!(loaded.classifier.num_classes(), 3);
        let layer = loaded.spatial_layer().unwrap();
        assert_eq!(layer.name, "conv_stage_2");
        assert_eq!(layer.index, 1);
    }

    #[test]
    fn test_registry_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let (entry, config) = tiny_entry();
        save_model::<TestBackend>(config.init(&device), &config, &dir.path().join(&entry.file))
            .unwrap();

        let cache = Arc::new(ModelCache::new());
        let registry = ModelRegistry::<TestBackend>::new(dir.path(), vec![entry], cache.clone(), device);

        let a = registry.get("resnet50").unwrap();
        let b = registry.get("ResNet-50").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(registry.get("VGG-16").is_err());
    }

    #[test]
    fn test_default_catalog_profiles() {
        let sizes: Vec<u32> = default_catalog().iter().map(|e| e.profile().input_size).collect();
        assert_eq!(sizes, vec![384, 224, 299]);
    }
}
