//! Single-image analysis: classification plus Grad-CAM explanation
//!
//! The prediction is always delivered. The explanation is attempted for the
//! predicted class; any saliency failure is downgraded to
//! [`HeatmapOutcome::Unavailable`] with the reason attached.

use burn::tensor::backend::AutodiffBackend;
use image::{DynamicImage, RgbImage};
use serde::Serialize;

use crate::explain::compositor::{check_blend_strength, encode_png, overlay};
use crate::explain::heatmap::RawHeatmap;
use crate::explain::saliency::compute_heatmap;
use crate::inference::predictor::{PredictionResult, Predictor};
use crate::inference::preprocess::preprocess;
use crate::model::registry::LoadedModel;
use crate::utils::error::Result;
use crate::utils::logging::StageTimer;

/// Visual explanation, or why there is none
#[derive(Debug, Clone)]
pub enum HeatmapOutcome {
    Rendered {
        heatmap: RawHeatmap,
        composite: RgbImage,
        /// PNG encoding of `composite`
        png: Vec<u8>,
    },
    Unavailable {
        reason: String,
    },
}

impl HeatmapOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, HeatmapOutcome::Rendered { .. })
    }

    pub fn composite(&self) -> Option<&RgbImage> {
        match self {
            HeatmapOutcome::Rendered { composite, .. } => Some(composite),
            HeatmapOutcome::Unavailable { .. } => None,
        }
    }

    pub fn png(&self) -> Option<&[u8]> {
        match self {
            HeatmapOutcome::Rendered { png, .. } => Some(png),
            HeatmapOutcome::Unavailable { .. } => None,
        }
    }
}

/// Everything the analysis view and report need
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub prediction: PredictionResult,
    pub original: RgbImage,
    pub heatmap: HeatmapOutcome,
}

/// Serializable summary of an analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary<'a> {
    pub prediction: &'a PredictionResult,
    pub heatmap_layer: Option<&'a str>,
    pub heatmap_unavailable_reason: Option<&'a str>,
}

impl AnalysisResult {
    /// One-paragraph description shown under the result
    pub fn explanation_text(&self) -> String {
        let p = &self.prediction;
        match &self.heatmap {
            HeatmapOutcome::Rendered { .. } => format!(
                "The {} model detected {} with {} confidence. \
                 The heatmap highlights the regions contributing to this decision.",
                p.model_name,
                p.class_name,
                p.confidence_label()
            ),
            HeatmapOutcome::Unavailable { .. } => format!(
                "The {} model detected {} with {} confidence. Heatmap unavailable.",
                p.model_name,
                p.class_name,
                p.confidence_label()
            ),
        }
    }

    pub fn summary(&self) -> AnalysisSummary<'_> {
        let (layer, reason) = match &self.heatmap {
            HeatmapOutcome::Rendered { heatmap, .. } => (Some(heatmap.layer.as_str()), None),
            HeatmapOutcome::Unavailable { reason } => (None, Some(reason.as_str())),
        };
        AnalysisSummary {
            prediction: &self.prediction,
            heatmap_layer: layer,
            heatmap_unavailable_reason: reason,
        }
    }
}

/// Grad-CAM for `class_index`, composited over `original`
pub fn explain_prediction<B: AutodiffBackend>(
    model: &LoadedModel<B>,
    input: burn::tensor::Tensor<B, 4>,
    class_index: usize,
    original: &RgbImage,
    blend_strength: f32,
) -> Result<HeatmapOutcome> {
    let layer = model.spatial_layer()?;

    let timer = StageTimer::start("saliency");
    let heatmap = compute_heatmap(model.classifier.as_ref(), input, layer, Some(class_index))?;
    timer.finish();

    let timer = StageTimer::start("composite");
    let composite = overlay(&heatmap, original, blend_strength)?;
    let png = encode_png(&composite)?;
    timer.finish();

    Ok(HeatmapOutcome::Rendered {
        heatmap,
        composite,
        png,
    })
}

/// Classify an image and explain the predicted class.
///
/// Only an invalid blend strength or a failed classification is returned as
/// an error.
pub fn analyze_image<B: AutodiffBackend>(
    model: &LoadedModel<B>,
    predictor: &Predictor,
    image: &DynamicImage,
    blend_strength: f32,
) -> Result<AnalysisResult> {
    check_blend_strength(blend_strength)?;

    let input = preprocess(image, &model.profile, &model.device);
    let prediction = predictor.predict_tensor(model, input.clone())?;
    let original = image.to_rgb8();

    let heatmap = match explain_prediction(
        model,
        input,
        prediction.predicted_class,
        &original,
        blend_strength,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Heatmap unavailable for {}: {}", model.name, e);
            HeatmapOutcome::Unavailable {
                reason: e.to_string(),
            }
        }
    };

    Ok(AnalysisResult {
        prediction,
        original,
        heatmap,
    })
}
