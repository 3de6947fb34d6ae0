//! PDF report for a model comparison

use chrono::{DateTime, Local};
use image::DynamicImage;

use crate::inference::comparison::ComparisonResult;
use crate::report::pdf::ReportBuilder;
use crate::utils::error::Result;

/// `Benchmark_Report_<HHMM>.pdf`
pub fn comparison_report_file_name(at: DateTime<Local>) -> String {
    format!("Benchmark_Report_{}.pdf", at.format("%H%M"))
}

pub fn comparison_report(image: &DynamicImage, result: &ComparisonResult) -> Result<Vec<u8>> {
    let mut report = ReportBuilder::new("CarAI Benchmark ", "Model Comparison")?;

    report.heading("01 // INPUT IMAGE");
    // 5 in x 3 in
    report.image(image, 127.0, 76.2);

    report.heading("02 // BENCHMARK RESULTS");
    let rows: Vec<Vec<String>> = result
        .entries
        .iter()
        .map(|e| {
            vec![
                e.prediction.model_name.clone(),
                e.prediction.class_name.clone(),
                format!("{:.2}%", e.prediction.confidence * 100.0),
            ]
        })
        .collect();
    report.table(&["MODEL ARCHITECTURE", "PREDICTED CLASS", "CONFIDENCE"], &rows);

    if let Some(winner) = result.winner() {
        report.paragraph(&format!(
            "Highest confidence: {} ({}, {:.2}%).",
            winner.prediction.model_name,
            winner.prediction.class_name,
            winner.prediction.confidence * 100.0
        ));
    }
    for skipped in &result.skipped {
        report.paragraph(&format!("{} skipped: {}", skipped.model_name, skipped.reason));
    }

    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::comparison::{ComparisonEntry, SkippedModel};
    use crate::inference::predictor::PredictionResult;
    use crate::model::architecture::Architecture;
    use crate::model::labels::ClassLabels;
    use std::time::Duration;

    #[test]
    fn test_report_lists_entries() {
        let labels = ClassLabels::parse("Audi R8\nBMW X5");
        let result = ComparisonResult {
            entries: vec![ComparisonEntry {
                architecture: Architecture::ResNet50,
                prediction: PredictionResult::new("ResNet-50", vec![0.3, 0.7], &labels, Duration::ZERO, 3),
            }],
            skipped: vec![SkippedModel {
                model_name: "Inception-V3".to_string(),
                reason: "weight file not found".to_string(),
            }],
        };

        let image = DynamicImage::new_rgb8(400, 300);
        let bytes = comparison_report(&image, &result).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
