//! PDF report for a single-image analysis

use chrono::{DateTime, Local};
use image::DynamicImage;

use crate::inference::analysis::AnalysisResult;
use crate::report::pdf::ReportBuilder;
use crate::utils::error::Result;

/// `Analysis_Report_<HHMMSS>.pdf`
pub fn analysis_report_file_name(at: DateTime<Local>) -> String {
    format!("Analysis_Report_{}.pdf", at.format("%H%M%S"))
}

pub fn analysis_report(result: &AnalysisResult) -> Result<Vec<u8>> {
    let p = &result.prediction;
    let mut report = ReportBuilder::new("Intelligent Analysis Report", "Car Classification")?;

    report.heading("01 // SUMMARY RESULTS");
    report.key_value_table(&[
        ("Model Architecture", p.model_name.clone()),
        ("Detected Class", p.class_name.clone()),
        ("Confidence Score", format!("{:.2}%", p.confidence * 100.0)),
    ]);
    report.spacer(4.0);

    report.heading("02 // VISUAL EVIDENCE");
    let original = DynamicImage::ImageRgb8(result.original.clone());
    let composite = result
        .heatmap
        .composite()
        .map(|c| DynamicImage::ImageRgb8(c.clone()));
    let mut images = vec![(&original, "Original Input")];
    if let Some(composite) = composite.as_ref() {
        images.push((composite, "Grad-CAM Heatmap"));
    }
    report.image_row(&images, 84.0, 63.5);
    if composite.is_none() {
        report.paragraph("Heatmap unavailable.");
    }
    report.spacer(4.0);

    if !p.top_k.is_empty() {
        report.heading("03 // PROBABILITY DISTRIBUTION");
        let bars: Vec<(String, f32)> = p
            .top_k
            .iter()
            .map(|r| (r.class_name.clone(), r.confidence))
            .collect();
        report.bar_chart(&bars, |v| format!("{:.1}%", v * 100.0));
    }

    report.finish()
}
