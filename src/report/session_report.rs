//! PDF report for a saved live session

use chrono::{DateTime, Local};

use crate::inference::preprocess::load_image;
use crate::report::pdf::ReportBuilder;
use crate::session::history::SessionRecord;
use crate::utils::error::Result;

/// `CarAI_Report_<HHMM>.pdf`
pub fn session_report_file_name(at: DateTime<Local>) -> String {
    format!("CarAI_Report_{}.pdf", at.format("%H%M"))
}

pub fn session_report(record: &SessionRecord) -> Result<Vec<u8>> {
    let mut report = ReportBuilder::new("CarAI Report ", "Live Inspector")?;

    report.heading("01 // SESSION METRICS");
    report.kpi_row(&[
        ("DURATION", format!("{:.1}s", record.duration_secs)),
        ("AVG FPS", format!("{:.1}", record.avg_fps())),
        ("MODELS DETECTED", record.detection_count().to_string()),
    ]);

    if let Some(best) = &record.best_detection {
        report.heading("02 // HIGHEST CONFIDENCE DETECTION");
        match best.snapshot.as_deref().map(load_image) {
            Some(Ok(image)) => report.image(&image, 127.0, 95.25),
            Some(Err(e)) => {
                tracing::warn!("Best-shot snapshot not embedded: {}", e);
            }
            None => {}
        }
        report.info_row(&[
            format!("MODEL: {}", best.class_name),
            format!("CONFIDENCE: {:.2}%", best.confidence * 100.0),
            format!("TIME: {}", best.time),
        ]);
    }

    let counts = record.detections_by_class();
    if !counts.is_empty() {
        report.page_break();
        report.heading("03 // ANALYTICS");
        report.paragraph("Detections by model");
        let bars: Vec<(String, f32)> = counts
            .into_iter()
            .map(|(name, count)| (name, count as f32))
            .collect();
        report.bar_chart(&bars, |v| format!("{}", v as usize));
    }

    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::history::{BestDetection, Detection};
    use image::RgbImage;
    use std::path::PathBuf;

    fn record(best: Option<BestDetection>) -> SessionRecord {
        SessionRecord {
            id: 1,
            timestamp: "2024-05-01 12:00:00".to_string(),
            model_name: "EfficientNet-B4".to_string(),
            duration_secs: 12.5,
            frames_count: 300,
            best_detection: best,
            detections: vec![Detection {
                timestamp: "12:00:01".to_string(),
                class_name: "Audi R8".to_string(),
                confidence: 0.8,
            }],
        }
    }

    #[test]
    fn test_report_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("best.jpg");
        RgbImage::new(32, 24).save(&snapshot).unwrap();

        let bytes = session_report(&record(Some(BestDetection {
            class_name: "Audi R8".to_string(),
            confidence: 0.8,
            time: "12:00:01".to_string(),
            snapshot: Some(snapshot),
        })))
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_missing_snapshot_does_not_fail_report() {
        let bytes = session_report(&record(Some(BestDetection {
            class_name: "Audi R8".to_string(),
            confidence: 0.8,
            time: "12:00:01".to_string(),
            snapshot: Some(PathBuf::from("/nonexistent/best.jpg")),
        })))
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_file_name_format() {
        let name = session_report_file_name(Local::now());
        assert!(name.starts_with("CarAI_Report_") && name.ends_with(".pdf"));
        assert_eq!(name.len(), "CarAI_Report_HHMM.pdf".len());
    }
}
