//! SVG chart generator for analysis, session and comparison results
//!
//! Charts are plain SVG strings so they can be written next to the PDF
//! reports or embedded in other documents.

use std::fs;
use std::path::Path;

use crate::inference::comparison::ComparisonResult;
use crate::inference::predictor::PredictionResult;
use crate::session::history::SessionRecord;

/// Chart styling constants
const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_PRIMARY: &str = "#00e5ff";
const COLOR_SECONDARY: &str = "#2ecc71";
const COLOR_TERTIARY: &str = "#ffb300";
const COLOR_BACKGROUND: &str = "#12141c";
const COLOR_GRID: &str = "#2a2e3d";
const COLOR_AXIS: &str = "#8a93a8";
const COLOR_TEXT: &str = "#e6e9f0";

const PALETTE: [&str; 3] = [COLOR_PRIMARY, COLOR_SECONDARY, COLOR_TERTIARY];

/// Bar chart data
#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    pub value: f64,
    pub color: String,
}

/// How bar values are labelled and scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueAxis {
    /// 0..100, labelled with `%`
    Percent,
    /// 0..max, labelled as integers
    Count,
}

/// Render a bar chart as an SVG document
pub fn render_bar_chart(title: &str, y_label: &str, bars: &[BarData], axis: ValueAxis) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let data_max = bars.iter().map(|b| b.value).fold(0.0f64, f64::max);
    let y_max = match axis {
        ValueAxis::Percent => 100.0,
        ValueAxis::Count => data_max.ceil().max(1.0),
    };

    let slot = plot_width / bars.len().max(1) as f64;
    let bar_width = slot * 0.7;
    let bar_gap = slot * 0.3;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="{}"/>"#,
        CHART_WIDTH, CHART_HEIGHT, COLOR_BACKGROUND
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines
    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = (i as f64 / 5.0) * y_max;

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, format_value(value, axis)
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    for (i, bar) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + (i as f64 * slot) + bar_gap / 2.0;
        let bar_height = (bar.value.clamp(0.0, y_max) / y_max) * plot_height;
        let y = MARGIN_TOP + plot_height - bar_height;

        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" rx="4"/>"#,
            x, y, bar_width, bar_height, bar.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" font-weight="bold" fill="{}">{}</text>"#,
            x + bar_width / 2.0, y - 8.0, COLOR_TEXT, format_value(bar.value, axis)
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            x + bar_width / 2.0, MARGIN_TOP + plot_height + 25.0, COLOR_TEXT, escape_xml(&bar.label)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Top-k class probabilities of one prediction
pub fn probability_distribution_chart(prediction: &PredictionResult) -> String {
    let bars: Vec<BarData> = prediction
        .top_k
        .iter()
        .enumerate()
        .map(|(i, r)| BarData {
            label: r.class_name.clone(),
            value: r.confidence as f64 * 100.0,
            color: PALETTE[i % PALETTE.len()].to_string(),
        })
        .collect();

    render_bar_chart(
        &format!("Probability Distribution ({})", prediction.model_name),
        "Confidence (%)",
        &bars,
        ValueAxis::Percent,
    )
}

/// Number of confident detections per class during a live session
pub fn detections_by_model_chart(record: &SessionRecord) -> String {
    let bars: Vec<BarData> = record
        .detections_by_class()
        .into_iter()
        .map(|(label, count)| BarData {
            label,
            value: count as f64,
            color: COLOR_PRIMARY.to_string(),
        })
        .collect();

    render_bar_chart("Detections by Model", "Detections", &bars, ValueAxis::Count)
}

/// Top-1 confidence of each architecture in a comparison
pub fn confidence_comparison_chart(result: &ComparisonResult) -> String {
    let bars: Vec<BarData> = result
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| BarData {
            label: format!("{} ({})", e.prediction.model_name, e.prediction.class_name),
            value: e.prediction.confidence as f64 * 100.0,
            color: PALETTE[i % PALETTE.len()].to_string(),
        })
        .collect();

    render_bar_chart("Model Confidence Comparison", "Confidence (%)", &bars, ValueAxis::Percent)
}

/// Write an SVG document to disk
pub fn write_svg(svg: &str, output_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, svg)
}

fn format_value(value: f64, axis: ValueAxis) -> String {
    match axis {
        ValueAxis::Percent => format!("{:.1}%", value),
        ValueAxis::Count => format!("{:.0}", value),
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::labels::ClassLabels;
    use crate::session::history::Detection;
    use std::time::Duration;

    #[test]
    fn test_probability_chart_lists_top_classes() {
        let labels = ClassLabels::parse("Audi R8\nBMW X5\nFord Focus");
        let prediction =
            PredictionResult::new("ResNet-50", vec![0.2, 0.7, 0.1], &labels, Duration::ZERO, 3);

        let svg = probability_distribution_chart(&prediction);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("BMW X5"));
        assert!(svg.contains("70.0%"));
        assert_eq!(svg.matches("rx=\"4\"").count(), 3);
    }

    #[test]
    fn test_detections_chart_counts() {
        let detection = |name: &str| Detection {
            timestamp: "12:00:00".to_string(),
            class_name: name.to_string(),
            confidence: 0.9,
        };
        let record = SessionRecord {
            id: 1,
            timestamp: "2024-05-01 12:00:00".to_string(),
            model_name: "ResNet-50".to_string(),
            duration_secs: 10.0,
            frames_count: 100,
            best_detection: None,
            detections: vec![detection("Audi R8"), detection("Audi R8"), detection("BMW X5")],
        };

        let svg = detections_by_model_chart(&record);
        assert!(svg.contains(">Audi R8<"));
        assert!(svg.contains(">2<"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("A&B <C>"), "A&amp;B &lt;C&gt;");
        let svg = render_bar_chart("x", "y", &[], ValueAxis::Count);
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_write_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts").join("c.svg");
        write_svg("<svg></svg>", &path).unwrap();
        assert!(path.exists());
    }
}
