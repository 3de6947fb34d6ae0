//! Completed live sessions

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// A logged detection above the confidence threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Wall-clock time, `HH:MM:SS`
    pub timestamp: String,
    pub class_name: String,
    pub confidence: f32,
}

/// Highest-confidence detection of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestDetection {
    pub class_name: String,
    pub confidence: f32,
    /// Wall-clock time, `HH:MM:SS`
    pub time: String,
    /// Saved JPEG of the frame, if writing it succeeded
    pub snapshot: Option<PathBuf>,
}

/// Summary of one finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Sequential id within the history, starting at 1
    pub id: usize,
    /// Local time the session ended, `YYYY-mm-dd HH:MM:SS`
    pub timestamp: String,
    pub model_name: String,
    pub duration_secs: f64,
    pub frames_count: usize,
    pub best_detection: Option<BestDetection>,
    pub detections: Vec<Detection>,
}

impl SessionRecord {
    /// Frames per second over the running time
    pub fn avg_fps(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.frames_count as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }

    /// Detections per class, most frequent first, ties by name
    pub fn detections_by_class(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for d in &self.detections {
            *counts.entry(d.class_name.as_str()).or_insert(0) += 1;
        }

        let mut counts: Vec<(String, usize)> =
            counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

/// Ordered history of saved sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionHistory {
    records: Vec<SessionRecord>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next pushed record will receive
    pub fn next_id(&self) -> usize {
        self.records.len() + 1
    }

    /// Append a record, assigning it the next id
    pub fn push(&mut self, mut record: SessionRecord) -> &SessionRecord {
        record.id = self.next_id();
        tracing::info!(
            "Session #{} saved: {:.1}s, {} frames, {} detections",
            record.id,
            record.duration_secs,
            record.frames_count,
            record.detection_count()
        );
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn get(&self, id: usize) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn latest(&self) -> Option<&SessionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class: &str, confidence: f32) -> Detection {
        Detection {
            timestamp: "12:00:00".to_string(),
            class_name: class.to_string(),
            confidence,
        }
    }

    fn record(detections: Vec<Detection>) -> SessionRecord {
        SessionRecord {
            id: 0,
            timestamp: "2024-05-01 12:00:00".to_string(),
            model_name: "ResNet-50".to_string(),
            duration_secs: 10.0,
            frames_count: 250,
            best_detection: None,
            detections,
        }
    }

    #[test]
    fn test_kpis() {
        let r = record(vec![
            detection("Audi R8", 0.8),
            detection("BMW X5", 0.5),
            detection("Audi R8", 0.6),
        ]);
        assert!((r.avg_fps() - 25.0).abs() < 1e-9);
        assert_eq!(r.detection_count(), 3);
        assert_eq!(
            r.detections_by_class(),
            vec![("Audi R8".to_string(), 2), ("BMW X5".to_string(), 1)]
        );
    }

    #[test]
    fn test_zero_duration_fps() {
        let mut r = record(vec![]);
        r.duration_secs = 0.0;
        assert_eq!(r.avg_fps(), 0.0);
    }

    #[test]
    fn test_history_assigns_sequential_ids() {
        let mut history = SessionHistory::new();
        assert_eq!(history.push(record(vec![])).id, 1);
        assert_eq!(history.push(record(vec![])).id, 2);
        assert_eq!(history.latest().unwrap().id, 2);
        assert!(history.get(1).is_some());
        assert!(history.to_json().unwrap().contains("\"frames_count\": 250"));

        let restored = SessionHistory::from_json(&history.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.next_id(), 3);
    }
}
