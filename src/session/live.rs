//! Live inspection session
//!
//! A session classifies every Nth frame of a stream, logs detections above a
//! confidence threshold, keeps a snapshot of the best one and stops itself
//! once the running time reaches the session limit. Paused time does not
//! count towards the limit.
//!
//! Time is passed in explicitly as an [`Instant`] so the state machine can be
//! driven deterministically.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::inference::predictor::PredictionResult;
use crate::session::history::{BestDetection, Detection, SessionHistory, SessionRecord};
use crate::session::source::FrameSource;
use crate::utils::error::{CarXplainError, Result};

/// Overlay text while nothing is detected
pub const SCANNING_LABEL: &str = "Scanning...";

/// Live session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSessionConfig {
    /// Minimum confidence for a prediction to count as a detection
    pub confidence_threshold: f32,
    /// Classify one frame out of every `skip_frames`
    pub skip_frames: usize,
    /// Maximum running time in seconds
    pub session_limit_secs: u64,
    /// Where best-detection snapshots are written
    pub snapshot_dir: PathBuf,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            skip_frames: 5,
            session_limit_secs: 60,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

impl LiveSessionConfig {
    pub fn session_limit(&self) -> Duration {
        Duration::from_secs(self.session_limit_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.skip_frames == 0 {
            return Err("skip_frames must be at least 1".to_string());
        }
        if self.session_limit_secs == 0 {
            return Err("session_limit_secs must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Finished,
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Not a classification frame
    Skipped,
    /// Classified below the threshold
    Scanned,
    /// Logged detection
    Detected {
        detection: Detection,
        new_best: bool,
    },
    /// The session limit was hit; the session is now finished
    LimitReached,
}

/// Snapshot file name for a best detection, e.g. `best_20240501_120000_123456.jpg`
pub fn snapshot_file_name() -> String {
    format!("best_{}.jpg", Local::now().format("%Y%m%d_%H%M%S_%6f"))
}

fn save_snapshot(frame: &DynamicImage, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name());
    frame
        .to_rgb8()
        .save_with_format(&path, ImageFormat::Jpeg)
        .map_err(|e| CarXplainError::ImageDecode(path.clone(), e.to_string()))?;
    Ok(path)
}

pub struct LiveSession {
    config: LiveSessionConfig,
    model_name: String,
    state: SessionState,
    frames: usize,
    classified: usize,
    detections: Vec<Detection>,
    best: Option<BestDetection>,
    label: String,
    accumulated: Duration,
    run_started: Option<Instant>,
}

impl LiveSession {
    /// Create an idle session; rejects an invalid `config`
    pub fn new(model_name: impl Into<String>, config: LiveSessionConfig) -> Result<Self> {
        config.validate().map_err(CarXplainError::InvalidParameter)?;
        Ok(Self {
            config,
            model_name: model_name.into(),
            state: SessionState::Idle,
            frames: 0,
            classified: 0,
            detections: Vec::new(),
            best: None,
            label: SCANNING_LABEL.to_string(),
            accumulated: Duration::ZERO,
            run_started: None,
        })
    }

    fn transition_error(&self, action: &str) -> CarXplainError {
        CarXplainError::Session(format!("cannot {} a session that is {:?}", action, self.state))
    }

    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(self.transition_error("start"));
        }
        tracing::info!("Live session started with {}", self.model_name);
        self.state = SessionState::Running;
        self.run_started = Some(now);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(self.transition_error("pause"));
        }
        self.bank_running_time(now);
        self.state = SessionState::Paused;
        tracing::debug!("Session paused at {:.1}s", self.accumulated.as_secs_f64());
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<()> {
        if self.state != SessionState::Paused {
            return Err(self.transition_error("resume"));
        }
        self.state = SessionState::Running;
        self.run_started = Some(now);
        Ok(())
    }

    fn bank_running_time(&mut self, now: Instant) {
        if let Some(started) = self.run_started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    fn finish(&mut self, now: Instant) {
        self.bank_running_time(now);
        self.state = SessionState::Finished;
    }

    /// Running time, excluding pauses
    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.state, self.run_started) {
            (SessionState::Running, Some(started)) => {
                self.accumulated + now.saturating_duration_since(started)
            }
            _ => self.accumulated,
        }
    }

    /// Running time left before the limit
    pub fn remaining(&self, now: Instant) -> Duration {
        self.config.session_limit().saturating_sub(self.elapsed(now))
    }

    /// Handle one frame; `classify` is only called on classification frames
    pub fn process_frame<F>(
        &mut self,
        frame: &DynamicImage,
        now: Instant,
        classify: F,
    ) -> Result<FrameOutcome>
    where
        F: FnOnce(&DynamicImage) -> Result<PredictionResult>,
    {
        if self.state != SessionState::Running {
            return Err(self.transition_error("feed frames to"));
        }

        if self.elapsed(now) >= self.config.session_limit() {
            tracing::info!(
                "Session limit reached ({}s)",
                self.config.session_limit_secs
            );
            self.finish(now);
            return Ok(FrameOutcome::LimitReached);
        }

        let index = self.frames;
        self.frames += 1;
        if index % self.config.skip_frames != 0 {
            return Ok(FrameOutcome::Skipped);
        }

        let prediction = classify(frame)?;
        self.classified += 1;

        if !prediction.is_confident(self.config.confidence_threshold) {
            self.label = SCANNING_LABEL.to_string();
            return Ok(FrameOutcome::Scanned);
        }

        let time = Local::now().format("%H:%M:%S").to_string();
        self.label = format!(
            "{}: {:.1}%",
            prediction.class_name,
            prediction.confidence * 100.0
        );

        let detection = Detection {
            timestamp: time.clone(),
            class_name: prediction.class_name.clone(),
            confidence: prediction.confidence,
        };
        self.detections.push(detection.clone());

        let new_best = self
            .best
            .as_ref()
            .map_or(true, |best| prediction.confidence > best.confidence);
        if new_best {
            let snapshot = match save_snapshot(frame, &self.config.snapshot_dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Could not save best-detection snapshot: {}", e);
                    None
                }
            };
            self.best = Some(BestDetection {
                class_name: prediction.class_name,
                confidence: prediction.confidence,
                time,
                snapshot,
            });
        }

        Ok(FrameOutcome::Detected {
            detection,
            new_best,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn classified_frames(&self) -> usize {
        self.classified
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn best(&self) -> Option<&BestDetection> {
        self.best.as_ref()
    }

    /// Overlay text for the current frame
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fps(&self, now: Instant) -> f64 {
        let secs = self.elapsed(now).as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Stop the session and append it to `history`
    pub fn end_and_save(mut self, now: Instant, history: &mut SessionHistory) -> &SessionRecord {
        if self.state != SessionState::Finished {
            self.finish(now);
        }

        let record = SessionRecord {
            id: history.next_id(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            model_name: self.model_name,
            duration_secs: self.accumulated.as_secs_f64(),
            frames_count: self.frames,
            best_detection: self.best,
            detections: self.detections,
        };
        history.push(record)
    }

    /// Drop the session without recording it
    pub fn discard(self) {
        tracing::info!(
            "Discarded live session ({} frames, {} detections)",
            self.frames,
            self.detections.len()
        );
    }
}

/// Feed frames from `source` until it ends or the session limit is reached.
///
/// Frames that fail to decode or classify are logged and skipped.
pub fn run_live_session<S, F>(
    source: &mut S,
    session: &mut LiveSession,
    mut classify: F,
) -> Result<()>
where
    S: FrameSource + ?Sized,
    F: FnMut(&DynamicImage) -> Result<PredictionResult>,
{
    if session.state() == SessionState::Idle {
        session.start(Instant::now())?;
    }

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Skipping unreadable frame from {}: {}", source.name(), e);
                continue;
            }
        };

        match session.process_frame(&frame, Instant::now(), &mut classify) {
            Ok(FrameOutcome::LimitReached) => break,
            Ok(FrameOutcome::Detected { new_best: true, .. }) => {
                tracing::info!("New best: {}", session.label());
            }
            Ok(_) => {}
            Err(CarXplainError::Session(msg)) => return Err(CarXplainError::Session(msg)),
            Err(e) => tracing::warn!("Frame {} failed: {}", session.frames(), e),
        }
    }

    Ok(())
}
