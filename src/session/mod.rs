//! Live video mode
//!
//! - [`source`]: frame sources (image directories, in-memory frames)
//! - [`live`]: the session state machine and its driver loop
//! - [`history`]: saved session records and their KPIs

pub mod history;
pub mod live;
pub mod source;

pub use history::{BestDetection, Detection, SessionHistory, SessionRecord};
pub use live::{run_live_session, FrameOutcome, LiveSession, LiveSessionConfig, SessionState};
pub use source::{DirectoryFrameSource, FrameSource, MemoryFrameSource};
