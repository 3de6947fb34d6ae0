//! PDF reports for the three dashboard modes
//!
//! Report generation never changes a result: failures come back as
//! `CarXplainError::Report` and the caller decides whether to surface them.

pub mod analysis_report;
pub mod comparison_report;
pub mod pdf;
pub mod session_report;

use std::path::{Path, PathBuf};

pub use analysis_report::{analysis_report, analysis_report_file_name};
pub use comparison_report::{comparison_report, comparison_report_file_name};
pub use session_report::{session_report, session_report_file_name};

use crate::utils::error::Result;

/// Write report bytes to `dir/name`, creating `dir` if needed
pub fn write_report(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    tracing::info!("Report written to {:?} ({} bytes)", path, bytes.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let path = write_report(&out, "r.pdf", b"%PDF-1.3").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.3");
    }
}
