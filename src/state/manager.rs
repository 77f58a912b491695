//! Persistence of run reports.
//!
//! Reports are written to a temporary file, synced, and renamed over the
//! previous report so a reader never sees a partial file.

use crate::error::{Result, StateError};
use crate::pipeline::{PipelineReport, REPORT_FORMAT_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Reads and writes the report file
#[derive(Debug, Clone)]
pub struct ReportManager {
    /// Path to report file
    report_path: PathBuf,
}

/// Result of a save
#[derive(Debug)]
pub struct SaveReportResult {
    /// Size of the written file in bytes
    pub file_size_bytes: u64,
    /// Duration of save operation
    pub save_duration: Duration,
}

impl ReportManager {
    /// Create a manager for `report_path`
    pub fn new<P: AsRef<Path>>(report_path: P) -> Self {
        Self {
            report_path: report_path.as_ref().to_path_buf(),
        }
    }

    /// Report file location
    pub fn path(&self) -> &Path {
        &self.report_path
    }

    /// Whether a report has been written
    pub fn exists(&self) -> bool {
        self.report_path.exists()
    }

    /// Write `report`, replacing any previous one
    pub fn save(&self, report: &PipelineReport) -> Result<SaveReportResult> {
        let start_time = SystemTime::now();

        let serialized =
            serde_json::to_string_pretty(report).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to serialize report: {}", e),
            })?;

        if let Some(parent) = self.report_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }

        let temp_path = self.report_path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to create temp file: {}", e),
            })?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| StateError::SaveFailed {
                    reason: format!("Failed to write report: {}", e),
                })?;
            file.sync_all().map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to sync file: {}", e),
            })?;
        }

        fs::rename(&temp_path, &self.report_path).map_err(|e| StateError::SaveFailed {
            reason: format!("Failed to rename temp file: {}", e),
        })?;

        Ok(SaveReportResult {
            file_size_bytes: serialized.len() as u64,
            save_duration: start_time.elapsed().unwrap_or_default(),
        })
    }

    /// Read the last report
    pub fn load(&self) -> Result<PipelineReport> {
        let contents = match fs::read_to_string(&self.report_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound.into());
            }
            Err(e) => {
                return Err(StateError::Corrupted {
                    reason: format!("Failed to read {}: {}", self.report_path.display(), e),
                }
                .into());
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
                reason: format!("Failed to parse report: {}", e),
            })?;

        let found = value.get("format_version").and_then(|v| v.as_u64());
        if found != Some(u64::from(REPORT_FORMAT_VERSION)) {
            return Err(StateError::VersionMismatch {
                expected: REPORT_FORMAT_VERSION.to_string(),
                found: found.map_or_else(|| "none".to_string(), |v| v.to_string()),
            }
            .into());
        }

        serde_json::from_value(value).map_err(|e| {
            StateError::Corrupted {
                reason: format!("Failed to deserialize report: {}", e),
            }
            .into()
        })
    }

    /// Delete the report
    pub fn cleanup(&self) -> Result<()> {
        if self.report_path.exists() {
            fs::remove_file(&self.report_path).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to remove report file: {}", e),
            })?;
        }
        Ok(())
    }
}
