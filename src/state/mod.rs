//! Run report persistence.
//!
//! The last run's report is kept in the work directory so `status` can show
//! what happened without re-running anything.

mod manager;

pub use manager::{ReportManager, SaveReportResult};

use crate::error::Result;
use crate::pipeline::PipelineReport;
use std::path::Path;

/// Report file name inside the work directory
pub const REPORT_FILE_NAME: &str = ".release_pipeline_report.json";

/// Create a report manager for the given work directory
pub fn create_report_manager(work_dir: &Path) -> ReportManager {
    ReportManager::new(work_dir.join(REPORT_FILE_NAME))
}

/// Quick check if a report exists in the given work directory
pub fn has_report(work_dir: &Path) -> bool {
    work_dir.join(REPORT_FILE_NAME).exists()
}

/// Load the last report from the given work directory
pub fn load_report(work_dir: &Path) -> Result<PipelineReport> {
    create_report_manager(work_dir).load()
}

/// Save a report to the given work directory
pub fn save_report(work_dir: &Path, report: &PipelineReport) -> Result<SaveReportResult> {
    create_report_manager(work_dir).save(report)
}
