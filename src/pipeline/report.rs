//! Per-stage results and the overall run outcome.

use crate::artifact::BundleHandle;
use crate::error::ReleaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current version of the report format
pub const REPORT_FORMAT_VERSION: u32 = 1;

/// Pipeline stages in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Run the build command
    Build,
    /// Store the build output as a bundle
    HandOff,
    /// Attach bundle files to the GitHub release
    RegistryUpload,
    /// Push bundle files to the package index
    IndexUpload,
}

impl StageKind {
    /// Whether this is one of the publish stages fanned out after hand-off
    pub fn is_publish(&self) -> bool {
        matches!(self, StageKind::RegistryUpload | StageKind::IndexUpload)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Build => write!(f, "Build"),
            StageKind::HandOff => write!(f, "Artifact hand-off"),
            StageKind::RegistryUpload => write!(f, "GitHub release upload"),
            StageKind::IndexUpload => write!(f, "Package index upload"),
        }
    }
}

/// Status of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    /// Stage ran and its external call succeeded
    Succeeded,
    /// Stage ran and failed
    Failed,
    /// Stage did not run because a prerequisite failed
    Skipped,
}

/// One file handled by a publish stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedFile {
    /// File name as published
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256
    pub sha256: String,
    /// Hex MD5, when the destination uses it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Download URL, when the destination returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// What a publish stage did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Human-readable destination (release URL, index URL)
    pub destination: String,
    /// Nothing was sent over the network
    pub dry_run: bool,
    /// File hashes should be shown to the user
    #[serde(default)]
    pub show_hashes: bool,
    /// Files published, in upload order
    pub files: Vec<PublishedFile>,
}

/// Result of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage
    pub stage: StageKind,
    /// How it ended
    pub status: StageStatus,
    /// When it started (absent when skipped)
    pub started_at: Option<DateTime<Utc>>,
    /// When it finished (absent when skipped)
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message, or the reason for skipping
    pub message: Option<String>,
    /// Whether re-running could fix the failure
    #[serde(default)]
    pub recoverable: bool,
    /// Bundle stored by the hand-off stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleHandle>,
    /// Receipt of a publish stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishReceipt>,
}

impl StageReport {
    /// Stage that succeeded
    pub fn succeeded(stage: StageKind, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            message: None,
            recoverable: false,
            bundle: None,
            receipt: None,
        }
    }

    /// Stage that failed with `error`
    pub fn failed(stage: StageKind, started_at: DateTime<Utc>, error: &ReleaseError) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            message: Some(error.to_string()),
            recoverable: error.is_recoverable(),
            bundle: None,
            receipt: None,
        }
    }

    /// Stage that never ran
    pub fn skipped(stage: StageKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            started_at: None,
            finished_at: None,
            message: Some(reason.into()),
            recoverable: true,
            bundle: None,
            receipt: None,
        }
    }

    /// Attach the stored bundle handle
    pub fn with_bundle(mut self, handle: BundleHandle) -> Self {
        self.bundle = Some(handle);
        self
    }

    /// Attach a publish receipt
    pub fn with_receipt(mut self, receipt: PublishReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }

    /// Wall-clock duration, when the stage ran
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Every stage that ran succeeded
    Success,
    /// Hand-off succeeded but at least one publish stage failed
    PartialFailure,
    /// Build or hand-off failed; nothing was published
    TotalFailure,
}

impl Outcome {
    /// Derive the outcome from stage results
    pub fn from_stages(stages: &[StageReport]) -> Self {
        let prerequisite_failed = stages
            .iter()
            .any(|s| !s.stage.is_publish() && s.status != StageStatus::Succeeded);
        if prerequisite_failed {
            return Outcome::TotalFailure;
        }

        let publish_failed = stages
            .iter()
            .any(|s| s.stage.is_publish() && s.status != StageStatus::Succeeded);
        if publish_failed {
            Outcome::PartialFailure
        } else {
            Outcome::Success
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::TotalFailure => 1,
            Outcome::PartialFailure => 2,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::PartialFailure => write!(f, "partial failure"),
            Outcome::TotalFailure => write!(f, "total failure"),
        }
    }
}

/// Complete record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Version of the report format
    pub format_version: u32,
    /// Unique ID for this run
    pub run_id: String,
    /// Tag of the triggering release
    pub tag: String,
    /// Whether publishers ran in dry-run mode
    pub dry_run: bool,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Stage results in dependency order
    pub stages: Vec<StageReport>,
    /// Overall outcome
    pub outcome: Outcome,
}

impl PipelineReport {
    /// Assemble a report, deriving the outcome
    pub fn new(
        tag: &str,
        dry_run: bool,
        started_at: DateTime<Utc>,
        stages: Vec<StageReport>,
    ) -> Self {
        let outcome = Outcome::from_stages(&stages);
        Self {
            format_version: REPORT_FORMAT_VERSION,
            run_id: format!("run-{}-{}", tag, started_at.timestamp()),
            tag: tag.to_string(),
            dry_run,
            started_at,
            finished_at: Utc::now(),
            stages,
            outcome,
        }
    }

    /// Result of a given stage
    pub fn stage(&self, stage: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Stages that failed
    pub fn failed_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .map(|s| s.stage)
            .collect()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Release {} - {} - {} elapsed",
            self.tag,
            self.outcome,
            format_duration(self.finished_at - self.started_at)
        )
    }
}

/// Format a duration as `1h 2m 3s`, dropping leading zero units
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
