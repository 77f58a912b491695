//! The release event that triggers a pipeline run.

use crate::config::EnvConfig;
use crate::error::{EventError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A published release, identified by its tag
///
/// Immutable once constructed; the tag is handed unchanged to the registry
/// upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    tag: String,
    release_id: Option<u64>,
    prerelease: bool,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    action: Option<String>,
    release: Option<ReleasePayload>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: String,
    id: Option<u64>,
    #[serde(default)]
    prerelease: bool,
}

impl ReleaseEvent {
    /// Create an event from a tag given on the command line
    pub fn from_tag(tag: &str) -> Result<Self> {
        validate_tag(tag)?;
        Ok(Self {
            tag: tag.to_string(),
            release_id: None,
            prerelease: false,
        })
    }

    /// Parse a GitHub `release` webhook payload
    ///
    /// Only `published` releases trigger the pipeline.
    pub fn from_payload(event_name: &str, payload: &str) -> Result<Self> {
        let parsed: EventPayload = serde_json::from_str(payload)?;
        let action = parsed.action.unwrap_or_default();

        if event_name != "release" || action != "published" {
            return Err(EventError::NotPublished {
                event: event_name.to_string(),
                action,
            }
            .into());
        }

        let release = parsed.release.ok_or(EventError::MissingTag)?;
        validate_tag(&release.tag_name)?;

        Ok(Self {
            tag: release.tag_name,
            release_id: release.id,
            prerelease: release.prerelease,
        })
    }

    /// Read the event payload from disk
    pub fn from_event_file(event_name: &str, path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path).map_err(|e| EventError::PayloadUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_payload(event_name, &payload)
    }

    /// Resolve the triggering event
    ///
    /// Precedence: explicit `--tag`, explicit `--event-path`, then the Actions
    /// runtime variables `GITHUB_EVENT_PATH` / `GITHUB_EVENT_NAME`.
    pub fn resolve(
        tag: Option<&str>,
        event_path: Option<&Path>,
        env: &EnvConfig,
    ) -> Result<Self> {
        if let Some(tag) = tag {
            return Self::from_tag(tag);
        }

        let event_name = env
            .get("GITHUB_EVENT_NAME")
            .unwrap_or_else(|| "release".to_string());

        if let Some(path) = event_path {
            return Self::from_event_file(&event_name, path);
        }

        match env.get("GITHUB_EVENT_PATH") {
            Some(path) => Self::from_event_file(&event_name, &PathBuf::from(path)),
            None => Err(EventError::MissingTag.into()),
        }
    }

    /// The release tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Release id from the payload, when known
    pub fn release_id(&self) -> Option<u64> {
        self.release_id
    }

    /// Whether the release is marked as a pre-release
    pub fn is_prerelease(&self) -> bool {
        self.prerelease
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    let reason = if tag.is_empty() {
        Some("tag is empty")
    } else if tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("tag contains whitespace or control characters")
    } else if tag.starts_with('-') {
        Some("tag starts with '-'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(EventError::InvalidTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}
