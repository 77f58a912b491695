//! GitHub release asset upload
//!
//! Attaches the selected bundle files to the release that triggered the run.
//! The release is looked up by exactly the event's tag; nothing is created.

mod release_manager;

pub use release_manager::{GitHubAsset, GitHubRelease, GitHubReleaseConfig, GitHubReleaseManager};

use crate::artifact::Bundle;
use crate::config::GitHubConfig;
use crate::credentials::Secret;
use crate::error::{ConfigError, PublishError, ReleaseError, Result};
use crate::event::ReleaseEvent;
use crate::pipeline::{PublishReceipt, PublishedFile, Publisher, StageKind};
use async_trait::async_trait;

/// Publisher attaching `*.tar.gz` and `*.whl` (or configured globs) to a release
pub struct GitHubAssetPublisher {
    manager: GitHubReleaseManager,
    patterns: Vec<glob::Pattern>,
    dry_run: bool,
}

impl GitHubAssetPublisher {
    /// Create from the `[github]` section
    ///
    /// `repository` must be in owner/repo form.
    pub fn new(
        client: reqwest::Client,
        config: &GitHubConfig,
        repository: &str,
        token: Secret,
        dry_run: bool,
    ) -> Result<Self> {
        let (owner, repo) = crate::config::parse_repository(repository)?;
        let patterns = compile_patterns(&config.patterns)?;
        let manager = GitHubReleaseManager::new(
            client,
            GitHubReleaseConfig {
                owner,
                repo,
                api_url: config.api_url.clone(),
            },
            token,
        );
        Ok(Self {
            manager,
            patterns,
            dry_run,
        })
    }

    fn pattern_list(&self) -> String {
        self.patterns
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Publisher for GitHubAssetPublisher {
    fn stage(&self) -> StageKind {
        StageKind::RegistryUpload
    }

    async fn publish(&self, bundle: &Bundle, event: &ReleaseEvent) -> Result<PublishReceipt> {
        let selected = bundle.select(&self.patterns);
        if selected.is_empty() {
            return Err(PublishError::NoMatchingFiles {
                patterns: self.pattern_list(),
            }
            .into());
        }

        if self.dry_run {
            log::info!(
                "[dry-run] Would attach {} file(s) to release {} of {}",
                selected.len(),
                event.tag(),
                self.manager.repository()
            );
            return Ok(PublishReceipt {
                destination: format!("{} release {}", self.manager.repository(), event.tag()),
                dry_run: true,
                show_hashes: false,
                files: selected
                    .iter()
                    .map(|file| PublishedFile {
                        name: file.file_name().to_string(),
                        size: file.size,
                        sha256: file.sha256.clone(),
                        md5: None,
                        url: None,
                    })
                    .collect(),
            });
        }

        let release = self
            .manager
            .get_release_by_tag(event.tag())
            .await?
            .ok_or_else(|| PublishError::ReleaseNotFound {
                tag: event.tag().to_string(),
            })?;

        // Checked before the first upload; a taken name uploads nothing
        let existing = GitHubReleaseManager::asset_names(&release);
        if let Some(taken) = selected.iter().find(|f| existing.contains(f.file_name())) {
            return Err(PublishError::AssetExists {
                tag: release.tag_name.clone(),
                asset: taken.file_name().to_string(),
            }
            .into());
        }

        let mut files = Vec::with_capacity(selected.len());
        for file in selected {
            log::info!("Uploading {} to release {}", file.file_name(), release.tag_name);
            let asset = self
                .manager
                .upload_asset(&release, file.file_name(), &bundle.path_of(file))
                .await?;
            files.push(PublishedFile {
                name: asset.name,
                size: file.size,
                sha256: file.sha256.clone(),
                md5: None,
                url: Some(asset.browser_download_url),
            });
        }

        Ok(PublishReceipt {
            destination: release.html_url,
            dry_run: false,
            show_hashes: false,
            files,
        })
    }
}

/// Compile file name globs
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| {
                ReleaseError::from(ConfigError::InvalidValue {
                    key: "github.patterns".to_string(),
                    reason: format!("'{}': {}", p, e),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_patterns() {
        let patterns = compile_patterns(&["*.tar.gz".to_string(), "*.whl".to_string()])
            .expect("patterns");
        assert!(patterns[0].matches("pkg-1.0.tar.gz"));
        assert!(patterns[1].matches("pkg-1.0-py3-none-any.whl"));
        assert!(!patterns.iter().any(|p| p.matches("pkg-1.0.zip")));

        assert!(compile_patterns(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_new_rejects_bad_repository() {
        let result = GitHubAssetPublisher::new(
            reqwest::Client::new(),
            &GitHubConfig::default(),
            "no-slash",
            Secret::new("t".to_string()),
            false,
        );
        assert!(result.is_err());
    }
}
