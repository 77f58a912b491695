//! Shared helper functions for command execution.

use crate::artifact::LocalArtifactStore;
use crate::cli::RuntimeConfig;
use crate::config::{EnvConfig, PipelineConfig};
use crate::credentials::{Secret, TrustedPublisher, github_token};
use crate::error::{CliError, ConfigError, ReleaseError, Result};
use crate::github::GitHubAssetPublisher;
use crate::index::IndexPublisher;
use crate::pipeline::{
    PipelineReport, Publisher, StageKind, StageReport, StageStatus, format_duration,
};
use crate::source::{RepositorySource, ResolvedRepo};
use std::path::Path;
use std::sync::Arc;

const USER_AGENT: &str = concat!("kodegen_release_pipeline/", env!("CARGO_PKG_VERSION"));

/// Resolve `--source` (default: the work directory) to a checkout of `tag`
pub(super) async fn resolve_checkout(
    source: Option<&str>,
    tag: Option<&str>,
    allow_persisted_credentials: bool,
    config: &RuntimeConfig,
) -> Result<ResolvedRepo> {
    let source = match source {
        Some(input) => RepositorySource::parse(input)?,
        None => RepositorySource::Local(config.work_dir.canonicalize()?),
    };

    match (&source, tag) {
        (RepositorySource::GitHub { owner, repo }, Some(tag)) => {
            config.println(&format!("📦 Cloning {}/{} at {}...", owner, repo, tag));
            source.resolve(tag, allow_persisted_credentials).await
        }
        (RepositorySource::GitHub { .. }, None) => Err(CliError::InvalidArguments {
            reason: "a remote --source needs --tag to know what to check out".to_string(),
        }
        .into()),
        (RepositorySource::Local(path), tag) => {
            config.verbose_println(&format!("Using checkout {}", path.display()));
            source
                .resolve(tag.unwrap_or_default(), allow_persisted_credentials)
                .await
        }
    }
}

/// Load, override and validate the pipeline configuration
pub(super) fn load_pipeline_config(
    config: &RuntimeConfig,
    checkout: &Path,
    env: &EnvConfig,
) -> Result<PipelineConfig> {
    let mut pipeline_config = PipelineConfig::load(config.config_path.as_deref(), checkout)?;
    pipeline_config.apply_env(env);
    pipeline_config.validate()?;
    Ok(pipeline_config)
}

/// Artifact store under the work directory
pub(super) fn open_store(
    config: &RuntimeConfig,
    pipeline_config: &PipelineConfig,
) -> LocalArtifactStore {
    LocalArtifactStore::new(config.work_dir.join(&pipeline_config.artifacts.store_dir))
}

/// HTTP client shared by every publisher
pub(super) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Build the enabled publishers, optionally restricted to one stage
pub(super) fn build_publishers(
    pipeline_config: &PipelineConfig,
    env: &EnvConfig,
    dry_run: bool,
    only: Option<StageKind>,
) -> Result<Vec<Arc<dyn Publisher>>> {
    let client = http_client()?;
    let wanted = |stage: StageKind| only.is_none_or(|o| o == stage);
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();

    if pipeline_config.github.enabled && wanted(StageKind::RegistryUpload) {
        let repository = pipeline_config.github.repository.as_deref().ok_or_else(|| {
            ReleaseError::from(ConfigError::InvalidValue {
                key: "github.repository".to_string(),
                reason: "not set and GITHUB_REPOSITORY is empty".to_string(),
            })
        })?;
        let token = match github_token(env) {
            Ok(token) => token,
            Err(_) if dry_run => Secret::new(String::new()),
            Err(e) => return Err(e),
        };
        publishers.push(Arc::new(GitHubAssetPublisher::new(
            client.clone(),
            &pipeline_config.github,
            repository,
            token,
            dry_run,
        )?));
    }

    if pipeline_config.index.enabled && wanted(StageKind::IndexUpload) {
        let tokens =
            TrustedPublisher::new(client.clone(), &pipeline_config.index.repository_url, env)?;
        publishers.push(Arc::new(IndexPublisher::new(
            client,
            pipeline_config.index.repository_url.clone(),
            Arc::new(tokens),
            pipeline_config.index.print_hash,
            dry_run,
        )));
    }

    if publishers.is_empty() {
        return Err(CliError::InvalidArguments {
            reason: "no publisher is enabled in the configuration".to_string(),
        }
        .into());
    }
    Ok(publishers)
}

/// Print stage results and their receipts
pub(super) fn print_stages(config: &RuntimeConfig, stages: &[StageReport]) {
    for stage in stages {
        let detail = match (&stage.status, stage.duration()) {
            (StageStatus::Succeeded, Some(duration)) => Some(format_duration(duration)),
            (StageStatus::Skipped, _) => stage.message.clone(),
            _ => None,
        };
        let _ = config
            .output()
            .stage(stage.status, &stage.stage.to_string(), detail.as_deref());

        if stage.status == StageStatus::Failed
            && let Some(message) = &stage.message
        {
            config.error_println(&format!("{}: {}", stage.stage, message));
        }

        if let Some(handle) = &stage.bundle {
            config.indent(&format!(
                "bundle '{}': {} file(s), {} bytes",
                handle.name, handle.file_count, handle.total_bytes
            ));
        }

        if let Some(receipt) = &stage.receipt {
            let verb = if receipt.dry_run {
                "would publish to"
            } else {
                "published to"
            };
            config.indent(&format!("{} {}", verb, receipt.destination));
            for file in &receipt.files {
                config.indent(&format!("  {} ({} bytes)", file.name, file.size));
                if receipt.show_hashes {
                    config.indent(&format!("    SHA256: {}", file.sha256));
                    if let Some(md5) = &file.md5 {
                        config.indent(&format!("    MD5:    {}", md5));
                    }
                } else {
                    config.verbose_println(&format!("      sha256 {}", file.sha256));
                }
                if let Some(url) = &file.url {
                    config.indent(&format!("    {}", url));
                }
            }
        }
    }
}

/// Print the run summary line
pub(super) fn print_summary(config: &RuntimeConfig, report: &PipelineReport) {
    match report.outcome {
        crate::pipeline::Outcome::Success => config.success_println(&report.summary()),
        crate::pipeline::Outcome::PartialFailure => config.warning_println(&report.summary()),
        crate::pipeline::Outcome::TotalFailure => config.error_println(&report.summary()),
    }
}

/// Print recovery suggestions for a failed command
pub(super) fn print_suggestions(config: &RuntimeConfig, error: &ReleaseError) {
    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() && !config.is_quiet() {
        config.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            config.println(&format!("  • {}", suggestion));
        }
    }
}
