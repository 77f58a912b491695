//! Pipeline configuration.
//!
//! Loaded from `release-pipeline.toml` when present; every field has a default,
//! so a project without the file gets the standard `pipx run build` → `dist/`
//! → GitHub + PyPI pipeline.

use crate::artifact::validate_bundle_name;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the checkout root
pub const CONFIG_FILE_NAME: &str = "release-pipeline.toml";

/// Default bundle name used for the hand-off
pub const DEFAULT_BUNDLE_NAME: &str = "distfiles";

/// Default legacy upload endpoint of the package index
pub const DEFAULT_INDEX_URL: &str = "https://upload.pypi.org/legacy/";

/// Default GitHub REST API base
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Build stage settings
    pub build: BuildConfig,
    /// Artifact hand-off settings
    pub artifacts: ArtifactConfig,
    /// GitHub release upload settings
    pub github: GitHubConfig,
    /// Package index upload settings
    pub index: IndexConfig,
}

/// Build stage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Output directory, relative to the checkout
    pub output_dir: PathBuf,
    /// Remove the output directory before building
    pub clean: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["pipx".to_string(), "run".to_string(), "build".to_string()],
            output_dir: PathBuf::from("dist"),
            clean: true,
        }
    }
}

/// Artifact hand-off settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactConfig {
    /// Name the bundle is stored and retrieved under
    pub bundle_name: String,
    /// Store directory, relative to the work directory
    pub store_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            bundle_name: DEFAULT_BUNDLE_NAME.to_string(),
            store_dir: PathBuf::from(".release-artifacts"),
        }
    }
}

/// GitHub release upload settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    /// Run the registry upload stage
    pub enabled: bool,
    /// Repository in owner/repo form (falls back to GITHUB_REPOSITORY)
    pub repository: Option<String>,
    /// REST API base URL
    pub api_url: String,
    /// File name globs selecting release assets
    pub patterns: Vec<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: None,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            patterns: vec!["*.tar.gz".to_string(), "*.whl".to_string()],
        }
    }
}

/// Package index upload settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Run the index upload stage
    pub enabled: bool,
    /// Legacy upload endpoint
    pub repository_url: String,
    /// Print SHA-256 and MD5 of each file before upload
    pub print_hash: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository_url: DEFAULT_INDEX_URL.to_string(),
            print_hash: true,
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    /// Load configuration from an explicit path, or from the checkout root when present
    ///
    /// A missing explicit path is an error; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>, checkout_dir: &Path) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (checkout_dir.join(CONFIG_FILE_NAME), false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::ReadFailed {
                    path,
                    reason: "file does not exist".to_string(),
                }
                .into());
            }
            log::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides
    ///
    /// `GITHUB_REPOSITORY` and `GITHUB_API_URL` are set by GitHub Actions and only
    /// fill values the file left at their defaults.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if self.github.repository.is_none() {
            self.github.repository = env.get("GITHUB_REPOSITORY");
        }
        if self.github.api_url == DEFAULT_GITHUB_API_URL
            && let Some(api_url) = env.get("GITHUB_API_URL")
        {
            self.github.api_url = api_url;
        }
        if let Some(bundle) = env.get("RELEASE_PIPELINE_BUNDLE") {
            self.artifacts.bundle_name = bundle;
        }
        if let Some(index_url) = env.get("RELEASE_PIPELINE_INDEX_URL") {
            self.index.repository_url = index_url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(invalid("build.command", "must name a program"));
        }
        if self.build.output_dir.as_os_str().is_empty() || self.build.output_dir.is_absolute() {
            return Err(invalid("build.output_dir", "must be a relative path"));
        }

        validate_bundle_name(&self.artifacts.bundle_name)
            .map_err(|e| invalid("artifacts.bundle_name", &e.to_string()))?;

        if self.github.enabled {
            if let Some(repo) = &self.github.repository {
                parse_repository(repo)?;
            }
            url::Url::parse(&self.github.api_url)
                .map_err(|e| invalid("github.api_url", &e.to_string()))?;
            if self.github.patterns.is_empty() {
                return Err(invalid("github.patterns", "at least one pattern is required"));
            }
            for pattern in &self.github.patterns {
                glob::Pattern::new(pattern)
                    .map_err(|e| invalid("github.patterns", &format!("'{}': {}", pattern, e)))?;
            }
        }

        if self.index.enabled {
            let url = url::Url::parse(&self.index.repository_url)
                .map_err(|e| invalid("index.repository_url", &e.to_string()))?;
            if url.host_str().is_none() {
                return Err(invalid("index.repository_url", "must include a host"));
            }
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> crate::error::ReleaseError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Parse an `owner/repo` string
pub fn parse_repository(repo: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = repo.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid(
            "github.repository",
            &format!("'{}' is not in owner/repo form", repo),
        ));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Snapshot of the process environment
///
/// Commands read the environment through this so tests can inject values
/// without touching process-global state.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    vars: std::collections::HashMap<String, String>,
}

impl EnvConfig {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a non-empty variable
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_standard_pipeline() {
        let config = PipelineConfig::default();
        assert_eq!(config.build.command, vec!["pipx", "run", "build"]);
        assert_eq!(config.build.output_dir, PathBuf::from("dist"));
        assert_eq!(config.artifacts.bundle_name, "distfiles");
        assert_eq!(config.github.patterns, vec!["*.tar.gz", "*.whl"]);
        assert_eq!(config.index.repository_url, DEFAULT_INDEX_URL);
        assert!(config.index.print_hash);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [build]
            command = ["python", "-m", "build"]

            [index]
            print_hash = false
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.build.command, vec!["python", "-m", "build"]);
        assert!(config.build.clean);
        assert!(!config.index.print_hash);
        assert!(config.github.enabled);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(PipelineConfig::from_toml_str("[build]\ncomand = [\"x\"]\n").is_err());
    }

    #[test]
    fn test_env_fills_repository_only_when_unset() {
        let env = EnvConfig::from_pairs([
            ("GITHUB_REPOSITORY", "octo/widgets"),
            ("GITHUB_API_URL", "https://ghe.example.com/api/v3"),
        ]);

        let mut config = PipelineConfig::default();
        config.apply_env(&env);
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");

        let mut pinned = PipelineConfig::default();
        pinned.github.repository = Some("other/repo".to_string());
        pinned.apply_env(&env);
        assert_eq!(pinned.github.repository.as_deref(), Some("other/repo"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.build.command.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.github.repository = Some("no-slash".to_string());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.github.patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.artifacts.bundle_name = "../escape".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.index.repository_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_repository() {
        assert_eq!(
            parse_repository("octo/widgets").expect("valid"),
            ("octo".to_string(), "widgets".to_string())
        );
        assert!(parse_repository("octo/").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }
}
