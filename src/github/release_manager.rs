//! GitHub Release management for attaching bundle files as release assets

use crate::credentials::Secret;
use crate::error::{PublishError, ReleaseError, Result};
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use url::Url;

const TARGET: &str = "GitHub";
const USER_AGENT: &str = concat!("kodegen_release_pipeline/", env!("CARGO_PKG_VERSION"));

/// Configuration for GitHub releases
#[derive(Debug, Clone)]
pub struct GitHubReleaseConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// REST API base URL
    pub api_url: String,
}

/// A release as returned by the REST API
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    /// Release ID
    pub id: u64,
    /// Tag the release is attached to
    pub tag_name: String,
    /// Release URL
    pub html_url: String,
    /// Upload URL template (`.../assets{?name,label}`)
    pub upload_url: String,
    /// Whether this is a draft
    #[serde(default)]
    pub draft: bool,
    /// Assets already attached
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// A release asset
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    /// Asset file name
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Public download URL
    #[serde(default)]
    pub browser_download_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: String,
}

/// GitHub release manager
pub struct GitHubReleaseManager {
    /// HTTP client
    client: reqwest::Client,
    /// Configuration
    config: GitHubReleaseConfig,
    /// Release-scoped token
    token: Secret,
}

impl GitHubReleaseManager {
    /// Create new GitHub release manager
    pub fn new(client: reqwest::Client, config: GitHubReleaseConfig, token: Secret) -> Self {
        Self {
            client,
            config,
            token,
        }
    }

    /// Repository in owner/repo form
    pub fn repository(&self) -> String {
        format!("{}/{}", self.config.owner, self.config.repo)
    }

    /// Find the release attached to `tag`
    ///
    /// # Returns
    /// - `Ok(Some(_))` - Release exists
    /// - `Ok(None)` - No release for this tag
    /// - `Err(_)` - Network or authentication error
    pub async fn get_release_by_tag(&self, tag: &str) -> Result<Option<GitHubRelease>> {
        let url = release_by_tag_url(&self.config, tag)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(network)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let release: GitHubRelease = response.json().await.map_err(network)?;
                Ok(Some(release))
            }
            status => Err(api_error(status, response.text().await.unwrap_or_default())),
        }
    }

    /// Asset names already attached to a release
    pub fn asset_names(release: &GitHubRelease) -> HashSet<String> {
        release.assets.iter().map(|asset| asset.name.clone()).collect()
    }

    /// Upload one file as an asset of `release`
    ///
    /// Fails with `AssetExists` if GitHub reports the name is taken.
    pub async fn upload_asset(
        &self,
        release: &GitHubRelease,
        asset_name: &str,
        path: &Path,
    ) -> Result<GitHubAsset> {
        let content = Bytes::from(tokio::fs::read(path).await?);
        let url = asset_upload_url(&release.upload_url, asset_name)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(asset_name))
            .body(content)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status.is_success() {
            let asset: GitHubAsset = response.json().await.map_err(network)?;
            return Ok(asset);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && is_already_exists(&body) {
            return Err(PublishError::AssetExists {
                tag: release.tag_name.clone(),
                asset: asset_name.to_string(),
            }
            .into());
        }
        Err(api_error(status, body))
    }
}

fn network(e: reqwest::Error) -> ReleaseError {
    PublishError::NetworkError {
        target: TARGET.to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn api_error(status: StatusCode, body: String) -> ReleaseError {
    let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body
    } else {
        parsed.message
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return PublishError::AuthenticationError {
            target: TARGET.to_string(),
            reason: format!("{} ({})", message, status),
        }
        .into();
    }
    PublishError::Api {
        target: TARGET.to_string(),
        status: status.as_u16(),
        message,
    }
    .into()
}

fn is_already_exists(body: &str) -> bool {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed.errors.iter().any(|e| e.code == "already_exists")
}

/// `GET /repos/{owner}/{repo}/releases/tags/{tag}`
pub(crate) fn release_by_tag_url(config: &GitHubReleaseConfig, tag: &str) -> Result<Url> {
    let mut url = Url::parse(&config.api_url).map_err(|e| invalid_url(&config.api_url, e))?;
    url.path_segments_mut()
        .map_err(|_| invalid_url(&config.api_url, "cannot be a base"))?
        .pop_if_empty()
        .extend([
            "repos",
            config.owner.as_str(),
            config.repo.as_str(),
            "releases",
            "tags",
            tag,
        ]);
    Ok(url)
}

/// Expand the `{?name,label}` upload template for one asset
pub(crate) fn asset_upload_url(template: &str, asset_name: &str) -> Result<Url> {
    let base = template.split('{').next().unwrap_or(template);
    let mut url = Url::parse(base).map_err(|e| invalid_url(template, e))?;
    url.query_pairs_mut().append_pair("name", asset_name);
    Ok(url)
}

fn invalid_url(url: &str, reason: impl std::fmt::Display) -> ReleaseError {
    PublishError::Api {
        target: TARGET.to_string(),
        status: 0,
        message: format!("invalid URL '{}': {}", url, reason),
    }
    .into()
}

/// Content type for release assets
fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        "application/gzip"
    } else if name.ends_with(".whl") || name.ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    }
}
