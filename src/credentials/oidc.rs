//! Trusted publishing: exchange the workflow's OIDC identity token for a
//! short-lived package index upload token.
//!
//! No long-lived secret is read. The flow is:
//! 1. ask the index which audience it expects (`/_/oidc/audience`)
//! 2. request an ID token for that audience from the Actions runtime
//! 3. trade the ID token for an upload token (`/_/oidc/mint-token`)

use super::{IndexTokenProvider, Secret};
use crate::config::EnvConfig;
use crate::error::{PublishError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use url::Url;

const TARGET: &str = "package index";

/// Claims shown when the index rejects an identity token
const DIAGNOSTIC_CLAIMS: &[&str] = &[
    "sub",
    "repository",
    "repository_owner",
    "repository_owner_id",
    "workflow_ref",
    "job_workflow_ref",
    "ref",
    "environment",
];

#[derive(Debug, Deserialize)]
struct AudienceResponse {
    audience: String,
}

#[derive(Debug, Deserialize)]
struct IdTokenResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct MintErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<MintErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct MintErrorDetail {
    code: String,
    description: String,
}

/// Trusted publishing token exchange against one index
#[derive(Debug, Clone)]
pub struct TrustedPublisher {
    client: reqwest::Client,
    index_base: Url,
    request_url: Option<String>,
    request_token: Option<Secret>,
}

impl TrustedPublisher {
    /// Create an exchange for the index behind `repository_url`
    ///
    /// The Actions runtime variables are captured here; their absence is only
    /// reported when a token is requested.
    pub fn new(client: reqwest::Client, repository_url: &str, env: &EnvConfig) -> Result<Self> {
        Ok(Self {
            client,
            index_base: index_base_url(repository_url)?,
            request_url: env.get("ACTIONS_ID_TOKEN_REQUEST_URL"),
            request_token: env.get("ACTIONS_ID_TOKEN_REQUEST_TOKEN").map(Secret::new),
        })
    }

    /// Base URL of the index web application
    pub fn index_base(&self) -> &Url {
        &self.index_base
    }

    async fn audience(&self) -> Result<String> {
        let url = self.endpoint("_/oidc/audience")?;
        let response = self.client.get(url).send().await.map_err(network)?;
        if !response.status().is_success() {
            return Err(PublishError::TrustedPublishing {
                reason: format!(
                    "index does not support trusted publishing (audience lookup returned {})",
                    response.status()
                ),
            }
            .into());
        }
        let body: AudienceResponse = response.json().await.map_err(network)?;
        Ok(body.audience)
    }

    async fn id_token(&self, audience: &str) -> Result<Secret> {
        let (Some(request_url), Some(request_token)) = (&self.request_url, &self.request_token)
        else {
            return Err(PublishError::MissingCredentials {
                target: TARGET.to_string(),
                reason: "ACTIONS_ID_TOKEN_REQUEST_URL/ACTIONS_ID_TOKEN_REQUEST_TOKEN are not set; \
                         the job needs the 'id-token: write' permission"
                    .to_string(),
            }
            .into());
        };

        let mut url = Url::parse(request_url).map_err(|e| PublishError::TrustedPublishing {
            reason: format!("invalid ACTIONS_ID_TOKEN_REQUEST_URL: {}", e),
        })?;
        url.query_pairs_mut().append_pair("audience", audience);

        let response = self
            .client
            .get(url)
            .bearer_auth(request_token.expose())
            .send()
            .await
            .map_err(network)?;
        if !response.status().is_success() {
            return Err(PublishError::AuthenticationError {
                target: "Actions OIDC provider".to_string(),
                reason: format!("identity token request returned {}", response.status()),
            }
            .into());
        }
        let body: IdTokenResponse = response.json().await.map_err(network)?;
        Ok(Secret::new(body.value))
    }

    async fn mint(&self, id_token: &Secret) -> Result<Secret> {
        let url = self.endpoint("_/oidc/mint-token")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "token": id_token.expose() }))
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status.is_success() {
            let body: MintResponse = response.json().await.map_err(network)?;
            return Ok(Secret::new(body.token));
        }

        let text = response.text().await.unwrap_or_default();
        let details: MintErrorResponse = serde_json::from_str(&text).unwrap_or_default();
        Err(PublishError::TrustedPublishing {
            reason: render_mint_failure(status.as_u16(), &details, id_token.expose()),
        }
        .into())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.index_base
            .join(path)
            .map_err(|e| {
                PublishError::TrustedPublishing {
                    reason: format!("invalid index URL: {}", e),
                }
                .into()
            })
    }
}

#[async_trait]
impl IndexTokenProvider for TrustedPublisher {
    async fn upload_token(&self) -> Result<Secret> {
        let audience = self.audience().await?;
        log::debug!("Trusted publishing audience: {}", audience);
        let id_token = self.id_token(&audience).await?;
        let token = self.mint(&id_token).await?;
        log::info!("Minted short-lived upload token for {}", self.index_base);
        Ok(token)
    }
}

fn network(e: reqwest::Error) -> crate::error::ReleaseError {
    PublishError::NetworkError {
        target: TARGET.to_string(),
        reason: e.to_string(),
    }
    .into()
}

/// Map a legacy upload URL to the index web application base URL
///
/// `upload.pypi.org` is served from `pypi.org`; every other index serves
/// the OIDC endpoints from its own host.
pub fn index_base_url(repository_url: &str) -> Result<Url> {
    let url = Url::parse(repository_url).map_err(|e| PublishError::TrustedPublishing {
        reason: format!("invalid repository URL '{}': {}", repository_url, e),
    })?;
    let host = url.host_str().ok_or_else(|| PublishError::TrustedPublishing {
        reason: format!("repository URL '{}' has no host", repository_url),
    })?;

    let host = match host {
        "upload.pypi.org" => "pypi.org",
        other => other,
    };
    let base = match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    };

    Url::parse(&base).map_err(|e| {
        PublishError::TrustedPublishing {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode the (unverified) claims of a JWT for diagnostics
pub fn decode_claims(jwt: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

fn render_mint_failure(status: u16, details: &MintErrorResponse, id_token: &str) -> String {
    let mut lines = vec![format!(
        "token mint returned {}{}",
        status,
        details
            .message
            .as_ref()
            .map(|m| format!(": {}", m))
            .unwrap_or_default()
    )];

    for error in &details.errors {
        lines.push(format!("  - {}: {}", error.code, error.description));
    }

    if let Some(claims) = decode_claims(id_token) {
        lines.push("  identity token claims:".to_string());
        for key in DIAGNOSTIC_CLAIMS {
            if let Some(value) = claims.get(*key) {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                lines.push(format!("    {}: {}", key, value));
            }
        }
    }

    lines.join("\n")
}
