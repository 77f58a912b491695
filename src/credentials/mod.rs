//! Short-lived credentials for the publish stages.
//!
//! Tokens are held in memory only; [`Secret`] keeps them out of logs and
//! debug output.

mod oidc;

pub use oidc::{TrustedPublisher, decode_claims, index_base_url};

use crate::config::EnvConfig;
use crate::error::{PublishError, Result};
use async_trait::async_trait;

/// A credential that must never be printed
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential value
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Reveal the value for use in a request
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***")
    }
}

/// Resolve the release-scoped GitHub token (`GH_TOKEN`, then `GITHUB_TOKEN`)
pub fn github_token(env: &EnvConfig) -> Result<Secret> {
    env.get("GH_TOKEN")
        .or_else(|| env.get("GITHUB_TOKEN"))
        .map(Secret::new)
        .ok_or_else(|| {
            PublishError::MissingCredentials {
                target: "GitHub".to_string(),
                reason: "set GH_TOKEN or GITHUB_TOKEN with contents: write".to_string(),
            }
            .into()
        })
}

/// Source of the upload token for the package index
#[async_trait]
pub trait IndexTokenProvider: Send + Sync {
    /// Obtain a token valid for this run only
    async fn upload_token(&self) -> Result<Secret>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("ghs_abcdef");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "ghs_abcdef");
    }

    #[test]
    fn test_github_token_precedence() {
        let env = EnvConfig::from_pairs([("GH_TOKEN", "first"), ("GITHUB_TOKEN", "second")]);
        assert_eq!(github_token(&env).expect("token").expose(), "first");

        let env = EnvConfig::from_pairs([("GH_TOKEN", ""), ("GITHUB_TOKEN", "second")]);
        assert_eq!(github_token(&env).expect("token").expose(), "second");

        assert!(github_token(&EnvConfig::default()).is_err());
    }
}
