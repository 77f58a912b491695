//! Comprehensive error types for release pipeline operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release pipeline operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release pipeline operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Release event errors
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Repository source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Build stage errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Artifact hand-off errors
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Publishing errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// State management errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pipeline configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {reason}")]
    ReadFailed {
        /// Path of the config file
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// A config value is invalid
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted config key
        key: String,
        /// Reason for the error
        reason: String,
    },
}

/// Release event errors
#[derive(Error, Debug)]
pub enum EventError {
    /// No tag was supplied and no event payload is available
    #[error("No release tag available. Pass --tag or run from a release event (GITHUB_EVENT_PATH).")]
    MissingTag,

    /// Tag is not usable
    #[error("Invalid release tag '{tag}': {reason}")]
    InvalidTag {
        /// Tag as received
        tag: String,
        /// Reason for the error
        reason: String,
    },

    /// Event payload is not a published release
    #[error("Event '{event}' with action '{action}' is not a published release")]
    NotPublished {
        /// Event name
        event: String,
        /// Event action
        action: String,
    },

    /// Event payload could not be read
    #[error("Failed to read event payload {path}: {reason}")]
    PayloadUnreadable {
        /// Path to the payload
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Repository source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source string not understood
    #[error("Invalid source: '{input}'. Use local path, GitHub URL, or org/repo")]
    InvalidSource {
        /// Input as given
        input: String,
    },

    /// Clone failed
    #[error("Failed to clone {url} at '{tag}': {reason}")]
    CloneFailed {
        /// Remote URL
        url: String,
        /// Tag being checked out
        tag: String,
        /// Reason for the error
        reason: String,
    },

    /// Local checkout holds credentials a build step could reuse
    #[error("Checkout {path} has persisted credentials: {}", .found.join(", "))]
    PersistedCredentials {
        /// Checkout path
        path: PathBuf,
        /// Kinds of entries found
        found: Vec<String>,
    },

    /// Persisted credentials could not be removed
    #[error("Failed to remove persisted credentials from {path}: {reason}")]
    CredentialScrubFailed {
        /// Checkout path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Build stage errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Build program not on PATH
    #[error("Build program '{program}' not found on PATH")]
    ProgramNotFound {
        /// Program name
        program: String,
    },

    /// Build command exited non-zero
    #[error("Build command '{command}' failed with {status}: {stderr}")]
    CommandFailed {
        /// Full command line
        command: String,
        /// Exit status description
        status: String,
        /// Tail of stderr
        stderr: String,
    },

    /// Build command could not be started
    #[error("Failed to start build command '{command}': {reason}")]
    SpawnFailed {
        /// Full command line
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// Artifact hand-off errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Nothing to store
    #[error("No files were found with the provided path: {path}. No artifacts will be uploaded.")]
    NoFilesFound {
        /// Directory that was empty
        path: PathBuf,
    },

    /// Bundle name already used
    #[error("Bundle '{name}' already exists and cannot be replaced")]
    AlreadyExists {
        /// Bundle name
        name: String,
    },

    /// Bundle name unknown
    #[error("Bundle '{name}' not found in artifact store")]
    NotFound {
        /// Bundle name
        name: String,
    },

    /// Bundle name is not acceptable
    #[error("Invalid bundle name '{name}': {reason}")]
    InvalidName {
        /// Bundle name
        name: String,
        /// Reason for the error
        reason: String,
    },

    /// Stored bytes changed after hand-off
    #[error("Bundle '{name}' failed integrity check for '{file}': expected {expected}, found {actual}")]
    IntegrityMismatch {
        /// Bundle name
        name: String,
        /// File relative path
        file: String,
        /// Digest recorded at store time
        expected: String,
        /// Digest found at retrieval time
        actual: String,
    },

    /// Manifest unreadable
    #[error("Bundle '{name}' manifest is corrupted: {reason}")]
    CorruptManifest {
        /// Bundle name
        name: String,
        /// Reason for the error
        reason: String,
    },
}

/// Publishing errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// No release for the tag
    #[error("No GitHub release found for tag '{tag}'")]
    ReleaseNotFound {
        /// Tag name
        tag: String,
    },

    /// Release already has an asset with that name
    #[error("Release '{tag}' already has an asset named '{asset}'")]
    AssetExists {
        /// Tag name
        tag: String,
        /// Asset file name
        asset: String,
    },

    /// Glob selection matched nothing
    #[error("No bundle files match {patterns}")]
    NoMatchingFiles {
        /// Patterns used for selection, comma separated
        patterns: String,
    },

    /// Credentials missing
    #[error("Missing credentials for {target}: {reason}")]
    MissingCredentials {
        /// Destination name
        target: String,
        /// Reason for the error
        reason: String,
    },

    /// Credentials rejected
    #[error("Authentication error for {target}: {reason}")]
    AuthenticationError {
        /// Destination name
        target: String,
        /// Reason for the error
        reason: String,
    },

    /// Trusted publishing exchange failed
    #[error("Trusted publishing exchange failed: {reason}")]
    TrustedPublishing {
        /// Reason for the error
        reason: String,
    },

    /// Index already has the file
    #[error("File '{filename}' already exists on the package index")]
    FileAlreadyExists {
        /// Distribution file name
        filename: String,
    },

    /// File is not a recognised distribution
    #[error("Invalid distribution '{filename}': {reason}")]
    InvalidDistribution {
        /// Distribution file name
        filename: String,
        /// Reason for the error
        reason: String,
    },

    /// Remote API error
    #[error("{target} API returned {status}: {message}")]
    Api {
        /// Destination name
        target: String,
        /// HTTP status code
        status: u16,
        /// Response message
        message: String,
    },

    /// Network error during publishing
    #[error("Network error during publishing to {target}: {reason}")]
    NetworkError {
        /// Destination name
        target: String,
        /// Reason for the error
        reason: String,
    },
}

/// State management errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file corrupted
    #[error("Report file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },

    /// State file not found
    #[error("No run report found. Run the pipeline first.")]
    NotFound,

    /// State version mismatch
    #[error("Report format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Found version
        found: String,
    },

    /// Failed to save state
    #[error("Failed to save report: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Event(EventError::MissingTag) => vec![
                "Pass the release tag explicitly: --tag v1.2.3".to_string(),
                "Or point --event-path at the release event payload".to_string(),
            ],
            ReleaseError::Source(SourceError::PersistedCredentials { .. }) => vec![
                "Check out with 'persist-credentials: false'".to_string(),
                "Or accept the stored credentials with --allow-persisted-credentials".to_string(),
            ],
            ReleaseError::Build(BuildError::ProgramNotFound { program }) => vec![
                format!("Install '{}' or put it on PATH", program),
                "Override the command in release-pipeline.toml: [build] command = [...]".to_string(),
            ],
            ReleaseError::Artifact(ArtifactError::NoFilesFound { .. }) => vec![
                "Check that the build command writes into [build] output_dir".to_string(),
                "Run the build command locally and inspect its output".to_string(),
            ],
            ReleaseError::Artifact(ArtifactError::AlreadyExists { name }) => vec![
                format!("Use a fresh --work-dir or remove the stored bundle '{}'", name),
            ],
            ReleaseError::Publish(PublishError::AssetExists { tag, asset }) => vec![
                format!("Delete '{}' from release '{}' before re-uploading", asset, tag),
            ],
            ReleaseError::Publish(PublishError::MissingCredentials { .. }) => vec![
                "Set GH_TOKEN or GITHUB_TOKEN for the GitHub release upload".to_string(),
                "Grant the job 'id-token: write' for trusted publishing".to_string(),
            ],
            ReleaseError::Publish(PublishError::TrustedPublishing { .. }) => vec![
                "Verify the trusted publisher configured on the index matches this repository and workflow".to_string(),
            ],
            ReleaseError::Publish(PublishError::FileAlreadyExists { .. }) => vec![
                "Index files are immutable; bump the version and release again".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable by re-running the stage
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReleaseError::Config(_)
                | ReleaseError::Event(_)
                | ReleaseError::Artifact(ArtifactError::NoFilesFound { .. })
                | ReleaseError::Artifact(ArtifactError::IntegrityMismatch { .. })
                | ReleaseError::Publish(PublishError::AssetExists { .. })
                | ReleaseError::Publish(PublishError::FileAlreadyExists { .. })
                | ReleaseError::Publish(PublishError::InvalidDistribution { .. })
        )
    }
}
