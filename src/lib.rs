//! # Kodegen Release Pipeline
//!
//! Builds Python distributions once and publishes them to two destinations
//! in parallel: the GitHub release that triggered the run and a package
//! index using trusted publishing.
//!
//! ## Stages
//!
//! - **Build**: run the configured build command in the checkout
//! - **Hand-off**: store the output as a named, immutable bundle
//! - **Registry upload**: attach `*.tar.gz` and `*.whl` to the GitHub release
//! - **Index upload**: push every distribution to the package index
//!
//! The two upload stages run concurrently and independently. A run ends as
//! [`Outcome::Success`], [`Outcome::PartialFailure`] or [`Outcome::TotalFailure`].
//!
//! ## Usage
//!
//! ```bash
//! kodegen_release_pipeline run --tag v1.2.0
//! kodegen_release_pipeline run --event-path "$GITHUB_EVENT_PATH" --dry-run
//! kodegen_release_pipeline status
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod artifact;
pub mod build;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod github;
pub mod index;
pub mod pipeline;
pub mod source;
pub mod state;

// Re-export main types for public API
pub use artifact::{ArtifactStore, Bundle, BundleFile, BundleHandle, LocalArtifactStore};
pub use build::{BuildOutput, CommandBuilder, PackageBuilder};
pub use cli::Args;
pub use config::{EnvConfig, PipelineConfig};
pub use credentials::{IndexTokenProvider, Secret, TrustedPublisher};
pub use error::{ReleaseError, Result};
pub use event::ReleaseEvent;
pub use github::GitHubAssetPublisher;
pub use index::IndexPublisher;
pub use pipeline::{
    Outcome, PipelineReport, PublishReceipt, PublishedFile, Publisher, ReleasePipeline, StageKind,
    StageReport, StageStatus,
};
pub use state::ReportManager;
