//! Release pipeline: build, hand off, then fan out to the publishers.
//!
//! Stages form a strict chain up to the hand-off. After that every publisher
//! runs concurrently against the same stored bundle and none of them waits
//! for, or is cancelled by, another. There is no join stage: the run outcome
//! is derived from the individual stage results.

mod report;

pub use report::{
    Outcome, PipelineReport, PublishReceipt, PublishedFile, REPORT_FORMAT_VERSION, StageKind,
    StageReport, StageStatus, format_duration,
};

use crate::artifact::{ArtifactStore, Bundle, BundleHandle};
use crate::build::PackageBuilder;
use crate::error::{ArtifactError, Result};
use crate::event::ReleaseEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// A publish stage consuming the handed-off bundle
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stage this publisher reports as
    fn stage(&self) -> StageKind;

    /// Publish the bundle for the release named by `event`
    async fn publish(&self, bundle: &Bundle, event: &ReleaseEvent) -> Result<PublishReceipt>;
}

/// Runs the stage chain for one release event
pub struct ReleasePipeline {
    builder: Arc<dyn PackageBuilder>,
    store: Arc<dyn ArtifactStore>,
    bundle_name: String,
    publishers: Vec<Arc<dyn Publisher>>,
    dry_run: bool,
}

impl ReleasePipeline {
    /// Pipeline with no publishers yet
    pub fn new(
        builder: Arc<dyn PackageBuilder>,
        store: Arc<dyn ArtifactStore>,
        bundle_name: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            store,
            bundle_name: bundle_name.into(),
            publishers: Vec::new(),
            dry_run: false,
        }
    }

    /// Add a publish stage
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Record that publishers were built in dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Name the bundle is stored under
    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    /// Run every stage for `event` against the checkout at `checkout`
    pub async fn run(&self, event: &ReleaseEvent, checkout: &Path) -> PipelineReport {
        let started_at = Utc::now();
        log::info!("Starting release pipeline for {}", event.tag());

        let (mut stages, handle) = self.build_and_hand_off(checkout).await;

        match handle {
            Some(handle) => {
                stages.extend(self.fan_out(Some(&handle), event).await);
            }
            None => {
                for publisher in &self.publishers {
                    stages.push(StageReport::skipped(
                        publisher.stage(),
                        "no artifacts were handed off",
                    ));
                }
            }
        }

        let report = PipelineReport::new(event.tag(), self.dry_run, started_at, stages);
        log::info!("{}", report.summary());
        report
    }

    /// Build and store the output; the handle is `None` when either failed
    pub async fn build_and_hand_off(
        &self,
        checkout: &Path,
    ) -> (Vec<StageReport>, Option<BundleHandle>) {
        let mut stages = Vec::with_capacity(2);

        let started_at = Utc::now();
        let output = match self.builder.build(checkout).await {
            Ok(output) => {
                stages.push(StageReport::succeeded(StageKind::Build, started_at));
                output
            }
            Err(e) => {
                log::error!("Build failed: {}", e);
                stages.push(StageReport::failed(StageKind::Build, started_at, &e));
                stages.push(StageReport::skipped(StageKind::HandOff, "build failed"));
                return (stages, None);
            }
        };

        let started_at = Utc::now();
        match self.store.put(&self.bundle_name, &output.dir).await {
            Ok(handle) => {
                log::info!(
                    "Stored {} file(s) ({} bytes) as bundle '{}'",
                    handle.file_count,
                    handle.total_bytes,
                    handle.name
                );
                stages.push(
                    StageReport::succeeded(StageKind::HandOff, started_at)
                        .with_bundle(handle.clone()),
                );
                (stages, Some(handle))
            }
            Err(e) => {
                log::error!("Artifact hand-off failed: {}", e);
                stages.push(StageReport::failed(StageKind::HandOff, started_at, &e));
                (stages, None)
            }
        }
    }

    /// Run every publisher concurrently against the stored bundle
    ///
    /// With a handle, each publisher checks that the bundle it retrieved is
    /// the one that was handed off.
    pub async fn fan_out(
        &self,
        handle: Option<&BundleHandle>,
        event: &ReleaseEvent,
    ) -> Vec<StageReport> {
        let runs = self
            .publishers
            .iter()
            .map(|publisher| self.run_publisher(publisher.as_ref(), handle, event));
        futures::future::join_all(runs).await
    }

    async fn run_publisher(
        &self,
        publisher: &dyn Publisher,
        handle: Option<&BundleHandle>,
        event: &ReleaseEvent,
    ) -> StageReport {
        let stage = publisher.stage();
        let started_at = Utc::now();
        log::info!("{} started", stage);

        let result: Result<PublishReceipt> = async {
            let bundle = self.store.get(&self.bundle_name).await?;
            if let Some(handle) = handle
                && handle.digest != bundle.digest()
            {
                return Err(ArtifactError::IntegrityMismatch {
                    name: self.bundle_name.clone(),
                    file: "<bundle>".to_string(),
                    expected: handle.digest.clone(),
                    actual: bundle.digest().to_string(),
                }
                .into());
            }
            publisher.publish(&bundle, event).await
        }
        .await;

        match result {
            Ok(receipt) => {
                log::info!(
                    "{} succeeded: {} file(s) to {}",
                    stage,
                    receipt.files.len(),
                    receipt.destination
                );
                StageReport::succeeded(stage, started_at).with_receipt(receipt)
            }
            Err(e) => {
                log::error!("{} failed: {}", stage, e);
                StageReport::failed(stage, started_at, &e)
            }
        }
    }
}
