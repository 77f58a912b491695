#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use kodegen_release_pipeline::artifact::{ArtifactStore, Bundle, LocalArtifactStore};
    use kodegen_release_pipeline::build::{BuildOutput, PackageBuilder};
    use kodegen_release_pipeline::config::GitHubConfig;
    use kodegen_release_pipeline::credentials::{IndexTokenProvider, Secret};
    use kodegen_release_pipeline::error::{BuildError, PublishError, ReleaseError, Result};
    use kodegen_release_pipeline::event::ReleaseEvent;
    use kodegen_release_pipeline::github::GitHubAssetPublisher;
    use kodegen_release_pipeline::index::IndexPublisher;
    use kodegen_release_pipeline::pipeline::{
        Outcome, PublishReceipt, PublishedFile, Publisher, ReleasePipeline, StageKind, StageStatus,
    };
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Writes fixed files into `<checkout>/dist`
    struct FakeBuilder {
        files: Vec<(&'static str, &'static [u8])>,
        fail: bool,
    }

    impl FakeBuilder {
        fn producing(files: Vec<(&'static str, &'static [u8])>) -> Arc<Self> {
            Arc::new(Self { files, fail: false })
        }
    }

    #[async_trait]
    impl PackageBuilder for FakeBuilder {
        async fn build(&self, checkout: &Path) -> Result<BuildOutput> {
            if self.fail {
                return Err(BuildError::CommandFailed {
                    command: "pipx run build".to_string(),
                    status: "exit code 1".to_string(),
                    stderr: "ERROR Backend subprocess exited".to_string(),
                }
                .into());
            }
            let dir = checkout.join("dist");
            std::fs::create_dir_all(&dir)?;
            for (name, content) in &self.files {
                std::fs::write(dir.join(name), content)?;
            }
            Ok(BuildOutput {
                dir,
                files: self.files.iter().map(|(n, _)| n.to_string()).collect(),
            })
        }
    }

    #[derive(Debug, Clone)]
    struct Seen {
        tag: String,
        files: Vec<String>,
        digest: String,
    }

    /// Records what it was given; optionally fails or waits at a barrier
    struct RecordingPublisher {
        stage: StageKind,
        fail: bool,
        delay: Option<Duration>,
        barrier: Option<Arc<tokio::sync::Barrier>>,
        seen: Mutex<Vec<Seen>>,
    }

    impl RecordingPublisher {
        fn new(stage: StageKind) -> Self {
            Self {
                stage,
                fail: false,
                delay: None,
                barrier: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn meeting(mut self, barrier: Arc<tokio::sync::Barrier>) -> Self {
            self.barrier = Some(barrier);
            self
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn stage(&self) -> StageKind {
            self.stage
        }

        async fn publish(&self, bundle: &Bundle, event: &ReleaseEvent) -> Result<PublishReceipt> {
            self.seen.lock().expect("lock").push(Seen {
                tag: event.tag().to_string(),
                files: bundle
                    .files()
                    .iter()
                    .map(|f| f.file_name().to_string())
                    .collect(),
                digest: bundle.digest().to_string(),
            });

            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PublishError::ReleaseNotFound {
                    tag: event.tag().to_string(),
                }
                .into());
            }

            Ok(PublishReceipt {
                destination: format!("fake {:?}", self.stage),
                dry_run: false,
                show_hashes: false,
                files: bundle
                    .files()
                    .iter()
                    .map(|f| PublishedFile {
                        name: f.file_name().to_string(),
                        size: f.size,
                        sha256: f.sha256.clone(),
                        md5: None,
                        url: None,
                    })
                    .collect(),
            })
        }
    }

    struct Fixture {
        checkout: tempfile::TempDir,
        store_dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                checkout: tempfile::tempdir().expect("tempdir"),
                store_dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn pipeline(
            &self,
            builder: Arc<dyn PackageBuilder>,
            publishers: &[Arc<RecordingPublisher>],
        ) -> ReleasePipeline {
            publishers.iter().fold(
                ReleasePipeline::new(
                    builder,
                    Arc::new(LocalArtifactStore::new(self.store_dir.path())),
                    "distfiles",
                ),
                |pipeline, p| pipeline.with_publisher(p.clone()),
            )
        }
    }

    const TWO_FILES: &[(&str, &[u8])] = &[
        ("widgets-1.0.0-py3-none-any.whl", b"wheel bytes"),
        ("widgets-1.0.0.tar.gz", b"sdist bytes"),
    ];

    #[tokio::test]
    async fn test_two_files_reach_both_publishers() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload));
        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload));
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry.clone(), index.clone()],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.outcome, Outcome::Success);
        assert_eq!(report.stages.len(), 4);
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));

        let handle = report
            .stage(StageKind::HandOff)
            .and_then(|s| s.bundle.clone())
            .expect("bundle handle");
        assert_eq!(handle.file_count, 2);

        let expected = vec![
            "widgets-1.0.0-py3-none-any.whl".to_string(),
            "widgets-1.0.0.tar.gz".to_string(),
        ];
        for publisher in [&registry, &index] {
            let seen = publisher.seen();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].files, expected);
            assert_eq!(seen[0].digest, handle.digest);
        }
    }

    #[tokio::test]
    async fn test_zero_files_halts_pipeline() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload));
        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload));
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(Vec::new()),
            &[registry.clone(), index.clone()],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.outcome, Outcome::TotalFailure);
        let hand_off = report.stage(StageKind::HandOff).expect("hand-off stage");
        assert_eq!(hand_off.status, StageStatus::Failed);
        assert!(
            hand_off
                .message
                .as_deref()
                .is_some_and(|m| m.contains("No files were found with the provided path"))
        );

        for stage in [StageKind::RegistryUpload, StageKind::IndexUpload] {
            assert_eq!(
                report.stage(stage).map(|s| s.status),
                Some(StageStatus::Skipped)
            );
        }
        assert!(registry.seen().is_empty());
        assert!(index.seen().is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_is_partial() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload).failing());
        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload));
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry.clone(), index.clone()],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.outcome, Outcome::PartialFailure);
        assert_eq!(report.outcome.exit_code(), 2);
        assert_eq!(report.failed_stages(), vec![StageKind::RegistryUpload]);

        let index_stage = report.stage(StageKind::IndexUpload).expect("index stage");
        assert_eq!(index_stage.status, StageStatus::Succeeded);
        assert_eq!(index_stage.receipt.as_ref().map(|r| r.files.len()), Some(2));
    }

    #[tokio::test]
    async fn test_build_failure_skips_everything_after() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload));
        let pipeline = fixture.pipeline(
            Arc::new(FakeBuilder {
                files: Vec::new(),
                fail: true,
            }),
            &[registry.clone()],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.outcome, Outcome::TotalFailure);
        assert_eq!(
            report.stage(StageKind::Build).map(|s| s.status),
            Some(StageStatus::Failed)
        );
        assert_eq!(
            report.stage(StageKind::HandOff).map(|s| s.status),
            Some(StageStatus::Skipped)
        );
        assert!(registry.seen().is_empty());
    }

    #[tokio::test]
    async fn test_publishers_receive_event_tag() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload));
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry.clone()],
        );

        let event = ReleaseEvent::from_tag("release-2024.06").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.tag, "release-2024.06");
        assert_eq!(registry.seen()[0].tag, "release-2024.06");
    }

    #[tokio::test]
    async fn test_publishers_run_concurrently() {
        let fixture = Fixture::new();
        // Each publisher waits for the other; sequential execution never gets past the barrier
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let registry = Arc::new(
            RecordingPublisher::new(StageKind::RegistryUpload).meeting(barrier.clone()),
        );
        let index =
            Arc::new(RecordingPublisher::new(StageKind::IndexUpload).meeting(barrier.clone()));
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry, index],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run(&event, fixture.checkout.path()),
        )
        .await
        .expect("publishers did not run concurrently");

        assert_eq!(report.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn test_fast_failure_does_not_cancel_slow_publisher() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload).failing());
        let index = Arc::new(
            RecordingPublisher::new(StageKind::IndexUpload).delayed(Duration::from_millis(200)),
        );
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry, index],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(
            report.stage(StageKind::IndexUpload).map(|s| s.status),
            Some(StageStatus::Succeeded)
        );
        assert_eq!(report.outcome, Outcome::PartialFailure);
    }

    #[tokio::test]
    async fn test_both_publishers_failing_is_still_partial() {
        let fixture = Fixture::new();
        let registry = Arc::new(RecordingPublisher::new(StageKind::RegistryUpload).failing());
        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload).failing());
        let pipeline = fixture.pipeline(
            FakeBuilder::producing(TWO_FILES.to_vec()),
            &[registry, index],
        );

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let report = pipeline.run(&event, fixture.checkout.path()).await;

        assert_eq!(report.outcome, Outcome::PartialFailure);
        assert_eq!(report.failed_stages().len(), 2);
        assert!(report.stages.iter().filter(|s| s.stage.is_publish()).all(|s| s.recoverable));
    }

    #[tokio::test]
    async fn test_fan_out_without_handle_reads_existing_bundle() {
        let fixture = Fixture::new();
        let source = tempfile::tempdir().expect("tempdir");
        std::fs::write(source.path().join("widgets-1.0.0.tar.gz"), b"sdist").expect("write");

        LocalArtifactStore::new(fixture.store_dir.path())
            .put("distfiles", source.path())
            .await
            .expect("put");

        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload));
        let pipeline = fixture.pipeline(FakeBuilder::producing(Vec::new()), &[index.clone()]);

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let stages = pipeline.fan_out(None, &event).await;

        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].status, StageStatus::Succeeded);
        assert_eq!(index.seen()[0].files, vec!["widgets-1.0.0.tar.gz"]);
    }

    #[tokio::test]
    async fn test_fan_out_missing_bundle_fails_stage() {
        let fixture = Fixture::new();
        let index = Arc::new(RecordingPublisher::new(StageKind::IndexUpload));
        let pipeline = fixture.pipeline(FakeBuilder::producing(Vec::new()), &[index.clone()]);

        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let stages = pipeline.fan_out(None, &event).await;

        assert_eq!(stages[0].status, StageStatus::Failed);
        assert!(index.seen().is_empty());
    }

    const METADATA: &str = "Metadata-Version: 2.1\nName: widgets\nVersion: 1.0.0\n\nWidgets.\n";

    /// Token provider that must never be asked in dry-run mode
    struct NoTokens;

    #[async_trait]
    impl IndexTokenProvider for NoTokens {
        async fn upload_token(&self) -> Result<Secret> {
            Err(PublishError::MissingCredentials {
                target: "package index".to_string(),
                reason: "dry run asked for a token".to_string(),
            }
            .into())
        }
    }

    /// Stores a wheel, an sdist and `extras` as the `distfiles` bundle
    async fn distribution_bundle(fixture: &Fixture, extras: &[(&str, &[u8])]) -> Bundle {
        use std::io::Write;

        let dist = fixture.checkout.path().join("dist");
        std::fs::create_dir_all(&dist).expect("mkdir");

        let mut wheel = zip::ZipWriter::new(
            std::fs::File::create(dist.join("widgets-1.0.0-py3-none-any.whl")).expect("create"),
        );
        wheel
            .start_file(
                "widgets-1.0.0.dist-info/METADATA",
                zip::write::SimpleFileOptions::default(),
            )
            .expect("start");
        wheel.write_all(METADATA.as_bytes()).expect("write");
        wheel.finish().expect("finish");

        let mut sdist = tar::Builder::new(flate2::write::GzEncoder::new(
            std::fs::File::create(dist.join("widgets-1.0.0.tar.gz")).expect("create"),
            flate2::Compression::default(),
        ));
        let mut header = tar::Header::new_gnu();
        header.set_size(METADATA.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        sdist
            .append_data(&mut header, "widgets-1.0.0/PKG-INFO", METADATA.as_bytes())
            .expect("append");
        sdist.into_inner().expect("tar").finish().expect("gzip");

        for (name, content) in extras {
            std::fs::write(dist.join(name), content).expect("write");
        }

        let store = LocalArtifactStore::new(fixture.store_dir.path());
        store.put("distfiles", &dist).await.expect("put");
        store.get("distfiles").await.expect("get")
    }

    #[tokio::test]
    async fn test_index_dry_run_skips_token_exchange() {
        let fixture = Fixture::new();
        let bundle = distribution_bundle(&fixture, &[]).await;

        let publisher = IndexPublisher::new(
            reqwest::Client::new(),
            "https://upload.pypi.org/legacy/",
            Arc::new(NoTokens),
            true,
            true,
        );
        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let receipt = publisher.publish(&bundle, &event).await.expect("dry run");

        assert!(receipt.dry_run);
        assert!(receipt.show_hashes);
        let names: Vec<&str> = receipt.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["widgets-1.0.0-py3-none-any.whl", "widgets-1.0.0.tar.gz"]
        );
        assert!(receipt.files.iter().all(|f| f.md5.is_some()));
    }

    #[tokio::test]
    async fn test_index_rejects_non_distribution_in_bundle() {
        let fixture = Fixture::new();
        let bundle = distribution_bundle(&fixture, &[("SHA256SUMS.txt", b"sums")]).await;

        let publisher = IndexPublisher::new(
            reqwest::Client::new(),
            "https://upload.pypi.org/legacy/",
            Arc::new(NoTokens),
            false,
            true,
        );
        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let err = publisher.publish(&bundle, &event).await.unwrap_err();
        match err {
            ReleaseError::Publish(PublishError::InvalidDistribution { filename, .. }) => {
                assert_eq!(filename, "SHA256SUMS.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_index_live_run_requires_token() {
        let fixture = Fixture::new();
        let bundle = distribution_bundle(&fixture, &[]).await;

        let publisher = IndexPublisher::new(
            reqwest::Client::new(),
            "https://upload.pypi.org/legacy/",
            Arc::new(NoTokens),
            false,
            false,
        );
        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let err = publisher.publish(&bundle, &event).await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::Publish(PublishError::MissingCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn test_github_dry_run_selects_release_assets() {
        let fixture = Fixture::new();
        let bundle = distribution_bundle(&fixture, &[("SHA256SUMS.txt", b"sums")]).await;

        let publisher = GitHubAssetPublisher::new(
            reqwest::Client::new(),
            &GitHubConfig::default(),
            "acme/widgets",
            Secret::new(""),
            true,
        )
        .expect("publisher");
        let event = ReleaseEvent::from_tag("v1.0.0").expect("event");
        let receipt = publisher.publish(&bundle, &event).await.expect("dry run");

        assert!(receipt.dry_run);
        assert_eq!(receipt.destination, "acme/widgets release v1.0.0");
        let names: Vec<&str> = receipt.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["widgets-1.0.0-py3-none-any.whl", "widgets-1.0.0.tar.gz"]
        );
    }

    #[test]
    fn test_error_type_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReleaseError>();
    }
}
