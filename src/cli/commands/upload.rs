//! Single-destination upload commands working from an existing bundle.

use super::helpers::{build_publishers, load_pipeline_config, open_store, print_stages};
use crate::build::CommandBuilder;
use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::EnvConfig;
use crate::error::Result;
use crate::event::ReleaseEvent;
use crate::pipeline::{ReleasePipeline, StageKind, StageStatus};
use std::sync::Arc;

/// Execute upload-github and upload-index
pub(super) async fn execute_upload(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let env = EnvConfig::from_process();
    let (stage, event, bundle, dry_run) = match &args.command {
        Command::UploadGithub {
            tag,
            bundle,
            dry_run,
        } => (
            StageKind::RegistryUpload,
            ReleaseEvent::from_tag(tag)?,
            bundle,
            *dry_run,
        ),
        Command::UploadIndex {
            tag,
            bundle,
            dry_run,
        } => (
            StageKind::IndexUpload,
            ReleaseEvent::resolve(tag.as_deref(), None, &env)?,
            bundle,
            *dry_run,
        ),
        _ => unreachable!("execute_upload called with non-upload command"),
    };

    let work_dir = config.work_dir.canonicalize()?;
    let mut pipeline_config = load_pipeline_config(config, &work_dir, &env)?;
    if let Some(bundle) = bundle {
        pipeline_config.artifacts.bundle_name = bundle.clone();
    }

    config.section(&format!("{} for {}", stage, event.tag()));
    let publishers = build_publishers(&pipeline_config, &env, dry_run, Some(stage))?;

    let pipeline = publishers.into_iter().fold(
        ReleasePipeline::new(
            Arc::new(CommandBuilder::from_config(&pipeline_config.build)),
            Arc::new(open_store(config, &pipeline_config)),
            pipeline_config.artifacts.bundle_name.clone(),
        )
        .dry_run(dry_run),
        ReleasePipeline::with_publisher,
    );

    let stages = pipeline.fan_out(None, &event).await;
    print_stages(config, &stages);

    let failed = stages.iter().any(|s| s.status != StageStatus::Succeeded);
    Ok(if failed { 1 } else { 0 })
}
