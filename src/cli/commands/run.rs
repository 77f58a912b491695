//! Run command: the full pipeline for one release event.

use super::helpers::{
    build_publishers, load_pipeline_config, open_store, print_stages, print_summary,
    resolve_checkout,
};
use crate::build::CommandBuilder;
use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::EnvConfig;
use crate::error::Result;
use crate::event::ReleaseEvent;
use crate::pipeline::ReleasePipeline;
use std::sync::Arc;

/// Execute run command
pub(super) async fn execute_run(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let Command::Run {
        source,
        tag,
        event_path,
        dry_run,
        allow_persisted_credentials,
    } = &args.command
    else {
        unreachable!("execute_run called with non-Run command");
    };

    let env = EnvConfig::from_process();
    let event = ReleaseEvent::resolve(tag.as_deref(), event_path.as_deref(), &env)?;
    config.section(&format!("Release {}", event.tag()));
    if event.is_prerelease() {
        config.verbose_println("Release is marked as a pre-release");
    }

    let checkout = resolve_checkout(
        source.as_deref(),
        Some(event.tag()),
        *allow_persisted_credentials,
        config,
    )
    .await?;
    let pipeline_config = load_pipeline_config(config, &checkout.path, &env)?;
    let publishers = build_publishers(&pipeline_config, &env, *dry_run, None)?;

    let store = open_store(config, &pipeline_config);
    if store.discard(&pipeline_config.artifacts.bundle_name)? {
        config.verbose_println(&format!(
            "Discarded bundle '{}' from a previous run",
            pipeline_config.artifacts.bundle_name
        ));
    }

    let builder = CommandBuilder::from_config(&pipeline_config.build);
    config.println(&format!("🔨 Building with: {}", builder.command_line()));
    if *dry_run {
        config.warning_println("Dry run: nothing will be published");
    }

    let pipeline = publishers.into_iter().fold(
        ReleasePipeline::new(
            Arc::new(builder),
            Arc::new(store),
            pipeline_config.artifacts.bundle_name.clone(),
        )
        .dry_run(*dry_run),
        ReleasePipeline::with_publisher,
    );

    let report = pipeline.run(&event, &checkout.path).await;

    print_stages(config, &report.stages);
    print_summary(config, &report);

    match crate::state::save_report(&config.work_dir, &report) {
        Ok(saved) => config.verbose_println(&format!(
            "Report saved ({} bytes)",
            saved.file_size_bytes
        )),
        Err(e) => config.warning_println(&format!("Could not save run report: {}", e)),
    }

    Ok(report.outcome.exit_code())
}
