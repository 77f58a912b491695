//! Build command: build and hand off without publishing.

use super::helpers::{load_pipeline_config, open_store, print_stages, resolve_checkout};
use crate::build::CommandBuilder;
use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::EnvConfig;
use crate::error::Result;
use crate::pipeline::ReleasePipeline;
use std::sync::Arc;

/// Execute build command
pub(super) async fn execute_build(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let Command::Build {
        source,
        tag,
        allow_persisted_credentials,
    } = &args.command
    else {
        unreachable!("execute_build called with non-Build command");
    };

    let env = EnvConfig::from_process();
    let checkout = resolve_checkout(
        source.as_deref(),
        tag.as_deref(),
        *allow_persisted_credentials,
        config,
    )
    .await?;
    let pipeline_config = load_pipeline_config(config, &checkout.path, &env)?;

    let store = open_store(config, &pipeline_config);
    store.discard(&pipeline_config.artifacts.bundle_name)?;

    let builder = CommandBuilder::from_config(&pipeline_config.build);
    config.println(&format!("🔨 Building with: {}", builder.command_line()));

    let pipeline = ReleasePipeline::new(
        Arc::new(builder),
        Arc::new(store),
        pipeline_config.artifacts.bundle_name.clone(),
    );
    let (stages, handle) = pipeline.build_and_hand_off(&checkout.path).await;
    print_stages(config, &stages);

    match handle {
        Some(handle) => {
            config.success_println(&format!(
                "Bundle '{}' ready ({} file(s))",
                handle.name, handle.file_count
            ));
            Ok(0)
        }
        None => Ok(1),
    }
}
