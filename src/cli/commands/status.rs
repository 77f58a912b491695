//! Status command implementation.
//!
//! Displays the report of the last pipeline run.

use super::helpers::{print_stages, print_summary};
use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::{ReleaseError, Result};
use crate::state::{has_report, load_report};

/// Execute status command
pub(super) async fn execute_status(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let Command::Status { json } = &args.command else {
        unreachable!("execute_status called with non-Status command");
    };

    if !has_report(&config.work_dir) {
        if *json {
            println!("{{\"status\": \"no_report\"}}");
        } else {
            config.println("No run report found");
        }
        return Ok(());
    }

    let report = load_report(&config.work_dir)?;

    if *json {
        let json_output = serde_json::to_string_pretty(&report).map_err(ReleaseError::Json)?;
        println!("{}", json_output);
        return Ok(());
    }

    config.println(&format!("📊 Run {}", report.run_id));
    config.verbose_println(&format!("Started: {}", report.started_at));
    config.verbose_println(&format!("Finished: {}", report.finished_at));
    if report.dry_run {
        config.println("Dry run");
    }
    print_stages(config, &report.stages);
    print_summary(config, &report);

    Ok(())
}
