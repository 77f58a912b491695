//! Command execution functions.
//!
//! Every command returns a process exit code; errors are printed here with
//! their recovery suggestions.

mod build;
mod helpers;
mod run;
mod status;
mod upload;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::Result;

use build::execute_build;
use run::execute_run;
use status::execute_status;
use upload::execute_upload;

/// Exit code when the run is interrupted
pub const EXIT_INTERRUPTED: i32 = 130;

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        // Validation errors are never quiet
        let output = super::OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(1);
    }

    let config = RuntimeConfig::from(&args);

    // Dropping the command future removes any temporary clone
    let result = tokio::select! {
        result = dispatch(&args, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            config.error_println("Interrupted");
            return Ok(EXIT_INTERRUPTED);
        }
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            config.error_println(&format!("Command '{}' failed: {}", args.command.name(), e));
            helpers::print_suggestions(&config, &e);
            Ok(1)
        }
    }
}

async fn dispatch(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    match &args.command {
        Command::Run { .. } => execute_run(args, config).await,
        Command::Build { .. } => execute_build(args, config).await,
        Command::UploadGithub { .. } | Command::UploadIndex { .. } => {
            execute_upload(args, config).await
        }
        Command::Status { .. } => {
            execute_status(args, config).await?;
            Ok(0)
        }
    }
}
