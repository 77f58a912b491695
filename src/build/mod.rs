//! Build stage: run the packaging command and collect its output.

use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Number of stderr lines kept in a build failure
const STDERR_TAIL_LINES: usize = 20;

/// What a successful build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Output directory handed to the artifact store
    pub dir: PathBuf,
    /// File names found directly in the output directory
    pub files: Vec<String>,
}

/// Produces distributable files from a checkout
#[async_trait]
pub trait PackageBuilder: Send + Sync {
    /// Build inside `checkout` and report the output directory
    ///
    /// An empty output directory is not an error here; the hand-off rejects it.
    async fn build(&self, checkout: &Path) -> Result<BuildOutput>;
}

/// Builder that runs an external command
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
    clean: bool,
}

impl CommandBuilder {
    /// Create from the `[build]` section
    pub fn from_config(config: &BuildConfig) -> Self {
        let mut parts = config.command.iter().cloned();
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            output_dir: config.output_dir.clone(),
            clean: config.clean,
        }
    }

    /// Full command line for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl PackageBuilder for CommandBuilder {
    async fn build(&self, checkout: &Path) -> Result<BuildOutput> {
        let program = which::which_in(&self.program, std::env::var_os("PATH"), checkout)
            .map_err(|_| BuildError::ProgramNotFound {
                program: self.program.clone(),
            })?;

        let output_dir = checkout.join(&self.output_dir);
        if self.clean && output_dir.exists() {
            log::debug!("Removing stale output directory {}", output_dir.display());
            tokio::fs::remove_dir_all(&output_dir).await?;
        }

        let command_line = self.command_line();
        log::info!("Running build: {} (in {})", command_line, checkout.display());

        let output = tokio::process::Command::new(&program)
            .args(&self.args)
            .current_dir(checkout)
            .output()
            .await
            .map_err(|e| BuildError::SpawnFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log::debug!("[build] {}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::CommandFailed {
                command: command_line,
                status: describe_status(&output.status),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            }
            .into());
        }

        let files = list_files(&output_dir).await?;
        log::info!(
            "Build produced {} file(s) in {}",
            files.len(),
            output_dir.display()
        );

        Ok(BuildOutput {
            dir: output_dir,
            files,
        })
    }
}

fn describe_status(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}
