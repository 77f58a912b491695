//! Command line argument parsing and validation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build Python distributions and publish them to a GitHub release and a package index
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_release_pipeline",
    version,
    about = "Build once, publish everywhere: release assets and package index uploads",
    long_about = "Run the release pipeline for a published GitHub release.

The build runs once; its output is stored as a named bundle and handed to
two independent publishers: the GitHub release asset upload and the package
index upload. A failure in one publisher never stops the other.

Usage:
  kodegen_release_pipeline run --tag v1.2.0
  kodegen_release_pipeline run --event-path $GITHUB_EVENT_PATH
  kodegen_release_pipeline run --source octo/widgets --tag v1.2.0 --dry-run
  kodegen_release_pipeline build
  kodegen_release_pipeline status"
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Work directory (default checkout, artifact store and run report)
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Pipeline configuration file (default: release-pipeline.toml in the checkout)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print detailed progress
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Pipeline commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build, hand off and publish to every enabled destination
    Run {
        /// Repository source: local path, GitHub URL, or owner/repo (default: work dir)
        #[arg(long, value_name = "SOURCE")]
        source: Option<String>,

        /// Release tag (overrides the event payload)
        #[arg(long, conflicts_with = "event_path")]
        tag: Option<String>,

        /// Path to a release event payload (default: GITHUB_EVENT_PATH)
        #[arg(long, value_name = "FILE")]
        event_path: Option<PathBuf>,

        /// Build for real but only report what would be published
        #[arg(long)]
        dry_run: bool,

        /// Build from a local checkout even if its git config stores credentials
        #[arg(long)]
        allow_persisted_credentials: bool,
    },

    /// Build and hand off only
    Build {
        /// Repository source: local path, GitHub URL, or owner/repo (default: work dir)
        #[arg(long, value_name = "SOURCE")]
        source: Option<String>,

        /// Tag to check out (required for remote sources)
        #[arg(long)]
        tag: Option<String>,

        /// Build from a local checkout even if its git config stores credentials
        #[arg(long)]
        allow_persisted_credentials: bool,
    },

    /// Attach an existing bundle to a GitHub release
    UploadGithub {
        /// Release tag
        #[arg(long)]
        tag: String,

        /// Bundle name (default from configuration)
        #[arg(long)]
        bundle: Option<String>,

        /// Only report what would be uploaded
        #[arg(long)]
        dry_run: bool,
    },

    /// Upload an existing bundle to the package index
    UploadIndex {
        /// Release tag (default: from the event payload)
        #[arg(long)]
        tag: Option<String>,

        /// Bundle name (default from configuration)
        #[arg(long)]
        bundle: Option<String>,

        /// Only report what would be uploaded
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the last run report
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run { .. } => "run",
            Command::Build { .. } => "build",
            Command::UploadGithub { .. } => "upload-github",
            Command::UploadIndex { .. } => "upload-index",
            Command::Status { .. } => "status",
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.work_dir.as_os_str().is_empty() {
            return Err("--work-dir must not be empty".to_string());
        }

        let (source, tag, bundle) = match &self.command {
            Command::Run { source, tag, .. } | Command::Build { source, tag, .. } => {
                (source.as_deref(), tag.as_deref(), None)
            }
            Command::UploadGithub { tag, bundle, .. } => {
                (None, Some(tag.as_str()), bundle.as_deref())
            }
            Command::UploadIndex { tag, bundle, .. } => (None, tag.as_deref(), bundle.as_deref()),
            Command::Status { .. } => (None, None, None),
        };

        if source.is_some_and(|s| s.trim().is_empty()) {
            return Err("--source must not be empty".to_string());
        }
        if tag.is_some_and(|t| t.trim().is_empty()) {
            return Err("--tag must not be empty".to_string());
        }
        if let Some(bundle) = bundle {
            crate::artifact::validate_bundle_name(bundle).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
    /// Work directory
    pub work_dir: PathBuf,
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
            work_dir: args.work_dir.clone(),
            config_path: args.config.clone(),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print verbose message
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }

    /// Check if verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}
