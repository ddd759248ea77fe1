//! Worker configuration.
//!
//! Command line flags (with environment fallbacks) layered over the
//! workflow's defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crown_workflow::{CrownConfig, RetryPolicy};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--min-runtime-secs ({min}) must not exceed --max-runtime-secs ({max})")]
    RuntimeBounds { min: u64, max: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Crown worker: detects agent completion and takes part in crown evaluation.
#[derive(Debug, Parser)]
#[command(name = "crown-worker", about = "Crown workflow worker", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: WorkerConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for the agent to finish, then report and evaluate
    Watch {
        /// Run ID
        #[arg(long)]
        run_id: String,

        /// Agent workspace
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Report that the agent exited, then evaluate
    Finish {
        /// Run ID
        #[arg(long)]
        run_id: String,

        /// Agent workspace
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Agent exit code
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        exit_code: i32,
    },

    /// Attempt evaluation of a task
    Evaluate {
        /// Task ID
        #[arg(long)]
        task_id: String,
    },
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct WorkerConfig {
    /// Task store base URL
    #[arg(long, env = "CROWN_STORE_URL")]
    pub store_url: String,

    /// Bearer token for the task store
    #[arg(long, env = "CROWN_STORE_TOKEN", hide_env_values = true)]
    pub store_token: Option<String>,

    /// Clone whose `origin` is the shared remote
    #[arg(long, env = "CROWN_REPO_DIR", default_value = ".")]
    pub repo_dir: PathBuf,

    /// Claude CLI used as the judge
    #[arg(long, env = "CROWN_CLAUDE_PATH", default_value = "claude")]
    pub claude_path: String,

    /// Judge model
    #[arg(long, env = "CROWN_JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// GitHub token; pull requests are only opened when set
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub API root
    #[arg(long, env = "GITHUB_API_URL")]
    pub github_api_url: Option<String>,

    /// Open pull requests as drafts
    #[arg(long)]
    pub draft_prs: bool,

    /// Skip the summary of the winning diff
    #[arg(long)]
    pub no_summary: bool,

    /// Shell command run after the crown is committed
    #[arg(long, env = "CROWN_ON_FINALIZE")]
    pub on_finalize: Option<String>,

    /// Seconds between completion polls
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Completion is never reported earlier than this
    #[arg(long, default_value_t = 30)]
    pub min_runtime_secs: u64,

    /// Agents still running after this long time out
    #[arg(long, default_value_t = 1200)]
    pub max_runtime_secs: u64,

    /// Checks for unfinished sibling runs before deferring
    #[arg(long, default_value_t = 6)]
    pub completeness_attempts: u32,

    /// Seconds between sibling checks
    #[arg(long, default_value_t = 10)]
    pub completeness_backoff_secs: u64,
}

impl WorkerConfig {
    /// Build the workflow configuration.
    pub fn crown_config(&self) -> Result<CrownConfig, ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Zero("--poll-interval-secs"));
        }
        if self.max_runtime_secs == 0 {
            return Err(ConfigError::Zero("--max-runtime-secs"));
        }
        if self.min_runtime_secs > self.max_runtime_secs {
            return Err(ConfigError::RuntimeBounds {
                min: self.min_runtime_secs,
                max: self.max_runtime_secs,
            });
        }

        let mut config = CrownConfig::default();
        config.detector.poll_interval = Duration::from_secs(self.poll_interval_secs);
        config.detector.min_runtime = Duration::from_secs(self.min_runtime_secs);
        config.detector.max_runtime = Duration::from_secs(self.max_runtime_secs);
        config.coordinator.completeness_retry = RetryPolicy::new(
            self.completeness_attempts,
            Duration::from_secs(self.completeness_backoff_secs),
        );
        config.coordinator.summarize = !self.no_summary;
        config.coordinator.draft_pull_requests = self.draft_prs;
        Ok(config)
    }
}
