//! Workflow configuration.
//!
//! Every knob has a default matching production behaviour; the worker binary
//! overrides individual fields from its command line.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Completion detector timing.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Interval between artifact polls.
    pub poll_interval: Duration,

    /// Completion is never reported before this much time has elapsed.
    pub min_runtime: Duration,

    /// A timeout is reported once this much time has elapsed.
    pub max_runtime: Duration,

    /// Log-scraping strategies require this long without new records.
    pub quiet_period: Duration,

    /// Terminal output must be unchanged this long to count as idle.
    pub terminal_idle_threshold: Duration,

    /// Where Claude Code keeps its per-project session transcripts.
    pub claude_projects_dir: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            min_runtime: Duration::from_secs(30),
            max_runtime: Duration::from_secs(20 * 60),
            quiet_period: Duration::from_secs(10),
            terminal_idle_threshold: Duration::from_secs(15),
            claude_projects_dir: std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".claude").join("projects")),
        }
    }
}

/// Branch fetch retry budget.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Retry budget for a single branch.
    pub retry: RetryPolicy,

    /// Timeout for one `git fetch` / `git rev-parse`.
    pub git_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            git_timeout: Duration::from_secs(30),
        }
    }
}

/// Diff collection limits.
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Diff output beyond this many bytes is cut.
    pub max_bytes: usize,

    /// Pathspecs excluded from every diff (lockfiles, build output).
    pub excluded_paths: Vec<String>,

    /// Timeout for one diff invocation.
    pub timeout: Duration,
}

impl Default for DiffConfig {
    fn default() -> Self {
        let excluded = [
            "package-lock.json",
            "yarn.lock",
            "pnpm-lock.yaml",
            "bun.lockb",
            "bun.lock",
            "Cargo.lock",
            "poetry.lock",
            "uv.lock",
            "Gemfile.lock",
            "composer.lock",
            "go.sum",
            "node_modules",
            "dist",
            "build",
            "target",
            ".next",
            "coverage",
            "*.min.js",
            "*.map",
        ];
        Self {
            max_bytes: 256 * 1024,
            excluded_paths: excluded.iter().map(|p| p.to_string()).collect(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Evaluation coordinator budgets.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long to wait for sibling runs to finish before deferring.
    pub completeness_retry: RetryPolicy,

    /// Retry budget for calls the evaluation cannot continue without:
    /// loading the task and its evaluation, and asking the judge.
    pub essential_retry: RetryPolicy,

    /// Timeout for each task store call.
    pub store_timeout: Duration,

    /// Timeout for each judge call.
    pub judge_timeout: Duration,

    /// Timeout for pull request creation.
    pub pull_request_timeout: Duration,

    /// Timeout for each post-commit hook.
    pub hook_timeout: Duration,

    /// Characters of each candidate diff included in the judge prompt.
    pub prompt_diff_chars: usize,

    /// Whether to ask the judge for a summary of the winning diff.
    pub summarize: bool,

    /// Open pull requests as drafts.
    pub draft_pull_requests: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            completeness_retry: RetryPolicy::new(6, Duration::from_secs(10)),
            essential_retry: RetryPolicy::new(3, Duration::from_secs(2)),
            store_timeout: Duration::from_secs(15),
            judge_timeout: Duration::from_secs(180),
            pull_request_timeout: Duration::from_secs(60),
            hook_timeout: Duration::from_secs(30),
            prompt_diff_chars: 5000,
            summarize: true,
            draft_pull_requests: false,
        }
    }
}

/// Full workflow configuration.
#[derive(Debug, Clone, Default)]
pub struct CrownConfig {
    pub detector: DetectorConfig,
    pub probe: ProbeConfig,
    pub diff: DiffConfig,
    pub coordinator: CoordinatorConfig,
}
