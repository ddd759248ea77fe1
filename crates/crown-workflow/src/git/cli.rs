//! `git` subprocess adapter.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{DiffRequest, GitRemote, WorkspaceRepo};
use crate::error::{with_timeout, WorkflowError};

const REMOTE: &str = "origin";
const TRUNCATED_MARKER: &str = "\n... [diff truncated]";

/// Runs git commands with a per-call timeout.
///
/// Remote operations run in `repo_dir`, a clone whose `origin` is the shared
/// remote. Workspace operations run in the directory they are given.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout,
        }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<Output, WorkflowError> {
        debug!(args = ?args, dir = %dir.display(), "Running git");
        let mut cmd = self.command(dir, args);
        with_timeout("git", self.timeout, async move {
            Ok::<_, WorkflowError>(cmd.output().await?)
        })
        .await
    }

    async fn run_checked(&self, dir: &Path, args: &[&str]) -> Result<Output, WorkflowError> {
        let output = self.run(dir, args).await?;
        if !output.status.success() {
            return Err(git_error(args, &output.stderr));
        }
        Ok(output)
    }

    async fn run_capture(&self, dir: &Path, args: &[&str]) -> Result<String, WorkflowError> {
        let output = self.run_checked(dir, args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run `git diff` reading at most `max_bytes` of its output.
    async fn capped_diff(
        &self,
        args: &[String],
        max_bytes: usize,
    ) -> Result<String, WorkflowError> {
        let mut child = self
            .command(&self.repo_dir, &args.iter().map(String::as_str).collect::<Vec<_>>())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkflowError::Git {
                command: "diff".to_string(),
                stderr: "stdout unavailable".to_string(),
            })?;
        let mut stderr = child.stderr.take();

        let mut buf = Vec::new();
        (&mut stdout)
            .take(max_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .await?;

        let truncated = buf.len() > max_bytes;
        if truncated {
            // Output beyond the cap is never read; stop the process instead
            // of waiting on a full pipe.
            let _ = child.kill().await;
        } else {
            let status = child.wait().await?;
            if !status.success() {
                let mut err = Vec::new();
                if let Some(stderr) = stderr.as_mut() {
                    let _ = stderr.read_to_end(&mut err).await;
                }
                return Err(git_error(&["diff"], &err));
            }
        }

        let mut text = String::from_utf8_lossy(&buf).into_owned();
        if truncated {
            truncate_at_char_boundary(&mut text, max_bytes);
            text.push_str(TRUNCATED_MARKER);
        }
        Ok(text)
    }
}

fn git_error(args: &[&str], stderr: &[u8]) -> WorkflowError {
    WorkflowError::Git {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

fn truncate_at_char_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/{REMOTE}/{branch}")
}

/// Pathspecs that exclude `pattern` anywhere in the tree, as a file or a
/// directory.
fn exclude_pathspecs(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|p| {
            [
                format!(":(glob,exclude)**/{p}"),
                format!(":(glob,exclude)**/{p}/**"),
            ]
        })
        .collect()
}

#[async_trait]
impl GitRemote for GitCli {
    #[instrument(skip(self))]
    async fn fetch_branch(&self, branch: &str) -> Result<(), WorkflowError> {
        let refspec = format!("+refs/heads/{branch}:{}", remote_ref(branch));
        self.run_checked(&self.repo_dir, &["fetch", "--no-tags", REMOTE, &refspec])
            .await?;
        Ok(())
    }

    async fn resolve_ref(&self, branch: &str) -> Result<Option<String>, WorkflowError> {
        let spec = format!("{}^{{commit}}", remote_ref(branch));
        let output = self
            .run(&self.repo_dir, &["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!sha.is_empty()).then_some(sha))
    }

    #[instrument(skip_all, fields(base = request.base, branch = request.branch))]
    async fn diff(&self, request: DiffRequest<'_>) -> Result<String, WorkflowError> {
        let mut args = vec![
            "diff".to_string(),
            "--no-color".to_string(),
            "--no-ext-diff".to_string(),
            format!("{}...{}", remote_ref(request.base), remote_ref(request.branch)),
            "--".to_string(),
            ".".to_string(),
        ];
        args.extend(exclude_pathspecs(request.excluded_paths));

        let max_bytes = request.max_bytes;
        with_timeout("git diff", self.timeout, self.capped_diff(&args, max_bytes)).await
    }
}

#[async_trait]
impl WorkspaceRepo for GitCli {
    async fn current_branch(&self, workdir: &Path) -> Result<String, WorkflowError> {
        let name = self
            .run_capture(workdir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        if name == "HEAD" {
            return Err(WorkflowError::Git {
                command: "rev-parse --abbrev-ref HEAD".to_string(),
                stderr: "detached HEAD".to_string(),
            });
        }
        Ok(name)
    }

    #[instrument(skip(self, message))]
    async fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool, WorkflowError> {
        self.run_checked(workdir, &["add", "-A"]).await?;
        let staged = self
            .run_capture(workdir, &["diff", "--cached", "--name-only"])
            .await?;
        if staged.is_empty() {
            debug!("No staged changes, skipping commit");
            return Ok(false);
        }
        self.run_checked(workdir, &["commit", "--no-verify", "-m", message])
            .await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn push_branch(&self, workdir: &Path, branch: &str) -> Result<(), WorkflowError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run_checked(workdir, &["push", REMOTE, &refspec]).await?;
        Ok(())
    }
}
