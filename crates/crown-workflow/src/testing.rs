//! Scripted collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crown_core::PullRequestInfo;
use serde_json::Value;

use crate::error::WorkflowError;
use crate::git::{DiffRequest, GitRemote, WorkspaceRepo};
use crate::hooks::{CrownFinalized, FinalizeHook};
use crate::judge::{Judge, RawVerdict};
use crate::pull_request::{PullRequestRequest, PullRequestService};

#[derive(Default)]
struct GitState {
    branches: HashMap<String, String>,
    fetched: HashSet<String>,
    pending_failures: HashMap<String, u32>,
    fetches: HashMap<String, u32>,
    diffs: HashMap<String, u32>,
}

/// Remote with a fixed set of branches, each mapped to its diff text.
#[derive(Default)]
pub struct FakeGit {
    state: Mutex<GitState>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_branch(&self, branch: &str, diff: &str) {
        let mut state = self.state.lock().unwrap();
        state.branches.insert(branch.to_string(), diff.to_string());
    }

    /// Simulate the branch disappearing from the remote.
    pub fn remove_branch(&self, branch: &str) {
        let mut state = self.state.lock().unwrap();
        state.branches.remove(branch);
        state.fetched.remove(branch);
    }

    /// Fail the next `count` fetches of `branch`.
    pub fn fail_fetches(&self, branch: &str, count: u32) {
        let mut state = self.state.lock().unwrap();
        state.pending_failures.insert(branch.to_string(), count);
    }

    pub fn fetch_count(&self, branch: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.fetches.get(branch).copied().unwrap_or_default()
    }

    pub fn diff_count(&self, branch: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.diffs.get(branch).copied().unwrap_or_default()
    }
}

fn git_error(command: &str, branch: &str) -> WorkflowError {
    WorkflowError::Git {
        command: format!("{command} {branch}"),
        stderr: "couldn't find remote ref".to_string(),
    }
}

#[async_trait]
impl GitRemote for FakeGit {
    async fn fetch_branch(&self, branch: &str) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().unwrap();
        *state.fetches.entry(branch.to_string()).or_default() += 1;

        if let Some(remaining) = state.pending_failures.get_mut(branch) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(git_error("fetch", branch));
            }
        }
        if !state.branches.contains_key(branch) {
            return Err(git_error("fetch", branch));
        }
        state.fetched.insert(branch.to_string());
        Ok(())
    }

    async fn resolve_ref(&self, branch: &str) -> Result<Option<String>, WorkflowError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .fetched
            .contains(branch)
            .then(|| format!("{:040x}", branch.len())))
    }

    async fn diff(&self, request: DiffRequest<'_>) -> Result<String, WorkflowError> {
        let mut state = self.state.lock().unwrap();
        *state.diffs.entry(request.branch.to_string()).or_default() += 1;
        state
            .branches
            .get(request.branch)
            .cloned()
            .ok_or_else(|| git_error("diff", request.branch))
    }
}

/// Agent workspaces whose pushes land in a [`FakeGit`].
pub struct FakeWorkspace {
    git: Arc<FakeGit>,
    checkouts: Mutex<HashMap<PathBuf, (String, String)>>,
    fail_pushes: AtomicBool,
}

impl FakeWorkspace {
    pub fn new(git: Arc<FakeGit>) -> Self {
        Self {
            git,
            checkouts: Mutex::new(HashMap::new()),
            fail_pushes: AtomicBool::new(false),
        }
    }

    /// Check out `branch` in `dir`; pushing it publishes `diff`.
    pub fn set_branch(&self, dir: impl AsRef<Path>, branch: &str, diff: &str) {
        self.checkouts.lock().unwrap().insert(
            dir.as_ref().to_path_buf(),
            (branch.to_string(), diff.to_string()),
        );
    }

    pub fn fail_pushes(&self) {
        self.fail_pushes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkspaceRepo for FakeWorkspace {
    async fn current_branch(&self, workdir: &Path) -> Result<String, WorkflowError> {
        self.checkouts
            .lock()
            .unwrap()
            .get(workdir)
            .map(|(branch, _)| branch.clone())
            .ok_or_else(|| git_error("rev-parse", &workdir.display().to_string()))
    }

    async fn commit_all(&self, _workdir: &Path, _message: &str) -> Result<bool, WorkflowError> {
        Ok(true)
    }

    async fn push_branch(&self, workdir: &Path, branch: &str) -> Result<(), WorkflowError> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(git_error("push", branch));
        }
        let diff = self
            .checkouts
            .lock()
            .unwrap()
            .get(workdir)
            .map(|(_, diff)| diff.clone())
            .unwrap_or_default();
        self.git.add_branch(branch, &diff);
        Ok(())
    }
}

/// Judge returning a canned verdict.
pub struct ScriptedJudge {
    verdict: Result<(Value, Option<String>), String>,
    summary: Result<String, String>,
    pending_failures: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    evaluations: AtomicUsize,
    summaries: AtomicUsize,
}

impl ScriptedJudge {
    pub fn winner(index: Value, reason: &str) -> Self {
        Self {
            verdict: Ok((index, Some(reason.to_string()))),
            summary: Ok("- summary".to_string()),
            pending_failures: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            evaluations: AtomicUsize::new(0),
            summaries: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            verdict: Err(message.to_string()),
            ..Self::winner(Value::Null, "")
        }
    }

    /// Fail the first `count` evaluations before answering.
    pub fn fail_first(self, count: usize) -> Self {
        self.pending_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_failing_summary(mut self) -> Self {
        self.summary = Err("summary unavailable".to_string());
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn summaries(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(&self, prompt: &str) -> Result<RawVerdict, WorkflowError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let pending = self.pending_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_failures.store(pending - 1, Ordering::SeqCst);
            return Err(WorkflowError::Judge("rate limited".to_string()));
        }
        let (winner_index, reason) = self.verdict.clone().map_err(WorkflowError::Judge)?;
        Ok(RawVerdict {
            raw_response: format!("{{\"winner\": {winner_index}}}"),
            winner_index,
            reason,
        })
    }

    async fn summarize(&self, _prompt: &str) -> Result<String, WorkflowError> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        self.summary.clone().map_err(WorkflowError::Judge)
    }
}

/// Pull request service that records requests.
#[derive(Default)]
pub struct RecordingPullRequests {
    pub fail: bool,
    pub requests: Mutex<Vec<PullRequestRequest>>,
}

#[async_trait]
impl PullRequestService for RecordingPullRequests {
    async fn open(&self, request: PullRequestRequest) -> Result<PullRequestInfo, WorkflowError> {
        if self.fail {
            return Err(WorkflowError::PullRequest("HTTP 502".to_string()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(PullRequestInfo {
            url: format!("https://github.com/{}/pull/{}", request.repository, requests.len()),
            number: requests.len() as u64,
            is_draft: request.draft,
        })
    }
}

/// Hook that counts invocations.
#[derive(Default)]
pub struct RecordingHook {
    pub fail: bool,
    pub calls: Mutex<Vec<CrownFinalized>>,
}

#[async_trait]
impl FinalizeHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_finalized(&self, event: &CrownFinalized) -> Result<(), WorkflowError> {
        self.calls.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(WorkflowError::Hook {
                name: "recording".to_string(),
                message: "boom".to_string(),
            });
        }
        Ok(())
    }
}
