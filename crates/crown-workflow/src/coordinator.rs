//! Evaluation coordinator.
//!
//! Every worker runs one of these after its own agent finishes. The store's
//! evaluation lock lets exactly one of them proceed; that one waits for the
//! sibling runs, asks the judge and commits the crown.
//!
//! ```text
//! NotStarted ─lock─▶ Locked ─all terminal─▶ AwaitingCompleteness ─▶ Judging ─commit─▶ Finalized
//!      │                 │                          │                   │
//!      └─ lock held      └─ budget exhausted        └─ already done     └─ judge/integrity fault
//! ```

use std::sync::Arc;
use std::time::Duration;

use crown_core::{
    CrownCommit, CrownEvaluation, EvaluationAudit, EvaluationStatus, PullRequestInfo, RunId,
    Task, TaskId, TaskRun,
};
use tracing::{debug, error, info, instrument, warn};

use crate::candidates::{Candidate, CandidateAggregator};
use crate::config::{CoordinatorConfig, CrownConfig};
use crate::error::{with_timeout, WorkflowError};
use crate::git::{BranchProber, DiffCache, DiffCollector, GitRemote, NO_CHANGES};
use crate::hooks::{CrownFinalized, FinalizeHook};
use crate::judge::{evaluation_prompt, summary_prompt, validate_winner, Judge};
use crate::pull_request::{
    pull_request_body, pull_request_title, PullRequestRequest, PullRequestService,
};
use crate::store::{CommitOutcome, TaskStore};

/// Rationale recorded when only one run completed.
pub const ONLY_CANDIDATE_REASON: &str = "Only candidate run";

/// Why an evaluation stopped early without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds the evaluation lock.
    LockHeld,
    /// A crown evaluation already exists.
    AlreadyEvaluated,
}

/// Result of one evaluation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// This attempt committed the crown.
    Finalized(CrownEvaluation),
    /// Nothing to do.
    Skipped(SkipReason),
    /// Sibling runs were still active after the wait budget; a later trigger
    /// retries.
    Deferred,
    /// The attempt failed; the message was recorded on the task.
    Failed(String),
}

impl EvaluationOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }
}

/// Everything an evaluation needs, owned explicitly instead of living in
/// process-wide statics. Reuse one context across attempts to keep the diff
/// cache warm.
pub struct EvaluationContext {
    pub store: Arc<dyn TaskStore>,
    pub aggregator: CandidateAggregator,
    pub judge: Arc<dyn Judge>,
    pub pull_requests: Option<Arc<dyn PullRequestService>>,
    pub hooks: Vec<Arc<dyn FinalizeHook>>,
    pub config: CoordinatorConfig,
}

impl EvaluationContext {
    /// Build a context with a fresh diff cache.
    pub fn new(
        store: Arc<dyn TaskStore>,
        git: Arc<dyn GitRemote>,
        judge: Arc<dyn Judge>,
        config: &CrownConfig,
    ) -> Self {
        let prober = BranchProber::new(git.clone(), config.probe.clone());
        let collector = DiffCollector::new(git, Arc::new(DiffCache::new()), config.diff.clone());
        Self {
            store,
            aggregator: CandidateAggregator::new(prober, collector),
            judge,
            pull_requests: None,
            hooks: Vec::new(),
            config: config.coordinator.clone(),
        }
    }

    /// Open pull requests for crowned runs of `auto_pr` tasks.
    pub fn with_pull_requests(mut self, service: Arc<dyn PullRequestService>) -> Self {
        self.pull_requests = Some(service);
        self
    }

    /// Run `hook` after every successful commit.
    pub fn with_hook(mut self, hook: Arc<dyn FinalizeHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// The winner chosen for a task, before it is committed.
struct Selection {
    winner: TaskRun,
    reason: String,
    candidate_run_ids: Vec<RunId>,
    audit: EvaluationAudit,
    summary: Option<String>,
}

/// Drives one task from "runs finished" to a committed crown.
#[derive(Clone)]
pub struct EvaluationCoordinator {
    ctx: Arc<EvaluationContext>,
}

impl EvaluationCoordinator {
    pub fn new(ctx: Arc<EvaluationContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    /// Try to evaluate `task_id`. Never fails; every problem ends up in the
    /// returned outcome.
    ///
    /// A deferred attempt checks the runs once more after giving the lock
    /// back. A sibling that finished while the lock was still held was
    /// turned away, so this worker retries on its behalf.
    #[instrument(skip_all, fields(task_id = %task_id))]
    pub async fn evaluate(&self, task_id: &TaskId) -> EvaluationOutcome {
        let outcome = self.attempt(task_id).await;
        if outcome != EvaluationOutcome::Deferred || !self.all_runs_terminal(task_id).await {
            return outcome;
        }
        info!("Sibling runs finished during deferral, retrying evaluation");
        self.attempt(task_id).await
    }

    async fn attempt(&self, task_id: &TaskId) -> EvaluationOutcome {
        let config = &self.ctx.config;

        let granted = with_timeout(
            "begin evaluation",
            config.store_timeout,
            self.ctx.store.begin_evaluation(task_id),
        )
        .await;
        match granted {
            Ok(true) => info!("Evaluation lock acquired"),
            Ok(false) => {
                debug!("Evaluation lock held by another worker");
                return EvaluationOutcome::Skipped(SkipReason::LockHeld);
            }
            Err(e) => {
                // Without the lock this worker must not write to the task.
                warn!(error = %e, "Could not request evaluation lock");
                return EvaluationOutcome::Failed(e.to_string());
            }
        }

        self.set_status(task_id, EvaluationStatus::InProgress).await;

        match self.run_locked(task_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                if e.is_integrity_fault() {
                    error!(error = %message, "Evaluation aborted on integrity fault");
                } else {
                    warn!(error = %message, "Evaluation failed");
                }
                self.set_status(task_id, EvaluationStatus::Failed(message.clone()))
                    .await;
                EvaluationOutcome::Failed(message)
            }
        }
    }

    async fn run_locked(&self, task_id: &TaskId) -> Result<EvaluationOutcome, WorkflowError> {
        let Some(runs) = self.await_completeness(task_id).await else {
            info!("Sibling runs still active, deferring evaluation");
            self.set_status(task_id, EvaluationStatus::NotStarted).await;
            let released = self
                .store_call("release lock", self.ctx.store.release_evaluation(task_id))
                .await;
            if let Err(e) = released {
                warn!(error = %e, "Could not release evaluation lock");
            }
            return Ok(EvaluationOutcome::Deferred);
        };

        let timeout = self.ctx.config.store_timeout;
        let existing = self
            .essential_call("get evaluation", timeout, || {
                self.ctx.store.get_crown_evaluation(task_id)
            })
            .await?;
        if existing.is_some() {
            info!("Task already evaluated");
            self.set_status(task_id, EvaluationStatus::NotStarted).await;
            return Ok(EvaluationOutcome::Skipped(SkipReason::AlreadyEvaluated));
        }

        let task = self
            .essential_call("get task", timeout, || self.ctx.store.get_task(task_id))
            .await?;
        let completed: Vec<TaskRun> = runs.into_iter().filter(TaskRun::is_completed).collect();

        let selection = match completed.len() {
            0 => return Err(WorkflowError::NoCompletedRuns),
            1 => {
                let winner = completed.into_iter().next().ok_or(WorkflowError::NoCompletedRuns)?;
                info!(winner_run_id = %winner.id, "Single completed run, crowning without judge");
                Selection {
                    candidate_run_ids: vec![winner.id.clone()],
                    winner,
                    reason: ONLY_CANDIDATE_REASON.to_string(),
                    audit: EvaluationAudit::default(),
                    summary: None,
                }
            }
            _ => self.judge(&task, completed).await?,
        };

        let pull_request = self.open_pull_request(&task, &selection).await;
        self.commit(&task, selection, pull_request).await
    }

    /// Poll until every run of the task is terminal. `None` if the budget ran
    /// out first.
    async fn await_completeness(&self, task_id: &TaskId) -> Option<Vec<TaskRun>> {
        let policy = self.ctx.config.completeness_retry;
        policy
            .run(|attempt| async move {
                let runs = self
                    .store_call("get runs", self.ctx.store.get_task_runs(task_id))
                    .await;
                let runs = match runs {
                    Ok(runs) => runs,
                    Err(e) => {
                        warn!(attempt, error = %e, "Could not load runs");
                        return None;
                    }
                };
                let active = runs.iter().filter(|r| r.status.is_active()).count();
                if active == 0 {
                    info!(run_count = runs.len(), "All runs terminal");
                    Some(runs)
                } else {
                    debug!(attempt, active, total = runs.len(), "Waiting for sibling runs");
                    None
                }
            })
            .await
    }

    async fn all_runs_terminal(&self, task_id: &TaskId) -> bool {
        match self
            .store_call("get runs", self.ctx.store.get_task_runs(task_id))
            .await
        {
            Ok(runs) => runs.iter().all(|r| !r.status.is_active()),
            Err(e) => {
                warn!(error = %e, "Could not recheck runs after deferral");
                false
            }
        }
    }

    async fn judge(
        &self,
        task: &Task,
        completed: Vec<TaskRun>,
    ) -> Result<Selection, WorkflowError> {
        let config = &self.ctx.config;
        let candidates = self.ctx.aggregator.build(task, &completed).await?;

        let prompt = evaluation_prompt(&task.description, &candidates, config.prompt_diff_chars);
        let verdict = self
            .essential_call("judge evaluation", config.judge_timeout, || {
                self.ctx.judge.evaluate(&prompt)
            })
            .await?;

        let index = validate_winner(&verdict.winner_index, candidates.len())?;
        let chosen: &Candidate = &candidates[index];
        let winner = completed
            .into_iter()
            .nth(index)
            .ok_or_else(|| WorkflowError::InvalidWinner {
                value: index.to_string(),
                count: candidates.len(),
            })?;

        let reason = verdict
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("Selected {}", winner.agent_name));
        info!(winner_run_id = %winner.id, index, reason = %reason, "Judge picked winner");

        let summary = self.summarize(task, chosen).await;
        Ok(Selection {
            candidate_run_ids: candidates.iter().map(|c| c.run_id.clone()).collect(),
            winner,
            reason,
            audit: EvaluationAudit {
                prompt,
                response: verdict.raw_response,
            },
            summary,
        })
    }

    async fn summarize(&self, task: &Task, winner: &Candidate) -> Option<String> {
        let config = &self.ctx.config;
        if !config.summarize || winner.diff == NO_CHANGES {
            return None;
        }
        let prompt = summary_prompt(&task.description, &winner.diff, config.prompt_diff_chars);
        let summary = with_timeout(
            "judge summary",
            config.judge_timeout,
            self.ctx.judge.summarize(&prompt),
        )
        .await;
        match summary {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "Summary failed, finalizing without it");
                None
            }
        }
    }

    async fn open_pull_request(
        &self,
        task: &Task,
        selection: &Selection,
    ) -> Option<PullRequestInfo> {
        if !task.auto_pr {
            return None;
        }
        let service = self.ctx.pull_requests.as_ref()?;
        let (Some(repository), Some(head)) = (
            task.project_full_name.clone(),
            selection.winner.branch_name.clone(),
        ) else {
            warn!("Pull request requested but repository or branch unknown");
            return None;
        };

        let request = PullRequestRequest {
            repository,
            head,
            base: task.base_branch.clone(),
            title: pull_request_title(&task.description),
            body: pull_request_body(
                &task.description,
                &selection.winner.agent_name,
                &selection.reason,
                selection.summary.as_deref(),
            ),
            draft: self.ctx.config.draft_pull_requests,
        };
        match with_timeout(
            "pull request",
            self.ctx.config.pull_request_timeout,
            service.open(request),
        )
        .await
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "Pull request failed, finalizing without it");
                None
            }
        }
    }

    async fn commit(
        &self,
        task: &Task,
        selection: Selection,
        pull_request: Option<PullRequestInfo>,
    ) -> Result<EvaluationOutcome, WorkflowError> {
        let winner_agent = selection.winner.agent_name.clone();
        let winner_branch = selection.winner.branch_name.clone();
        let commit = CrownCommit {
            task_id: task.id.clone(),
            winner_run_id: selection.winner.id,
            reason: selection.reason,
            candidate_run_ids: selection.candidate_run_ids,
            audit: selection.audit,
            summary: selection.summary,
            pull_request,
        };
        commit.validate()?;

        let outcome = self
            .store_call("commit evaluation", self.ctx.store.commit_crown_evaluation(commit))
            .await?;
        let evaluation = match outcome {
            CommitOutcome::Committed(evaluation) => evaluation,
            CommitOutcome::AlreadyEvaluated(existing) => {
                info!(winner_run_id = %existing.winner_run_id, "Another worker committed first");
                self.set_status(&task.id, EvaluationStatus::NotStarted).await;
                return Ok(EvaluationOutcome::Skipped(SkipReason::AlreadyEvaluated));
            }
        };
        info!(winner_run_id = %evaluation.winner_run_id, "Crown committed");

        self.run_hooks(CrownFinalized {
            task_id: task.id.clone(),
            evaluation: evaluation.clone(),
            winner_agent,
            winner_branch,
        })
        .await;
        Ok(EvaluationOutcome::Finalized(evaluation))
    }

    async fn run_hooks(&self, event: CrownFinalized) {
        for hook in &self.ctx.hooks {
            let result = with_timeout(
                "finalize hook",
                self.ctx.config.hook_timeout,
                hook.on_finalized(&event),
            )
            .await;
            if let Err(e) = result {
                warn!(hook = hook.name(), error = %e, "Finalize hook failed");
            }
        }
    }

    /// Call `call` under `timeout`, retrying transient failures within the
    /// essential retry budget. Integrity faults are returned at once.
    async fn essential_call<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        mut call: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, WorkflowError>>,
    {
        self.ctx
            .config
            .essential_retry
            .retry(
                |attempt| {
                    debug!(operation, attempt, "Essential call");
                    with_timeout(operation, timeout, call())
                },
                |e: &WorkflowError| !e.is_integrity_fault(),
            )
            .await
    }

    async fn store_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, WorkflowError>
    where
        F: std::future::Future<Output = Result<T, WorkflowError>>,
    {
        with_timeout(operation, self.ctx.config.store_timeout, call).await
    }

    /// Best-effort progress marker update.
    async fn set_status(&self, task_id: &TaskId, status: EvaluationStatus) {
        let result = self
            .store_call(
                "set evaluation status",
                self.ctx.store.set_task_evaluation_status(task_id, status),
            )
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Could not update evaluation status");
        }
    }
}
