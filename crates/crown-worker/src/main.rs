//! Crown worker binary.
//!
//! Runs next to one agent. Detects when the agent is done, pushes its work,
//! reports the run and attempts crown evaluation of the task.

mod config;

use std::sync::Arc;

use clap::Parser;
use crown_core::{RunId, TaskId};
use crown_workflow::{
    with_timeout, ClaudeCliJudge, CommandHook, CompletionDetector, CrownConfig, CrownWorker,
    EvaluationContext, EvaluationCoordinator, EvaluationOutcome, GitCli, GitHubPullRequests,
    HttpTaskStore, TaskStore, WorkflowError,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crown_worker=info,crown_workflow=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let crown_config = cli.config.crown_config()?;
    let worker = build_worker(&cli.config, &crown_config)?;

    let outcome = match cli.command {
        Command::Watch { run_id, workdir } => {
            let run_id = RunId::new(run_id);
            let run = with_timeout(
                "get run",
                crown_config.coordinator.store_timeout,
                worker.store().get_task_run(&run_id),
            )
            .await?;
            info!(run_id = %run.id, agent = %run.agent_name, "Watching agent");
            worker.watch(&run, &workdir).await
        }
        Command::Finish {
            run_id,
            workdir,
            exit_code,
        } => {
            worker
                .on_agent_finished(&RunId::new(run_id), &workdir, exit_code)
                .await
        }
        Command::Evaluate { task_id } => worker.coordinator().evaluate(&TaskId::new(task_id)).await,
    };

    report(outcome)
}

fn build_worker(
    config: &WorkerConfig,
    crown_config: &CrownConfig,
) -> Result<CrownWorker, WorkflowError> {
    let mut store = HttpTaskStore::new(&config.store_url)
        .with_request_timeout(crown_config.coordinator.store_timeout)?;
    if let Some(token) = &config.store_token {
        store = store.with_token(token.clone());
    }
    let store: Arc<dyn TaskStore> = Arc::new(store);

    let git = Arc::new(GitCli::new(
        config.repo_dir.clone(),
        crown_config.probe.git_timeout,
    ));

    let mut judge = ClaudeCliJudge::new(config.claude_path.clone());
    if let Some(model) = &config.judge_model {
        judge = judge.with_model(model.clone());
    }

    let mut ctx = EvaluationContext::new(store.clone(), git.clone(), Arc::new(judge), crown_config);
    if let Some(token) = &config.github_token {
        let mut github = GitHubPullRequests::new(token.clone());
        if let Some(api_url) = &config.github_api_url {
            github = github.with_api_url(api_url);
        }
        ctx = ctx.with_pull_requests(Arc::new(github));
    }
    if let Some(script) = &config.on_finalize {
        ctx = ctx.with_hook(Arc::new(
            CommandHook::shell(script.clone()).with_current_dir(config.repo_dir.clone()),
        ));
    }

    Ok(CrownWorker::new(
        store,
        git,
        EvaluationCoordinator::new(Arc::new(ctx)),
        CompletionDetector::new(crown_config.detector.clone()),
    ))
}

/// Print the outcome. Only a failed evaluation is an error; deferred and
/// skipped attempts are normal for all but one worker per task.
fn report(outcome: EvaluationOutcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        EvaluationOutcome::Finalized(evaluation) => {
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
            Ok(())
        }
        EvaluationOutcome::Skipped(reason) => {
            println!("Evaluation skipped: {reason:?}");
            Ok(())
        }
        EvaluationOutcome::Deferred => {
            println!("Evaluation deferred: other runs are still in progress");
            Ok(())
        }
        EvaluationOutcome::Failed(message) => {
            error!(error = %message, "Crown evaluation failed");
            Err(message.into())
        }
    }
}
