//! HTTP client for a managed task store backend.
//!
//! Endpoints (JSON bodies):
//!
//! | call | request |
//! |---|---|
//! | begin evaluation | `POST /api/tasks/{id}/evaluation/begin` → `{"granted": bool}` |
//! | release | `DELETE /api/tasks/{id}/evaluation/lock` |
//! | task | `GET /api/tasks/{id}` |
//! | runs | `GET /api/tasks/{id}/runs` |
//! | run | `GET /api/runs/{id}` |
//! | evaluation | `GET /api/tasks/{id}/crown` (404 when absent) |
//! | commit | `POST /api/tasks/{id}/crown` → 201 new, 409 existing |
//! | status | `PUT /api/tasks/{id}/evaluation-status` `{"status": ...}` |
//! | completion | `POST /api/runs/{id}/complete` |

use std::time::Duration;

use async_trait::async_trait;
use crown_core::{
    CoreError, CrownCommit, CrownEvaluation, EvaluationStatus, RunId, Task, TaskId, TaskRun,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CommitOutcome, RunCompletion, TaskStore};
use crate::error::WorkflowError;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LockResponse {
    pub granted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StatusBody {
    pub status: EvaluationStatus,
}

/// Task store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskStore {
    inner: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTaskStore {
    /// Create a new client for `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Give up on any request that takes longer than `timeout`, connecting
    /// and reading the body included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, WorkflowError> {
        self.inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Authenticate every request with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Task store request");
        let builder = self.inner.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, WorkflowError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WorkflowError::Store(format!("HTTP {status}: {}", body.trim())))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, WorkflowError> {
        Ok(self.send(self.request(Method::GET, path)).await?.json().await?)
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn begin_evaluation(&self, task_id: &TaskId) -> Result<bool, WorkflowError> {
        let path = format!("/api/tasks/{task_id}/evaluation/begin");
        let response: LockResponse = self
            .send(self.request(Method::POST, &path))
            .await?
            .json()
            .await?;
        Ok(response.granted)
    }

    async fn release_evaluation(&self, task_id: &TaskId) -> Result<(), WorkflowError> {
        let path = format!("/api/tasks/{task_id}/evaluation/lock");
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Task, WorkflowError> {
        let response = self
            .request(Method::GET, &format!("/api/tasks/{task_id}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CoreError::TaskNotFound(task_id.to_string()).into());
        }
        if !response.status().is_success() {
            return Err(WorkflowError::Store(format!("HTTP {}", response.status())));
        }
        Ok(response.json().await?)
    }

    async fn get_task_runs(&self, task_id: &TaskId) -> Result<Vec<TaskRun>, WorkflowError> {
        self.get_json(&format!("/api/tasks/{task_id}/runs")).await
    }

    async fn get_task_run(&self, run_id: &RunId) -> Result<TaskRun, WorkflowError> {
        self.get_json(&format!("/api/runs/{run_id}")).await
    }

    async fn get_crown_evaluation(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<CrownEvaluation>, WorkflowError> {
        let response = self
            .request(Method::GET, &format!("/api/tasks/{task_id}/crown"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WorkflowError::Store(format!("HTTP {}", response.status())));
        }
        Ok(Some(response.json().await?))
    }

    async fn commit_crown_evaluation(
        &self,
        commit: CrownCommit,
    ) -> Result<CommitOutcome, WorkflowError> {
        let path = format!("/api/tasks/{}/crown", commit.task_id);
        let response = self.request(Method::POST, &path).json(&commit).send().await?;
        match response.status() {
            StatusCode::CONFLICT => Ok(CommitOutcome::AlreadyEvaluated(response.json().await?)),
            status if status.is_success() => Ok(CommitOutcome::Committed(response.json().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(WorkflowError::Store(format!("HTTP {status}: {}", body.trim())))
            }
        }
    }

    async fn set_task_evaluation_status(
        &self,
        task_id: &TaskId,
        status: EvaluationStatus,
    ) -> Result<(), WorkflowError> {
        let path = format!("/api/tasks/{task_id}/evaluation-status");
        self.send(self.request(Method::PUT, &path).json(&StatusBody { status }))
            .await?;
        Ok(())
    }

    async fn report_run_completion(
        &self,
        completion: RunCompletion,
    ) -> Result<TaskRun, WorkflowError> {
        let path = format!("/api/runs/{}/complete", completion.run_id);
        Ok(self
            .send(self.request(Method::POST, &path).json(&completion))
            .await?
            .json()
            .await?)
    }
}
