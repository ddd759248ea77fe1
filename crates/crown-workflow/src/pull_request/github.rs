//! GitHub REST v3 pull request client.

use async_trait::async_trait;
use crown_core::PullRequestInfo;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PullRequestRequest, PullRequestService};
use crate::error::WorkflowError;

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GitHubPull {
    pub html_url: String,
    pub number: u64,
    #[serde(default)]
    pub draft: bool,
}

impl From<GitHubPull> for PullRequestInfo {
    fn from(pull: GitHubPull) -> Self {
        Self {
            url: pull.html_url,
            number: pull.number,
            is_draft: pull.draft,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
    draft: bool,
}

/// Opens pull requests through the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubPullRequests {
    inner: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubPullRequests {
    /// Create a client for api.github.com.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        }
    }

    /// Point at a different API root (GitHub Enterprise).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_url, path);
        debug!(method = %method, url = %url, "GitHub request");
        self.inner
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "crown-worker")
    }

    async fn existing(
        &self,
        request: &PullRequestRequest,
    ) -> Result<Option<GitHubPull>, WorkflowError> {
        let owner = request.repository.split('/').next().unwrap_or_default();
        let path = format!("/repos/{}/pulls", request.repository);
        let head = format!("{owner}:{}", request.head);
        let response = self
            .request(Method::GET, &path)
            .query(&[("state", "open"), ("head", head.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WorkflowError::PullRequest(format!(
                "listing pull requests failed: HTTP {}",
                response.status()
            )));
        }
        let pulls: Vec<GitHubPull> = response.json().await?;
        Ok(pulls.into_iter().next())
    }
}

#[async_trait]
impl PullRequestService for GitHubPullRequests {
    async fn open(&self, request: PullRequestRequest) -> Result<PullRequestInfo, WorkflowError> {
        if !request.repository.contains('/') {
            return Err(WorkflowError::PullRequest(format!(
                "repository must be owner/repo, got {:?}",
                request.repository
            )));
        }

        if let Some(pull) = self.existing(&request).await? {
            info!(number = pull.number, head = %request.head, "Reusing open pull request");
            return Ok(pull.into());
        }

        let path = format!("/repos/{}/pulls", request.repository);
        let response = self
            .request(Method::POST, &path)
            .json(&CreatePull {
                title: &request.title,
                head: &request.head,
                base: &request.base,
                body: &request.body,
                draft: request.draft,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::PullRequest(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let pull: GitHubPull = response.json().await?;
        info!(number = pull.number, url = %pull.html_url, "Pull request opened");
        Ok(pull.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeGitHub {
        pulls: Mutex<Vec<(String, u64)>>,
    }

    type Shared = Arc<FakeGitHub>;

    async fn list(
        State(gh): State<Shared>,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Vec<GitHubPull>> {
        let head = q.get("head").cloned().unwrap_or_default();
        let pulls = gh.pulls.lock().unwrap();
        Json(
            pulls
                .iter()
                .filter(|(h, _)| *h == head)
                .map(|(_, n)| GitHubPull {
                    html_url: format!("https://github.com/acme/api/pull/{n}"),
                    number: *n,
                    draft: false,
                })
                .collect(),
        )
    }

    async fn create(
        State(gh): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<GitHubPull> {
        let head = body["head"].as_str().unwrap_or_default().to_string();
        let draft = body["draft"].as_bool().unwrap_or_default();
        let mut pulls = gh.pulls.lock().unwrap();
        let number = pulls.len() as u64 + 1;
        pulls.push((format!("acme:{head}"), number));
        Json(GitHubPull {
            html_url: format!("https://github.com/acme/api/pull/{number}"),
            number,
            draft,
        })
    }

    async fn serve(gh: Shared) -> String {
        let app = Router::new()
            .route("/repos/:owner/:repo/pulls", get(list).post(create))
            .with_state(gh);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn request(head: &str) -> PullRequestRequest {
        PullRequestRequest {
            repository: "acme/api".to_string(),
            head: head.to_string(),
            base: "main".to_string(),
            title: "Add retries".to_string(),
            body: "body".to_string(),
            draft: true,
        }
    }

    #[tokio::test]
    async fn test_open_is_idempotent_per_head() {
        let gh = Shared::default();
        let client = GitHubPullRequests::new("token").with_api_url(&serve(gh.clone()).await);

        let first = client.open(request("codex/t1")).await.unwrap();
        let second = client.open(request("codex/t1")).await.unwrap();
        let other = client.open(request("amp/t1")).await.unwrap();

        assert_eq!(first.number, 1);
        assert!(first.is_draft);
        assert_eq!(second.number, 1);
        assert_eq!(other.number, 2);
        assert_eq!(gh.pulls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_repository() {
        let client = GitHubPullRequests::new("token").with_api_url("http://127.0.0.1:9");
        let mut bad = request("x");
        bad.repository = "acme".to_string();

        assert!(matches!(
            client.open(bad).await,
            Err(WorkflowError::PullRequest(_))
        ));
    }
}
