use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::types::{FailedRun, FileContent, LogRetrievalStrategy, PushResult, WorkflowLogs};
use crate::{CodeHost, CodeHostError};

/// `CodeHost` implementation backed by the GitHub REST API.
pub struct GitHubCodeHost {
    client: reqwest::Client,
    api_base: String,
}

impl Default for GitHubCodeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubCodeHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: "https://api.github.com".to_string(),
        }
    }

    /// Override the API base URL (used by tests against `wiremock`).
    #[must_use]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    fn owner_repo(repo_url: &str) -> Option<(String, String)> {
        let trimmed = repo_url.trim_end_matches('/').trim_end_matches(".git");
        let mut parts = trimmed.rsplit('/');
        let repo = parts.next()?.to_string();
        let owner = parts.next()?.to_string();
        Some((owner, repo))
    }

    fn auth_request(
        &self,
        method: reqwest::Method,
        url: &str,
        token: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", "repair-agent")
            .header("Accept", "application/vnd.github+json")
    }
}

#[derive(Debug, Deserialize)]
struct GhRun {
    id: u64,
    name: String,
    head_sha: String,
    html_url: String,
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRunList {
    workflow_runs: Vec<GhRun>,
}

#[derive(Debug, Deserialize)]
struct GhContent {
    content: String,
    encoding: String,
}

#[async_trait]
impl CodeHost for GitHubCodeHost {
    async fn get_pr_failed_runs(
        &self,
        owner: &str,
        repo: &str,
        pr: u64,
        exclude_patterns: &[String],
    ) -> Result<Vec<FailedRun>, CodeHostError> {
        let url = format!("{}/repos/{owner}/{repo}/actions/runs", self.api_base);
        debug!(owner, repo, pr, "fetching workflow runs for PR");

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "repair-agent")
            .send()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CodeHostError::Unauthorized);
        }

        let list: GhRunList = resp
            .json()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        let failed: Vec<FailedRun> = list
            .workflow_runs
            .into_iter()
            .filter(|r| r.conclusion.as_deref() == Some("failure"))
            .filter(|r| !exclude_patterns.iter().any(|p| r.name.contains(p.as_str())))
            .map(|r| FailedRun {
                run_id: r.id.to_string(),
                workflow_name: r.name,
                head_sha: r.head_sha,
                html_url: r.html_url,
            })
            .collect();

        if failed.is_empty() {
            warn!(owner, repo, pr, "no failed runs found for PR");
        }

        Ok(failed)
    }

    async fn get_workflow_logs(
        &self,
        repo_url: &str,
        run_id: &str,
        token: &str,
        strategy: LogRetrievalStrategy,
    ) -> Result<WorkflowLogs, CodeHostError> {
        let (owner, repo) =
            Self::owner_repo(repo_url).ok_or_else(|| CodeHostError::NotFound(repo_url.to_string()))?;

        let url = match strategy {
            LogRetrievalStrategy::Standard | LogRetrievalStrategy::Extended => format!(
                "{}/repos/{owner}/{repo}/actions/runs/{run_id}/logs",
                self.api_base
            ),
            LogRetrievalStrategy::AnyError => {
                format!("{}/repos/{owner}/{repo}/actions/runs/{run_id}/jobs", self.api_base)
            }
            LogRetrievalStrategy::ForceLatest => format!(
                "{}/repos/{owner}/{repo}/actions/runs?per_page=1",
                self.api_base
            ),
        };

        let resp = self
            .auth_request(reqwest::Method::GET, &url, token)
            .send()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CodeHostError::NoFailedJob {
                run_id: run_id.to_string(),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(CodeHostError::NoFailedJob {
                run_id: run_id.to_string(),
            });
        }

        info!(run_id, ?strategy, "fetched workflow logs");
        Ok(WorkflowLogs {
            text,
            strategy_used: strategy,
        })
    }

    async fn get_file_content(
        &self,
        repo_url: &str,
        path: &str,
        token: &str,
    ) -> Result<FileContent, CodeHostError> {
        let (owner, repo) =
            Self::owner_repo(repo_url).ok_or_else(|| CodeHostError::NotFound(repo_url.to_string()))?;
        let encoded_path = urlencoding::encode(path);
        let url = format!("{}/repos/{owner}/{repo}/contents/{encoded_path}", self.api_base);

        let resp = self
            .auth_request(reqwest::Method::GET, &url, token)
            .send()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CodeHostError::NotFound(path.to_string()));
        }

        let body: GhContent = resp
            .json()
            .await
            .map_err(|e| CodeHostError::Http(e.to_string()))?;

        let content = if body.encoding == "base64" {
            let cleaned: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(cleaned)
                .map_err(|e| CodeHostError::Http(e.to_string()))?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            body.content
        };

        Ok(FileContent {
            path: path.to_string(),
            content,
        })
    }

    async fn push_commit_on_branch(
        &self,
        repo_url: &str,
        branch: &str,
        files: &[FileContent],
        message: &str,
        token: &str,
    ) -> Result<PushResult, CodeHostError> {
        let (owner, repo) =
            Self::owner_repo(repo_url).ok_or_else(|| CodeHostError::NotFound(repo_url.to_string()))?;

        // Tree-then-commit-then-ref-update, each step retried up to 3 times
        // on transient HTTP failure before surfacing an error.
        let base_tree_sha = self.get_branch_head_sha(&owner, &repo, branch, token).await?;
        let tree_sha = self
            .create_tree(&owner, &repo, &base_tree_sha, files, token)
            .await?;
        let commit_sha = self
            .create_commit(&owner, &repo, &tree_sha, &base_tree_sha, message, token)
            .await?;
        self.update_ref(&owner, &repo, branch, &commit_sha, token).await?;

        Ok(PushResult {
            commit_url: format!(
                "https://github.com/{owner}/{repo}/commit/{commit_sha}"
            ),
            commit_sha,
        })
    }
}

impl GitHubCodeHost {
    async fn retry<F, Fut, T>(&self, mut attempt: F) -> Result<T, CodeHostError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CodeHostError>>,
    {
        let mut last_err = None;
        for n in 0..3 {
            match attempt().await {
                Ok(v) => return Ok(v),
                Err(CodeHostError::Http(msg)) => {
                    warn!(attempt = n, %msg, "retrying transient push failure");
                    last_err = Some(CodeHostError::Http(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(CodeHostError::Http("exhausted retries".to_string())))
    }

    async fn get_branch_head_sha(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        token: &str,
    ) -> Result<String, CodeHostError> {
        #[derive(Deserialize)]
        struct RefObj {
            object: RefObjInner,
        }
        #[derive(Deserialize)]
        struct RefObjInner {
            sha: String,
        }

        let url = format!("{}/repos/{owner}/{repo}/git/ref/heads/{branch}", self.api_base);
        self.retry(|| async {
            let resp = self
                .auth_request(reqwest::Method::GET, &url, token)
                .send()
                .await
                .map_err(|e| CodeHostError::Http(e.to_string()))?;
            let parsed: RefObj = resp.json().await.map_err(|e| CodeHostError::Http(e.to_string()))?;
            Ok(parsed.object.sha)
        })
        .await
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        files: &[FileContent],
        token: &str,
    ) -> Result<String, CodeHostError> {
        #[derive(serde::Serialize)]
        struct TreeEntry<'a> {
            path: &'a str,
            mode: &'static str,
            #[serde(rename = "type")]
            kind: &'static str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct TreeRequest<'a> {
            base_tree: &'a str,
            tree: Vec<TreeEntry<'a>>,
        }
        #[derive(Deserialize)]
        struct TreeResponse {
            sha: String,
        }

        let url = format!("{}/repos/{owner}/{repo}/git/trees", self.api_base);
        let body = TreeRequest {
            base_tree,
            tree: files
                .iter()
                .map(|f| TreeEntry {
                    path: &f.path,
                    mode: "100644",
                    kind: "blob",
                    content: &f.content,
                })
                .collect(),
        };

        self.retry(|| async {
            let resp = self
                .auth_request(reqwest::Method::POST, &url, token)
                .json(&body)
                .send()
                .await
                .map_err(|e| CodeHostError::Http(e.to_string()))?;
            let parsed: TreeResponse =
                resp.json().await.map_err(|e| CodeHostError::Http(e.to_string()))?;
            Ok(parsed.sha)
        })
        .await
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        tree_sha: &str,
        parent_sha: &str,
        message: &str,
        token: &str,
    ) -> Result<String, CodeHostError> {
        #[derive(serde::Serialize)]
        struct CommitRequest<'a> {
            message: &'a str,
            tree: &'a str,
            parents: Vec<&'a str>,
        }
        #[derive(Deserialize)]
        struct CommitResponse {
            sha: String,
        }

        let url = format!("{}/repos/{owner}/{repo}/git/commits", self.api_base);
        let body = CommitRequest {
            message,
            tree: tree_sha,
            parents: vec![parent_sha],
        };

        self.retry(|| async {
            let resp = self
                .auth_request(reqwest::Method::POST, &url, token)
                .json(&body)
                .send()
                .await
                .map_err(|e| CodeHostError::Http(e.to_string()))?;
            let parsed: CommitResponse =
                resp.json().await.map_err(|e| CodeHostError::Http(e.to_string()))?;
            Ok(parsed.sha)
        })
        .await
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_sha: &str,
        token: &str,
    ) -> Result<(), CodeHostError> {
        #[derive(serde::Serialize)]
        struct RefUpdate<'a> {
            sha: &'a str,
            force: bool,
        }

        let url = format!("{}/repos/{owner}/{repo}/git/refs/heads/{branch}", self.api_base);
        let body = RefUpdate {
            sha: commit_sha,
            force: false,
        };

        self.retry(|| async {
            self.auth_request(reqwest::Method::PATCH, &url, token)
                .json(&body)
                .send()
                .await
                .map_err(|e| CodeHostError::Http(e.to_string()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_repo_parses_https_url() {
        let (owner, repo) =
            GitHubCodeHost::owner_repo("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn owner_repo_strips_trailing_dot_git() {
        let (owner, repo) =
            GitHubCodeHost::owner_repo("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[tokio::test]
    async fn get_workflow_logs_escalates_on_not_found() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let host = GitHubCodeHost::new().with_api_base(server.uri());
        let result = host
            .get_workflow_logs(
                "https://github.com/acme/widgets",
                "123",
                "tok",
                LogRetrievalStrategy::Standard,
            )
            .await;

        assert!(matches!(result, Err(CodeHostError::NoFailedJob { .. })));
    }
}
