//! Unified code-hosting API abstraction (spec §6).
//!
//! The repair-loop engine never talks to GitHub/GitLab directly; it calls
//! the [`CodeHost`] trait. `GitHubCodeHost` is the only implementation
//! shipped here (GitLab support follows the same trait, left for a future
//! addition — see `DESIGN.md`).

mod github;
mod types;

pub use github::GitHubCodeHost;
pub use types::{
    FailedRun, FileContent, LogRetrievalStrategy, PushResult, WorkflowLogs,
};

use async_trait::async_trait;

/// Errors surfaced by a [`CodeHost`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum CodeHostError {
    #[error("no failed job found for run {run_id}")]
    NoFailedJob { run_id: String },

    #[error("http request failed: {0}")]
    Http(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("authentication rejected by code host")]
    Unauthorized,
}

/// The code-hosting API contract (spec §6). Implementations are exclusively
/// network/HTTP collaborators — no business logic lives here.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// List failed workflow runs for a pull request.
    async fn get_pr_failed_runs(
        &self,
        owner: &str,
        repo: &str,
        pr: u64,
        exclude_patterns: &[String],
    ) -> Result<Vec<FailedRun>, CodeHostError>;

    /// Fetch the workflow log text for a run, using the given retrieval
    /// strategy (spec §4.3 step 1: `standard → extended → any_error →
    /// force_latest`).
    async fn get_workflow_logs(
        &self,
        repo_url: &str,
        run_id: &str,
        token: &str,
        strategy: LogRetrievalStrategy,
    ) -> Result<WorkflowLogs, CodeHostError>;

    /// Fetch a file's content at the repository's default/working ref.
    async fn get_file_content(
        &self,
        repo_url: &str,
        path: &str,
        token: &str,
    ) -> Result<FileContent, CodeHostError>;

    /// Push a commit on a branch: tree → commit → ref-update, each retried.
    async fn push_commit_on_branch(
        &self,
        repo_url: &str,
        branch: &str,
        files: &[FileContent],
        message: &str,
        token: &str,
    ) -> Result<PushResult, CodeHostError>;
}
