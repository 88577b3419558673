//! The Sandbox contract (spec §3) and its backends. The sandbox backend
//! itself is an external collaborator per spec §1 — only the contract is
//! specified here; `SimulationSandbox` is the one backend the engine
//! actually depends on as a behavior (the init-failure fallback of §4.1),
//! `DockerLocalSandbox` is a thin, real implementation for local use, and
//! `UnsupportedSandbox` stands in for backends (`kubernetes`, `e2b`) whose
//! wire protocol is out of scope here.

mod docker_local;
mod simulation;
mod unsupported;

pub use docker_local::DockerLocalSandbox;
pub use simulation::SimulationSandbox;
pub use unsupported::UnsupportedSandbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of running a command in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Timeout exit code per spec §5.
    pub const TIMEOUT_EXIT_CODE: i32 = 124;

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.exit_code == Self::TIMEOUT_EXIT_CODE
    }

    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: "command timed out".to_string(),
            exit_code: Self::TIMEOUT_EXIT_CODE,
        }
    }
}

/// Resource usage snapshot, if the backend can report one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceStats {
    pub cpu_percent: Option<f64>,
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox init failed: {0}")]
    InitFailed(String),
    #[error("clone failed: {0}")]
    CloneFailed(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("backend does not support this operation: {0}")]
    Unsupported(String),
}

/// An isolated execution environment holding one checked-out repository
/// (spec §3). Owned exclusively by the Supervisor for the lifetime of one
/// run; never shared across runs.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn init(&mut self) -> Result<(), SandboxError>;
    async fn teardown(&mut self) -> Result<(), SandboxError>;

    async fn run_command(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;
    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, SandboxError>;

    fn get_work_dir(&self) -> &str;
    fn get_id(&self) -> &str;

    async fn get_resource_stats(&self) -> Option<ResourceStats> {
        None
    }
}
