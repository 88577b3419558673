use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use super::{CommandOutput, Sandbox, SandboxError};

/// Runs commands directly against a local checkout under `base_dir`,
/// standing in for a real `docker_local` backend's container boundary. Real
/// container isolation (namespaces, cgroup limits) is provisioned by the
/// external sandbox backend named in `AppConfig.execution_backend`; this
/// type only implements the `Sandbox` contract against the filesystem and
/// process table the backend hands the engine.
pub struct DockerLocalSandbox {
    id: String,
    work_dir: PathBuf,
}

impl DockerLocalSandbox {
    #[must_use]
    pub fn new(id: impl Into<String>, work_dir: PathBuf) -> Self {
        Self {
            id: id.into(),
            work_dir,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.work_dir.join(p)
        }
    }
}

#[async_trait]
impl Sandbox for DockerLocalSandbox {
    async fn init(&mut self) -> Result<(), SandboxError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| SandboxError::InitFailed(e.to_string()))?;
        debug!(id = %self.id, dir = %self.work_dir.display(), "docker_local sandbox initialized");
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), SandboxError> {
        if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
            warn!(id = %self.id, error = %e, "teardown cleanup failed, ignoring");
        }
        Ok(())
    }

    async fn run_command(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        let deadline = timeout.unwrap_or_else(|| Duration::from_secs(120));

        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.work_dir)
            .output();

        match tokio::time::timeout(deadline, child).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(SandboxError::Io(e.to_string())),
            Err(_) => Ok(CommandOutput::timed_out()),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::Io(e.to_string()))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| SandboxError::Io(e.to_string()))
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| SandboxError::Io(e.to_string()))
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, SandboxError> {
        let full = self.resolve(dir);
        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| SandboxError::Io(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SandboxError::Io(e.to_string()))?
        {
            out.push(entry.path().display().to_string());
        }
        Ok(out)
    }

    fn get_work_dir(&self) -> &str {
        self.work_dir.to_str().unwrap_or_default()
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_and_run_against_temp_dir() {
        let dir = std::env::temp_dir().join(format!("repair-sandbox-test-{}", uuid::Uuid::new_v4()));
        let mut sandbox = DockerLocalSandbox::new("local-1", dir.clone());
        sandbox.init().await.unwrap();

        sandbox.write_file("hello.txt", "world").await.unwrap();
        let content = sandbox.read_file("hello.txt").await.unwrap();
        assert_eq!(content, "world");

        let out = sandbox.run_command("echo hi", None).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("hi"));

        sandbox.teardown().await.unwrap();
        assert!(!dir.exists());
    }
}
