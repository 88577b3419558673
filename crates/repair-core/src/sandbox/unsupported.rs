use async_trait::async_trait;
use std::time::Duration;

use super::{CommandOutput, Sandbox, SandboxError};

/// Placeholder for backends whose wire protocol is an external collaborator
/// out of scope here (`kubernetes`, `e2b` — spec §1). `init()` always fails,
/// which is exactly the signal the Supervisor needs to degrade to the
/// in-process simulator (spec §4.1 step 2).
pub struct UnsupportedSandbox {
    id: String,
    backend_name: &'static str,
}

impl UnsupportedSandbox {
    #[must_use]
    pub fn new(id: impl Into<String>, backend_name: &'static str) -> Self {
        Self {
            id: id.into(),
            backend_name,
        }
    }
}

#[async_trait]
impl Sandbox for UnsupportedSandbox {
    async fn init(&mut self) -> Result<(), SandboxError> {
        Err(SandboxError::Unsupported(self.backend_name.to_string()))
    }

    async fn teardown(&mut self) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn run_command(
        &self,
        _cmd: &str,
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        Err(SandboxError::Unsupported(self.backend_name.to_string()))
    }

    async fn write_file(&self, _path: &str, _content: &str) -> Result<(), SandboxError> {
        Err(SandboxError::Unsupported(self.backend_name.to_string()))
    }

    async fn read_file(&self, _path: &str) -> Result<String, SandboxError> {
        Err(SandboxError::Unsupported(self.backend_name.to_string()))
    }

    async fn list_files(&self, _dir: &str) -> Result<Vec<String>, SandboxError> {
        Err(SandboxError::Unsupported(self.backend_name.to_string()))
    }

    fn get_work_dir(&self) -> &str {
        "/unsupported"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_always_fails() {
        let mut sandbox = UnsupportedSandbox::new("k8s-1", "kubernetes");
        assert!(sandbox.init().await.is_err());
    }
}
