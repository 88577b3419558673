use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::{CommandOutput, ResourceStats, Sandbox, SandboxError};

/// In-process simulator: file I/O mocked against an in-memory map,
/// `runCommand` returns deterministic stub output. This is the fallback the
/// Supervisor degrades to when the configured backend's `init()` fails
/// (spec §4.1 step 2).
pub struct SimulationSandbox {
    id: String,
    work_dir: String,
    files: Mutex<BTreeMap<String, String>>,
}

impl SimulationSandbox {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            work_dir: "/sandbox/workspace".to_string(),
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seed a file, e.g. from a pre-fetched repository checkout.
    pub fn seed_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }
}

#[async_trait]
impl Sandbox for SimulationSandbox {
    async fn init(&mut self) -> Result<(), SandboxError> {
        debug!(id = %self.id, "simulation sandbox initialized");
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), SandboxError> {
        debug!(id = %self.id, "simulation sandbox torn down");
        Ok(())
    }

    async fn run_command(
        &self,
        cmd: &str,
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        debug!(id = %self.id, cmd, "simulated command execution");
        Ok(CommandOutput {
            stdout: format!("simulated: {cmd}"),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::Io(format!("no such file: {path}")))
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, SandboxError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect())
    }

    fn get_work_dir(&self) -> &str {
        &self.work_dir
    }

    fn get_id(&self) -> &str {
        &self.id
    }

    async fn get_resource_stats(&self) -> Option<ResourceStats> {
        Some(ResourceStats::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mut sandbox = SimulationSandbox::new("sim-1");
        sandbox.init().await.unwrap();
        sandbox.write_file("a.rs", "fn main() {}").await.unwrap();
        let content = sandbox.read_file("a.rs").await.unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[tokio::test]
    async fn list_files_filters_by_prefix() {
        let sandbox = SimulationSandbox::new("sim-2");
        sandbox.write_file("src/a.rs", "a").await.unwrap();
        sandbox.write_file("tests/b.rs", "b").await.unwrap();
        let files = sandbox.list_files("src/").await.unwrap();
        assert_eq!(files, vec!["src/a.rs".to_string()]);
    }
}
