//! The Supervisor (spec §4.1): owns sandbox lifecycle end-to-end and
//! delegates the actual repair work to the Graph Agent. The Supervisor never
//! inspects log content or diagnoses anything itself — that's the Graph
//! Agent's job once the sandbox is ready.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use config::{AppConfig, ExecutionBackend};
use scm::CodeHost;

use crate::error::RepairError;
use crate::graph::{GraphObserver, GraphEngine};
use crate::llm::LlmProvider;
use crate::sandbox::{DockerLocalSandbox, Sandbox, SimulationSandbox, UnsupportedSandbox};
use crate::types::GraphStateSnapshot;

/// Toolchain detected from a repository's manifest/lockfile, used to decide
/// what to install before the Graph Agent starts (spec §4.1 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Rust,
    Node,
    Bun,
    Python,
    Unknown,
}

impl Toolchain {
    /// Detect from the set of file names present at the repository root,
    /// reading `package.json` when present to distinguish a Bun project
    /// (`"packageManager": "bun@..."` or a `bun` dependency) from plain Node.
    pub async fn detect(sandbox: &dyn Sandbox, root_files: &[String]) -> Self {
        if root_files.iter().any(|f| f == "Cargo.toml") {
            return Self::Rust;
        }
        if root_files.iter().any(|f| f == "bun.lockb" || f == "bunfig.toml") {
            return Self::Bun;
        }
        if root_files.iter().any(|f| f == "package.json") {
            if let Ok(manifest) = sandbox.read_file("package.json").await {
                if manifest.contains("\"bun\"") {
                    return Self::Bun;
                }
            }
            return Self::Node;
        }
        if root_files
            .iter()
            .any(|f| f == "pyproject.toml" || f == "requirements.txt")
        {
            return Self::Python;
        }
        Self::Unknown
    }

    /// The install command run once before handing control to the Graph
    /// Agent, or `None` if nothing needs provisioning.
    #[must_use]
    pub fn install_command(self) -> Option<&'static str> {
        match self {
            Self::Rust => Some("cargo fetch"),
            Self::Node => Some("npm install"),
            Self::Bun => Some("bun install"),
            Self::Python => Some("pip install -r requirements.txt"),
            Self::Unknown => None,
        }
    }

    /// The command to re-fetch dependencies after an environment-recovery
    /// pass (spec §4.6), distinct from `install_command` in that it forces a
    /// clean re-resolution rather than trusting an existing lockfile/cache.
    #[must_use]
    pub fn refresh_command(self) -> Option<&'static str> {
        match self {
            Self::Rust => Some("cargo clean && cargo fetch"),
            Self::Node => Some("rm -rf node_modules && npm install"),
            Self::Bun => Some("rm -rf node_modules && bun install"),
            Self::Python => Some("pip install --force-reinstall -r requirements.txt"),
            Self::Unknown => None,
        }
    }
}

/// Outcome of one supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    pub final_snapshot: GraphStateSnapshot,
    pub sandbox_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("sandbox provisioning failed on every backend, including simulation fallback")]
    ProvisioningExhausted,
    #[error("repository clone failed: {0}")]
    CloneFailed(String),
    #[error(transparent)]
    Repair(#[from] RepairError),
}

/// Provisions a sandbox, clones the target repository at the failing
/// commit, installs the detected toolchain, runs the Graph Agent to
/// completion, and tears the sandbox down unconditionally — success,
/// failure, or panic in the delegated work.
pub struct Supervisor {
    config: AppConfig,
    code_host: Arc<dyn CodeHost>,
    llm: Arc<dyn LlmProvider>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: AppConfig, code_host: Arc<dyn CodeHost>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            config,
            code_host,
            llm,
        }
    }

    /// Build the configured sandbox backend, falling back to the in-process
    /// simulator if provisioning fails (spec §4.1 step 2).
    fn provision_backend(&self, sandbox_id: &str) -> Box<dyn Sandbox> {
        match self.config.execution_backend {
            ExecutionBackend::DockerLocal => Box::new(DockerLocalSandbox::new(
                sandbox_id.to_string(),
                std::env::temp_dir().join(format!("repair-{sandbox_id}")),
            )),
            ExecutionBackend::Kubernetes => {
                Box::new(UnsupportedSandbox::new(sandbox_id.to_string(), "kubernetes"))
            }
            ExecutionBackend::E2b => Box::new(UnsupportedSandbox::new(sandbox_id.to_string(), "e2b")),
            ExecutionBackend::Simulation => Box::new(SimulationSandbox::new(sandbox_id.to_string())),
        }
    }

    #[instrument(skip(self, observer), fields(repo = %self.config.repository_url))]
    pub async fn run(
        &self,
        head_sha: &str,
        initial_log_text: String,
        observer: Option<Arc<dyn GraphObserver>>,
    ) -> Result<SupervisorOutcome, SupervisorError> {
        let sandbox_id = uuid::Uuid::new_v4().to_string();
        let mut sandbox = self.provision_backend(&sandbox_id);

        if sandbox.init().await.is_err() {
            warn!(backend = ?self.config.execution_backend, "sandbox init failed, degrading to simulation");
            sandbox = Box::new(SimulationSandbox::new(sandbox_id.clone()));
            sandbox
                .init()
                .await
                .map_err(|_| SupervisorError::ProvisioningExhausted)?;
        }

        info!(sandbox_id = %sandbox_id, "sandbox ready");

        let clone_result = self.clone_repository(sandbox.as_ref(), head_sha).await;
        if let Err(e) = &clone_result {
            error!(error = %e, "clone failed, tearing down and surfacing terminal error");
            let _ = sandbox.teardown().await;
            return Err(SupervisorError::CloneFailed(e.clone()));
        }

        let root_files = sandbox
            .list_files(sandbox.get_work_dir())
            .await
            .unwrap_or_default();
        let toolchain = Toolchain::detect(sandbox.as_ref(), &root_files).await;
        if let Some(install_cmd) = toolchain.install_command() {
            info!(?toolchain, cmd = install_cmd, "provisioning toolchain");
            if let Err(e) = sandbox.run_command(install_cmd, None).await {
                warn!(error = %e, "toolchain provisioning failed, proceeding anyway");
            }
        }

        if root_files.iter().any(|f| f == "Dockerfile") {
            info!("Dockerfile present, ensuring hadolint is installed");
            let install_hadolint = "which hadolint || (curl -sSfL \
                 https://github.com/hadolint/hadolint/releases/latest/download/hadolint-Linux-x86_64 \
                 -o /usr/local/bin/hadolint && chmod +x /usr/local/bin/hadolint)";
            if let Err(e) = sandbox.run_command(install_hadolint, None).await {
                warn!(error = %e, "hadolint provisioning failed, proceeding anyway");
            }
        }

        let repo_context = root_files.join("\n");
        let engine = GraphEngine::new(
            Arc::clone(&self.llm),
            self.config.llm_model.clone(),
            self.config.max_iterations,
        );

        let run_result = engine
            .run(sandbox.as_ref(), initial_log_text, repo_context, observer)
            .await;

        // Teardown happens unconditionally on every exit path.
        if let Err(e) = sandbox.teardown().await {
            warn!(error = %e, "sandbox teardown reported an error, ignoring");
        }

        let final_snapshot = run_result.map_err(SupervisorError::Repair)?;

        Ok(SupervisorOutcome {
            final_snapshot,
            sandbox_id,
        })
    }

    async fn clone_repository(&self, sandbox: &dyn Sandbox, head_sha: &str) -> Result<(), String> {
        let cmd = format!(
            "git clone {} . && git checkout {}",
            self.config.repository_url, head_sha
        );
        match sandbox.run_command(&cmd, None).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(format!("exit {}: {}", out.exit_code, out.stderr)),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SimulationSandbox;

    #[tokio::test]
    async fn toolchain_detects_rust_from_manifest() {
        let sandbox = SimulationSandbox::new("sim");
        let files = vec!["Cargo.toml".to_string(), "src".to_string()];
        assert_eq!(Toolchain::detect(&sandbox, &files).await, Toolchain::Rust);
    }

    #[tokio::test]
    async fn toolchain_detects_bun_from_lockfile() {
        let sandbox = SimulationSandbox::new("sim");
        let files = vec!["bun.lockb".to_string(), "package.json".to_string()];
        assert_eq!(Toolchain::detect(&sandbox, &files).await, Toolchain::Bun);
    }

    #[tokio::test]
    async fn toolchain_detects_bun_from_package_manager_field() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox
            .write_file("package.json", r#"{"packageManager": "bun@1.1.0"}"#)
            .await
            .unwrap();
        let files = vec!["package.json".to_string()];
        assert_eq!(Toolchain::detect(&sandbox, &files).await, Toolchain::Bun);
    }

    #[tokio::test]
    async fn toolchain_falls_back_to_node_without_bun_markers() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("package.json", r#"{"name": "app"}"#).await.unwrap();
        let files = vec!["package.json".to_string()];
        assert_eq!(Toolchain::detect(&sandbox, &files).await, Toolchain::Node);
    }

    #[test]
    fn toolchain_unknown_has_no_install_command() {
        assert_eq!(Toolchain::Unknown.install_command(), None);
        assert_eq!(Toolchain::Unknown.refresh_command(), None);
    }
}
