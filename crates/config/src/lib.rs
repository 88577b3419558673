//! Shared configuration types for the repair-loop engine.
//!
//! Covers the per-job configuration (`AppConfig`), the unit of work handed
//! to exactly one supervisor (`RunGroup`), recognized feature flags, and the
//! environment-variable parsing used to build all three.

mod env;
mod error;
mod feature_flags;
mod run_group;

pub use env::EnvConfig;
pub use error::ConfigError;
pub use feature_flags::FeatureFlags;
pub use run_group::{MainRun, RunGroup};

use serde::{Deserialize, Serialize};

/// Sandbox backend selection (`executionBackend` in spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    DockerLocal,
    Kubernetes,
    E2b,
    Simulation,
}

impl Default for ExecutionBackend {
    fn default() -> Self {
        Self::Simulation
    }
}

impl std::str::FromStr for ExecutionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker_local" => Ok(Self::DockerLocal),
            "kubernetes" => Ok(Self::Kubernetes),
            "e2b" => Ok(Self::E2b),
            "simulation" => Ok(Self::Simulation),
            other => Err(ConfigError::InvalidValue {
                field: "executionBackend".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Per-job configuration. Immutable once constructed for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Repository URL (e.g. `https://github.com/owner/repo`).
    pub repository_url: String,
    /// Bearer token for the code-hosting API.
    pub access_token: String,
    /// LLM provider identifier, e.g. `"anthropic"`.
    pub llm_provider: String,
    /// LLM model identifier passed through to `generate()`.
    pub llm_model: String,
    /// Sandbox backend to provision.
    pub execution_backend: ExecutionBackend,
    /// Recognized feature flags, all defaulting to `false`.
    pub feature_flags: FeatureFlags,
    /// Maximum repair iterations before forced failure (spec default 5).
    pub max_iterations: u32,
}

impl AppConfig {
    /// Build configuration from recognized environment variables plus the
    /// per-job fields that only the driver knows (repo URL, token, model).
    #[must_use]
    pub fn from_env(
        repository_url: String,
        access_token: String,
        llm_provider: String,
        llm_model: String,
    ) -> Self {
        let env = EnvConfig::from_env();
        Self {
            repository_url,
            access_token,
            llm_provider,
            llm_model,
            execution_backend: env.execution_backend,
            feature_flags: env.feature_flags,
            max_iterations: env.max_adaptive_iterations.unwrap_or(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_backend_defaults_to_simulation() {
        assert_eq!(ExecutionBackend::default(), ExecutionBackend::Simulation);
    }

    #[test]
    fn execution_backend_parses_recognized_values() {
        assert_eq!(
            "docker_local".parse::<ExecutionBackend>().unwrap(),
            ExecutionBackend::DockerLocal
        );
        assert_eq!(
            "kubernetes".parse::<ExecutionBackend>().unwrap(),
            ExecutionBackend::Kubernetes
        );
        assert!("bogus".parse::<ExecutionBackend>().is_err());
    }
}
