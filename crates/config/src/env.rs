use crate::{ExecutionBackend, FeatureFlags};

/// Observability exporter target, derived from `OTEL_EXPORTER_FILE` /
/// `OTEL_EXPORTER_CONSOLE`. Neither set ⇒ spans are dropped (no-op exporter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtelExporter {
    None,
    Console,
    File(String),
}

/// Docker resource limits (spec §6 defaults).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerLimits {
    pub cpu_limit: String,
    pub memory_limit: String,
    pub pids_limit: u32,
}

impl Default for DockerLimits {
    fn default() -> Self {
        Self {
            cpu_limit: "1".to_string(),
            memory_limit: "2g".to_string(),
            pids_limit: 1000,
        }
    }
}

/// Everything derivable from process environment variables alone.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub execution_backend: ExecutionBackend,
    pub feature_flags: FeatureFlags,
    pub otel_exporter: OtelExporter,
    pub docker_limits: DockerLimits,
    pub compression_ratio: Option<f64>,
    pub max_adaptive_iterations: Option<u32>,
}

impl EnvConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let execution_backend = std::env::var("EXECUTION_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let otel_exporter = match (
            std::env::var("OTEL_EXPORTER_FILE").ok(),
            std::env::var("OTEL_EXPORTER_CONSOLE").ok(),
        ) {
            (Some(path), _) => OtelExporter::File(path),
            (None, Some(_)) => OtelExporter::Console,
            (None, None) => OtelExporter::None,
        };

        let docker_limits = DockerLimits {
            cpu_limit: std::env::var("DOCKER_CPU_LIMIT")
                .unwrap_or_else(|_| DockerLimits::default().cpu_limit),
            memory_limit: std::env::var("DOCKER_MEMORY_LIMIT")
                .unwrap_or_else(|_| DockerLimits::default().memory_limit),
            pids_limit: std::env::var("DOCKER_PIDS_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| DockerLimits::default().pids_limit),
        };

        Self {
            execution_backend,
            feature_flags: FeatureFlags::from_env(),
            otel_exporter,
            docker_limits,
            compression_ratio: std::env::var("COMPRESSION_RATIO")
                .ok()
                .and_then(|v| v.parse().ok()),
            max_adaptive_iterations: std::env::var("MAX_ADAPTIVE_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn docker_limits_default_to_spec_values() {
        let limits = DockerLimits::default();
        assert_eq!(limits.cpu_limit, "1");
        assert_eq!(limits.memory_limit, "2g");
        assert_eq!(limits.pids_limit, 1000);
    }

    #[test]
    #[serial]
    fn otel_exporter_prefers_file_over_console() {
        std::env::set_var("OTEL_EXPORTER_FILE", "/tmp/spans.jsonl");
        std::env::set_var("OTEL_EXPORTER_CONSOLE", "1");
        let env = EnvConfig::from_env();
        assert_eq!(env.otel_exporter, OtelExporter::File("/tmp/spans.jsonl".to_string()));
        std::env::remove_var("OTEL_EXPORTER_FILE");
        std::env::remove_var("OTEL_EXPORTER_CONSOLE");
    }

    #[test]
    #[serial]
    fn otel_exporter_none_when_unset() {
        std::env::remove_var("OTEL_EXPORTER_FILE");
        std::env::remove_var("OTEL_EXPORTER_CONSOLE");
        let env = EnvConfig::from_env();
        assert_eq!(env.otel_exporter, OtelExporter::None);
    }
}
