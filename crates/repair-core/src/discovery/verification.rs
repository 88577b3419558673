//! Post-write verification (spec §4.10): confirms the sandbox actually
//! holds what the Execution node believes it wrote, and that the project
//! still builds, before Verification relies on either.

use crate::sandbox::Sandbox;

/// True iff the sandbox's current content at `path` is byte-identical to
/// `expected`. Catches silent write failures and stale-cache reads.
pub async fn verify_content_match(sandbox: &dyn Sandbox, path: &str, expected: &str) -> bool {
    match sandbox.read_file(path).await {
        Ok(actual) => actual == expected,
        Err(_) => false,
    }
}

/// Result of a speculative build, run before committing to a fix.
#[derive(Debug, Clone)]
pub struct DryRunResult {
    pub success: bool,
    pub output: String,
}

/// Run `build_command` with no side effects beyond the sandbox's own
/// filesystem (callers are expected to have already staged the candidate
/// files). Returns the combined stdout/stderr for feedback on failure.
pub async fn dry_run_build(sandbox: &dyn Sandbox, build_command: &str) -> DryRunResult {
    match sandbox.run_command(build_command, Some(std::time::Duration::from_secs(120))).await {
        Ok(output) => DryRunResult {
            success: output.success(),
            output: format!("{}{}", output.stdout, output.stderr),
        },
        Err(e) => DryRunResult {
            success: false,
            output: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SimulationSandbox;

    #[tokio::test]
    async fn content_match_detects_divergence() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("a.rs", "fn main() {}").await.unwrap();
        assert!(verify_content_match(&sandbox, "a.rs", "fn main() {}").await);
        assert!(!verify_content_match(&sandbox, "a.rs", "fn main() { panic!() }").await);
    }

    #[tokio::test]
    async fn missing_file_is_not_a_match() {
        let sandbox = SimulationSandbox::new("sim");
        assert!(!verify_content_match(&sandbox, "missing.rs", "").await);
    }
}
