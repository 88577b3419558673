//! Reproduction-command inference (spec §4.11): derives the command that
//! reproduces a CI failure locally, in three escalating strategies, each
//! dry-run-verified before being accepted.

use crate::discovery::dry_run_build;
use crate::sandbox::Sandbox;

/// Ordered inference strategies (spec §4.11). The first candidate whose
/// dry run actually exercises the failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReproductionStrategy {
    /// Re-derive the command from the CI workflow file that failed.
    Workflow,
    /// Derive from the error signature itself (e.g. a named test function).
    Signature,
    /// A conservative, read-only scan command as a last resort.
    SafeScan,
}

impl ReproductionStrategy {
    #[must_use]
    pub fn escalation_order() -> [Self; 3] {
        [Self::Workflow, Self::Signature, Self::SafeScan]
    }
}

/// One inferred candidate command, paired with the strategy that produced
/// it, for explainability in logs.
#[derive(Debug, Clone)]
pub struct ReproductionCandidate {
    pub strategy: ReproductionStrategy,
    pub command: String,
}

fn infer_from_workflow(workflow_yaml: Option<&str>) -> Option<String> {
    let yaml = workflow_yaml?;
    yaml.lines()
        .map(str::trim)
        .find(|line| line.starts_with("run:"))
        .map(|line| line.trim_start_matches("run:").trim().to_string())
}

fn infer_from_signature(error_message: &str) -> Option<String> {
    // A line like "test result: FAILED   test_name ... " or a Rust panic
    // naming a test path is the most common signature shape.
    let re = regex::Regex::new(r"(?:test|fn)\s+([a-zA-Z0-9_:]+)\s*\.\.\.\s*FAILED").ok()?;
    re.captures(error_message)
        .map(|caps| format!("cargo test {} -- --exact", &caps[1]))
}

fn infer_safe_scan() -> String {
    "cargo check --workspace --all-targets".to_string()
}

/// Build the escalation sequence of candidates for this diagnosis. Not all
/// strategies necessarily produce a candidate (e.g. no workflow file, no
/// recognizable signature) — callers should dry-run each present candidate
/// in order and stop at the first success.
#[must_use]
pub fn infer_candidates(workflow_yaml: Option<&str>, error_message: &str) -> Vec<ReproductionCandidate> {
    let mut candidates = Vec::new();

    if let Some(cmd) = infer_from_workflow(workflow_yaml) {
        candidates.push(ReproductionCandidate {
            strategy: ReproductionStrategy::Workflow,
            command: cmd,
        });
    }
    if let Some(cmd) = infer_from_signature(error_message) {
        candidates.push(ReproductionCandidate {
            strategy: ReproductionStrategy::Signature,
            command: cmd,
        });
    }
    candidates.push(ReproductionCandidate {
        strategy: ReproductionStrategy::SafeScan,
        command: infer_safe_scan(),
    });

    candidates
}

/// Dry-run each candidate in escalation order and return the first whose
/// build actually runs (regardless of pass/fail — we only need it to
/// *execute*, since SafeScan may legitimately fail on the very issue being
/// repaired).
pub async fn resolve_reproduction_command(
    sandbox: &dyn Sandbox,
    workflow_yaml: Option<&str>,
    error_message: &str,
) -> Option<ReproductionCandidate> {
    for candidate in infer_candidates(workflow_yaml, error_message) {
        let result = dry_run_build(sandbox, &candidate.command).await;
        if !result.output.contains("command not found") {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_command_from_workflow_run_step() {
        let yaml = "steps:\n  - name: test\n    run: cargo test --workspace\n";
        let candidates = infer_candidates(Some(yaml), "");
        assert!(candidates
            .iter()
            .any(|c| c.strategy == ReproductionStrategy::Workflow && c.command == "cargo test --workspace"));
    }

    #[test]
    fn infers_command_from_test_signature() {
        let msg = "running 3 tests\ntest it_parses_config ... FAILED\n";
        let candidates = infer_candidates(None, msg);
        let sig = candidates
            .iter()
            .find(|c| c.strategy == ReproductionStrategy::Signature)
            .unwrap();
        assert_eq!(sig.command, "cargo test it_parses_config -- --exact");
    }

    #[test]
    fn safe_scan_is_always_present_as_last_resort() {
        let candidates = infer_candidates(None, "unrecognizable gibberish");
        assert_eq!(candidates.last().unwrap().strategy, ReproductionStrategy::SafeScan);
    }
}
