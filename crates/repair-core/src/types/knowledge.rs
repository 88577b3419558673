use serde::{Deserialize, Serialize};

use super::diagnosis::FixAction;
use super::ids::{ErrorFactId, Fingerprint};

/// Status of a persistent error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFactStatus {
    Open,
    InProgress,
    Resolved,
    Blocked,
}

/// Free-form structured notes kept on an `ErrorFact` (spec §6 wire contract).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorNotes {
    pub decisions: Vec<String>,
    pub attempts: Vec<String>,
    pub blockers: Vec<String>,
    pub key_findings: Vec<String>,
}

/// A persistent record of one error encountered during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFact {
    pub id: ErrorFactId,
    pub run_id: String,
    pub summary: String,
    pub file_path: String,
    pub fix_action: FixAction,
    pub status: ErrorFactStatus,
    pub notes: ErrorNotes,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Relationship kinds between two `ErrorFact`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Blocks,
    DiscoveredFrom,
    Related,
    ParentChild,
}

/// A directed relationship between two errors. Invariants: no self-edges,
/// `(source, target, type)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDependency {
    pub source_error_id: ErrorFactId,
    pub target_error_id: ErrorFactId,
    pub relationship_type: RelationshipType,
    pub metadata: Option<serde_json::Value>,
}

/// `FixTemplate` wire contract (spec §6): either a set of file edits or a
/// single command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixTemplate {
    Edit { edits: Vec<FileEdit> },
    Command { command: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub before: String,
    pub after: String,
}

/// A content-addressed fix pattern, keyed by `Fingerprint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixPattern {
    pub fingerprint: Fingerprint,
    pub template: FixTemplate,
    pub success_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Running statistics for a fingerprinted error's known solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSolution {
    pub fingerprint: Fingerprint,
    pub times_applied: u64,
    pub success_rate: f64,
    pub avg_iterations: f64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ErrorSolution {
    #[must_use]
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            times_applied: 0,
            success_rate: 0.0,
            avg_iterations: 0.0,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Upsert with a new outcome: `new_rate = (old_rate·old_n + outcome) /
    /// (old_n + 1)` (spec §4.7). `times_applied` strictly increases
    /// (invariant 6).
    pub fn record_outcome(&mut self, success: bool, iterations: u64) {
        let old_n = self.times_applied as f64;
        let outcome = f64::from(success);
        self.success_rate = (self.success_rate * old_n + outcome) / (old_n + 1.0);
        self.avg_iterations = (self.avg_iterations * old_n + iterations as f64) / (old_n + 1.0);
        self.times_applied += 1;
        self.updated_at = chrono::Utc::now();
    }
}

/// A merged, running-average record of tool-path outcomes for one
/// `(errorCategory, complexity bucket, toolPath)` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixTrajectory {
    pub error_category: String,
    pub complexity_bucket: u8,
    pub tool_path: Vec<String>,
    pub success: bool,
    pub total_cost: f64,
    pub latency_ms: f64,
    pub reward: f64,
    pub occurrence_count: u64,
}

impl FixTrajectory {
    /// Bucket width is 3 (spec §4.7).
    #[must_use]
    pub fn bucket(complexity: u8) -> u8 {
        complexity / 3
    }

    /// Merge another observation of the same key into this trajectory via
    /// a count-weighted running average.
    pub fn merge(&mut self, cost: f64, latency_ms: f64, reward: f64, success: bool) {
        let n = self.occurrence_count as f64;
        self.total_cost = (self.total_cost * n + cost) / (n + 1.0);
        self.latency_ms = (self.latency_ms * n + latency_ms) / (n + 1.0);
        self.reward = (self.reward * n + reward) / (n + 1.0);
        self.occurrence_count += 1;
        self.success = self.success || success;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_solution_running_average_matches_worked_example() {
        // spec §8 scenario 6, adapted to ErrorSolution-style accumulation.
        let mut solution = ErrorSolution::new(Fingerprint::new("fp"));
        solution.record_outcome(true, 3);
        solution.record_outcome(true, 2);
        assert!((solution.avg_iterations - 2.5).abs() < 1e-9);
        assert_eq!(solution.times_applied, 2);
    }

    #[test]
    fn trajectory_merge_matches_worked_example() {
        let mut traj = FixTrajectory {
            error_category: "TEST_FAILURE".to_string(),
            complexity_bucket: FixTrajectory::bucket(5),
            tool_path: vec!["test_runner".into(), "git_blame_analyzer".into()],
            success: true,
            total_cost: 0.02,
            latency_ms: 0.0,
            reward: 85.0,
            occurrence_count: 1,
        };
        traj.merge(0.03, 0.0, 90.0, true);
        assert_eq!(traj.occurrence_count, 2);
        assert!((traj.total_cost - 0.025).abs() < 1e-9);
        assert!((traj.reward - 87.5).abs() < 1e-9);
    }

    #[test]
    fn complexity_bucket_width_is_three() {
        assert_eq!(FixTrajectory::bucket(5), 1);
        assert_eq!(FixTrajectory::bucket(6), 2);
        assert_eq!(FixTrajectory::bucket(8), 2);
    }
}
