//! Loop and path-hallucination detection (spec §4.8). The Graph Agent
//! consults this after every Verification pass; a detected loop moves the
//! run to `STOPPED` rather than burning the rest of the iteration budget.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Banner surfaced in `GraphState.feedback` and the run's terminal message
/// when a loop is confirmed. Kept as a literal constant so callers and tests
/// don't drift from each other.
pub const LOOP_DETECTED_BANNER: &str =
    "LOOP DETECTED: the same state has recurred across iterations without progress.";

/// A content hash of one iteration's outcome: the diagnosis summary plus the
/// sorted set of modified-file content hashes. Two iterations that land on
/// the same snapshot made no real progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateSnapshot(String);

impl StateSnapshot {
    #[must_use]
    pub fn new(diagnosis_summary: &str, modified_contents: &[String]) -> Self {
        let mut hashes: Vec<String> = modified_contents
            .iter()
            .map(|c| hex::encode(Sha256::digest(c.as_bytes())))
            .collect();
        hashes.sort_unstable();

        let normalized_summary = diagnosis_summary.to_lowercase();
        let key = format!("{normalized_summary}|{}", hashes.join(","));
        Self(hex::encode(Sha256::digest(key.as_bytes())))
    }
}

/// Tracks recurrence of state snapshots and per-path hallucination counts
/// across one run's lifetime.
#[derive(Debug, Default)]
pub struct LoopDetector {
    seen: HashMap<StateSnapshot, u32>,
    consecutive_by_path: HashMap<String, u32>,
}

impl LoopDetector {
    /// Recurrence count, including this observation, considered a loop at
    /// two or more (spec §4.8).
    const LOOP_THRESHOLD: u32 = 2;

    /// Consecutive hallucinations on the same path at which a strategy
    /// shift is forced.
    const HALLUCINATION_THRESHOLD: u32 = 2;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration's snapshot; returns `true` if this confirms a
    /// loop (the same snapshot has now recurred `LOOP_THRESHOLD` times).
    pub fn record_snapshot(&mut self, snapshot: StateSnapshot) -> bool {
        let count = self.seen.entry(snapshot).or_insert(0);
        *count += 1;
        *count >= Self::LOOP_THRESHOLD
    }

    /// Record a path-hallucination event (the agent referenced a path that
    /// doesn't exist and isn't recoverable via fuzzy search).
    pub fn record_hallucination(&mut self, path: &str) {
        *self.consecutive_by_path.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Clear a path's hallucination streak once it resolves to a real file.
    pub fn clear_hallucination(&mut self, path: &str) {
        self.consecutive_by_path.remove(path);
    }

    #[must_use]
    pub fn should_trigger_strategy_shift(&self, path: &str) -> bool {
        self.consecutive_by_path.get(path).copied().unwrap_or(0) >= Self::HALLUCINATION_THRESHOLD
    }

    /// The automated-recovery command to try once a path's hallucination
    /// streak triggers a strategy shift: a repo-wide glob search for the
    /// file's basename rather than trusting the LLM's literal path again.
    #[must_use]
    pub fn trigger_automated_recovery(path: &str) -> String {
        let basename = path.rsplit(['/', '\\']).next().unwrap_or(path);
        format!("find . -type f -name '{basename}' -not -path '*/node_modules/*' -not -path '*/target/*'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_snapshot_recurring_twice_is_a_loop() {
        let mut detector = LoopDetector::new();
        let snap = StateSnapshot::new("syntax error in a.rs", &["fn main(){}".to_string()]);
        assert!(!detector.record_snapshot(snap.clone()));
        assert!(detector.record_snapshot(snap));
    }

    #[test]
    fn distinct_snapshots_never_trigger() {
        let mut detector = LoopDetector::new();
        assert!(!detector.record_snapshot(StateSnapshot::new("a", &[])));
        assert!(!detector.record_snapshot(StateSnapshot::new("b", &[])));
        assert!(!detector.record_snapshot(StateSnapshot::new("c", &[])));
    }

    #[test]
    fn hallucination_streak_triggers_strategy_shift_at_two() {
        let mut detector = LoopDetector::new();
        assert!(!detector.should_trigger_strategy_shift("src/missing.rs"));
        detector.record_hallucination("src/missing.rs");
        assert!(!detector.should_trigger_strategy_shift("src/missing.rs"));
        detector.record_hallucination("src/missing.rs");
        assert!(detector.should_trigger_strategy_shift("src/missing.rs"));
    }

    #[test]
    fn clearing_hallucination_resets_streak() {
        let mut detector = LoopDetector::new();
        detector.record_hallucination("src/missing.rs");
        detector.record_hallucination("src/missing.rs");
        detector.clear_hallucination("src/missing.rs");
        assert!(!detector.should_trigger_strategy_shift("src/missing.rs"));
    }

    #[test]
    fn automated_recovery_globs_by_basename_excluding_vendor_dirs() {
        let cmd = LoopDetector::trigger_automated_recovery("src/nested/foo.rs");
        assert!(cmd.contains("-name 'foo.rs'"));
        assert!(cmd.contains("node_modules"));
    }
}
