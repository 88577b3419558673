//! The dependency tracker (spec §4.9): an in-memory graph over `ErrorFact`s
//! used to schedule work — an error `blocked` by an unresolved dependency is
//! withheld from the ready set until the blocker resolves.

use std::collections::{HashMap, HashSet};

use crate::types::{ErrorFactId, ErrorFactStatus, RelationshipType};

#[derive(Debug, Clone)]
struct Edge {
    target: ErrorFactId,
    relationship: RelationshipType,
}

/// Tracks `blocks`/`discovered_from`/`related`/`parent_child` edges between
/// errors observed in one run and derives which are ready to work on.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    edges: HashMap<ErrorFactId, Vec<Edge>>,
    statuses: HashMap<ErrorFactId, ErrorFactStatus>,
}

impl DependencyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_error(&mut self, id: ErrorFactId, status: ErrorFactStatus) {
        self.statuses.entry(id).or_insert(status);
    }

    /// Record `source -> target` with the given relationship. Idempotent;
    /// rejects self-loops. Recording a `Blocks` edge marks the target
    /// `Blocked` (spec §4.9 invariant).
    pub fn record_error_dependency(
        &mut self,
        source: ErrorFactId,
        target: ErrorFactId,
        relationship: RelationshipType,
    ) {
        if source == target {
            return;
        }
        let entry = self.edges.entry(source).or_default();
        let already_present = entry
            .iter()
            .any(|e| e.target == target && e.relationship == relationship);
        if !already_present {
            if relationship == RelationshipType::Blocks {
                self.statuses.insert(target.clone(), ErrorFactStatus::Blocked);
            }
            entry.push(Edge {
                target,
                relationship,
            });
        }
    }

    /// Errors currently `Blocked`.
    #[must_use]
    pub fn get_blocked_errors(&self) -> Vec<ErrorFactId> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == ErrorFactStatus::Blocked)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Errors that are `Open` or `InProgress` and not blocked — candidates
    /// for the next Analysis/Planning pass.
    #[must_use]
    pub fn get_ready_errors(&self) -> Vec<ErrorFactId> {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, ErrorFactStatus::Open | ErrorFactStatus::InProgress))
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn has_blocking_dependencies(&self, id: &ErrorFactId) -> bool {
        self.statuses.get(id).copied() == Some(ErrorFactStatus::Blocked)
    }

    /// Mark `id` resolved and cascade-unblock every error it was the sole
    /// `Blocks` source for.
    pub fn mark_error_resolved(&mut self, id: &ErrorFactId) {
        self.statuses.insert(id.clone(), ErrorFactStatus::Resolved);

        if let Some(edges) = self.edges.get(id).cloned() {
            for edge in edges.into_iter().filter(|e| e.relationship == RelationshipType::Blocks) {
                if !self.has_other_unresolved_blocker(&edge.target, id) {
                    self.statuses.insert(edge.target, ErrorFactStatus::Open);
                }
            }
        }
    }

    fn has_other_unresolved_blocker(&self, target: &ErrorFactId, excluding: &ErrorFactId) -> bool {
        self.edges.iter().any(|(source, edges)| {
            source != excluding
                && edges
                    .iter()
                    .any(|e| &e.target == target && e.relationship == RelationshipType::Blocks)
                && self.statuses.get(source).copied() != Some(ErrorFactStatus::Resolved)
        })
    }

    /// Adjacency view for visualization/export: `source -> [(target, relationship)]`.
    #[must_use]
    pub fn build_dependency_graph(&self) -> HashMap<ErrorFactId, Vec<(ErrorFactId, RelationshipType)>> {
        self.edges
            .iter()
            .map(|(source, edges)| {
                (
                    source.clone(),
                    edges.iter().map(|e| (e.target.clone(), e.relationship)).collect(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn known_ids(&self) -> HashSet<ErrorFactId> {
        self.statuses.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ErrorFactId {
        ErrorFactId::new(s)
    }

    #[test]
    fn recording_blocks_edge_marks_target_blocked() {
        let mut tracker = DependencyTracker::new();
        tracker.register_error(id("a"), ErrorFactStatus::Open);
        tracker.register_error(id("b"), ErrorFactStatus::Open);
        tracker.record_error_dependency(id("a"), id("b"), RelationshipType::Blocks);
        assert!(tracker.has_blocking_dependencies(&id("b")));
        assert_eq!(tracker.get_blocked_errors(), vec![id("b")]);
    }

    #[test]
    fn self_loops_are_rejected() {
        let mut tracker = DependencyTracker::new();
        tracker.register_error(id("a"), ErrorFactStatus::Open);
        tracker.record_error_dependency(id("a"), id("a"), RelationshipType::Blocks);
        assert!(tracker.build_dependency_graph().is_empty());
    }

    #[test]
    fn resolving_blocker_unblocks_target() {
        let mut tracker = DependencyTracker::new();
        tracker.register_error(id("a"), ErrorFactStatus::Open);
        tracker.register_error(id("b"), ErrorFactStatus::Open);
        tracker.record_error_dependency(id("a"), id("b"), RelationshipType::Blocks);
        tracker.mark_error_resolved(&id("a"));
        assert!(!tracker.has_blocking_dependencies(&id("b")));
        assert!(tracker.get_ready_errors().contains(&id("b")));
    }

    #[test]
    fn target_stays_blocked_while_another_blocker_is_unresolved() {
        let mut tracker = DependencyTracker::new();
        tracker.register_error(id("a"), ErrorFactStatus::Open);
        tracker.register_error(id("c"), ErrorFactStatus::Open);
        tracker.register_error(id("b"), ErrorFactStatus::Open);
        tracker.record_error_dependency(id("a"), id("b"), RelationshipType::Blocks);
        tracker.record_error_dependency(id("c"), id("b"), RelationshipType::Blocks);
        tracker.mark_error_resolved(&id("a"));
        assert!(tracker.has_blocking_dependencies(&id("b")));
    }

    #[test]
    fn duplicate_dependency_recorded_once() {
        let mut tracker = DependencyTracker::new();
        tracker.record_error_dependency(id("a"), id("b"), RelationshipType::Related);
        tracker.record_error_dependency(id("a"), id("b"), RelationshipType::Related);
        assert_eq!(tracker.build_dependency_graph().get(&id("a")).unwrap().len(), 1);
    }
}
