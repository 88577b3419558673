use serde::{Deserialize, Serialize};

use super::ids::ErrorNodeId;

/// Closed enumeration of error categories (Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Runtime,
    Logic,
    Dependency,
    DependencyConflict,
    Type,
    Import,
    Network,
    DiskSpace,
    EnvironmentUnstable,
    TestFailure,
    Unknown,
}

impl ErrorCategory {
    /// A short, stable token used in fingerprints and logs.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Runtime => "runtime",
            Self::Logic => "logic",
            Self::Dependency => "dependency",
            Self::DependencyConflict => "dependency_conflict",
            Self::Type => "type",
            Self::Import => "import",
            Self::Network => "network",
            Self::DiskSpace => "disk_space",
            Self::EnvironmentUnstable => "environment_unstable",
            Self::TestFailure => "test_failure",
            Self::Unknown => "unknown",
        }
    }

    /// Classify raw log/error text by ordered, most-specific-first keyword
    /// matching. Order matters: a message can match several categories, and
    /// the first rule that fires wins.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();

        if lower.contains("enospc") || lower.contains("no space left on device") {
            return Self::DiskSpace;
        }
        if lower.contains("mass failure")
            || lower.contains("tests failed")
            || lower.contains("environment is unstable")
        {
            return Self::EnvironmentUnstable;
        }
        if lower.contains("syntaxerror")
            || lower.contains("syntax error")
            || lower.contains("unexpected token")
            || lower.contains("parse error")
        {
            return Self::Syntax;
        }
        if lower.contains("cannot find module")
            || lower.contains("modulenotfounderror")
            || lower.contains("importerror")
            || lower.contains("unresolved import")
        {
            return Self::Import;
        }
        if lower.contains("dependency conflict")
            || lower.contains("version solving failed")
            || lower.contains("conflicting requirements")
        {
            return Self::DependencyConflict;
        }
        if lower.contains("module not found")
            || lower.contains("package not found")
            || lower.contains("could not resolve")
            || lower.contains("no matching package")
        {
            return Self::Dependency;
        }
        if lower.contains("typeerror")
            || lower.contains("type error")
            || lower.contains("mismatched types")
            || lower.contains("type mismatch")
        {
            return Self::Type;
        }
        if lower.contains("econnrefused")
            || lower.contains("enotfound")
            || lower.contains("network error")
            || lower.contains("connection refused")
            || lower.contains("dns resolution")
            || lower.contains("timed out")
        {
            return Self::Network;
        }
        if lower.contains("assertion")
            || lower.contains("assert_eq")
            || lower.contains("test failed")
            || lower.contains("expect(")
        {
            return Self::TestFailure;
        }
        if lower.contains("panic") || lower.contains("traceback") || lower.contains("exception") {
            return Self::Runtime;
        }
        if lower.contains("logic") || lower.contains("incorrect result") {
            return Self::Logic;
        }

        Self::Unknown
    }
}

/// What kind of artifact a diagnosis resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    Edit,
    Create,
    Command,
}

/// Output of the Analysis node's classification step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub confidence: f64,
    pub affected_files: Vec<String>,
    pub root_cause_log: String,
    pub error_message: String,
    pub suggested_action: Option<String>,
    pub historical_matches: Option<Vec<String>>,
    /// Priority on a 0–10 scale; low-priority errors (<5) get a capped
    /// iteration budget (spec §4.2).
    pub priority: u8,
}

impl ClassifiedError {
    #[must_use]
    pub fn is_low_priority(&self) -> bool {
        self.priority < 5
    }

    /// True iff `other` strictly subsumes `self`: same category, same
    /// affected files, strictly fewer log lines (spec §4.3 step 4 — cascade
    /// suppression, applied in the opposite direction by the caller).
    #[must_use]
    pub fn is_strict_subset_of(&self, other: &Self) -> bool {
        self.category == other.category
            && self.affected_files == other.affected_files
            && self.root_cause_log.lines().count() < other.root_cause_log.lines().count()
    }
}

/// Output of the Analysis node's diagnosis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub summary: String,
    pub file_path: String,
    pub fix_action: FixAction,
    pub suggested_command: Option<String>,
    pub reproduction_command: Option<String>,
    pub confidence: f64,
}

/// One atomic sub-problem inside an `ErrorDAG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDagNode {
    pub id: ErrorNodeId,
    pub problem: String,
    pub dependencies: Vec<ErrorNodeId>,
    pub status: ErrorDagNodeStatus,
    pub complexity: u8,
    pub priority: u8,
    pub affected_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDagNodeStatus {
    Pending,
    Solved,
}

/// A directed acyclic graph of sub-problems produced when a diagnosis's
/// complexity score meets `T_decompose` (spec §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDag {
    pub nodes: Vec<ErrorDagNode>,
}

/// Complexity threshold above which the Planning node decomposes a
/// diagnosis into an `ErrorDag` (spec §4.4).
pub const T_DECOMPOSE: u8 = 7;

impl ErrorDag {
    /// Build a DAG from nodes, rejecting it if it contains a cycle.
    ///
    /// # Errors
    /// Returns `Err` with the id that closed a cycle.
    pub fn try_new(nodes: Vec<ErrorDagNode>) -> Result<Self, ErrorNodeId> {
        let dag = Self { nodes };
        dag.assert_acyclic()?;
        Ok(dag)
    }

    fn assert_acyclic(&self) -> Result<(), ErrorNodeId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        use std::collections::HashMap;

        let mut marks: HashMap<&ErrorNodeId, Mark> =
            self.nodes.iter().map(|n| (&n.id, Mark::Unvisited)).collect();

        fn visit<'a>(
            node_id: &'a ErrorNodeId,
            by_id: &HashMap<&'a ErrorNodeId, &'a ErrorDagNode>,
            marks: &mut HashMap<&'a ErrorNodeId, Mark>,
        ) -> Result<(), ErrorNodeId> {
            match marks.get(node_id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(node_id.clone()),
                _ => {}
            }
            marks.insert(node_id, Mark::InProgress);
            if let Some(node) = by_id.get(node_id) {
                for dep in &node.dependencies {
                    visit(dep, by_id, marks)?;
                }
            }
            marks.insert(node_id, Mark::Done);
            Ok(())
        }

        let by_id: HashMap<&ErrorNodeId, &ErrorDagNode> =
            self.nodes.iter().map(|n| (&n.id, n)).collect();

        for node in &self.nodes {
            visit(&node.id, &by_id, &mut marks)?;
        }
        Ok(())
    }

    /// The next node to work on: highest priority among nodes whose
    /// dependencies are all in `solved`, ties broken by lowest complexity
    /// then earliest id lexicographically (spec §4.4 tie-breaks).
    #[must_use]
    pub fn next_ready_node(&self, solved: &std::collections::HashSet<ErrorNodeId>) -> Option<&ErrorDagNode> {
        self.nodes
            .iter()
            .filter(|n| n.status == ErrorDagNodeStatus::Pending)
            .filter(|n| n.dependencies.iter().all(|d| solved.contains(d)))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.complexity.cmp(&a.complexity))
                    .then_with(|| b.id.0.cmp(&a.id.0))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_specific_patterns() {
        assert_eq!(
            ErrorCategory::classify("SyntaxError: unexpected token"),
            ErrorCategory::Syntax
        );
        assert_eq!(
            ErrorCategory::classify("ModuleNotFoundError: no module named 'foo'"),
            ErrorCategory::Import
        );
        assert_eq!(ErrorCategory::classify("50 tests failed, MASS FAILURE"), ErrorCategory::EnvironmentUnstable);
        assert_eq!(ErrorCategory::classify("something odd happened"), ErrorCategory::Unknown);
    }

    #[test]
    fn dag_rejects_cycles() {
        let a = ErrorDagNode {
            id: ErrorNodeId::new("a"),
            problem: "A".into(),
            dependencies: vec![ErrorNodeId::new("b")],
            status: ErrorDagNodeStatus::Pending,
            complexity: 1,
            priority: 5,
            affected_files: vec![],
        };
        let b = ErrorDagNode {
            id: ErrorNodeId::new("b"),
            problem: "B".into(),
            dependencies: vec![ErrorNodeId::new("a")],
            status: ErrorDagNodeStatus::Pending,
            complexity: 1,
            priority: 5,
            affected_files: vec![],
        };
        assert!(ErrorDag::try_new(vec![a, b]).is_err());
    }

    #[test]
    fn dag_next_ready_node_respects_tie_breaks() {
        let root = ErrorDagNode {
            id: ErrorNodeId::new("root"),
            problem: "root".into(),
            dependencies: vec![],
            status: ErrorDagNodeStatus::Solved,
            complexity: 1,
            priority: 10,
            affected_files: vec![],
        };
        let high_priority = ErrorDagNode {
            id: ErrorNodeId::new("z-high"),
            problem: "high priority".into(),
            dependencies: vec![ErrorNodeId::new("root")],
            status: ErrorDagNodeStatus::Pending,
            complexity: 3,
            priority: 9,
            affected_files: vec![],
        };
        let low_priority = ErrorDagNode {
            id: ErrorNodeId::new("a-low"),
            problem: "low priority".into(),
            dependencies: vec![ErrorNodeId::new("root")],
            status: ErrorDagNodeStatus::Pending,
            complexity: 1,
            priority: 3,
            affected_files: vec![],
        };
        let dag = ErrorDag::try_new(vec![root, high_priority, low_priority]).unwrap();
        let mut solved = std::collections::HashSet::new();
        solved.insert(ErrorNodeId::new("root"));
        let next = dag.next_ready_node(&solved).unwrap();
        assert_eq!(next.id, ErrorNodeId::new("z-high"));
    }
}
