use serde::{Deserialize, Serialize};
use std::collections::{HashSet};

use super::diagnosis::{ClassifiedError, Diagnosis, ErrorDag};
use super::ids::ErrorFactId;

/// Node names of the graph state machine (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    Initial,
    Analysis,
    Planning,
    Execution,
    Verification,
    EnvRecovery,
    Success,
    Failure,
    Stopped,
}

/// Overall repair status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Working,
    Success,
    Failed,
    Stopped,
}

/// Language/name context carried alongside file content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVariant {
    pub content: String,
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeStatus {
    Modified,
    Created,
    Deleted,
}

/// A pending or applied edit to a single file. `modified.content` is
/// authoritative for verification and commit (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub original: FileVariant,
    pub modified: FileVariant,
    pub status: FileChangeStatus,
}

impl FileChange {
    /// Construct a `created` change; enforces `original.content == ""`.
    #[must_use]
    pub fn created(path: String, content: String, language: String) -> Self {
        let name = path.clone();
        Self {
            path,
            original: FileVariant {
                content: String::new(),
                language: language.clone(),
                name: name.clone(),
            },
            modified: FileVariant {
                content,
                language,
                name,
            },
            status: FileChangeStatus::Created,
        }
    }

    #[must_use]
    pub fn modified(path: String, original_content: String, new_content: String, language: String) -> Self {
        let name = path.clone();
        Self {
            path,
            original: FileVariant {
                content: original_content,
                language: language.clone(),
                name: name.clone(),
            },
            modified: FileVariant {
                content: new_content,
                language,
                name,
            },
            status: FileChangeStatus::Modified,
        }
    }
}

/// One entry in the structured history trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub node: NodeName,
    pub action: String,
    pub result: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A single LLM call's cost/latency accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMetric {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// The mutable state of one repair, exclusively owned by the Graph Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    // control
    pub current_node: NodeName,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: RunStatus,
    pub failure_reason: Option<String>,

    // artifacts
    pub classification: Option<ClassifiedError>,
    pub diagnosis: Option<Diagnosis>,
    pub plan: Option<String>,
    pub problem_complexity: Option<u8>,
    pub complexity_history: Vec<u8>,
    pub error_dag: Option<ErrorDag>,
    pub solved_nodes: Vec<String>,
    pub current_node_id: Option<String>,
    pub is_atomic: Option<bool>,
    pub refined_problem_statement: Option<String>,

    // data
    pub initial_log_text: String,
    pub current_log_text: String,
    pub initial_repo_context: String,
    pub feedback: Vec<String>,
    pub history: Vec<HistoryEntry>,

    // I/O
    pub files: std::collections::BTreeMap<String, FileChange>,
    pub file_reservations: HashSet<String>,

    // budget
    pub budget_remaining: Option<f64>,
    pub total_cost_accumulated: f64,
    pub total_latency_accumulated_ms: u64,
    pub llm_metrics: Vec<LlmMetric>,

    // learning
    pub reward_history: Vec<f64>,
    pub selected_model: Option<String>,
    pub selected_tools: Vec<String>,

    // loop detection
    pub loop_detected: bool,
    pub loop_guidance: Option<String>,

    // knowledge-base linkage
    pub current_error_fact_id: Option<ErrorFactId>,
}

impl GraphState {
    #[must_use]
    pub fn new(initial_log_text: String, initial_repo_context: String, max_iterations: u32) -> Self {
        Self {
            current_node: NodeName::Initial,
            iteration: 0,
            max_iterations,
            status: RunStatus::Working,
            failure_reason: None,
            classification: None,
            diagnosis: None,
            plan: None,
            problem_complexity: None,
            complexity_history: Vec::new(),
            error_dag: None,
            solved_nodes: Vec::new(),
            current_node_id: None,
            is_atomic: None,
            refined_problem_statement: None,
            initial_log_text: initial_log_text.clone(),
            current_log_text: initial_log_text,
            initial_repo_context,
            feedback: Vec::new(),
            history: Vec::new(),
            files: std::collections::BTreeMap::new(),
            file_reservations: HashSet::new(),
            budget_remaining: None,
            total_cost_accumulated: 0.0,
            total_latency_accumulated_ms: 0,
            llm_metrics: Vec::new(),
            reward_history: Vec::new(),
            selected_model: None,
            selected_tools: Vec::new(),
            loop_detected: false,
            loop_guidance: None,
            current_error_fact_id: None,
        }
    }

    /// Invariant 1 (spec §8): `fileReservations ⊆ domain(files) ∪
    /// {diagnosis.filePath}`.
    #[must_use]
    pub fn reservations_are_valid(&self) -> bool {
        let diagnosis_path = self.diagnosis.as_ref().map(|d| d.file_path.as_str());
        self.file_reservations
            .iter()
            .all(|p| self.files.contains_key(p) || Some(p.as_str()) == diagnosis_path)
    }

    pub fn record_llm_call(&mut self, metric: LlmMetric) {
        self.total_cost_accumulated += metric.cost_usd;
        self.total_latency_accumulated_ms += metric.latency_ms;
        self.llm_metrics.push(metric);
    }

    pub fn push_history(&mut self, node: NodeName, action: impl Into<String>, result: impl Into<String>) {
        self.history.push(HistoryEntry {
            node,
            action: action.into(),
            result: result.into(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// A read-only, serializable view of `GraphState` published to the observer
/// callback on every transition (spec §4.2, §9 "explicit state-patch
/// return").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStateSnapshot {
    pub current_node: NodeName,
    pub iteration: u32,
    pub status: RunStatus,
    pub failure_reason: Option<String>,
    pub active_log: String,
}

impl From<&GraphState> for GraphStateSnapshot {
    fn from(state: &GraphState) -> Self {
        let active_log = state
            .history
            .iter()
            .map(|h| format!("[{:?}] {}: {}", h.node, h.action, h.result))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            current_node: state.current_node,
            iteration: state.iteration,
            status: state.status,
            failure_reason: state.failure_reason.clone(),
            active_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_change_created_has_empty_original() {
        let fc = FileChange::created("a.rs".into(), "fn main() {}".into(), "rust".into());
        assert_eq!(fc.original.content, "");
        assert_eq!(fc.status, FileChangeStatus::Created);
    }

    #[test]
    fn reservations_valid_when_subset_of_files_or_diagnosis_path() {
        let mut state = GraphState::new("log".into(), "ctx".into(), 5);
        state.files.insert(
            "a.rs".into(),
            FileChange::created("a.rs".into(), "x".into(), "rust".into()),
        );
        state.file_reservations.insert("a.rs".into());
        assert!(state.reservations_are_valid());

        state.file_reservations.insert("b.rs".into());
        assert!(!state.reservations_are_valid());
    }
}
