//! The Planning node (spec §4.4): resolve and reserve the target path,
//! decompose complex diagnoses into an `ErrorDag`, and ask the LLM for a
//! concrete plan.

use std::collections::HashSet;

use tracing::info;

use crate::discovery::to_absolute_path;
use crate::error::RepairError;
use crate::knowledge::trajectories::find_optimal_path;
use crate::knowledge::KnowledgeStore;
use crate::llm::{generate_with_backoff, LlmProvider, LlmRequest};
use crate::sandbox::Sandbox;
use crate::types::{
    ClassifiedError, ErrorDag, ErrorDagNode, ErrorDagNodeStatus, ErrorNodeId, GraphState, LlmMetric, NodeName,
    T_DECOMPOSE,
};

use super::map_llm_error;

/// Decompose a diagnosis into one sub-problem node per affected file, plus
/// an "integrate" node depending on all of them once every file's edit is
/// solved (spec §4.4). Falls back to the prior single-root shape when there
/// is at most one affected file to split on.
fn decompose(diagnosis_summary: &str, classification: &ClassifiedError, complexity: u8) -> Vec<ErrorDagNode> {
    let priority = classification.priority;
    let files = &classification.affected_files;

    if files.len() <= 1 {
        return vec![ErrorDagNode {
            id: ErrorNodeId::new("root"),
            problem: diagnosis_summary.to_string(),
            dependencies: Vec::new(),
            status: ErrorDagNodeStatus::Pending,
            complexity,
            priority,
            affected_files: files.clone(),
        }];
    }

    let per_file_complexity = (complexity / u8::try_from(files.len()).unwrap_or(1)).max(1);
    let mut nodes: Vec<ErrorDagNode> = files
        .iter()
        .enumerate()
        .map(|(i, file)| ErrorDagNode {
            id: ErrorNodeId::new(format!("file-{i}")),
            problem: format!("{diagnosis_summary} ({file})"),
            dependencies: Vec::new(),
            status: ErrorDagNodeStatus::Pending,
            complexity: per_file_complexity,
            priority,
            affected_files: vec![file.clone()],
        })
        .collect();

    let integrate_deps = nodes.iter().map(|n| n.id.clone()).collect();
    nodes.push(ErrorDagNode {
        id: ErrorNodeId::new("integrate"),
        problem: format!("{diagnosis_summary} (integrate sub-fixes)"),
        dependencies: integrate_deps,
        status: ErrorDagNodeStatus::Pending,
        complexity,
        priority,
        affected_files: files.clone(),
    });
    nodes
}

/// Heuristic feasibility gate (spec FSM: `PLANNING -> ANALYSIS` when the
/// generated plan is judged infeasible): a plan that is empty or that
/// itself says the problem can't be resolved isn't worth executing.
fn plan_is_feasible(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    const INFEASIBLE_MARKERS: &[&str] = &[
        "cannot be fixed",
        "no viable plan",
        "unable to produce a plan",
        "insufficient information",
        "not possible to resolve",
    ];
    !INFEASIBLE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Heuristic complexity score (0–10) from a diagnosis's confidence and
/// breadth, feeding the `T_DECOMPOSE` check (spec §4.4).
fn estimate_complexity(state: &GraphState) -> u8 {
    let Some(classification) = &state.classification else {
        return 0;
    };
    let file_spread = u8::try_from(classification.affected_files.len().min(10)).unwrap_or(10);
    let confidence_penalty = ((1.0 - classification.confidence) * 5.0) as u8;
    (file_spread + confidence_penalty).min(10)
}

pub async fn run(
    state: &mut GraphState,
    sandbox: &dyn Sandbox,
    llm: &dyn LlmProvider,
    model: &str,
    knowledge: Option<&dyn KnowledgeStore>,
) -> Result<NodeName, RepairError> {
    let Some(diagnosis) = state.diagnosis.clone() else {
        return Err(RepairError::Uncaught {
            node: "planning".to_string(),
            message: "no diagnosis to plan against".to_string(),
        });
    };

    if !diagnosis.file_path.is_empty() {
        let resolved = to_absolute_path(sandbox.get_work_dir(), &diagnosis.file_path)
            .unwrap_or_else(|_| diagnosis.file_path.clone());
        state.file_reservations.insert(resolved);
    }

    let complexity = estimate_complexity(state);
    state.problem_complexity = Some(complexity);
    state.complexity_history.push(complexity);

    if complexity >= T_DECOMPOSE && state.error_dag.is_none() {
        let default_classification = ClassifiedError {
            category: crate::types::ErrorCategory::Unknown,
            confidence: 0.5,
            affected_files: Vec::new(),
            root_cause_log: String::new(),
            error_message: String::new(),
            suggested_action: None,
            historical_matches: None,
            priority: 5,
        };
        let classification = state.classification.as_ref().unwrap_or(&default_classification);
        let nodes = decompose(&diagnosis.summary, classification, complexity);
        match ErrorDag::try_new(nodes) {
            Ok(dag) => {
                let solved: HashSet<ErrorNodeId> =
                    state.solved_nodes.iter().map(|s| ErrorNodeId::new(s.clone())).collect();
                state.current_node_id = dag.next_ready_node(&solved).map(|n| n.id.0.clone());
                let node_count = dag.nodes.len();
                state.error_dag = Some(dag);
                state.push_history(
                    NodeName::Planning,
                    "decompose",
                    &format!("built error DAG with {node_count} node(s)"),
                );
            }
            Err(cycle_at) => {
                state.feedback.push(format!("DAG decomposition rejected a cycle at {cycle_at}"));
            }
        }
    }

    let optimal_path_hint = match knowledge {
        Some(store) => {
            let category = state
                .classification
                .as_ref()
                .map(|c| c.category.short_name())
                .unwrap_or_else(|| "unknown");
            find_optimal_path(store, category, complexity)
                .await
                .ok()
                .flatten()
        }
        None => None,
    };

    let prompt = match optimal_path_hint {
        Some(tools) => format!(
            "Produce a short, concrete remediation plan for this diagnosis.\n\nSummary: {}\nTarget file: {}\nFix action: {:?}\nA similar past problem was solved using this tool path: {:?}",
            diagnosis.summary, diagnosis.file_path, diagnosis.fix_action, tools
        ),
        None => format!(
            "Produce a short, concrete remediation plan for this diagnosis.\n\nSummary: {}\nTarget file: {}\nFix action: {:?}",
            diagnosis.summary, diagnosis.file_path, diagnosis.fix_action
        ),
    };

    let response = generate_with_backoff(
        llm,
        LlmRequest {
            prompt,
            model: model.to_string(),
            max_tokens: Some(512),
            temperature: Some(0.2),
        },
    )
    .await
    .map_err(map_llm_error)?;

    state.record_llm_call(LlmMetric {
        model: response.model.clone(),
        input_tokens: response.usage.input,
        output_tokens: response.usage.output,
        cost_usd: response.cost_usd,
        latency_ms: response.latency_ms,
    });

    info!(complexity, "plan generated");
    let plan_text = response.text.trim().to_string();

    if !plan_is_feasible(&plan_text) {
        state.feedback.push(format!("plan judged infeasible: {plan_text}"));
        state.push_history(NodeName::Planning, "plan", "plan judged infeasible, returning to analysis");
        return Ok(NodeName::Analysis);
    }

    state.plan = Some(plan_text);
    state.push_history(NodeName::Planning, "plan", "generated remediation plan");

    Ok(NodeName::Execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;

    fn sample_classification(affected_files: Vec<String>) -> ClassifiedError {
        ClassifiedError {
            category: ErrorCategory::Unknown,
            confidence: 0.5,
            affected_files,
            root_cause_log: String::new(),
            error_message: String::new(),
            suggested_action: None,
            historical_matches: None,
            priority: 5,
        }
    }

    #[test]
    fn decompose_falls_back_to_single_root_for_one_file() {
        let classification = sample_classification(vec!["a.rs".into()]);
        let nodes = decompose("fix a.rs", &classification, 8);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id.as_str(), "root");
    }

    #[test]
    fn decompose_splits_multi_file_diagnoses_with_an_integrate_node() {
        let classification = sample_classification(vec!["a.rs".into(), "b.rs".into(), "c.rs".into()]);
        let nodes = decompose("fix the build", &classification, 9);
        assert_eq!(nodes.len(), 4);
        let integrate = nodes.iter().find(|n| n.id.as_str() == "integrate").unwrap();
        assert_eq!(integrate.dependencies.len(), 3);
        let dag = ErrorDag::try_new(nodes).unwrap();
        assert!(dag.next_ready_node(&HashSet::new()).is_some());
    }

    #[test]
    fn plan_is_feasible_rejects_empty_and_explicit_refusals() {
        assert!(!plan_is_feasible(""));
        assert!(!plan_is_feasible("There is no viable plan for this diagnosis."));
        assert!(plan_is_feasible("Add a missing semicolon to src/lib.rs line 12."));
    }

    #[test]
    fn complexity_rises_with_file_spread_and_low_confidence() {
        let mut state = GraphState::new("log".into(), "ctx".into(), 5);
        state.classification = Some(ClassifiedError {
            category: ErrorCategory::Unknown,
            confidence: 0.9,
            affected_files: vec!["a.rs".into()],
            root_cause_log: String::new(),
            error_message: String::new(),
            suggested_action: None,
            historical_matches: None,
            priority: 5,
        });
        let low = estimate_complexity(&state);

        state.classification.as_mut().unwrap().confidence = 0.1;
        state.classification.as_mut().unwrap().affected_files =
            (0..8).map(|i| format!("f{i}.rs")).collect();
        let high = estimate_complexity(&state);

        assert!(high > low);
    }
}
