//! The Analysis node (spec §4.3): classify the active log text, diagnose a
//! fix, suppress cascading duplicates of an already-diagnosed root cause,
//! and record the observation in the knowledge base.

use tracing::info;

use crate::dependency_tracker::DependencyTracker;
use crate::error::RepairError;
use crate::knowledge::{fingerprint, KnowledgeStore};
use crate::llm::{generate_with_backoff, LlmProvider, LlmRequest};
use crate::types::{
    ClassifiedError, Diagnosis, ErrorFact, ErrorFactId, ErrorFactStatus, ErrorNotes, FixAction, GraphState,
    LlmMetric, NodeName, RelationshipType,
};

use super::map_llm_error;

const FILE_PATH_PATTERN: &str = r"([a-zA-Z0-9_./-]+\.[a-zA-Z0-9]{1,10}):\d+";

fn extract_affected_files(log_text: &str) -> Vec<String> {
    let re = regex::Regex::new(FILE_PATH_PATTERN).expect("static pattern is valid");
    let mut files: Vec<String> = re
        .captures_iter(log_text)
        .map(|c| c[1].to_string())
        .collect();
    files.sort();
    files.dedup();
    files
}

/// Heuristic 0–10 priority score from category alone (spec §4.2: drives the
/// low-priority iteration cap).
fn priority_for(category: crate::types::ErrorCategory) -> u8 {
    use crate::types::ErrorCategory::{
        DependencyConflict, DiskSpace, EnvironmentUnstable, Import, Logic, Network, Runtime, Syntax,
        TestFailure, Type, Unknown,
    };
    match category {
        DiskSpace | EnvironmentUnstable => 9,
        DependencyConflict | Network => 7,
        Syntax | Type | Import => 6,
        TestFailure | Runtime | Logic => 5,
        crate::types::ErrorCategory::Dependency => 6,
        Unknown => 3,
    }
}

pub async fn run(
    state: &mut GraphState,
    llm: &dyn LlmProvider,
    model: &str,
    knowledge: Option<&dyn KnowledgeStore>,
    dependency_tracker: &mut DependencyTracker,
    run_id: &str,
) -> Result<NodeName, RepairError> {
    let category = crate::types::ErrorCategory::classify(&state.current_log_text);
    let affected_files = extract_affected_files(&state.current_log_text);
    let priority = priority_for(category);

    let candidate = ClassifiedError {
        category,
        confidence: 0.7,
        affected_files: affected_files.clone(),
        root_cause_log: state.current_log_text.clone(),
        error_message: state
            .current_log_text
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
        suggested_action: None,
        historical_matches: None,
        priority,
    };

    // Cascade suppression (spec §4.3 step 4): a strict subset of the
    // already-diagnosed root cause carries no new information. Clone the
    // previous classification before mutating `state` to avoid borrowing it
    // and `state.classification` at once.
    if let Some(previous) = state.classification.clone() {
        if candidate.is_strict_subset_of(&previous) {
            state.current_log_text = previous.root_cause_log.clone();
            state.push_history(
                NodeName::Analysis,
                "suppress_cascade",
                "classified error is a strict subset of the prior diagnosis; reusing it",
            );
            return Ok(NodeName::Planning);
        }
    }

    let fp = fingerprint::compute(category, &candidate.error_message, &affected_files);
    let fact_id = ErrorFactId::new(fp.as_str());
    dependency_tracker.register_error(fact_id.clone(), ErrorFactStatus::Open);
    if let Some(previous_id) = state.current_error_fact_id.clone() {
        if previous_id != fact_id {
            dependency_tracker.record_error_dependency(previous_id, fact_id.clone(), RelationshipType::DiscoveredFrom);
        }
    }
    if dependency_tracker.has_blocking_dependencies(&fact_id) {
        state.feedback.push(format!(
            "error {} has unresolved blocking dependencies; diagnosis may be premature",
            fact_id.as_str()
        ));
    }

    let prompt = match state.loop_guidance.take() {
        Some(guidance) => format!(
            "{guidance}\n\nDiagnose this CI failure and respond with a single-sentence fix summary.\n\nCategory: {}\nAffected files: {:?}\nLog:\n{}",
            category.short_name(),
            affected_files,
            truncate(&state.current_log_text, 4000),
        ),
        None => format!(
            "Diagnose this CI failure and respond with a single-sentence fix summary.\n\nCategory: {}\nAffected files: {:?}\nLog:\n{}",
            category.short_name(),
            affected_files,
            truncate(&state.current_log_text, 4000),
        ),
    };

    let started = std::time::Instant::now();
    let response = generate_with_backoff(
        llm,
        LlmRequest {
            prompt,
            model: model.to_string(),
            max_tokens: Some(256),
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
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "analysis LLM call complete");

    let fix_action = if affected_files.is_empty() {
        FixAction::Command
    } else {
        FixAction::Edit
    };

    let diagnosis = Diagnosis {
        summary: response.text.trim().to_string(),
        file_path: affected_files.first().cloned().unwrap_or_default(),
        fix_action,
        suggested_command: None,
        reproduction_command: None,
        confidence: candidate.confidence,
    };

    state.current_error_fact_id = Some(fact_id.clone());

    if let Some(store) = knowledge {
        let fact = ErrorFact {
            id: fact_id,
            run_id: run_id.to_string(),
            summary: diagnosis.summary.clone(),
            file_path: diagnosis.file_path.clone(),
            fix_action,
            status: ErrorFactStatus::InProgress,
            notes: ErrorNotes::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let _ = store.record_error_fact(fact).await;
    }

    state.push_history(NodeName::Analysis, "diagnose", &diagnosis.summary);
    state.classification = Some(candidate);
    state.diagnosis = Some(diagnosis);

    Ok(NodeName::Planning)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_file_paths_with_line_numbers() {
        let log = "error[E0425]: cannot find value `x` in src/lib.rs:42:5\nsome other line";
        assert_eq!(extract_affected_files(log), vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn dedupes_and_sorts_affected_files() {
        let log = "src/b.rs:1:1\nsrc/a.rs:2:2\nsrc/a.rs:2:2";
        assert_eq!(
            extract_affected_files(log),
            vec!["src/a.rs".to_string(), "src/b.rs".to_string()]
        );
    }

    #[test]
    fn priority_ranks_environment_issues_highest() {
        assert!(priority_for(crate::types::ErrorCategory::DiskSpace) > priority_for(crate::types::ErrorCategory::Unknown));
    }
}
