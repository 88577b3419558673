//! The Verification node (spec §4.6): apply the reproduction command,
//! detect mass-failure signatures that warrant environment recovery rather
//! than another diagnosis pass, and feed genuine failures back to Analysis.

use tracing::{info, warn};

use crate::dependency_tracker::DependencyTracker;
use crate::error::RepairError;
use crate::knowledge::patterns::upsert_seen_pattern;
use crate::knowledge::KnowledgeStore;
use crate::loop_detector::{LoopDetector, StateSnapshot, LOOP_DETECTED_BANNER};
use crate::reproduction::resolve_reproduction_command;
use crate::sandbox::Sandbox;
use crate::types::{ErrorCategory, FileEdit, FixTemplate, GraphState, NodeName, RunStatus};

pub async fn run(
    state: &mut GraphState,
    sandbox: &dyn Sandbox,
    loop_detector: &mut LoopDetector,
    dependency_tracker: &mut DependencyTracker,
    knowledge: Option<&dyn KnowledgeStore>,
) -> Result<NodeName, RepairError> {
    let Some(diagnosis) = state.diagnosis.clone() else {
        return Err(RepairError::Uncaught {
            node: "verification".to_string(),
            message: "no diagnosis to verify".to_string(),
        });
    };

    let command = match &diagnosis.reproduction_command {
        Some(cmd) => cmd.clone(),
        None => resolve_reproduction_command(sandbox, None, &diagnosis.summary)
            .await
            .map(|c| c.command)
            .unwrap_or_else(|| "cargo check --workspace".to_string()),
    };

    let output = sandbox
        .run_command(&command, Some(std::time::Duration::from_secs(300)))
        .await
        .map_err(|e| RepairError::NetworkIo(e.to_string()))?;

    if output.is_timeout() {
        return Err(RepairError::CommandTimeout(300));
    }

    let combined = format!("{}{}", output.stdout, output.stderr);
    let category = ErrorCategory::classify(&combined);

    if output.success() {
        info!(command = %command, "verification passed");
        state.push_history(NodeName::Verification, "verify", "reproduction command succeeded");
        state.status = RunStatus::Success;

        if let Some(id) = &state.current_error_fact_id {
            dependency_tracker.mark_error_resolved(id);
        }

        if let Some(store) = knowledge {
            if let Some(classification) = &state.classification {
                let fp = crate::knowledge::fingerprint::compute(
                    classification.category,
                    &classification.error_message,
                    &classification.affected_files,
                );
                let _ = store.record_solution_outcome(&fp, true, u64::from(state.iteration)).await;

                let template = if state.files.is_empty() {
                    FixTemplate::Command { command: command.clone() }
                } else {
                    FixTemplate::Edit {
                        edits: state
                            .files
                            .values()
                            .map(|f| FileEdit {
                                path: f.path.clone(),
                                before: f.original.content.clone(),
                                after: f.modified.content.clone(),
                            })
                            .collect(),
                    }
                };
                let _ = upsert_seen_pattern(store, fp, template, true).await;
            }
        }
        return Ok(NodeName::Success);
    }

    if category == ErrorCategory::EnvironmentUnstable {
        warn!("mass-failure signature detected, routing to environment recovery");
        state.push_history(NodeName::Verification, "verify", "mass-failure signature detected");
        return Ok(NodeName::EnvRecovery);
    }

    let modified_contents: Vec<String> = state.files.values().map(|f| f.modified.content.clone()).collect();
    let snapshot = StateSnapshot::new(&diagnosis.summary, &modified_contents);
    if loop_detector.record_snapshot(snapshot) {
        state.loop_detected = true;
        state.loop_guidance = Some(LOOP_DETECTED_BANNER.to_string());
        state.feedback.push(LOOP_DETECTED_BANNER.to_string());
        return Ok(NodeName::Analysis);
    }

    state.current_log_text = combined;
    state.feedback.push(format!("reproduction command still failing: {command}"));
    state.push_history(NodeName::Verification, "verify", "reproduction command failed, retrying analysis");

    if let Some(store) = knowledge {
        if let Some(classification) = &state.classification {
            let fp = crate::knowledge::fingerprint::compute(
                classification.category,
                &classification.error_message,
                &classification.affected_files,
            );
            let _ = store.record_solution_outcome(&fp, false, u64::from(state.iteration)).await;
        }
    }

    Ok(NodeName::Analysis)
}
