//! The deterministic repair-loop state machine (spec §4.2, §9 design note:
//! tagged-variant node dispatch with explicit state updates rather than
//! dynamic dispatch through a trait object per node).

use std::sync::Arc;

use tracing::{error, info};

use crate::knowledge::KnowledgeStore;
use crate::llm::LlmProvider;
use crate::observability::{node_span, RunCounters};
use crate::sandbox::Sandbox;
use crate::types::{GraphState, GraphStateSnapshot, NodeName, RunStatus};

use super::nodes::{analysis, env_recovery, execution, planning, verification};
use crate::error::{ErrorKind, RepairError};

/// Low-priority diagnoses (`priority < 5`) get a tighter iteration budget
/// so the agent doesn't burn the full run on cosmetic failures (spec §4.2).
const LOW_PRIORITY_ITERATION_CAP: u32 = 3;

/// Published to subscribers on every node transition (spec §9 — the engine
/// never blocks on observers; failures there are the caller's problem).
pub trait GraphObserver: Send + Sync {
    fn on_transition(&self, snapshot: &GraphStateSnapshot);
}

/// Drives one run's `GraphState` through the node transition table.
pub struct GraphEngine {
    llm: Arc<dyn LlmProvider>,
    model: String,
    max_iterations: u32,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
}

impl GraphEngine {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>, model: String, max_iterations: u32) -> Self {
        Self {
            llm,
            model,
            max_iterations,
            knowledge: None,
        }
    }

    #[must_use]
    pub fn with_knowledge(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    pub async fn run(
        &self,
        sandbox: &dyn Sandbox,
        initial_log_text: String,
        repo_context: String,
        observer: Option<Arc<dyn GraphObserver>>,
    ) -> Result<GraphStateSnapshot, RepairError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut state = GraphState::new(initial_log_text, repo_context, self.max_iterations);
        let mut loop_detector = crate::loop_detector::LoopDetector::new();
        let mut dependency_tracker = crate::dependency_tracker::DependencyTracker::new();
        state.current_node = NodeName::Analysis;

        loop {
            if let Some(obs) = &observer {
                obs.on_transition(&GraphStateSnapshot::from(&state));
            }

            let next = self
                .step(&mut state, sandbox, &mut loop_detector, &mut dependency_tracker, &run_id)
                .await;

            match next {
                Ok(NodeName::Success) => {
                    RunCounters::run_succeeded();
                    state.current_node = NodeName::Success;
                    break;
                }
                Ok(NodeName::Failure) => {
                    RunCounters::run_failed();
                    state.current_node = NodeName::Failure;
                    break;
                }
                Ok(NodeName::Stopped) => {
                    state.current_node = NodeName::Stopped;
                    break;
                }
                Ok(node) => {
                    state.current_node = node;
                }
                Err(e) => {
                    if e.is_terminal() {
                        error!(error = %e, "terminal node error, ending run");
                        RunCounters::run_failed();
                        state.status = RunStatus::Failed;
                        state.failure_reason = Some(e.to_string());
                        state.current_node = NodeName::Failure;
                        break;
                    }
                    // Non-terminal errors feed back into the loop rather than
                    // propagating (spec §7 propagation policy).
                    state.feedback.push(e.to_string());
                    state.current_node = recovery_target_for(&e);
                }
            }
        }

        if let Some(obs) = &observer {
            obs.on_transition(&GraphStateSnapshot::from(&state));
        }

        Ok(GraphStateSnapshot::from(&state))
    }

    async fn step(
        &self,
        state: &mut GraphState,
        sandbox: &dyn Sandbox,
        loop_detector: &mut crate::loop_detector::LoopDetector,
        dependency_tracker: &mut crate::dependency_tracker::DependencyTracker,
        run_id: &str,
    ) -> Result<NodeName, RepairError> {
        match state.current_node {
            NodeName::Initial => Ok(NodeName::Analysis),

            NodeName::Analysis => {
                state.iteration += 1;
                RunCounters::iteration_started(state.iteration);

                if state.iteration > state.max_iterations {
                    return Err(RepairError::IterationBudgetExceeded);
                }
                if state
                    .classification
                    .as_ref()
                    .is_some_and(crate::types::ClassifiedError::is_low_priority)
                    && state.iteration > LOW_PRIORITY_ITERATION_CAP
                {
                    return Err(RepairError::IterationBudgetExceeded);
                }

                let span = node_span(run_id, "analysis", state.iteration);
                let _enter = span.enter();
                analysis::run(
                    state,
                    self.llm.as_ref(),
                    &self.model,
                    self.knowledge_ref(),
                    dependency_tracker,
                    run_id,
                )
                .await
            }

            NodeName::Planning => {
                let span = node_span(run_id, "planning", state.iteration);
                let _enter = span.enter();
                planning::run(state, sandbox, self.llm.as_ref(), &self.model, self.knowledge_ref()).await
            }

            NodeName::Execution => {
                let span = node_span(run_id, "execution", state.iteration);
                let _enter = span.enter();
                execution::run(state, sandbox, self.llm.as_ref(), &self.model, loop_detector).await
            }

            NodeName::Verification => {
                let span = node_span(run_id, "verification", state.iteration);
                let _enter = span.enter();
                verification::run(state, sandbox, loop_detector, dependency_tracker, self.knowledge_ref()).await
            }

            NodeName::EnvRecovery => {
                let span = node_span(run_id, "env_recovery", state.iteration);
                let _enter = span.enter();
                env_recovery::run(state, sandbox).await
            }

            NodeName::Success | NodeName::Failure | NodeName::Stopped => {
                info!(node = ?state.current_node, "run already in a terminal node");
                Ok(state.current_node)
            }
        }
    }

    fn knowledge_ref(&self) -> Option<&dyn KnowledgeStore> {
        self.knowledge.as_deref()
    }
}

/// Where a non-terminal error sends the run: navigation/verification kinds
/// retry from Analysis, environment kinds go through recovery first.
fn recovery_target_for(err: &RepairError) -> NodeName {
    match err.kind() {
        ErrorKind::Environment => NodeName::EnvRecovery,
        ErrorKind::Transient | ErrorKind::Verification | ErrorKind::Navigation => NodeName::Analysis,
        ErrorKind::Terminal => NodeName::Failure,
    }
}
