//! Span-per-node tracing and counters, gated by [`config::EnvConfig`]'s
//! `OtelExporter` selection. The engine always emits `tracing` spans;
//! whether they're also shipped to an OTLP collector is an operator
//! decision made at process start (`init_tracing`, in `repair-cli`).

use tracing::{info_span, Span};

/// Span covering one node's full execution, tagged with the identifying
/// triple the engine publishes to the observer callback too.
pub fn node_span(run_id: &str, node: &str, iteration: u32) -> Span {
    info_span!("graph.node", run_id = %run_id, node = %node, iteration = iteration)
}

/// Counters recorded once per run; named to match the teacher's
/// `agent.run.*`/`llm.*` convention so dashboards built against the
/// teacher's metrics keep working unmodified.
pub struct RunCounters;

impl RunCounters {
    pub fn run_succeeded() {
        tracing::info!(counter.name = "agent.run.success", value = 1u64);
    }

    pub fn run_failed() {
        tracing::info!(counter.name = "agent.run.failed", value = 1u64);
    }

    pub fn iteration_started(iteration: u32) {
        tracing::info!(counter.name = "agent.iterations", value = 1u64, iteration);
    }

    pub fn llm_call_recorded(cost_usd: f64) {
        tracing::info!(counter.name = "llm.calls", value = 1u64);
        tracing::info!(counter.name = "llm.cost_usd", value = cost_usd);
    }
}
