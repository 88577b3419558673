//! State-machine nodes (spec §4.2–§4.6). Each node is a free function
//! `run(state, ..collaborators..) -> Result<NodeName, RepairError>`: it
//! mutates `GraphState` in place and returns the next node name, which the
//! engine matches on to drive the transition table. There's no dynamic
//! dispatch here — the engine's `match` on `NodeName` is the dispatch.

pub mod analysis;
pub mod env_recovery;
pub mod execution;
pub mod planning;
pub mod verification;

use crate::error::RepairError;
use crate::llm::LlmError;

/// Map a provider-level error onto the node-error taxonomy (spec §7):
/// rate limits and transient failures stay retryable, terminal provider
/// errors become an uncaught node error which ends the run.
pub(crate) fn map_llm_error(err: LlmError) -> RepairError {
    match err {
        LlmError::RateLimited => RepairError::LlmRateLimited("provider rate limit".to_string()),
        LlmError::Transient(msg) => RepairError::NetworkIo(msg),
        LlmError::Terminal(msg) => RepairError::Uncaught {
            node: "llm".to_string(),
            message: msg,
        },
    }
}
