use thiserror::Error;

/// Errors a node can raise, grouped by the propagation-policy taxonomy of
/// spec §7. Nodes never re-raise for `Transient`/`Verification`/
/// `Navigation`/`Environment` kinds; they append to `feedback` and return a
/// partial state update instead. Only `Terminal` kinds cause the engine to
/// end the run in `FAILURE`.
#[derive(Error, Debug, Clone)]
pub enum RepairError {
    // Transient — backoff + retry.
    #[error("LLM rate limited: {0}")]
    LlmRateLimited(String),
    #[error("sandbox command timed out after {0}s")]
    CommandTimeout(u64),
    #[error("network I/O error: {0}")]
    NetworkIo(String),

    // Verification — feedback + iterate.
    #[error("lint/validator rejected candidate: {0}")]
    LintFailure(String),
    #[error("judge rejected candidate: {0}")]
    JudgeRejected(String),
    #[error("reproduction command exited with code {0}")]
    ReproductionFailed(i32),

    // Navigation — strategy shift.
    #[error("path hallucination: {0}")]
    PathHallucination(String),
    #[error("loop detected")]
    LoopDetected,
    #[error("cascading error detected from root cause")]
    CascadingError,

    // Environment — recover-in-place.
    #[error("mass-failure signature detected: {0}")]
    MassFailureSignature(String),
    #[error("dependency install failed: {0}")]
    DependencyInstallFailed(String),

    // Terminal — surface as FAILURE.
    #[error("repository clone failed: {0}")]
    CloneFailed(String),
    #[error("log retrieval exhausted after all strategies")]
    LogRetrievalExhausted,
    #[error("iteration budget exceeded")]
    IterationBudgetExceeded,
    #[error("uncaught error in node {node}: {message}")]
    Uncaught { node: String, message: String },
}

/// The broad kind used by the engine to decide propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Verification,
    Navigation,
    Environment,
    Terminal,
}

impl RepairError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LlmRateLimited(_) | Self::CommandTimeout(_) | Self::NetworkIo(_) => {
                ErrorKind::Transient
            }
            Self::LintFailure(_) | Self::JudgeRejected(_) | Self::ReproductionFailed(_) => {
                ErrorKind::Verification
            }
            Self::PathHallucination(_) | Self::LoopDetected | Self::CascadingError => {
                ErrorKind::Navigation
            }
            Self::MassFailureSignature(_) | Self::DependencyInstallFailed(_) => {
                ErrorKind::Environment
            }
            Self::CloneFailed(_)
            | Self::LogRetrievalExhausted
            | Self::IterationBudgetExceeded
            | Self::Uncaught { .. } => ErrorKind::Terminal,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind() == ErrorKind::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds_are_flagged() {
        assert!(RepairError::CloneFailed("x".into()).is_terminal());
        assert!(!RepairError::LintFailure("x".into()).is_terminal());
    }

    #[test]
    fn kind_groups_match_spec_taxonomy() {
        assert_eq!(RepairError::LoopDetected.kind(), ErrorKind::Navigation);
        assert_eq!(
            RepairError::MassFailureSignature("x".into()).kind(),
            ErrorKind::Environment
        );
    }
}
