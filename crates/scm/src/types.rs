use serde::{Deserialize, Serialize};

/// Log retrieval strategy escalation order (spec §4.3 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRetrievalStrategy {
    Standard,
    Extended,
    AnyError,
    ForceLatest,
}

impl LogRetrievalStrategy {
    /// The full escalation order, first attempt first.
    #[must_use]
    pub const fn escalation_order() -> [Self; 4] {
        [Self::Standard, Self::Extended, Self::AnyError, Self::ForceLatest]
    }

    /// The strategy to escalate to after this one fails, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Standard => Some(Self::Extended),
            Self::Extended => Some(Self::AnyError),
            Self::AnyError => Some(Self::ForceLatest),
            Self::ForceLatest => None,
        }
    }
}

/// A failed workflow run as reported by the code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_id: String,
    pub workflow_name: String,
    pub head_sha: String,
    pub html_url: String,
}

/// Raw log text plus the strategy that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowLogs {
    pub text: String,
    pub strategy_used: LogRetrievalStrategy,
}

/// A file's content as read from, or to be written to, the code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResult {
    pub commit_url: String,
    pub commit_sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_order_is_standard_first_force_latest_last() {
        let order = LogRetrievalStrategy::escalation_order();
        assert_eq!(order[0], LogRetrievalStrategy::Standard);
        assert_eq!(order[3], LogRetrievalStrategy::ForceLatest);
    }

    #[test]
    fn next_terminates_at_force_latest() {
        assert_eq!(
            LogRetrievalStrategy::Standard.next(),
            Some(LogRetrievalStrategy::Extended)
        );
        assert_eq!(LogRetrievalStrategy::ForceLatest.next(), None);
    }
}
