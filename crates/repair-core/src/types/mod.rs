//! The data model (spec §3): entities shared across the supervisor, graph
//! engine, and knowledge base.

mod diagnosis;
mod graph_state;
mod ids;
mod knowledge;

pub use diagnosis::{
    ClassifiedError, Diagnosis, ErrorCategory, ErrorDag, ErrorDagNode, ErrorDagNodeStatus,
    FixAction, T_DECOMPOSE,
};
pub use graph_state::{
    FileChange, FileChangeStatus, FileVariant, GraphState, GraphStateSnapshot, HistoryEntry,
    LlmMetric, NodeName, RunStatus,
};
pub use ids::{ErrorFactId, ErrorNodeId, Fingerprint, RunGroupId};
pub use knowledge::{
    ErrorDependency, ErrorFact, ErrorFactStatus, ErrorNotes, ErrorSolution, FileEdit, FixPattern,
    FixTemplate, FixTrajectory, RelationshipType,
};
