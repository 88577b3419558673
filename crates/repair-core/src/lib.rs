//! The hierarchical repair-loop engine: a Supervisor owning sandbox
//! lifecycle, a Graph Agent finite-state machine doing the actual
//! diagnose/plan/execute/verify work, a knowledge base that learns fix
//! patterns and trajectories across runs, and the supporting services
//! (dependency tracking, loop detection, file discovery, reproduction-
//! command inference) those nodes lean on.

pub mod dependency_tracker;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod llm;
pub mod loop_detector;
pub mod observability;
pub mod reproduction;
pub mod sandbox;
pub mod supervisor;
pub mod types;

pub use error::{ErrorKind, RepairError};
pub use graph::{GraphEngine, GraphObserver};
pub use supervisor::{Supervisor, SupervisorError, SupervisorOutcome, Toolchain};
