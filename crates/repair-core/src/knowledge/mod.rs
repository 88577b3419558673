//! The knowledge base (spec §4.7): content-addressed fix patterns,
//! fingerprinting, and trajectory learning, all behind the [`KnowledgeStore`]
//! contract so the graph engine never depends on a storage backend
//! directly.

pub mod fingerprint;
pub mod patterns;
mod store;
pub mod trajectories;

pub use store::{InMemoryKnowledgeStore, KnowledgeError, KnowledgeStore, PostgresKnowledgeStore};
