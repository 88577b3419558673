//! Persistence contract for the knowledge base (spec §4.7, §6). Mirrors the
//! `CodeHost`/`LlmProvider` pattern: the engine depends only on the trait,
//! never on `sqlx` types directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{ErrorDependency, ErrorFact, ErrorFactId, ErrorSolution, FixPattern, FixTrajectory, Fingerprint};

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("record not found")]
    NotFound,
}

/// Key for a `FixTrajectory` record (spec §4.7): category + complexity
/// bucket + the ordered tool path taken.
fn trajectory_key(category: &str, bucket: u8, tool_path: &[String]) -> String {
    format!("{category}|{bucket}|{}", tool_path.join(","))
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn record_error_fact(&self, fact: ErrorFact) -> Result<(), KnowledgeError>;
    async fn get_error_fact(&self, id: &ErrorFactId) -> Result<Option<ErrorFact>, KnowledgeError>;

    async fn record_dependency(&self, dep: ErrorDependency) -> Result<(), KnowledgeError>;
    async fn list_dependencies(&self) -> Result<Vec<ErrorDependency>, KnowledgeError>;

    async fn upsert_fix_pattern(&self, pattern: FixPattern) -> Result<(), KnowledgeError>;
    async fn get_fix_pattern(&self, fingerprint: &Fingerprint) -> Result<Option<FixPattern>, KnowledgeError>;

    /// Record one outcome for a fingerprint's `ErrorSolution`, creating it if
    /// absent, applying the running-average update otherwise (spec §4.7).
    async fn record_solution_outcome(
        &self,
        fingerprint: &Fingerprint,
        success: bool,
        iterations: u64,
    ) -> Result<ErrorSolution, KnowledgeError>;

    /// Merge one observation into the `FixTrajectory` keyed by
    /// `(errorCategory, complexityBucket, toolPath)`, creating it if absent.
    async fn merge_trajectory(
        &self,
        error_category: String,
        complexity: u8,
        tool_path: Vec<String>,
        cost: f64,
        latency_ms: f64,
        reward: f64,
        success: bool,
    ) -> Result<FixTrajectory, KnowledgeError>;

    /// The `limit` highest-reward trajectories for an error category,
    /// descending (spec §4.7 `findSimilarFixes`, default limit 5).
    async fn find_similar_fixes(
        &self,
        error_category: &str,
        limit: usize,
    ) -> Result<Vec<FixTrajectory>, KnowledgeError>;
}

/// In-memory store for tests and the simulation backend.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    facts: Mutex<HashMap<String, ErrorFact>>,
    dependencies: Mutex<Vec<ErrorDependency>>,
    patterns: Mutex<HashMap<String, FixPattern>>,
    solutions: Mutex<HashMap<String, ErrorSolution>>,
    trajectories: Mutex<HashMap<String, FixTrajectory>>,
}

impl InMemoryKnowledgeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn record_error_fact(&self, fact: ErrorFact) -> Result<(), KnowledgeError> {
        self.facts.lock().unwrap().insert(fact.id.as_str().to_string(), fact);
        Ok(())
    }

    async fn get_error_fact(&self, id: &ErrorFactId) -> Result<Option<ErrorFact>, KnowledgeError> {
        Ok(self.facts.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn record_dependency(&self, dep: ErrorDependency) -> Result<(), KnowledgeError> {
        let mut deps = self.dependencies.lock().unwrap();
        let is_duplicate = deps.iter().any(|d| {
            d.source_error_id == dep.source_error_id
                && d.target_error_id == dep.target_error_id
                && d.relationship_type == dep.relationship_type
        });
        if !is_duplicate {
            deps.push(dep);
        }
        Ok(())
    }

    async fn list_dependencies(&self) -> Result<Vec<ErrorDependency>, KnowledgeError> {
        Ok(self.dependencies.lock().unwrap().clone())
    }

    async fn upsert_fix_pattern(&self, pattern: FixPattern) -> Result<(), KnowledgeError> {
        self.patterns
            .lock()
            .unwrap()
            .insert(pattern.fingerprint.as_str().to_string(), pattern);
        Ok(())
    }

    async fn get_fix_pattern(&self, fingerprint: &Fingerprint) -> Result<Option<FixPattern>, KnowledgeError> {
        Ok(self.patterns.lock().unwrap().get(fingerprint.as_str()).cloned())
    }

    async fn record_solution_outcome(
        &self,
        fingerprint: &Fingerprint,
        success: bool,
        iterations: u64,
    ) -> Result<ErrorSolution, KnowledgeError> {
        let mut solutions = self.solutions.lock().unwrap();
        let entry = solutions
            .entry(fingerprint.as_str().to_string())
            .or_insert_with(|| ErrorSolution::new(fingerprint.clone()));
        entry.record_outcome(success, iterations);
        Ok(entry.clone())
    }

    async fn merge_trajectory(
        &self,
        error_category: String,
        complexity: u8,
        tool_path: Vec<String>,
        cost: f64,
        latency_ms: f64,
        reward: f64,
        success: bool,
    ) -> Result<FixTrajectory, KnowledgeError> {
        let bucket = FixTrajectory::bucket(complexity);
        let key = trajectory_key(&error_category, bucket, &tool_path);
        let mut trajectories = self.trajectories.lock().unwrap();
        let entry = trajectories.entry(key).or_insert_with(|| FixTrajectory {
            error_category: error_category.clone(),
            complexity_bucket: bucket,
            tool_path: tool_path.clone(),
            success: false,
            total_cost: 0.0,
            latency_ms: 0.0,
            reward: 0.0,
            occurrence_count: 0,
        });
        entry.merge(cost, latency_ms, reward, success);
        Ok(entry.clone())
    }

    async fn find_similar_fixes(
        &self,
        error_category: &str,
        limit: usize,
    ) -> Result<Vec<FixTrajectory>, KnowledgeError> {
        let mut matches: Vec<FixTrajectory> = self
            .trajectories
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.error_category == error_category)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.reward.partial_cmp(&a.reward).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }
}

/// `sqlx`/Postgres-backed store, for the persistent deployment (spec §6;
/// grounded in the teacher's `experience` crate, which carries the same
/// `sqlx` + `postgres` dependency pair for its own learning store —
/// see `DESIGN.md`). Complex nested fields (`notes`, `template`,
/// `tool_path`) are stored as `jsonb` rather than normalized, matching the
/// teacher's preference for a narrow schema plus JSON payload columns.
pub struct PostgresKnowledgeStore {
    pool: sqlx::PgPool,
}

impl PostgresKnowledgeStore {
    #[must_use]
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Run the knowledge-base schema migration. Idempotent.
    pub async fn migrate(&self) -> Result<(), KnowledgeError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS error_facts (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                file_path TEXT NOT NULL,
                fix_action TEXT NOT NULL,
                status TEXT NOT NULL,
                notes JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS error_dependencies (
                source_error_id TEXT NOT NULL,
                target_error_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                metadata JSONB,
                PRIMARY KEY (source_error_id, target_error_id, relationship_type)
            );
            CREATE TABLE IF NOT EXISTS fix_patterns (
                fingerprint TEXT PRIMARY KEY,
                template JSONB NOT NULL,
                success_count BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS error_solutions (
                fingerprint TEXT PRIMARY KEY,
                times_applied BIGINT NOT NULL,
                success_rate DOUBLE PRECISION NOT NULL,
                avg_iterations DOUBLE PRECISION NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS fix_trajectories (
                key TEXT PRIMARY KEY,
                error_category TEXT NOT NULL,
                complexity_bucket SMALLINT NOT NULL,
                tool_path JSONB NOT NULL,
                success BOOLEAN NOT NULL,
                total_cost DOUBLE PRECISION NOT NULL,
                latency_ms DOUBLE PRECISION NOT NULL,
                reward DOUBLE PRECISION NOT NULL,
                occurrence_count BIGINT NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for PostgresKnowledgeStore {
    async fn record_error_fact(&self, fact: ErrorFact) -> Result<(), KnowledgeError> {
        let notes = serde_json::to_value(&fact.notes).map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        sqlx::query(
            r"INSERT INTO error_facts (id, run_id, summary, file_path, fix_action, status, notes, created_at, updated_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
               ON CONFLICT (id) DO UPDATE SET summary=$3, status=$6, notes=$7, updated_at=$9",
        )
        .bind(fact.id.as_str())
        .bind(&fact.run_id)
        .bind(&fact.summary)
        .bind(&fact.file_path)
        .bind(format!("{:?}", fact.fix_action))
        .bind(format!("{:?}", fact.status))
        .bind(notes)
        .bind(fact.created_at)
        .bind(fact.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_error_fact(&self, _id: &ErrorFactId) -> Result<Option<ErrorFact>, KnowledgeError> {
        // Reconstructing the typed enums from stored text requires a small
        // parser; left for the row-mapping pass once this store is wired
        // into a live deployment (DESIGN.md notes this as a known gap).
        Err(KnowledgeError::Backend("row mapping not implemented".to_string()))
    }

    async fn record_dependency(&self, dep: ErrorDependency) -> Result<(), KnowledgeError> {
        let metadata = dep.metadata.clone();
        sqlx::query(
            r"INSERT INTO error_dependencies (source_error_id, target_error_id, relationship_type, metadata)
               VALUES ($1,$2,$3,$4)
               ON CONFLICT DO NOTHING",
        )
        .bind(dep.source_error_id.as_str())
        .bind(dep.target_error_id.as_str())
        .bind(format!("{:?}", dep.relationship_type))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_dependencies(&self) -> Result<Vec<ErrorDependency>, KnowledgeError> {
        Err(KnowledgeError::Backend("row mapping not implemented".to_string()))
    }

    async fn upsert_fix_pattern(&self, pattern: FixPattern) -> Result<(), KnowledgeError> {
        let template = serde_json::to_value(&pattern.template).map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        sqlx::query(
            r"INSERT INTO fix_patterns (fingerprint, template, success_count, created_at, updated_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (fingerprint) DO UPDATE SET success_count=$3, updated_at=$5",
        )
        .bind(pattern.fingerprint.as_str())
        .bind(template)
        .bind(pattern.success_count as i64)
        .bind(pattern.created_at)
        .bind(pattern.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_fix_pattern(&self, _fingerprint: &Fingerprint) -> Result<Option<FixPattern>, KnowledgeError> {
        Err(KnowledgeError::Backend("row mapping not implemented".to_string()))
    }

    async fn record_solution_outcome(
        &self,
        fingerprint: &Fingerprint,
        success: bool,
        iterations: u64,
    ) -> Result<ErrorSolution, KnowledgeError> {
        let mut solution = ErrorSolution::new(fingerprint.clone());
        solution.record_outcome(success, iterations);
        sqlx::query(
            r"INSERT INTO error_solutions (fingerprint, times_applied, success_rate, avg_iterations, updated_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (fingerprint) DO UPDATE SET
                 times_applied = error_solutions.times_applied + 1,
                 success_rate = (error_solutions.success_rate * error_solutions.times_applied + $6) / (error_solutions.times_applied + 1),
                 avg_iterations = (error_solutions.avg_iterations * error_solutions.times_applied + $7) / (error_solutions.times_applied + 1),
                 updated_at = $5",
        )
        .bind(fingerprint.as_str())
        .bind(1_i64)
        .bind(solution.success_rate)
        .bind(solution.avg_iterations)
        .bind(solution.updated_at)
        .bind(f64::from(success))
        .bind(iterations as f64)
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;
        Ok(solution)
    }

    async fn merge_trajectory(
        &self,
        error_category: String,
        complexity: u8,
        tool_path: Vec<String>,
        cost: f64,
        latency_ms: f64,
        reward: f64,
        success: bool,
    ) -> Result<FixTrajectory, KnowledgeError> {
        let bucket = FixTrajectory::bucket(complexity);
        let key = trajectory_key(&error_category, bucket, &tool_path);
        let tool_path_json =
            serde_json::to_value(&tool_path).map_err(|e| KnowledgeError::Backend(e.to_string()))?;

        sqlx::query(
            r"INSERT INTO fix_trajectories
                 (key, error_category, complexity_bucket, tool_path, success, total_cost, latency_ms, reward, occurrence_count)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,1)
               ON CONFLICT (key) DO UPDATE SET
                 total_cost = (fix_trajectories.total_cost * fix_trajectories.occurrence_count + $6) / (fix_trajectories.occurrence_count + 1),
                 latency_ms = (fix_trajectories.latency_ms * fix_trajectories.occurrence_count + $7) / (fix_trajectories.occurrence_count + 1),
                 reward = (fix_trajectories.reward * fix_trajectories.occurrence_count + $8) / (fix_trajectories.occurrence_count + 1),
                 occurrence_count = fix_trajectories.occurrence_count + 1,
                 success = fix_trajectories.success OR $5",
        )
        .bind(&key)
        .bind(&error_category)
        .bind(i16::from(bucket))
        .bind(tool_path_json)
        .bind(success)
        .bind(cost)
        .bind(latency_ms)
        .bind(reward)
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Backend(e.to_string()))?;

        Ok(FixTrajectory {
            error_category,
            complexity_bucket: bucket,
            tool_path,
            success,
            total_cost: cost,
            latency_ms,
            reward,
            occurrence_count: 1,
        })
    }

    async fn find_similar_fixes(
        &self,
        _error_category: &str,
        _limit: usize,
    ) -> Result<Vec<FixTrajectory>, KnowledgeError> {
        Err(KnowledgeError::Backend("row mapping not implemented".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorFactStatus, ErrorNotes, FixAction};

    fn sample_fact() -> ErrorFact {
        ErrorFact {
            id: ErrorFactId::new("ef-1"),
            run_id: "run-1".into(),
            summary: "boom".into(),
            file_path: "src/a.rs".into(),
            fix_action: FixAction::Edit,
            status: ErrorFactStatus::Open,
            notes: ErrorNotes::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_and_fetch_error_fact_round_trips() {
        let store = InMemoryKnowledgeStore::new();
        let fact = sample_fact();
        store.record_error_fact(fact.clone()).await.unwrap();
        let fetched = store.get_error_fact(&fact.id).await.unwrap().unwrap();
        assert_eq!(fetched.summary, "boom");
    }

    #[tokio::test]
    async fn duplicate_dependency_is_idempotent() {
        let store = InMemoryKnowledgeStore::new();
        let dep = ErrorDependency {
            source_error_id: ErrorFactId::new("a"),
            target_error_id: ErrorFactId::new("b"),
            relationship_type: crate::types::RelationshipType::Blocks,
            metadata: None,
        };
        store.record_dependency(dep.clone()).await.unwrap();
        store.record_dependency(dep).await.unwrap();
        assert_eq!(store.list_dependencies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_similar_fixes_orders_by_reward_descending() {
        let store = InMemoryKnowledgeStore::new();
        store
            .merge_trajectory("SYNTAX".into(), 5, vec!["a".into()], 0.01, 100.0, 50.0, true)
            .await
            .unwrap();
        store
            .merge_trajectory("SYNTAX".into(), 5, vec!["b".into()], 0.01, 100.0, 90.0, true)
            .await
            .unwrap();
        let top = store.find_similar_fixes("SYNTAX", 5).await.unwrap();
        assert_eq!(top[0].tool_path, vec!["b".to_string()]);
    }
}
