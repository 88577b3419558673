//! Trajectory learning (spec §4.7): records the cost/latency/reward of each
//! `(errorCategory, complexityBucket, toolPath)` attempt and exposes the
//! best-known path for a new occurrence of the same kind of problem.

use super::store::{KnowledgeError, KnowledgeStore};
use crate::types::FixTrajectory;

/// How many candidates to pull from the store before filtering by
/// complexity bucket and success. Wide enough that the bucket/success
/// filter isn't starved by the store's own reward-ranked truncation.
const CANDIDATE_POOL: usize = 64;

/// Merge one observation and return the updated, merged trajectory.
pub async fn record_attempt(
    store: &dyn KnowledgeStore,
    error_category: impl Into<String>,
    complexity: u8,
    tool_path: Vec<String>,
    cost: f64,
    latency_ms: f64,
    reward: f64,
    success: bool,
) -> Result<FixTrajectory, KnowledgeError> {
    store
        .merge_trajectory(
            error_category.into(),
            complexity,
            tool_path,
            cost,
            latency_ms,
            reward,
            success,
        )
        .await
}

/// The best known tool path for this `(errorCategory, complexity)` pair, if
/// any (spec §4.7 `findOptimalPath(category, complexity)`): only successful
/// trajectories whose complexity bucket overlaps `complexity`'s are
/// considered, ranked by highest reward, then lowest cost, then fewest
/// tools.
pub async fn find_optimal_path(
    store: &dyn KnowledgeStore,
    error_category: &str,
    complexity: u8,
) -> Result<Option<Vec<String>>, KnowledgeError> {
    let bucket = FixTrajectory::bucket(complexity);
    let candidates = store.find_similar_fixes(error_category, CANDIDATE_POOL).await?;

    let mut best: Option<FixTrajectory> = None;
    for candidate in candidates {
        if !candidate.success || candidate.complexity_bucket != bucket {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => {
                if candidate.reward != current.reward {
                    candidate.reward > current.reward
                } else if candidate.total_cost != current.total_cost {
                    candidate.total_cost < current.total_cost
                } else {
                    candidate.tool_path.len() < current.tool_path.len()
                }
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    Ok(best.map(|t| t.tool_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::InMemoryKnowledgeStore;

    #[tokio::test]
    async fn optimal_path_picks_highest_reward_trajectory() {
        let store = InMemoryKnowledgeStore::new();
        record_attempt(&store, "IMPORT", 4, vec!["grep".into()], 0.01, 10.0, 40.0, true)
            .await
            .unwrap();
        record_attempt(
            &store,
            "IMPORT",
            4,
            vec!["grep".into(), "llm_edit".into()],
            0.02,
            20.0,
            95.0,
            true,
        )
        .await
        .unwrap();

        let best = find_optimal_path(&store, "IMPORT", 4).await.unwrap().unwrap();
        assert_eq!(best, vec!["grep".to_string(), "llm_edit".to_string()]);
    }

    #[tokio::test]
    async fn optimal_path_ignores_trajectories_outside_the_complexity_bucket() {
        let store = InMemoryKnowledgeStore::new();
        record_attempt(&store, "IMPORT", 4, vec!["grep".into()], 0.01, 10.0, 40.0, true)
            .await
            .unwrap();
        record_attempt(
            &store,
            "IMPORT",
            9,
            vec!["grep".into(), "llm_edit".into()],
            0.02,
            20.0,
            95.0,
            true,
        )
        .await
        .unwrap();

        let best = find_optimal_path(&store, "IMPORT", 4).await.unwrap().unwrap();
        assert_eq!(best, vec!["grep".to_string()]);
    }

    #[tokio::test]
    async fn optimal_path_excludes_unsuccessful_trajectories() {
        let store = InMemoryKnowledgeStore::new();
        record_attempt(&store, "IMPORT", 4, vec!["grep".into()], 0.01, 10.0, 99.0, false)
            .await
            .unwrap();

        assert!(find_optimal_path(&store, "IMPORT", 4).await.unwrap().is_none());
    }
}
