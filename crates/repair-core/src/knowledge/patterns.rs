//! Fix-pattern upsert logic (spec §4.7): the first time a fingerprint is
//! seen, persist its template; on repeat sightings, bump `success_count`
//! rather than overwriting the template, so a pattern only strengthens.

use super::store::{KnowledgeError, KnowledgeStore};
use crate::types::{FixPattern, FixTemplate, Fingerprint};

pub async fn upsert_seen_pattern(
    store: &dyn KnowledgeStore,
    fingerprint: Fingerprint,
    template: FixTemplate,
    applied_successfully: bool,
) -> Result<FixPattern, KnowledgeError> {
    let now = chrono::Utc::now();
    let pattern = match store.get_fix_pattern(&fingerprint).await? {
        Some(mut existing) => {
            if applied_successfully {
                existing.success_count += 1;
            }
            existing.updated_at = now;
            existing
        }
        None => FixPattern {
            fingerprint,
            template,
            success_count: u64::from(applied_successfully),
            created_at: now,
            updated_at: now,
        },
    };
    store.upsert_fix_pattern(pattern.clone()).await?;
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::InMemoryKnowledgeStore;

    #[tokio::test]
    async fn second_sighting_bumps_success_count_without_losing_template() {
        let store = InMemoryKnowledgeStore::new();
        let fp = Fingerprint::new("abc123");
        let template = FixTemplate::Command {
            command: "cargo fix".into(),
        };
        upsert_seen_pattern(&store, fp.clone(), template.clone(), true)
            .await
            .unwrap();
        let second = upsert_seen_pattern(&store, fp, template, true).await.unwrap();
        assert_eq!(second.success_count, 2);
    }
}
