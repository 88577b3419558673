use serde::{Deserialize, Serialize};

/// The head commit of the primary failing workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainRun {
    pub head_sha: String,
}

/// One repair job: created by the driver, consumed by exactly one
/// Supervisor, immutable for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGroup {
    pub id: String,
    pub name: String,
    pub run_ids: Vec<String>,
    pub main_run: MainRun,
}

impl RunGroup {
    #[must_use]
    pub fn new(id: String, name: String, run_ids: Vec<String>, head_sha: String) -> Self {
        Self {
            id,
            name,
            run_ids,
            main_run: MainRun { head_sha },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_populates_main_run() {
        let group = RunGroup::new(
            "grp-1".to_string(),
            "nightly".to_string(),
            vec!["run-1".to_string()],
            "abc123".to_string(),
        );
        assert_eq!(group.main_run.head_sha, "abc123");
        assert_eq!(group.run_ids.len(), 1);
    }
}
