//! Fallback file discovery (spec §4.10): when a path the LLM names doesn't
//! exist verbatim, try progressively looser strategies before giving up and
//! recording a hallucination.

use crate::sandbox::Sandbox;

const VENDOR_DIRS: &[&str] = &["node_modules", "target", "vendor", ".git", "dist", "build"];

fn is_vendor_path(path: &str) -> bool {
    VENDOR_DIRS.iter().any(|dir| {
        path.split('/').any(|segment| segment == *dir)
    })
}

/// How a file was ultimately located, for logging and hallucination
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    ExactMatch(String),
    RecursiveMatch(String),
    /// More than one file shares `basename`; the caller can't safely pick
    /// one and should route back to Analysis with this candidate list.
    MultipleMatches(Vec<String>),
    FuzzyMatch(String),
    RenamedInHistory(String),
    DeletedInHistory,
    NotFound,
}

/// Try to find exactly one file matching `basename` under `search_root`,
/// escalating through recursive search, fuzzy (case-insensitive, extension
/// agnostic) search, then git-history checks, in that order (spec §4.10).
/// Vendor directories are excluded from every non-exact strategy.
pub async fn find_unique_file(
    sandbox: &dyn Sandbox,
    search_root: &str,
    basename: &str,
) -> Result<DiscoveryOutcome, String> {
    if sandbox.read_file(basename).await.is_ok() {
        return Ok(DiscoveryOutcome::ExactMatch(basename.to_string()));
    }

    let all_files = sandbox.list_files(search_root).await.map_err(|e| e.to_string())?;
    let candidates: Vec<&String> = all_files
        .iter()
        .filter(|f| !is_vendor_path(f))
        .filter(|f| f.rsplit('/').next() == Some(basename))
        .collect();

    match candidates.as_slice() {
        [only] => return Ok(DiscoveryOutcome::RecursiveMatch((*only).clone())),
        [] => {}
        multiple => {
            let names: Vec<String> = multiple.iter().map(|s| (*s).clone()).collect();
            return Ok(DiscoveryOutcome::MultipleMatches(names));
        }
    }

    let lower_basename = basename.to_lowercase();
    let fuzzy: Vec<&String> = all_files
        .iter()
        .filter(|f| !is_vendor_path(f))
        .filter(|f| {
            f.rsplit('/')
                .next()
                .map(|name| name.to_lowercase().starts_with(&strip_extension(&lower_basename)))
                .unwrap_or(false)
        })
        .collect();
    if let Some(first) = fuzzy.first() {
        return Ok(DiscoveryOutcome::FuzzyMatch((*first).clone()));
    }

    match check_git_history_for_rename(sandbox, basename).await? {
        Some(renamed) => Ok(DiscoveryOutcome::RenamedInHistory(renamed)),
        None => {
            if check_git_history_for_deletion(sandbox, basename).await? {
                Ok(DiscoveryOutcome::DeletedInHistory)
            } else {
                Ok(DiscoveryOutcome::NotFound)
            }
        }
    }
}

fn strip_extension(name: &str) -> String {
    name.rsplit_once('.').map_or_else(|| name.to_string(), |(stem, _)| stem.to_string())
}

/// `git log --follow --diff-filter=R` for the basename; returns the file's
/// current path if history shows it was renamed.
async fn check_git_history_for_rename(sandbox: &dyn Sandbox, basename: &str) -> Result<Option<String>, String> {
    let cmd = format!(
        "git log --follow --diff-filter=R --name-status --oneline -- '**/{basename}' | tail -n 1"
    );
    let output = sandbox.run_command(&cmd, None).await.map_err(|e| e.to_string())?;
    let line = output.stdout.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        // `R100\told/path\tnew/path` — take the new path.
        Ok(line.split('\t').last().map(str::to_string))
    }
}

/// `git log --diff-filter=D` for the basename; true if history shows a
/// deletion (so the agent can stop hallucinating edits to it).
async fn check_git_history_for_deletion(sandbox: &dyn Sandbox, basename: &str) -> Result<bool, String> {
    let cmd = format!("git log --diff-filter=D --oneline -- '**/{basename}' | head -n 1");
    let output = sandbox.run_command(&cmd, None).await.map_err(|e| e.to_string())?;
    Ok(!output.stdout.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SimulationSandbox;

    #[tokio::test]
    async fn exact_match_short_circuits() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("src/a.rs", "x").await.unwrap();
        let outcome = find_unique_file(&sandbox, "", "src/a.rs").await.unwrap();
        assert_eq!(outcome, DiscoveryOutcome::ExactMatch("src/a.rs".to_string()));
    }

    #[tokio::test]
    async fn recursive_match_finds_relocated_basename() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("src/nested/a.rs", "x").await.unwrap();
        let outcome = find_unique_file(&sandbox, "", "a.rs").await.unwrap();
        assert_eq!(outcome, DiscoveryOutcome::RecursiveMatch("src/nested/a.rs".to_string()));
    }

    #[tokio::test]
    async fn vendor_paths_are_excluded_from_recursive_search() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("node_modules/pkg/a.rs", "x").await.unwrap();
        let outcome = find_unique_file(&sandbox, "", "a.rs").await.unwrap();
        assert_eq!(outcome, DiscoveryOutcome::NotFound);
    }

    #[tokio::test]
    async fn multiple_recursive_candidates_are_reported_as_ambiguous() {
        let sandbox = SimulationSandbox::new("sim");
        sandbox.write_file("src/a.rs", "x").await.unwrap();
        sandbox.write_file("src/nested/a.rs", "x").await.unwrap();
        let outcome = find_unique_file(&sandbox, "", "a.rs").await.unwrap();
        match outcome {
            DiscoveryOutcome::MultipleMatches(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected MultipleMatches, got {other:?}"),
        }
    }
}
