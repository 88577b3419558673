//! The Execution node (spec §4.5): turn the plan into a concrete file edit
//! or command, auto-correcting a hallucinated path via file discovery, and
//! running one self-correction pass if the generated content looks broken.

use tracing::{info, warn};

use crate::discovery::{find_unique_file, to_absolute_path, DiscoveryOutcome};
use crate::error::RepairError;
use crate::llm::{generate_with_backoff, LlmProvider, LlmRequest};
use crate::loop_detector::LoopDetector;
use crate::sandbox::Sandbox;
use crate::types::{FileChange, FixAction, GraphState, LlmMetric, NodeName};

use super::map_llm_error;

/// Strip Markdown code fences the LLM tends to wrap generated content in.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_lang = rest.split_once('\n').map_or(rest, |(_, body)| body);
        without_lang.trim_end().trim_end_matches("```").trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Minimal per-language sanity check before accepting generated content —
/// not a real compiler, just enough to catch an obviously truncated
/// response and trigger the one-shot self-correction pass.
fn looks_well_formed(language: &str, content: &str) -> bool {
    match language {
        "rust" => balanced(content, '{', '}') && balanced(content, '(', ')'),
        "json" => serde_json::from_str::<serde_json::Value>(content).is_ok(),
        "yaml" => serde_yaml::from_str::<serde_yaml::Value>(content).is_ok(),
        "javascript" | "typescript" => {
            !content.trim().is_empty()
                && balanced(content, '{', '}')
                && balanced(content, '(', ')')
                && balanced(content, '[', ']')
        }
        "dockerfile" => looks_like_dockerfile(content),
        _ => true,
    }
}

/// First non-comment, non-blank line of a Dockerfile must be a `FROM` (or a
/// leading build `ARG` used to parameterize the base image).
fn looks_like_dockerfile(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .is_some_and(|first| {
            let instruction = first.split_whitespace().next().unwrap_or("").to_uppercase();
            instruction == "FROM" || instruction == "ARG"
        })
}

fn balanced(content: &str, open: char, close: char) -> bool {
    let mut depth = 0i32;
    for ch in content.chars() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth < 0 {
                return false;
            }
        }
    }
    depth == 0
}

fn infer_language(path: &str) -> String {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if basename.eq_ignore_ascii_case("dockerfile") || basename.starts_with("Dockerfile.") {
        return "dockerfile".to_string();
    }
    match path.rsplit_once('.') {
        Some((_, "rs")) => "rust",
        Some((_, "json")) => "json",
        Some((_, "toml")) => "toml",
        Some((_, "py")) => "python",
        Some((_, "js")) => "javascript",
        Some((_, "ts")) => "typescript",
        Some((_, "yaml" | "yml")) => "yaml",
        _ => "text",
    }
    .to_string()
}

/// Resolve `path` to a real file, escalating through discovery on a miss.
/// On `Err`, the caller routes back to Analysis with the message as
/// feedback rather than writing to an unresolved path (spec §4.5/§4.8).
async fn resolve_target_path(
    state: &mut GraphState,
    sandbox: &dyn Sandbox,
    loop_detector: &mut LoopDetector,
    path: &str,
) -> Result<String, String> {
    let absolute = to_absolute_path(sandbox.get_work_dir(), path).unwrap_or_else(|_| path.to_string());
    if sandbox.read_file(&absolute).await.is_ok() {
        loop_detector.clear_hallucination(&absolute);
        return Ok(absolute);
    }

    match find_unique_file(sandbox, "", path.rsplit('/').next().unwrap_or(path)).await {
        Ok(DiscoveryOutcome::ExactMatch(p) | DiscoveryOutcome::RecursiveMatch(p) | DiscoveryOutcome::FuzzyMatch(p)) => {
            state.feedback.push(format!("auto-corrected path {path} -> {p}"));
            loop_detector.clear_hallucination(&p);
            Ok(p)
        }
        Ok(DiscoveryOutcome::RenamedInHistory(p)) => {
            state.feedback.push(format!("path {path} was renamed to {p} in history"));
            loop_detector.clear_hallucination(&p);
            Ok(p)
        }
        Ok(DiscoveryOutcome::MultipleMatches(candidates)) => {
            loop_detector.record_hallucination(&absolute);
            Err(format!("Path Hallucination: multiple candidates for {path}: {candidates:?}"))
        }
        Ok(DiscoveryOutcome::DeletedInHistory) => {
            loop_detector.record_hallucination(&absolute);
            Err(format!("Path Hallucination: {path} was deleted in history and no longer exists"))
        }
        Ok(DiscoveryOutcome::NotFound) => {
            loop_detector.record_hallucination(&absolute);
            Err(format!("Path Hallucination: could not locate {path}"))
        }
        Err(e) => {
            loop_detector.record_hallucination(&absolute);
            Err(format!("Path Hallucination: discovery failed for {path}: {e}"))
        }
    }
}

pub async fn run(
    state: &mut GraphState,
    sandbox: &dyn Sandbox,
    llm: &dyn LlmProvider,
    model: &str,
    loop_detector: &mut LoopDetector,
) -> Result<NodeName, RepairError> {
    let Some(diagnosis) = state.diagnosis.clone() else {
        return Err(RepairError::Uncaught {
            node: "execution".to_string(),
            message: "no diagnosis to execute against".to_string(),
        });
    };

    match diagnosis.fix_action {
        FixAction::Command => {
            let command = diagnosis
                .suggested_command
                .clone()
                .unwrap_or_else(|| "cargo check --workspace".to_string());
            let output = sandbox
                .run_command(&command, Some(std::time::Duration::from_secs(180)))
                .await
                .map_err(|e| RepairError::NetworkIo(e.to_string()))?;

            if output.is_timeout() {
                return Err(RepairError::CommandTimeout(180));
            }
            state.push_history(NodeName::Execution, "run_command", &command);
            if !output.success() {
                state.feedback.push(format!("command failed: {}", output.stderr));
            }
        }
        FixAction::Edit | FixAction::Create => {
            let target_path = match resolve_target_path(state, sandbox, loop_detector, &diagnosis.file_path).await {
                Ok(p) => p,
                Err(message) => {
                    warn!(path = %diagnosis.file_path, "{message}");
                    state.feedback.push(message);
                    state.push_history(NodeName::Execution, "resolve_path", "path hallucination, returning to analysis");
                    return Ok(NodeName::Analysis);
                }
            };
            let language = infer_language(&target_path);
            let original_content = sandbox.read_file(&target_path).await.unwrap_or_default();

            let mut content = generate_fix_content(
                llm,
                model,
                state,
                &diagnosis.summary,
                &target_path,
                &language,
                &original_content,
                None,
            )
            .await?;

            if !looks_well_formed(&language, &content) {
                warn!(path = %target_path, "generated content failed sanity check, retrying once");
                content = generate_fix_content(
                    llm,
                    model,
                    state,
                    &diagnosis.summary,
                    &target_path,
                    &language,
                    &original_content,
                    Some("The previous attempt produced unbalanced braces/invalid syntax. Fix that."),
                )
                .await?;
                if !looks_well_formed(&language, &content) {
                    state.feedback.push(format!(
                        "self-correction failed for {target_path}, returning to analysis instead of writing invalid content"
                    ));
                    state.push_history(NodeName::Execution, "lint", "content still invalid after self-correction, returning to analysis");
                    return Ok(NodeName::Analysis);
                }
            }

            sandbox
                .write_file(&target_path, &content)
                .await
                .map_err(|e| RepairError::Uncaught {
                    node: "execution".to_string(),
                    message: e.to_string(),
                })?;

            let change = if original_content.is_empty() {
                FileChange::created(target_path.clone(), content, language)
            } else {
                FileChange::modified(target_path.clone(), original_content, content, language)
            };
            state.files.insert(target_path.clone(), change);
            info!(path = %target_path, "applied generated fix");
            state.push_history(NodeName::Execution, "write_file", &target_path);
        }
    }

    Ok(NodeName::Verification)
}

#[allow(clippy::too_many_arguments)]
async fn generate_fix_content(
    llm: &dyn LlmProvider,
    model: &str,
    state: &mut GraphState,
    summary: &str,
    path: &str,
    language: &str,
    original_content: &str,
    correction_feedback: Option<&str>,
) -> Result<String, RepairError> {
    let mut prompt = format!(
        "Rewrite the full contents of {path} ({language}) to fix: {summary}\n\nCurrent content:\n{original_content}\n\nRespond with only the new file content."
    );
    if let Some(feedback) = correction_feedback {
        prompt.push_str(&format!("\n\nCorrection needed: {feedback}"));
    }

    let response = generate_with_backoff(
        llm,
        LlmRequest {
            prompt,
            model: model.to_string(),
            max_tokens: Some(2048),
            temperature: Some(0.1),
        },
    )
    .await
    .map_err(map_llm_error)?;

    state.record_llm_call(LlmMetric {
        model: response.model.clone(),
        input_tokens: response.usage.input,
        output_tokens: response.usage.output,
        cost_usd: response.cost_usd,
        latency_ms: response.latency_ms,
    });

    Ok(strip_code_fences(&response.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_code_blocks() {
        let raw = "```rust\nfn main() {}\n```";
        assert_eq!(strip_code_fences(raw), "fn main() {}");
    }

    #[test]
    fn detects_unbalanced_braces() {
        assert!(!looks_well_formed("rust", "fn main() {"));
        assert!(looks_well_formed("rust", "fn main() {}"));
    }

    #[test]
    fn infers_language_from_extension() {
        assert_eq!(infer_language("src/a.rs"), "rust");
        assert_eq!(infer_language("README"), "text");
        assert_eq!(infer_language("Dockerfile"), "dockerfile");
        assert_eq!(infer_language("deploy/Dockerfile.ci"), "dockerfile");
        assert_eq!(infer_language("ci/workflow.yaml"), "yaml");
        assert_eq!(infer_language("src/index.ts"), "typescript");
    }

    #[test]
    fn validates_yaml_structurally() {
        assert!(looks_well_formed("yaml", "key: value\nlist:\n  - a\n  - b\n"));
        assert!(!looks_well_formed("yaml", "key: [unterminated"));
    }

    #[test]
    fn validates_dockerfile_starts_with_from_or_arg() {
        assert!(looks_well_formed("dockerfile", "FROM rust:1\nRUN cargo build"));
        assert!(looks_well_formed("dockerfile", "# comment\nARG VERSION=1\nFROM rust:${VERSION}"));
        assert!(!looks_well_formed("dockerfile", "RUN echo hello"));
    }

    #[test]
    fn validates_javascript_brace_balance() {
        assert!(looks_well_formed("javascript", "function f() { return [1, 2]; }"));
        assert!(!looks_well_formed("javascript", "function f() { return [1, 2];"));
    }
}
