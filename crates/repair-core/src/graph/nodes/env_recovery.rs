//! The EnvRecovery node (spec §4.6 mass-failure branch): attempts to
//! restore a sane environment — dependency refresh, killing dangling
//! processes, and, as a last resort, a full workspace purge — before
//! sending the run back to Analysis. Runs at most once per iteration.

use tracing::{info, warn};

use crate::error::RepairError;
use crate::sandbox::Sandbox;
use crate::supervisor::Toolchain;
use crate::types::{GraphState, NodeName};

const MAX_RECOVERY_ATTEMPTS: usize = 2;

pub async fn run(state: &mut GraphState, sandbox: &dyn Sandbox) -> Result<NodeName, RepairError> {
    let attempts_so_far = state
        .history
        .iter()
        .filter(|h| h.node == NodeName::EnvRecovery)
        .count();

    if attempts_so_far >= MAX_RECOVERY_ATTEMPTS {
        state.failure_reason = Some("environment recovery exhausted without stabilizing".to_string());
        state.push_history(NodeName::EnvRecovery, "give_up", "recovery attempts exhausted");
        return Ok(NodeName::Failure);
    }

    refresh_dependencies(sandbox).await;
    kill_dangling_processes(sandbox).await;

    if attempts_so_far + 1 >= MAX_RECOVERY_ATTEMPTS {
        purge_environment(sandbox).await;
    }

    state.push_history(NodeName::EnvRecovery, "recover", "ran dependency refresh and process cleanup");
    Ok(NodeName::Verification)
}

/// Refresh the target repository's own dependencies — using whatever
/// toolchain the repo under repair actually uses, not the agent's own.
async fn refresh_dependencies(sandbox: &dyn Sandbox) {
    let root_files = sandbox
        .list_files(sandbox.get_work_dir())
        .await
        .unwrap_or_default();
    let toolchain = Toolchain::detect(sandbox, &root_files).await;
    let Some(cmd) = toolchain.refresh_command() else {
        info!(?toolchain, "no refresh command for this toolchain, skipping");
        return;
    };

    match sandbox.run_command(cmd, None).await {
        Ok(out) if out.success() => info!(?toolchain, "dependencies refreshed"),
        Ok(out) => warn!(?toolchain, stderr = %out.stderr, "dependency refresh reported errors"),
        Err(e) => warn!(?toolchain, error = %e, "dependency refresh command failed"),
    }
}

async fn kill_dangling_processes(sandbox: &dyn Sandbox) {
    if let Err(e) = sandbox.run_command("pkill -f 'cargo test' || true", None).await {
        warn!(error = %e, "process cleanup command failed");
    }
}

async fn purge_environment(sandbox: &dyn Sandbox) {
    warn!("purging environment as a last-resort recovery step");
    let _ = sandbox.run_command("rm -rf target", None).await;
}
