//! Thin command-line driver for the repair-loop engine: loads
//! configuration, builds a `Supervisor`, subscribes a console observer, and
//! runs one repair to completion against a single failing CI run.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use config::{AppConfig, EnvConfig};
use repair_core::llm::{HttpLlmProvider, LlmProvider};
use repair_core::types::GraphStateSnapshot;
use repair_core::{GraphObserver, Supervisor};
use scm::{CodeHost, GitHubCodeHost, LogRetrievalStrategy};

/// Run the repair-loop engine against one failing CI run.
#[derive(Parser)]
#[command(name = "repair-agent")]
#[command(about = "Autonomous CI-failure repair agent")]
#[command(version)]
struct Cli {
    /// Repository URL, e.g. `https://github.com/owner/repo`.
    #[arg(long)]
    repository: String,

    /// Commit SHA of the failing run.
    #[arg(long)]
    head_sha: String,

    /// Failing workflow run id, used to fetch logs.
    #[arg(long)]
    run_id: String,

    /// Code-hosting API token.
    #[arg(long, env = "GITHUB_TOKEN")]
    access_token: String,

    /// LLM provider identifier.
    #[arg(long, default_value = "anthropic")]
    llm_provider: String,

    /// LLM model identifier.
    #[arg(long)]
    llm_model: String,

    /// LLM API base URL.
    #[arg(long, env = "LLM_API_BASE")]
    llm_api_base: String,

    /// LLM API key.
    #[arg(long, env = "LLM_API_KEY")]
    llm_api_key: String,

    /// Enable verbose tracing output.
    #[arg(short, long)]
    verbose: bool,
}

/// Prints each state transition to stdout as it happens.
struct StdoutObserver;

impl GraphObserver for StdoutObserver {
    fn on_transition(&self, snapshot: &GraphStateSnapshot) {
        println!(
            "[{:>12}] iteration={} status={:?}",
            format!("{:?}", snapshot.current_node),
            snapshot.iteration,
            snapshot.status
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("repair_core=debug,repair_cli=debug")
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let env = EnvConfig::from_env();
    info!(backend = ?env.execution_backend, "starting repair run");

    let app_config = AppConfig::from_env(
        cli.repository.clone(),
        cli.access_token.clone(),
        cli.llm_provider.clone(),
        cli.llm_model.clone(),
    );

    let code_host: Arc<dyn CodeHost> = Arc::new(GitHubCodeHost::new());
    let llm: Arc<dyn LlmProvider> = Arc::new(HttpLlmProvider::new(cli.llm_api_base, cli.llm_api_key));

    let logs = code_host
        .get_workflow_logs(&cli.repository, &cli.run_id, &cli.access_token, LogRetrievalStrategy::Standard)
        .await
        .with_context(|| format!("fetching workflow logs for run {}", cli.run_id))?;

    let supervisor = Supervisor::new(app_config, Arc::clone(&code_host), llm);

    let outcome = supervisor
        .run(&cli.head_sha, logs.text, Some(Arc::new(StdoutObserver)))
        .await;

    match outcome {
        Ok(result) => {
            println!("{} sandbox={}", "run complete".green().bold(), result.sandbox_id);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {e}", "run failed:".red().bold());
            Err(e.into())
        }
    }
}
