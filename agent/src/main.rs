//! Backlog-driven repository agent.
//!
//! Reads `.ai-tasks.md` and `tasks.md`, lets a tool-calling model work on them
//! inside the project root, and prints the resulting commit message on stdout
//! for the deployment harness to commit with.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use backlog_agent::agent::{load_task_prompt, run_cycle};
use backlog_agent::core::capability::{CATALOGUE_VERSION, declarations};
use backlog_agent::exit_codes;
use backlog_agent::io::config::{AgentConfig, CONFIG_FILE, load_config, load_env_file};
use backlog_agent::io::gemini::{GeminiChat, GeminiConfig};
use backlog_agent::io::prompt::PromptEngine;
use backlog_agent::logging;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "backlog-agent",
    version,
    about = "Autonomous agent that works through a repository task backlog"
)]
struct Cli {
    /// Project root the agent operates in.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `<root>/agent.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent cycle and print the commit message.
    Run {
        /// Override the configured model call budget.
        #[arg(long)]
        max_calls: Option<u32>,
        /// Also write the commit message to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the task prompt that would be sent to the model.
    Prompt,
    /// Print the capability declarations advertised to the model as JSON.
    Capabilities,
}

#[tokio::main]
async fn main() {
    logging::init();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { max_calls, output } => {
            cmd_run(&cli.root, cli.config.as_deref(), max_calls, output.as_deref()).await
        }
        Command::Prompt => cmd_prompt(&cli.root, cli.config.as_deref()).await,
        Command::Capabilities => cmd_capabilities(),
    }
}

async fn cmd_run(
    root: &Path,
    config_path: Option<&Path>,
    max_calls: Option<u32>,
    output: Option<&Path>,
) -> Result<i32> {
    load_env_file(root)?;
    let mut cfg = load_agent_config(root, config_path)?;
    if let Some(max_calls) = max_calls {
        cfg.max_calls = max_calls;
        cfg.validate()?;
    }

    let system_instruction = PromptEngine::new()?.render_system(cfg.max_calls)?;
    let mut chat = GeminiChat::new(GeminiConfig {
        api_key: cfg.api_key()?,
        model: cfg.model.name.clone(),
        base_url: cfg.model.base_url.clone(),
        timeout: Duration::from_secs(cfg.model.timeout_secs),
        system_instruction,
    })?;

    let outcome = run_cycle(root, &cfg, &mut chat).await?;
    info!(stop = ?outcome.stop, requests = outcome.requests, "cycle finished");

    if let Some(path) = output {
        fs::write(path, &outcome.commit_message)
            .with_context(|| format!("write {}", path.display()))?;
    }
    if !outcome.committed() {
        eprintln!("agent finished without a commit message");
        return Ok(exit_codes::NO_COMMIT);
    }
    println!("{}", outcome.commit_message);
    Ok(exit_codes::OK)
}

async fn cmd_prompt(root: &Path, config_path: Option<&Path>) -> Result<i32> {
    let cfg = load_agent_config(root, config_path)?;
    println!("{}", load_task_prompt(root, &cfg).await?);
    Ok(exit_codes::OK)
}

fn cmd_capabilities() -> Result<i32> {
    let catalogue = json!({
        "version": CATALOGUE_VERSION,
        "functionDeclarations": declarations(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&catalogue).context("serialize capabilities")?
    );
    Ok(exit_codes::OK)
}

fn load_agent_config(root: &Path, config_path: Option<&Path>) -> Result<AgentConfig> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(CONFIG_FILE));
    load_config(&path)
}
