// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `stationd` — backend orchestration core for an interactive agent
//! workstation: a single process exposing a chat socket and a structured
//! socket in front of the upstream model, tool providers, a shell session
//! manager, and a browser manager.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use core_config::Config;
use core_gateway::{build_router, serve, AppState};
use core_mcp::McpClient;
use core_model::UpstreamClient;

/// How often the stale-task sweep runs.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// A task's scratch memory is evicted once it hasn't been touched for this long.
const MEMORY_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Parser, Debug)]
#[command(name = "stationd", about = "Backend orchestration core for an interactive agent workstation")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the chat and structured socket endpoints. Default if no
    /// subcommand is given.
    Serve,
    /// Load configuration and the MCP manifest, report any error, and exit
    /// without binding a socket.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::from_env()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => check_config(&cfg),
        Command::Serve => run(cfg).await,
    }
}

fn check_config(cfg: &Config) -> anyhow::Result<()> {
    match cfg.load_mcp_manifest() {
        Ok(manifest) => {
            info!(
                upstream_host = %cfg.upstream_host,
                port = cfg.port,
                providers = manifest.providers.len(),
                "configuration is valid"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "configuration is invalid");
            Err(e.into())
        }
    }
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let manifest = cfg.load_mcp_manifest()?;

    let model = Arc::new(UpstreamClient::new(&cfg)?);
    let mcp = Arc::new(McpClient::spawn_all(&manifest).await);

    let state = AppState::new(
        model,
        mcp.clone(),
        cfg.shell.clone(),
        cfg.max_sessions,
        cfg.browser_headless,
        cfg.upstream_timeout,
    );

    let terminal = state.terminal.clone();
    let browser = state.browser.clone();
    let memory = state.memory.clone();
    let memory_sweep = tokio::spawn(memory_sweep_loop(memory));
    let router = build_router(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let result = serve(&addr, router, shutdown_signal()).await;

    info!("shutting down: closing browser contexts, terminal sessions, and tool providers");
    memory_sweep.abort();
    let _ = memory_sweep.await;
    if let Err(e) = browser.cleanup().await {
        error!(error = %e, "error while closing browser contexts");
    }
    terminal.manager().close_all().await;
    mcp.close_all().await;

    result.map_err(Into::into)
}

/// Periodically evicts task memory that hasn't been touched in
/// `MEMORY_MAX_AGE`, so a workstation left running doesn't accumulate scratch
/// memory for tasks nobody is looking at anymore.
async fn memory_sweep_loop(memory: Arc<core_memory::TaskMemoryRegistry>) {
    let mut ticker = tokio::time::interval(MEMORY_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let evicted = memory.cleanup_old_tasks(MEMORY_MAX_AGE).await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "evicted stale task memory");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
