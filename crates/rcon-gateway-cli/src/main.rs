//! rcon-gateway: command-line gateway to a Minecraft server's RCON port
//!
//! Loads configuration from the environment (`RCON_PASSWORD` is required),
//! starts the worker pool, and submits commands taken from the command line,
//! a JSON job file, or stdin:
//!
//! ```text
//! rcon-gateway "list" "say hello"     # one response per argument
//! rcon-gateway --job maintenance.json # a job of CommandSpec records
//! rcon-gateway                        # interactive: one command per line
//! ```

use anyhow::{Context, Result};
use rcon_gateway_core::{Command, CommandSpec, build_job};
use rcon_gateway_pool::{PoolConfig, RconWorkerPool};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PoolConfig::from_env().context("loading configuration from the environment")?;
    info!(
        port = config.port,
        workers = config.worker_count,
        "starting RCON gateway"
    );

    let pool = RconWorkerPool::from_config(config)?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    pool.scope(|pool| async move {
        match args.as_slice() {
            [flag, path] if flag == "--job" => run_job(&pool, path).await,
            [] => run_interactive(&pool).await,
            commands => run_commands(&pool, commands).await,
        }
    })
    .await??;

    Ok(())
}

/// Submit each argument as its own command and print the responses in order
async fn run_commands(pool: &RconWorkerPool, commands: &[String]) -> Result<()> {
    for text in commands {
        let command = Command::new(text.clone());
        pool.submit(Arc::clone(&command))?;
        let response = command.result().await?;
        println!("{response}");
    }
    Ok(())
}

/// Submit a JSON job file and print each awaited command's outcome
async fn run_job(pool: &RconWorkerPool, path: &str) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading job file {path}"))?;
    let specs: Vec<CommandSpec> =
        serde_json::from_str(&raw).with_context(|| format!("parsing job file {path}"))?;

    let commands = build_job(&specs, None)?;
    pool.submit_job(&commands)?;

    for (spec, command) in specs.iter().zip(&commands) {
        if !spec.require_result {
            continue;
        }
        match command.result().await {
            Ok(response) => println!("#{}: {response}", command.id()),
            Err(error) => eprintln!("#{}: {error}", command.id()),
        }
    }
    Ok(())
}

/// Read commands from stdin, one per line, until EOF
async fn run_interactive(pool: &RconWorkerPool) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let command = Command::new(text);
        pool.submit(Arc::clone(&command))?;
        match command.result().await {
            Ok(response) => println!("{response}"),
            Err(error) => eprintln!("error: {error}"),
        }
    }
    Ok(())
}
