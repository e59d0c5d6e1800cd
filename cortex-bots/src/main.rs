//! cortex-bots: run one agent of the cortex fabric.
//!
//!   cortex-bots --role brain [--interactive]
//!   cortex-bots --role memory [--memory-file memory.json]
//!   cortex-bots --role network
//!
//! Ctrl-C stops the listener, drains queued tasks and exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use cortex_bots::brain::{Brain, Router, Routes};
use cortex_bots::config::{BotConfig, Role};
use cortex_bots::memory::{self, MemoryStore};
use cortex_bots::memory_bot::MemoryBot;
use cortex_bots::network_bot::NetworkBot;
use cortex_bots::queue::{TaskQueue, WorkerPool};
use cortex_sdk::Client;
use cortex_server::{Handler, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with CORTEX_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("CORTEX_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("cortex_bots=info".parse()?)
        .add_directive("cortex_server=info".parse()?)
        .add_directive("cortex_sdk=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = BotConfig::parse();
    let registry = Arc::new(config.load_registry().context("Failed to load registry")?);
    let name = config.bot_name();
    let listen_addr = config
        .listen_addr(&registry)
        .with_context(|| format!("No listen address for {name}"))?;
    let client = Client::new(Arc::clone(&registry), config.transport());
    let server_config = config.server_config(listen_addr);

    tracing::info!(
        role = ?config.role,
        bot = %name,
        addr = %server_config.listen_addr,
        bots = registry.len(),
        "Starting cortex-bots"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl-C received, shutting down");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
        });
    }

    match config.role {
        Role::Memory => run_memory(&config, server_config, shutdown_rx).await?,
        Role::Network => {
            Server::new(server_config, NetworkBot::new(client, config.fanout_timeout()))
                .run(shutdown_rx)
                .await?
        }
        Role::Brain => run_brain(&config, client, server_config, shutdown_tx).await?,
    }

    tracing::info!(bot = %name, "Stopped");
    Ok(())
}

fn open_store(config: &BotConfig) -> Result<Arc<MemoryStore>> {
    let path = config.memory_file();
    let store = MemoryStore::open(&path, config.memory_policy())
        .with_context(|| format!("Failed to open memory file {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn run_memory(config: &BotConfig, server_config: ServerConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let store = open_store(config)?;
    let decay = memory::spawn_decay(Arc::clone(&store), config.decay_interval(), shutdown.clone());

    let result = Server::new(server_config, MemoryBot::new(store)).run(shutdown).await;
    decay.abort();
    result
}

async fn run_brain(
    config: &BotConfig,
    client: Client,
    server_config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    let shutdown = shutdown_tx.subscribe();
    let store = open_store(config)?;
    let decay = memory::spawn_decay(Arc::clone(&store), config.decay_interval(), shutdown.clone());

    let queue = Arc::new(TaskQueue::new());
    let router = Router::new(client.clone(), store, Routes::default());
    let pool = WorkerPool::spawn(Arc::clone(&queue), Arc::new(router), usize::from(config.workers));

    let launcher = config.load_launcher().context("Failed to load launch commands")?;
    let brain = Arc::new(Brain::new(
        client,
        Arc::clone(&queue),
        launcher,
        config.probe_timeout(),
        config.fanout_timeout(),
    ));
    if config.interactive {
        tokio::spawn(terminal(Arc::clone(&brain), shutdown_tx.clone()));
    }

    let result = Server::with_shared(server_config, brain).run(shutdown).await;

    // Stop decay alongside the listener even when bind failed.
    let _ = shutdown_tx.send(true);
    queue.close();
    tracing::info!(pending = queue.len(), "Draining task queue");
    pool.join().await;
    let _ = decay.await;
    result
}

/// Line-oriented operator console for the brain.
async fn terminal(brain: Arc<Brain>, shutdown: watch::Sender<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("Brain online. Type a command, or `exit` to quit.");

    loop {
        let _ = stdout.write_all(b"You: ").await;
        let _ = stdout.flush().await;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let reply = match brain.dispatch(line.to_string()).await {
            Ok(reply) => reply,
            Err(e) => e.to_response(),
        };
        println!("Brain: {reply}");
    }

    let _ = shutdown.send(true);
}
