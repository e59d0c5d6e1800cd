//! TCP listener and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cortex_sdk::client::DEFAULT_MAX_MESSAGE_BYTES;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::connection::{self, Limits};
use crate::handler::Handler;

/// Listener configuration for one bot.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to bind. Port 0 picks an ephemeral port.
    pub listen_addr: String,
    /// Request receive ceiling.
    pub max_message_bytes: usize,
    /// How long a connection may take to deliver its request.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            read_timeout: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    fn limits(&self) -> Limits {
        Limits {
            max_message_bytes: self.max_message_bytes,
            read_timeout: self.read_timeout,
        }
    }
}

pub struct Server<H> {
    config: ServerConfig,
    handler: Arc<H>,
}

impl<H: Handler> Server<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_shared(config, Arc::new(handler))
    }

    /// Serve a handler that the caller also keeps a reference to.
    pub fn with_shared(config: ServerConfig, handler: Arc<H>) -> Self {
        Self { config, handler }
    }

    /// Bind and serve until `shutdown` flips to `true` (or its sender is
    /// dropped). In-flight connections are left to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        serve(listener, self.handler, self.config.limits(), shutdown).await
    }

    /// Bind, then serve on a background task. Returns the bound address and
    /// a handle that stops the loop.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(serve(listener, self.handler, self.config.limits(), shutdown_rx));

        Ok((addr, ServerHandle { shutdown_tx, task }))
    }
}

/// Control handle for a server started with [`Server::start`].
pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// Signal the accept loop to stop and wait for it to exit.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.task.await?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn serve<H: Handler>(
    listener: TcpListener,
    handler: Arc<H>,
    limits: Limits,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle(stream, handler, limits).await {
                            tracing::warn!("Connection error: {e:#}");
                        }
                    });
                }
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning.
                    tracing::error!("Accept error: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    tracing::info!("Stopped accepting connections");
    Ok(())
}
