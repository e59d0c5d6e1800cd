//! Per-connection request handling.
//!
//! Each accepted connection is single-shot:
//! `Accepted → Reading → Dispatching → Writing → Closed`. Nothing here may
//! take the accept loop down; failures are logged and, where a reply is
//! still possible, written back as `error: ...`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cortex_sdk::Error;
use cortex_sdk::client::read_bounded;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};

use crate::handler::Handler;

/// Limits applied to each connection.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Request receive ceiling; extra bytes are dropped.
    pub max_message_bytes: usize,
    /// How long to wait for the peer to finish sending.
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accepted,
    Reading,
    Dispatching,
    Writing,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Accepted => write!(f, "accepted"),
            Phase::Reading => write!(f, "reading"),
            Phase::Dispatching => write!(f, "dispatching"),
            Phase::Writing => write!(f, "writing"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Serve one request on `stream`, then close it.
pub async fn handle<H: Handler>(mut stream: TcpStream, handler: Arc<H>, limits: Limits) -> Result<()> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut phase = Phase::Accepted;
    tracing::debug!(%peer, %phase, "New connection");

    phase = Phase::Reading;
    let deadline = Instant::now() + limits.read_timeout;
    let bytes = read_bounded(&mut stream, limits.max_message_bytes, Some(deadline))
        .await
        .with_context(|| format!("{phase} request from {peer}"))?;
    if bytes.is_empty() {
        tracing::debug!(%peer, "Empty request, closing");
        return Ok(());
    }
    if bytes.len() >= limits.max_message_bytes {
        // Discard the overflow so closing doesn't reset the peer before it
        // reads the reply.
        let _ = timeout_at(deadline, tokio::io::copy(&mut stream, &mut tokio::io::sink())).await;
        tracing::debug!(%peer, limit = limits.max_message_bytes, "Request truncated");
    }

    phase = Phase::Dispatching;
    tracing::trace!(%peer, %phase, bytes = bytes.len(), "Request read");
    let reply = match decode(bytes) {
        Ok(request) => run_handler(&handler, request.trim().to_string(), &peer).await,
        Err(e) => e.to_response(),
    };

    phase = Phase::Writing;
    stream
        .write_all(reply.as_bytes())
        .await
        .with_context(|| format!("{phase} reply to {peer}"))?;
    let _ = stream.shutdown().await;

    phase = Phase::Closed;
    tracing::debug!(%peer, %phase, bytes = reply.len(), "Reply sent");
    Ok(())
}

/// Run the handler on its own task so a panic is contained to this request.
async fn run_handler<H: Handler>(handler: &Arc<H>, request: String, peer: &str) -> String {
    let handler = Arc::clone(handler);
    let task = tokio::spawn(async move { handler.dispatch(request).await });

    match task.await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            tracing::warn!(%peer, error = %e, "Handler returned error");
            e.to_response()
        }
        Err(e) => {
            tracing::error!(%peer, error = %e, "Handler panicked");
            Error::protocol("internal handler failure").to_response()
        }
    }
}

/// Strict UTF-8, except that a multi-byte character cut off by the receive
/// ceiling is dropped rather than rejected.
fn decode(bytes: Vec<u8>) -> Result<String, Error> {
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) if e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(_) => Err(Error::protocol("request is not valid UTF-8")),
    }
}
