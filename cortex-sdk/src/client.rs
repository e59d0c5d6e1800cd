//! Synchronous request/response transport.
//!
//! Every outbound call opens a fresh TCP connection, writes the request,
//! half-closes, reads one reply (until EOF or the receive ceiling) and
//! drops the connection. There is no framing: anything past
//! [`TransportConfig::max_message_bytes`] is discarded. Calls are never
//! retried here; retry policy belongs to the caller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

use crate::error::{Error, Result};
use crate::registry::Registry;

/// Reference receive ceiling, applied on both legs.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024;
/// Reference bound for a whole outbound call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Limits applied to each outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound for connect + write + read.
    pub timeout: Duration,
    /// Receive ceiling; longer replies are truncated.
    pub max_message_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Read until EOF, `limit` bytes, or `deadline`, whichever comes first.
///
/// Bytes received before the deadline are returned rather than discarded.
pub async fn read_bounded<R>(reader: &mut R, limit: usize, deadline: Option<Instant>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(4096));
    let mut chunk = [0u8; 1024];

    while buf.len() < limit {
        let want = (limit - buf.len()).min(chunk.len());
        let read = reader.read(&mut chunk[..want]);
        let n = match deadline {
            Some(deadline) => match timeout_at(deadline, read).await {
                Ok(res) => res?,
                Err(_) => break,
            },
            None => read.await?,
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(buf)
}

/// Send `message` to `addr` and return the decoded reply.
///
/// `target` names the peer in errors. The connection is closed on every
/// exit path, including timeouts.
pub async fn call(target: &str, addr: &str, message: &str, config: &TransportConfig) -> Result<String> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(message.as_bytes()).await?;
        stream.shutdown().await?;
        read_bounded(&mut stream, config.max_message_bytes, None).await
    };

    match timeout(config.timeout, exchange).await {
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Err(e)) => Err(Error::network(target, e)),
        Err(_) => Err(Error::network(
            target,
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply within {:?}", config.timeout),
            ),
        )),
    }
}

/// Check whether anything accepts connections at `addr`.
pub async fn probe(target: &str, addr: &str, limit: Duration) -> Result<()> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(Error::network(target, e)),
        Err(_) => Err(Error::network(
            target,
            io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        )),
    }
}

/// Registry-aware client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Client {
    registry: Arc<Registry>,
    config: TransportConfig,
}

impl Client {
    pub fn new(registry: Arc<Registry>, config: TransportConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve `bot` and exchange one message with it.
    pub async fn send(&self, bot: &str, message: &str) -> Result<String> {
        let identity = self.registry.resolve(bot)?;
        tracing::debug!(bot = %bot, addr = %identity.addr(), "Sending message");
        let result = call(bot, &identity.addr(), message, &self.config).await;
        if let Err(ref e) = result {
            tracing::warn!(bot = %bot, error = %e, "Call failed");
        }
        result
    }

    /// Like [`Client::send`], but bounded by `limit` when that is tighter
    /// than the configured call timeout.
    pub async fn send_within(&self, bot: &str, message: &str, limit: Duration) -> Result<String> {
        let identity = self.registry.resolve(bot)?;
        let config = TransportConfig {
            timeout: limit.min(self.config.timeout),
            ..self.config
        };
        let result = call(bot, &identity.addr(), message, &config).await;
        if let Err(ref e) = result {
            tracing::warn!(bot = %bot, error = %e, "Call failed");
        }
        result
    }

    /// Connect-only reachability check.
    pub async fn probe(&self, bot: &str, limit: Duration) -> Result<()> {
        let identity = self.registry.resolve(bot)?;
        probe(bot, &identity.addr(), limit).await
    }
}
