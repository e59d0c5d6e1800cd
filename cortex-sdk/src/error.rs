//! Error taxonomy shared by every layer of the fabric.

use std::path::PathBuf;

/// Errors produced by the fabric.
///
/// None of these are fatal. Each is caught at the boundary where it occurs
/// (connection, worker, store operation) and turned into response text or
/// a log line.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target unreachable: refused, reset, or timed out.
    #[error("error communicating with {target}: {source}")]
    Network {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Registry lookup miss.
    #[error("bot {0} not recognized")]
    UnknownTarget(String),

    /// Unrecognized verb or malformed payload.
    #[error("{0}")]
    Protocol(String),

    /// Durable record read/write failure.
    #[error("storage failure at {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },

    /// Malformed argument, e.g. a non-integer count.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The component is shutting down and no longer accepts work.
    #[error("{0} is shut down")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn network(target: impl Into<String>, source: std::io::Error) -> Self {
        Error::Network {
            target: target.into(),
            source,
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Error::Protocol(reason.into())
    }

    pub fn storage(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Render as the text written back over the wire.
    pub fn to_response(&self) -> String {
        format!("error: {self}")
    }
}
