//! Request/response server loop for cortex bots.
//!
//! A [`Server`] binds one listening socket, accepts connections
//! concurrently, hands each request to a [`Handler`], writes the reply and
//! closes the connection.

pub mod connection;
pub mod handler;
pub mod server;

pub use handler::Handler;
pub use server::{Server, ServerConfig, ServerHandle};
