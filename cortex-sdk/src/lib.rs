//! Client SDK for the cortex bot fabric.
//!
//! Bots are independent TCP services that exchange short verb-prefixed
//! text commands. This crate holds everything a caller needs to reach
//! them: the static [`registry`], the one-shot request/response
//! [`client`], [`broadcast`] fan-out, the [`message`] wire type, and the
//! shared [`error`] taxonomy.

pub mod broadcast;
pub mod client;
pub mod error;
pub mod message;
pub mod registry;

pub use client::{Client, TransportConfig};
pub use error::{Error, Result};
pub use message::Message;
pub use registry::{BotIdentity, Registry};
