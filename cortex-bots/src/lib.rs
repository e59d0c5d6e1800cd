//! cortex-bots: the agents of the cortex fabric.
//!
//! One binary, three roles:
//! - brain: orchestrator with a task queue, worker pool and relays
//! - memory: persistent memory with reinforcement and decay
//! - network: broadcast and point-to-point relay

pub mod brain;
pub mod config;
pub mod launcher;
pub mod memory;
pub mod memory_bot;
pub mod network_bot;
pub mod queue;
