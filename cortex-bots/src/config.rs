//! Command-line and environment configuration for one bot process.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use cortex_sdk::broadcast::DEFAULT_FANOUT_TIMEOUT;
use cortex_sdk::client::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_MESSAGE_BYTES};
use cortex_sdk::registry::names;
use cortex_sdk::{Registry, Result, TransportConfig};
use cortex_server::ServerConfig;

use crate::brain::DEFAULT_PROBE_TIMEOUT;
use crate::launcher::Launcher;
use crate::memory::{DEFAULT_DECAY_INTERVAL, MemoryPolicy};
use crate::queue::DEFAULT_WORKERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Orchestrator: task queue, routing, status, relays
    Brain,
    /// Memory keeper
    Memory,
    /// Broadcast and relay
    Network,
}

impl Role {
    pub fn default_name(self) -> &'static str {
        match self {
            Role::Brain => names::BRAIN,
            Role::Memory => names::MEMORY,
            Role::Network => names::NETWORK,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "cortex-bots", about = "Agents of the cortex bot fabric")]
pub struct BotConfig {
    /// Which agent to run
    #[arg(long, value_enum, env = "CORTEX_ROLE")]
    pub role: Role,

    /// Registry name of this bot (defaults per role)
    #[arg(long, env = "CORTEX_NAME")]
    pub name: Option<String>,

    /// Registry TOML file; the built-in table is used when absent
    #[arg(long, env = "CORTEX_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Listen host override
    #[arg(long, env = "CORTEX_HOST")]
    pub host: Option<String>,

    /// Listen port override
    #[arg(long, env = "CORTEX_PORT")]
    pub port: Option<u16>,

    /// Memory file (defaults to `<name>.json`)
    #[arg(long, env = "CORTEX_MEMORY_FILE")]
    pub memory_file: Option<PathBuf>,

    /// Task workers (brain only)
    #[arg(long, env = "CORTEX_WORKERS", default_value_t = DEFAULT_WORKERS, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    #[arg(long, env = "CORTEX_DECAY_INTERVAL_SECS", default_value_t = DEFAULT_DECAY_INTERVAL.as_secs())]
    pub decay_interval_secs: u64,

    #[arg(long, env = "CORTEX_CALL_TIMEOUT_MS", default_value_t = millis(DEFAULT_CALL_TIMEOUT))]
    pub call_timeout_ms: u64,

    #[arg(long, env = "CORTEX_PROBE_TIMEOUT_MS", default_value_t = millis(DEFAULT_PROBE_TIMEOUT))]
    pub probe_timeout_ms: u64,

    /// Per-target bound for broadcast and relayed calls
    #[arg(long, env = "CORTEX_FANOUT_TIMEOUT_MS", default_value_t = millis(DEFAULT_FANOUT_TIMEOUT))]
    pub fanout_timeout_ms: u64,

    #[arg(long, env = "CORTEX_READ_TIMEOUT_MS", default_value_t = 2000)]
    pub read_timeout_ms: u64,

    /// Receive ceiling for requests and replies
    #[arg(long, env = "CORTEX_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Keep only the top-N memories by confidence
    #[arg(long, env = "CORTEX_CAPACITY")]
    pub capacity: Option<usize>,

    /// Read commands from stdin (brain only)
    #[arg(long, env = "CORTEX_INTERACTIVE")]
    pub interactive: bool,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl BotConfig {
    pub fn bot_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.role.default_name().to_string())
    }

    pub fn load_registry(&self) -> Result<Registry> {
        match &self.registry {
            Some(path) => Registry::load(path),
            None => Ok(Registry::builtin()),
        }
    }

    pub fn load_launcher(&self) -> Result<Launcher> {
        match &self.registry {
            Some(path) => Launcher::load(path),
            None => Ok(Launcher::default()),
        }
    }

    /// Flag overrides win; otherwise the bot's own registry entry.
    pub fn listen_addr(&self, registry: &Registry) -> Result<String> {
        let name = self.bot_name();
        let entry = registry.resolve(&name);
        let host = match (&self.host, &entry) {
            (Some(host), _) => host.clone(),
            (None, Ok(bot)) => bot.host.clone(),
            (None, Err(_)) => "127.0.0.1".to_string(),
        };
        let port = match (self.port, entry) {
            (Some(port), _) => port,
            (None, Ok(bot)) => bot.port,
            (None, Err(e)) => return Err(e),
        };
        Ok(format!("{host}:{port}"))
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_millis(self.call_timeout_ms),
            max_message_bytes: self.max_message_bytes,
        }
    }

    pub fn server_config(&self, listen_addr: String) -> ServerConfig {
        ServerConfig {
            listen_addr,
            max_message_bytes: self.max_message_bytes,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn memory_policy(&self) -> MemoryPolicy {
        MemoryPolicy {
            capacity: self.capacity,
            ..Default::default()
        }
    }

    pub fn memory_file(&self) -> PathBuf {
        self.memory_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.json", self.bot_name())))
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Fan-out and relay bound, strictly below the call timeout. Falls back
    /// to half the call timeout when configured at or above it.
    pub fn fanout_timeout(&self) -> Duration {
        let call = Duration::from_millis(self.call_timeout_ms);
        let fanout = Duration::from_millis(self.fanout_timeout_ms);
        if fanout < call { fanout } else { call / 2 }
    }
}
