//! Static bot name → address resolution.
//!
//! One registry is loaded per process, either from the built-in reference
//! table or from a TOML file, and never mutated afterwards.
//!
//! ```toml
//! [bots.memory_ai]
//! host = "127.0.0.1"
//! port = 7073
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Identity of one bot in the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BotIdentity {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl BotIdentity {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

/// Well-known bot names.
pub mod names {
    pub const BRAIN: &str = "brain_ai";
    pub const MEMORY: &str = "memory_ai";
    pub const NEWS: &str = "news_ai";
    pub const PSYCHOLOGY: &str = "psychology_ai";
    pub const SELF_ANALYSIS: &str = "self_analysis_ai";
    pub const LOGIC: &str = "logic_ai";
    pub const LEARNING: &str = "learning_ai";
    pub const TRADING: &str = "trading_ai";
    pub const SECURITY: &str = "security_ai";
    pub const LINGUISTIC: &str = "linguistic_ai";
    pub const ATTENTION: &str = "attention_ai";
    pub const NETWORK: &str = "network_ai";
}

/// Reference port assignments. `network_ai` has appeared as both 7087 and
/// 7090 in older deployments; 7087 is used here and a registry file can
/// override it.
const BUILTIN: &[(&str, u16)] = &[
    (names::BRAIN, 7070),
    (names::MEMORY, 7073),
    (names::NEWS, 7074),
    (names::PSYCHOLOGY, 7076),
    (names::SELF_ANALYSIS, 7077),
    (names::LOGIC, 7078),
    (names::LEARNING, 7080),
    (names::TRADING, 7081),
    (names::SECURITY, 7082),
    (names::LINGUISTIC, 7085),
    (names::ATTENTION, 7086),
    (names::NETWORK, 7087),
];

const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    bots: BTreeMap<String, BotEntry>,
}

#[derive(Debug, Deserialize)]
struct BotEntry {
    #[serde(default = "default_host")]
    host: String,
    port: u16,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Immutable name → identity table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    bots: BTreeMap<String, BotIdentity>,
}

impl Registry {
    /// Build from identities, rejecting duplicate names and shared addresses.
    pub fn new(bots: impl IntoIterator<Item = BotIdentity>) -> Result<Self> {
        let mut table = BTreeMap::new();
        let mut claimed: HashMap<(String, u16), String> = HashMap::new();

        for bot in bots {
            if table.contains_key(&bot.name) {
                return Err(Error::Validation(format!("bot {} registered twice", bot.name)));
            }
            if let Some(owner) = claimed.insert((bot.host.clone(), bot.port), bot.name.clone()) {
                return Err(Error::Validation(format!(
                    "bots {owner} and {} both claim {}",
                    bot.name,
                    bot.addr()
                )));
            }
            table.insert(bot.name.clone(), bot);
        }

        Ok(Self { bots: table })
    }

    /// The reference table on localhost.
    pub fn builtin() -> Self {
        let bots = BUILTIN
            .iter()
            .map(|(name, port)| (name.to_string(), BotIdentity::new(*name, DEFAULT_HOST, *port)))
            .collect();
        Self { bots }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: RegistryFile =
            toml::from_str(s).map_err(|e| Error::Validation(format!("bad registry: {e}")))?;
        Self::new(
            file.bots
                .into_iter()
                .map(|(name, entry)| BotIdentity::new(name, entry.host, entry.port)),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        let registry = Self::from_toml_str(&s)?;
        tracing::info!(path = %path.display(), bots = registry.len(), "Loaded registry");
        Ok(registry)
    }

    pub fn resolve(&self, name: &str) -> Result<&BotIdentity> {
        self.bots
            .get(name)
            .ok_or_else(|| Error::UnknownTarget(name.to_string()))
    }

    /// Bots in name order.
    pub fn iter(&self) -> impl Iterator<Item = &BotIdentity> {
        self.bots.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
