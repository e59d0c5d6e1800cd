//! Launch commands used by `RESTART`.
//!
//! Read from the same TOML file as the registry:
//!
//! ```toml
//! [bots.memory_ai]
//! port = 7073
//! launch = ["cortex-bots", "--role", "memory"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use cortex_sdk::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct LaunchFile {
    #[serde(default)]
    bots: BTreeMap<String, LaunchEntry>,
}

#[derive(Debug, Deserialize)]
struct LaunchEntry {
    #[serde(default)]
    launch: Vec<String>,
}

/// Bot name → argv.
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    commands: BTreeMap<String, Vec<String>>,
}

impl Launcher {
    pub fn new(commands: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            commands: commands.into_iter().filter(|(_, argv)| !argv.is_empty()).collect(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: LaunchFile =
            toml::from_str(s).map_err(|e| Error::Validation(format!("bad registry: {e}")))?;
        Ok(Self::new(file.bots.into_iter().map(|(name, entry)| (name, entry.launch))))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        Self::from_toml_str(&s)
    }

    pub fn command(&self, name: &str) -> Option<&[String]> {
        self.commands.get(name).map(Vec::as_slice)
    }

    /// Spawn a detached process for `name`. Returns its pid.
    pub fn launch(&self, name: &str) -> Result<u32> {
        let Some((program, args)) = self.command(name).and_then(|argv| argv.split_first()) else {
            return Err(Error::Validation(format!("no launch command configured for {name}")));
        };

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::network(name, e))?;

        let pid = child.id().unwrap_or_default();
        tracing::info!(bot = %name, pid, program = %program, "Launched bot process");
        Ok(pid)
    }
}
