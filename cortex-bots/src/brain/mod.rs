//! The orchestrator bot.
//!
//! Accepts commands on its own listener, queues tasks for the worker pool,
//! relays requests to specialist bots and reports fabric status.

mod command;
pub mod router;

pub use command::BrainCommand;
pub use router::{Route, Router, Routes};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cortex_sdk::broadcast::probe_all;
use cortex_sdk::registry::names;
use cortex_sdk::{Client, Error, Result};
use cortex_server::Handler;

use crate::launcher::Launcher;
use crate::queue::TaskQueue;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Brain {
    client: Client,
    queue: Arc<TaskQueue>,
    launcher: Launcher,
    probe_timeout: Duration,
    /// Bound for relayed calls, below our callers' own timeout.
    relay_timeout: Duration,
}

impl Brain {
    pub fn new(
        client: Client,
        queue: Arc<TaskQueue>,
        launcher: Launcher,
        probe_timeout: Duration,
        relay_timeout: Duration,
    ) -> Self {
        Self {
            client,
            queue,
            launcher,
            probe_timeout,
            relay_timeout,
        }
    }

    pub async fn execute(&self, command: BrainCommand) -> Result<String> {
        match command {
            BrainCommand::Status => self.status().await,
            BrainCommand::Task(task) => {
                let id = self.queue.enqueue(task.clone())?;
                tracing::info!(task = id, "Task accepted");
                Ok(format!("Task added: {task}"))
            }
            BrainCommand::Bot { target, message } => self.relay(&target, &message).await,
            BrainCommand::Recall => self.relay(names::MEMORY, "RECALL").await,
            BrainCommand::Learn => self.relay(names::LEARNING, "LEARN").await,
            BrainCommand::FetchNews => self.relay(names::NEWS, "FETCH").await,
            BrainCommand::Restart(name) => {
                self.client.registry().resolve(&name)?;
                self.launcher.launch(&name)?;
                Ok(format!("Restarted {name}."))
            }
            BrainCommand::Queue => Ok(format!("{} task(s) pending", self.queue.len())),
        }
    }

    async fn relay(&self, bot: &str, message: &str) -> Result<String> {
        self.client.send_within(bot, message, self.relay_timeout).await
    }

    async fn status(&self) -> Result<String> {
        let report: BTreeMap<String, &str> = probe_all(&self.client, self.probe_timeout)
            .await
            .into_iter()
            .map(|(name, online)| (name, if online { "Online" } else { "Offline" }))
            .collect();
        serde_json::to_string_pretty(&report).map_err(|e| Error::protocol(e.to_string()))
    }
}

impl Handler for Brain {
    async fn dispatch(&self, request: String) -> Result<String> {
        let command = BrainCommand::parse(&request)?;
        tracing::debug!(?command, "Brain command");
        self.execute(command).await
    }
}
