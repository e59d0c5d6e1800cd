//! The network relay bot: broadcast and point-to-point forwarding.

use std::collections::BTreeMap;
use std::time::Duration;

use cortex_sdk::broadcast::broadcast;
use cortex_sdk::{Client, Error, Message, Result};
use cortex_server::Handler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    Broadcast(String),
    Request { target: String, message: String },
    Other(String),
}

impl NetworkCommand {
    pub fn parse(raw: &str) -> Result<Self> {
        let msg = Message::parse(raw).ok_or_else(|| Error::protocol("empty request"))?;

        let cmd = match msg.verb.as_str() {
            "BROADCAST" => match msg.payload {
                Some(message) => NetworkCommand::Broadcast(message),
                None => return Err(Error::Validation("BROADCAST needs a message".to_string())),
            },
            "REQUEST" => match msg.payload_parts(3).as_slice() {
                [target, message] if !target.is_empty() && !message.is_empty() => NetworkCommand::Request {
                    target: target.to_string(),
                    message: message.to_string(),
                },
                _ => return Err(Error::protocol("Invalid REQUEST format")),
            },
            _ => NetworkCommand::Other(raw.trim().to_string()),
        };
        Ok(cmd)
    }
}

pub struct NetworkBot {
    client: Client,
    /// Per-target bound for outbound calls, below our callers' own timeout.
    fanout_timeout: Duration,
}

impl NetworkBot {
    pub fn new(client: Client, fanout_timeout: Duration) -> Self {
        Self { client, fanout_timeout }
    }

    pub async fn execute(&self, command: NetworkCommand) -> Result<String> {
        match command {
            NetworkCommand::Broadcast(message) => {
                let report: BTreeMap<String, String> = broadcast(&self.client, &message, self.fanout_timeout)
                    .await
                    .into_iter()
                    .map(|(name, outcome)| (name, outcome.unwrap_or_else(|e| e.to_response())))
                    .collect();
                serde_json::to_string(&report).map_err(|e| Error::protocol(e.to_string()))
            }
            NetworkCommand::Request { target, message } => {
                self.client.send_within(&target, &message, self.fanout_timeout).await
            }
            NetworkCommand::Other(text) => Ok(format!("Received message: {text} | No specialized response set.")),
        }
    }
}

impl Handler for NetworkBot {
    async fn dispatch(&self, request: String) -> Result<String> {
        let command = NetworkCommand::parse(&request)?;
        self.execute(command).await
    }
}
