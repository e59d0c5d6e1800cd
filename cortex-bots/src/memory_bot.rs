//! The memory-keeper bot: a wire front end for [`MemoryStore`].

use std::sync::Arc;

use cortex_sdk::{Error, Message, Result};
use cortex_server::Handler;

use crate::memory::{DEFAULT_RECALL_LIMIT, MemoryEntry, MemoryStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryCommand {
    Recall { query: Option<String>, limit: usize },
    Reinforce(String),
    ForgetLast(usize),
    ForgetAll,
    Decay,
    Remember(String),
}

impl MemoryCommand {
    /// Anything that isn't a known verb is a memory to store.
    pub fn parse(raw: &str) -> Result<Self> {
        let msg = Message::parse(raw).ok_or_else(|| Error::protocol("empty request"))?;

        let cmd = match msg.verb.as_str() {
            "RECALL" if msg.is_colon_form() => MemoryCommand::Recall {
                query: msg.payload.clone(),
                limit: DEFAULT_RECALL_LIMIT,
            },
            "RECALL" => match count(&msg, DEFAULT_RECALL_LIMIT)? {
                0 => return Err(Error::Validation("RECALL count must be at least 1".to_string())),
                limit => MemoryCommand::Recall { query: None, limit },
            },
            "REINFORCE" => match msg.payload {
                Some(query) => MemoryCommand::Reinforce(query),
                None => return Err(Error::Validation("REINFORCE needs a query".to_string())),
            },
            "FORGET_LAST" => MemoryCommand::ForgetLast(count(&msg, 1)?),
            "FORGET_ALL" => MemoryCommand::ForgetAll,
            "DECAY" => MemoryCommand::Decay,
            _ => MemoryCommand::Remember(raw.trim().to_string()),
        };
        Ok(cmd)
    }
}

fn count(msg: &Message, default: usize) -> Result<usize> {
    match &msg.payload {
        Some(n) => n
            .parse()
            .map_err(|_| Error::Validation(format!("{} expects a count, got {n:?}", msg.verb))),
        None => Ok(default),
    }
}

pub struct MemoryBot {
    store: Arc<MemoryStore>,
}

impl MemoryBot {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn execute(&self, command: MemoryCommand) -> Result<String> {
        match command {
            MemoryCommand::Recall { query: None, limit } => {
                let entries = self.store.recall(None, limit);
                if entries.is_empty() {
                    return Ok("No memory available.".to_string());
                }
                render(&entries)
            }
            MemoryCommand::Recall { query: Some(query), limit } => {
                let entries = self.store.recall(Some(&query), limit);
                if entries.is_empty() {
                    return Ok("No matching memories found.".to_string());
                }
                render(&entries)
            }
            MemoryCommand::Reinforce(query) => {
                let hits = self.store.reinforce(&query)?;
                Ok(format!("Memory reinforcement applied to {hits} entries."))
            }
            MemoryCommand::ForgetLast(n) => {
                self.store.forget_last(n)?;
                Ok(format!("Deleted last {n} memory entries."))
            }
            MemoryCommand::ForgetAll => {
                let n = self.store.forget_all()?;
                tracing::info!(cleared = n, "Memory wiped");
                Ok("All memory wiped.".to_string())
            }
            MemoryCommand::Decay => {
                let evicted = self.store.decay()?;
                Ok(format!("Memory decay applied, {evicted} entries evicted."))
            }
            MemoryCommand::Remember(text) => {
                self.store.remember(&text)?;
                Ok("Memory stored successfully.".to_string())
            }
        }
    }
}

fn render(entries: &[MemoryEntry]) -> Result<String> {
    serde_json::to_string(entries).map_err(|e| Error::protocol(e.to_string()))
}

impl Handler for MemoryBot {
    async fn dispatch(&self, request: String) -> Result<String> {
        let command = MemoryCommand::parse(&request)?;
        self.execute(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPolicy;

    fn bot() -> MemoryBot {
        MemoryBot::new(Arc::new(MemoryStore::in_memory(MemoryPolicy::default())))
    }

    #[test]
    fn parse_forms() {
        assert_eq!(
            MemoryCommand::parse("RECALL").unwrap(),
            MemoryCommand::Recall { query: None, limit: 10 }
        );
        assert_eq!(
            MemoryCommand::parse("RECALL 3").unwrap(),
            MemoryCommand::Recall { query: None, limit: 3 }
        );
        assert_eq!(
            MemoryCommand::parse("RECALL:aapl").unwrap(),
            MemoryCommand::Recall {
                query: Some("aapl".to_string()),
                limit: 10
            }
        );
        assert_eq!(MemoryCommand::parse("FORGET_LAST").unwrap(), MemoryCommand::ForgetLast(1));
        assert_eq!(MemoryCommand::parse("FORGET_LAST 4").unwrap(), MemoryCommand::ForgetLast(4));
        assert_eq!(
            MemoryCommand::parse("the sky is blue").unwrap(),
            MemoryCommand::Remember("the sky is blue".to_string())
        );
    }

    #[test]
    fn non_integer_count_is_validation_error() {
        assert!(matches!(MemoryCommand::parse("RECALL many"), Err(Error::Validation(_))));
        assert!(matches!(MemoryCommand::parse("FORGET_LAST -1"), Err(Error::Validation(_))));
    }

    #[test]
    fn zero_recall_count_rejected() {
        let bot = bot();
        bot.execute(MemoryCommand::Remember("something".to_string())).unwrap();
        let err = MemoryCommand::parse("RECALL 0").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(bot.store().len(), 1);
    }

    #[test]
    fn remember_recall_cycle() {
        let bot = bot();
        assert_eq!(bot.execute(MemoryCommand::parse("RECALL").unwrap()).unwrap(), "No memory available.");

        for text in ["buy AAPL", "weather", "sell AAPL"] {
            let reply = bot.execute(MemoryCommand::parse(text).unwrap()).unwrap();
            assert_eq!(reply, "Memory stored successfully.");
        }

        let reply = bot.execute(MemoryCommand::parse("RECALL:aapl").unwrap()).unwrap();
        let entries: Vec<MemoryEntry> = serde_json::from_str(&reply).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "sell AAPL");

        let reply = bot.execute(MemoryCommand::parse("RECALL:tsla").unwrap()).unwrap();
        assert_eq!(reply, "No matching memories found.");
    }

    #[test]
    fn reinforce_and_forget() {
        let bot = bot();
        for text in ["alpha", "beta", "alphabet"] {
            bot.execute(MemoryCommand::Remember(text.to_string())).unwrap();
        }
        let reply = bot.execute(MemoryCommand::parse("REINFORCE:alpha").unwrap()).unwrap();
        assert_eq!(reply, "Memory reinforcement applied to 2 entries.");

        bot.execute(MemoryCommand::ForgetLast(1)).unwrap();
        assert_eq!(bot.store().len(), 2);

        let err = bot.execute(MemoryCommand::ForgetLast(5)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(bot.store().len(), 2);

        assert_eq!(bot.execute(MemoryCommand::ForgetAll).unwrap(), "All memory wiped.");
        assert!(bot.store().is_empty());
    }
}
