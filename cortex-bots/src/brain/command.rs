use cortex_sdk::{Error, Message, Result};

/// Requests understood by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrainCommand {
    Status,
    Task(String),
    Bot { target: String, message: String },
    Recall,
    Learn,
    FetchNews,
    Restart(String),
    Queue,
}

impl BrainCommand {
    pub fn parse(raw: &str) -> Result<Self> {
        let msg = Message::parse(raw).ok_or_else(|| Error::protocol("empty command"))?;

        let cmd = match msg.verb.as_str() {
            "STATUS" => BrainCommand::Status,
            "TASK" => match msg.payload {
                Some(task) => BrainCommand::Task(task),
                None => return Err(Error::Validation("TASK needs a task description".to_string())),
            },
            "BOT" => match msg.payload_parts(3).as_slice() {
                [target, message] if !target.is_empty() && !message.is_empty() => BrainCommand::Bot {
                    target: target.to_string(),
                    message: message.to_string(),
                },
                _ => return Err(Error::protocol("Invalid BOT command format")),
            },
            "RECALL" => BrainCommand::Recall,
            "LEARN" => BrainCommand::Learn,
            "FETCH_NEWS" => BrainCommand::FetchNews,
            "RESTART" => match msg.payload {
                Some(name) => BrainCommand::Restart(name),
                None => return Err(Error::Validation("RESTART needs a bot name".to_string())),
            },
            "QUEUE" => BrainCommand::Queue,
            other => return Err(Error::protocol(format!("unknown command {other}"))),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_verbs() {
        assert_eq!(BrainCommand::parse("STATUS").unwrap(), BrainCommand::Status);
        assert_eq!(BrainCommand::parse(" QUEUE\n").unwrap(), BrainCommand::Queue);
        assert_eq!(BrainCommand::parse("RECALL").unwrap(), BrainCommand::Recall);
        assert_eq!(BrainCommand::parse("LEARN").unwrap(), BrainCommand::Learn);
        assert_eq!(BrainCommand::parse("FETCH_NEWS").unwrap(), BrainCommand::FetchNews);
    }

    #[test]
    fn task_keeps_inner_colons() {
        assert_eq!(
            BrainCommand::parse("TASK:TRADE:AAPL").unwrap(),
            BrainCommand::Task("TRADE:AAPL".to_string())
        );
    }

    #[test]
    fn empty_task_rejected() {
        assert!(matches!(BrainCommand::parse("TASK:   "), Err(Error::Validation(_))));
    }

    #[test]
    fn bot_relay() {
        assert_eq!(
            BrainCommand::parse("BOT:news_ai:FETCH").unwrap(),
            BrainCommand::Bot {
                target: "news_ai".to_string(),
                message: "FETCH".to_string()
            }
        );
    }

    #[test]
    fn bot_needs_exactly_three_parts() {
        for bad in ["BOT:news_ai", "BOT:news_ai:FETCH:AAPL", "BOT", "BOT::FETCH"] {
            let err = BrainCommand::parse(bad).unwrap_err();
            assert_eq!(err.to_response(), "error: Invalid BOT command format", "{bad}");
        }
    }

    #[test]
    fn restart_needs_name() {
        assert_eq!(
            BrainCommand::parse("RESTART:memory_ai").unwrap(),
            BrainCommand::Restart("memory_ai".to_string())
        );
        assert!(matches!(BrainCommand::parse("RESTART"), Err(Error::Validation(_))));
    }

    #[test]
    fn unknown_and_lowercase_verbs() {
        assert!(matches!(BrainCommand::parse("DANCE"), Err(Error::Protocol(_))));
        assert!(matches!(BrainCommand::parse("status"), Err(Error::Protocol(_))));
        assert!(matches!(BrainCommand::parse(""), Err(Error::Protocol(_))));
    }
}
