//! Fan-out of one message to every registered bot.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;

use crate::client::Client;
use crate::error::Result;

/// Reference per-target bound for a fan-out. Kept below the reference
/// call timeout so a relay that fans out still answers its own caller.
pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(1);

/// Send `message` to every bot in the registry, the sender included if it
/// is registered. Each target gets its own call bounded by `limit`; one
/// failure never aborts delivery to the rest. The result has exactly one
/// entry per registry name.
pub async fn broadcast(client: &Client, message: &str, limit: Duration) -> BTreeMap<String, Result<String>> {
    let calls = client.registry().iter().map(|bot| async move {
        let outcome = client.send_within(&bot.name, message, limit).await;
        (bot.name.clone(), outcome)
    });

    let results: BTreeMap<_, _> = join_all(calls).await.into_iter().collect();
    let failed = results.values().filter(|r| r.is_err()).count();
    tracing::info!(targets = results.len(), failed, "Broadcast delivered");
    results
}

/// Connect-only probe of every registered bot: name → reachable.
pub async fn probe_all(client: &Client, limit: Duration) -> BTreeMap<String, bool> {
    let probes = client.registry().iter().map(|bot| async move {
        let online = client.probe(&bot.name, limit).await.is_ok();
        (bot.name.clone(), online)
    });
    join_all(probes).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::client::TransportConfig;
    use crate::registry::{BotIdentity, Registry};

    /// Answers every connection with `ok <request>`.
    async fn echo() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut req = Vec::new();
                    stream.read_to_end(&mut req).await.unwrap();
                    let _ = stream.write_all(format!("ok {}", String::from_utf8_lossy(&req)).as_bytes()).await;
                });
            }
        });
        port
    }

    /// Accepts connections and never answers.
    async fn silent() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        port
    }

    #[tokio::test]
    async fn silent_target_bounded_by_fanout_limit() {
        let registry = Registry::new([
            BotIdentity::new("news_ai", "127.0.0.1", echo().await),
            BotIdentity::new("logic_ai", "127.0.0.1", silent().await),
        ])
        .unwrap();
        let client = Client::new(Arc::new(registry), TransportConfig::default());

        let started = Instant::now();
        let results = broadcast(&client, "ping", Duration::from_millis(300)).await;
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());

        assert_eq!(results.len(), 2);
        assert_eq!(results["news_ai"].as_ref().unwrap(), "ok ping");
        assert!(results["logic_ai"].is_err());
    }
}
