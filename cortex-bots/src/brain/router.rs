//! Task routing: pick a specialist by marker, relay, record the outcome.

use std::sync::Arc;

use cortex_sdk::Client;
use cortex_sdk::registry::names;

use crate::memory::{MemoryStore, Record};
use crate::queue::{Task, TaskProcessor};

pub const UNRECOGNIZED: &str = "Task format not recognized.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Trade,
    Analyze,
    Learn,
}

impl Route {
    /// Checked in this order; the first marker found wins.
    pub const ALL: [Route; 3] = [Route::Trade, Route::Analyze, Route::Learn];

    pub fn marker(self) -> &'static str {
        match self {
            Route::Trade => "TRADE",
            Route::Analyze => "ANALYZE",
            Route::Learn => "LEARN",
        }
    }

    pub fn detect(task: &str) -> Option<Route> {
        Self::ALL.into_iter().find(|r| task.contains(r.marker()))
    }
}

/// Which bot handles each route.
#[derive(Debug, Clone)]
pub struct Routes {
    pub trade: String,
    pub analyze: String,
    pub learn: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            trade: names::TRADING.to_string(),
            analyze: names::SELF_ANALYSIS.to_string(),
            learn: names::LEARNING.to_string(),
        }
    }
}

impl Routes {
    pub fn target(&self, route: Route) -> &str {
        match route {
            Route::Trade => &self.trade,
            Route::Analyze => &self.analyze,
            Route::Learn => &self.learn,
        }
    }
}

pub struct Router {
    client: Client,
    memory: Arc<MemoryStore>,
    routes: Routes,
}

impl Router {
    pub fn new(client: Client, memory: Arc<MemoryStore>, routes: Routes) -> Self {
        Self { client, memory, routes }
    }

    /// Route one task and remember `{task, response}`. Transport failures
    /// become the response text.
    pub async fn route(&self, task: &Task) -> String {
        let response = match Route::detect(&task.raw) {
            Some(route) => {
                let target = self.routes.target(route);
                tracing::info!(task = task.id, bot = %target, marker = route.marker(), "Routing task");
                match self.client.send(target, &task.raw).await {
                    Ok(reply) => reply,
                    Err(e) => e.to_response(),
                }
            }
            None => {
                tracing::info!(task = task.id, "No route for task");
                UNRECOGNIZED.to_string()
            }
        };

        let record = Record::new(task.raw.clone()).with_detail(response.clone());
        if let Err(e) = self.memory.remember_record(record) {
            tracing::error!(task = task.id, error = %e, "Failed to record task outcome");
        }
        response
    }
}

impl TaskProcessor for Router {
    async fn process(&self, task: Task) -> String {
        self.route(&task).await
    }
}
