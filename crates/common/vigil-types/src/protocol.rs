use serde::{Deserialize, Serialize};

/// Request the validator sends to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Liveness probe; workers answer with their software version.
    Ping,
    /// Collect up to `count` recent items matching `query`.
    Scrape { query: String, count: u32 },
}

/// A single collected item. `fingerprint` identifies the content for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub fingerprint: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reply a worker returns for a [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerResponse {
    Pong { version: String },
    Items { items: Vec<ScrapedItem> },
}

impl WorkerResponse {
    pub fn version(&self) -> Option<&str> {
        match self {
            WorkerResponse::Pong { version } => Some(version),
            WorkerResponse::Items { .. } => None,
        }
    }

    pub fn items(&self) -> &[ScrapedItem] {
        match self {
            WorkerResponse::Items { items } => items,
            WorkerResponse::Pong { .. } => &[],
        }
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.items().iter().map(|item| item.fingerprint.as_str())
    }
}
