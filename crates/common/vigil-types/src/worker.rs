use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot index of a worker in the registry.
///
/// The index is stable across registry syncs while the identity occupying the
/// slot may change, so a `WorkerId` always means "whoever holds this slot now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u16);

impl WorkerId {
    /// Position of this worker in score and identity vectors.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for WorkerId {
    fn from(value: u16) -> Self {
        WorkerId(value)
    }
}

/// Opaque key (usually an account address) held by a worker slot at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity(pub String);

impl WorkerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerIdentity {
    fn from(value: &str) -> Self {
        WorkerIdentity(value.to_string())
    }
}

/// Network address a worker advertises on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    pub ip: String,
    pub port: u16,
}

impl WorkerEndpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// An endpoint that was never announced is registered as `0.0.0.0` or with port 0.
    pub fn is_serving(&self) -> bool {
        self.ip != "0.0.0.0" && self.port != 0
    }
}

impl fmt::Display for WorkerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One registry slot as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub identity: WorkerIdentity,
    pub endpoint: WorkerEndpoint,
}

/// Ordered view of the worker registry. Position `i` is `WorkerId(i)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub workers: Vec<WorkerInfo>,
}

impl WorkerSnapshot {
    pub fn new(workers: Vec<WorkerInfo>) -> Self {
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn identities(&self) -> Vec<WorkerIdentity> {
        self.workers.iter().map(|w| w.identity.clone()).collect()
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerInfo> {
        self.workers.get(id.index())
    }

    pub fn endpoint(&self, id: WorkerId) -> Option<&WorkerEndpoint> {
        self.get(id).map(|w| &w.endpoint)
    }

    /// Ids of every slot whose endpoint is currently serving.
    pub fn serving_ids(&self) -> Vec<WorkerId> {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.endpoint.is_serving())
            .filter_map(|(i, _)| u16::try_from(i).ok().map(WorkerId))
            .collect()
    }
}
