use async_trait::async_trait;
use std::time::Duration;
use vigil_types::{WorkerEndpoint, WorkerRequest, WorkerResponse};

/// A worker's answer and how long the call took.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReply {
    pub response: WorkerResponse,
    pub latency: Duration,
}

/// Wire transport used to reach worker endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` to every endpoint concurrently.
    ///
    /// The result is positionally aligned with `endpoints`. A call that errors,
    /// returns a non-success status or exceeds `timeout` yields `None`.
    async fn dispatch(
        &self,
        endpoints: &[WorkerEndpoint],
        request: &WorkerRequest,
        timeout: Duration,
    ) -> Vec<Option<WorkerReply>>;
}
