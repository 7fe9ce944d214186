//! Fan-out of worker requests and aggregation of their replies.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use vigil_types::{ValidatorError, ValidatorResult, WorkerId, WorkerRequest, WorkerResponse, WorkerSnapshot};

use crate::metrics;
use crate::publisher::WeightPublisher;
use crate::reputation::ReputationTable;
use crate::sampler::Sampler;
use crate::transport::{Transport, WorkerReply};

/// How valid responses are turned into the values handed to the reward policy.
pub enum ResponseTransform<T> {
    /// Responses pass through unchanged (`T` is built with `From`).
    Identity,
    /// Applied to each response on its own.
    ItemWise(Box<dyn Fn(WorkerResponse) -> T + Send + Sync>),
    /// Applied to the whole set of valid responses. Must keep the count.
    BatchWise(Box<dyn Fn(Vec<WorkerResponse>) -> Vec<T> + Send + Sync>),
}

impl<T> ResponseTransform<T> {
    pub fn item_wise(f: impl Fn(WorkerResponse) -> T + Send + Sync + 'static) -> Self {
        ResponseTransform::ItemWise(Box::new(f))
    }

    pub fn batch_wise(f: impl Fn(Vec<WorkerResponse>) -> Vec<T> + Send + Sync + 'static) -> Self {
        ResponseTransform::BatchWise(Box::new(f))
    }
}

impl<T: From<WorkerResponse>> ResponseTransform<T> {
    fn apply(&self, responses: Vec<WorkerResponse>) -> ValidatorResult<Vec<T>> {
        match self {
            ResponseTransform::Identity => Ok(responses.into_iter().map(T::from).collect()),
            ResponseTransform::ItemWise(f) => Ok(responses.into_iter().map(|r| f(r)).collect()),
            ResponseTransform::BatchWise(f) => {
                let expected = responses.len();
                let transformed = f(responses);
                if transformed.len() != expected {
                    return Err(ValidatorError::TransformMismatch {
                        expected,
                        produced: transformed.len(),
                    });
                }
                Ok(transformed)
            }
        }
    }
}

/// One valid reply from a sampling round, with the reward it earned.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResponse<T> {
    pub response: T,
    pub worker_id: WorkerId,
    pub score: f64,
    pub latency: Duration,
}

/// Orders by `(score, latency)` descending: best score first, and on equal
/// scores the slower reply first.
pub fn rank<T>(results: &mut [RankedResponse<T>]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| b.latency.cmp(&a.latency)));
}

pub struct Forwarder {
    transport: Arc<dyn Transport>,
    sampler: Arc<dyn Sampler>,
    registry: Arc<RwLock<WorkerSnapshot>>,
    reputation: ReputationTable,
    publisher: Arc<WeightPublisher>,
    sample_size: usize,
    networking_disabled: bool,
}

impl Forwarder {
    pub fn new(
        transport: Arc<dyn Transport>,
        sampler: Arc<dyn Sampler>,
        registry: Arc<RwLock<WorkerSnapshot>>,
        reputation: ReputationTable,
        publisher: Arc<WeightPublisher>,
        sample_size: usize,
        networking_disabled: bool,
    ) -> Self {
        Self {
            transport,
            sampler,
            registry,
            reputation,
            publisher,
            sample_size,
            networking_disabled,
        }
    }

    /// Runs one sampling round for `request` and returns the ranked valid replies.
    ///
    /// Rewards come from `reward_fn`, one per transformed response. When at
    /// least one worker answered, the reputation table is updated and a weight
    /// submission is attempted if one is due.
    pub async fn forward<T, R>(
        &self,
        request: &WorkerRequest,
        reward_fn: R,
        transform: ResponseTransform<T>,
        timeout: Duration,
    ) -> ValidatorResult<Vec<RankedResponse<T>>>
    where
        T: From<WorkerResponse>,
        R: Fn(&[T]) -> Vec<f64>,
    {
        let replies = self.collect(request, self.sample_size, timeout).await;
        metrics::record_forward_round();
        if replies.is_empty() {
            return Ok(Vec::new());
        }

        let mut worker_ids = Vec::with_capacity(replies.len());
        let mut latencies = Vec::with_capacity(replies.len());
        let mut responses = Vec::with_capacity(replies.len());
        for (worker, reply) in replies {
            worker_ids.push(worker);
            latencies.push(reply.latency);
            responses.push(reply.response);
        }

        let transformed = transform.apply(responses)?;
        let rewards = reward_fn(&transformed);
        if rewards.len() != worker_ids.len() {
            return Err(ValidatorError::LengthMismatch {
                rewards: rewards.len(),
                workers: worker_ids.len(),
            });
        }

        self.reputation.update(&rewards, &worker_ids).await?;
        self.publish_if_due().await;

        let mut ranked: Vec<RankedResponse<T>> = transformed
            .into_iter()
            .zip(worker_ids)
            .zip(latencies)
            .zip(&rewards)
            .map(|(((response, worker_id), latency), score)| RankedResponse {
                response,
                worker_id,
                score: if score.is_finite() { *score } else { 0.0 },
                latency,
            })
            .collect();
        rank(&mut ranked);
        Ok(ranked)
    }

    /// Samples up to `k` serving workers and dispatches `request` to them.
    /// Only valid replies are returned, each with the worker it came from.
    pub async fn collect(&self, request: &WorkerRequest, k: usize, timeout: Duration) -> Vec<(WorkerId, WorkerReply)> {
        if self.networking_disabled {
            tracing::debug!("Networking disabled, skipping worker dispatch");
            return Vec::new();
        }
        let candidates = self.registry.read().await.serving_ids();
        let sampled = self.sampler.sample(&candidates, k);
        if sampled.is_empty() {
            tracing::warn!("No serving workers available to sample");
            return Vec::new();
        }
        self.dispatch_to(&sampled, request, timeout).await
    }

    /// Sends a liveness probe to every serving worker.
    pub async fn ping_workers(&self, timeout: Duration) -> Vec<(WorkerId, WorkerReply)> {
        if self.networking_disabled {
            return Vec::new();
        }
        let serving = self.registry.read().await.serving_ids();
        self.dispatch_to(&serving, &WorkerRequest::Ping, timeout).await
    }

    async fn dispatch_to(
        &self,
        worker_ids: &[WorkerId],
        request: &WorkerRequest,
        timeout: Duration,
    ) -> Vec<(WorkerId, WorkerReply)> {
        let (ids, endpoints): (Vec<WorkerId>, Vec<_>) = {
            let registry = self.registry.read().await;
            worker_ids
                .iter()
                .filter_map(|id| registry.endpoint(*id).map(|e| (*id, e.clone())))
                .unzip()
        };
        if endpoints.is_empty() {
            return Vec::new();
        }

        let replies = self.transport.dispatch(&endpoints, request, timeout).await;
        let valid: Vec<(WorkerId, WorkerReply)> = ids
            .into_iter()
            .zip(replies)
            .filter_map(|(id, reply)| reply.map(|r| (id, r)))
            .collect();

        for (_, reply) in &valid {
            metrics::observe_worker_latency(reply.latency.as_secs_f64());
        }
        metrics::record_worker_responses(valid.len(), endpoints.len().saturating_sub(valid.len()));
        tracing::debug!(
            dispatched = endpoints.len(),
            valid = valid.len(),
            "Collected worker replies"
        );
        valid
    }

    /// Publishes weights if the ledger cadence allows it. Never fails.
    pub async fn publish_if_due(&self) -> bool {
        let step = self.reputation.step().await;
        let scores = self.reputation.scores().await;
        let worker_count = self.registry.read().await.len();
        self.publisher.publish_if_due(step, &scores, worker_count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(worker: u16, score: f64, latency_ms: u64) -> RankedResponse<()> {
        RankedResponse {
            response: (),
            worker_id: WorkerId(worker),
            score,
            latency: Duration::from_millis(latency_ms),
        }
    }

    #[test]
    fn rank_orders_by_score_then_latency_descending() {
        let mut results = vec![
            entry(0, 0.5, 100),
            entry(1, 0.9, 10),
            entry(2, 0.5, 300),
            entry(3, 0.1, 50),
        ];
        rank(&mut results);
        let order: Vec<u16> = results.iter().map(|r| r.worker_id.0).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn batch_transform_must_keep_count() {
        let transform: ResponseTransform<WorkerResponse> = ResponseTransform::batch_wise(|mut responses| {
            responses.pop();
            responses
        });
        let responses = vec![
            WorkerResponse::Pong { version: "1".into() },
            WorkerResponse::Pong { version: "2".into() },
        ];
        let err = transform.apply(responses).unwrap_err();
        assert!(matches!(err, ValidatorError::TransformMismatch { expected: 2, produced: 1 }));
    }

    #[test]
    fn item_transform_maps_each_response() -> anyhow::Result<()> {
        struct Version(String);
        impl From<WorkerResponse> for Version {
            fn from(response: WorkerResponse) -> Self {
                Version(response.version().unwrap_or_default().to_string())
            }
        }
        let transform = ResponseTransform::item_wise(|r: WorkerResponse| Version(format!("v{}", r.version().unwrap_or("?"))));
        let out = transform.apply(vec![WorkerResponse::Pong { version: "3".into() }])?;
        assert_eq!(out[0].0, "v3");

        let identity: ResponseTransform<Version> = ResponseTransform::Identity;
        let out = identity.apply(vec![WorkerResponse::Pong { version: "4".into() }])?;
        assert_eq!(out[0].0, "4");
        Ok(())
    }
}
