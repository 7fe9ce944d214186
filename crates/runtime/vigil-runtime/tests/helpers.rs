#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_runtime::{
    Collaborators, InMemoryStateStore, LedgerClient, Sampler, StateStore, StaticQuerySource, SubmitOutcome, Transport, Validator,
    ValidatorConfig, WorkerReply,
};
use vigil_types::{
    ScrapedItem, ValidatorError, ValidatorResult, ValidatorState, WorkerEndpoint, WorkerId, WorkerIdentity, WorkerInfo,
    WorkerRequest, WorkerResponse, WorkerSnapshot,
};

/// Registry of `keys.len()` serving workers at `10.0.0.<index>:8091`.
pub fn snapshot(keys: &[&str]) -> WorkerSnapshot {
    WorkerSnapshot::new(
        keys.iter()
            .enumerate()
            .map(|(i, key)| WorkerInfo {
                identity: WorkerIdentity::from(*key),
                endpoint: endpoint(i),
            })
            .collect(),
    )
}

pub fn endpoint(index: usize) -> WorkerEndpoint {
    WorkerEndpoint::new(format!("10.0.0.{}", index), 8091)
}

pub fn items(fingerprints: &[&str]) -> WorkerResponse {
    WorkerResponse::Items {
        items: fingerprints
            .iter()
            .map(|fp| ScrapedItem {
                fingerprint: fp.to_string(),
                payload: serde_json::Value::Null,
            })
            .collect(),
    }
}

/// Ledger double with settable block, registry and weight-update block.
pub struct MockLedger {
    block: AtomicU64,
    tempo: AtomicU64,
    last_update: AtomicU64,
    workers: Mutex<WorkerSnapshot>,
    pending_registry_failures: AtomicUsize,
    accept_weights: AtomicBool,
    submissions: Mutex<Vec<(Vec<u16>, Vec<u16>)>>,
}

impl MockLedger {
    pub fn new(workers: WorkerSnapshot) -> Self {
        Self {
            block: AtomicU64::new(0),
            tempo: AtomicU64::new(360),
            last_update: AtomicU64::new(0),
            workers: Mutex::new(workers),
            pending_registry_failures: AtomicUsize::new(0),
            accept_weights: AtomicBool::new(true),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_block(&self, block: u64) {
        self.block.store(block, Ordering::SeqCst);
    }

    pub fn set_tempo(&self, tempo: u64) {
        self.tempo.store(tempo, Ordering::SeqCst);
    }

    pub fn set_last_update(&self, block: u64) {
        self.last_update.store(block, Ordering::SeqCst);
    }

    pub fn set_workers(&self, workers: WorkerSnapshot) {
        *self.workers.lock().unwrap() = workers;
    }

    /// The next `count` registry reads fail.
    pub fn fail_registry_reads(&self, count: usize) {
        self.pending_registry_failures.store(count, Ordering::SeqCst);
    }

    pub fn reject_weights(&self) {
        self.accept_weights.store(false, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<(Vec<u16>, Vec<u16>)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn current_block(&self) -> ValidatorResult<u64> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn workers(&self) -> ValidatorResult<WorkerSnapshot> {
        let failed = self
            .pending_registry_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ValidatorError::Ledger("registry unavailable".into()));
        }
        Ok(self.workers.lock().unwrap().clone())
    }

    async fn tempo(&self) -> ValidatorResult<u64> {
        Ok(self.tempo.load(Ordering::SeqCst))
    }

    async fn last_weight_update(&self) -> ValidatorResult<u64> {
        Ok(self.last_update.load(Ordering::SeqCst))
    }

    async fn process_weights(
        &self,
        worker_ids: Vec<WorkerId>,
        weights: Vec<f64>,
    ) -> ValidatorResult<(Vec<WorkerId>, Vec<f64>)> {
        Ok((worker_ids, weights))
    }

    async fn submit_weights(&self, worker_ids: Vec<u16>, weights: Vec<u16>) -> ValidatorResult<SubmitOutcome> {
        self.submissions.lock().unwrap().push((worker_ids, weights));
        let accepted = self.accept_weights.load(Ordering::SeqCst);
        if accepted {
            self.last_update
                .store(self.block.load(Ordering::SeqCst), Ordering::SeqCst);
        }
        Ok(SubmitOutcome {
            accepted,
            message: if accepted { "ok".into() } else { "rate limited".into() },
        })
    }
}

#[derive(Clone)]
pub enum Behavior {
    Reply(WorkerResponse, Duration),
    Fail,
    /// Never answers within any reasonable timeout.
    Hang,
}

/// Transport double answering per endpoint IP. Unknown endpoints fail.
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    requests: Mutex<Vec<WorkerRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, index: usize, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(endpoint(index).ip, behavior);
    }

    pub fn reply(&self, index: usize, response: WorkerResponse, latency_ms: u64) {
        self.set(index, Behavior::Reply(response, Duration::from_millis(latency_ms)));
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn dispatch(
        &self,
        endpoints: &[WorkerEndpoint],
        request: &WorkerRequest,
        _timeout: Duration,
    ) -> Vec<Option<WorkerReply>> {
        self.requests.lock().unwrap().push(request.clone());
        let behaviors: Vec<Behavior> = {
            let map = self.behaviors.lock().unwrap();
            endpoints
                .iter()
                .map(|e| map.get(&e.ip).cloned().unwrap_or(Behavior::Fail))
                .collect()
        };
        if behaviors.iter().any(|b| matches!(b, Behavior::Hang)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        behaviors
            .into_iter()
            .map(|b| match b {
                Behavior::Reply(response, latency) => Some(WorkerReply { response, latency }),
                Behavior::Fail | Behavior::Hang => None,
            })
            .collect()
    }
}

/// In-memory store whose next `n` saves fail with a storage error.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStateStore,
    pending_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Option<ValidatorState> {
        self.inner.stored()
    }
}

impl StateStore for FlakyStore {
    fn save(&self, state: &ValidatorState) -> ValidatorResult<()> {
        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ValidatorError::Storage("disk full".into()));
        }
        self.inner.save(state)
    }

    fn load(&self, live: &WorkerSnapshot) -> ValidatorResult<ValidatorState> {
        self.inner.load(live)
    }
}

/// Deterministic sampler: the first `k` candidates.
pub struct FirstSampler;

impl Sampler for FirstSampler {
    fn sample(&self, candidates: &[WorkerId], k: usize) -> Vec<WorkerId> {
        candidates.iter().take(k).copied().collect()
    }
}

pub fn test_config() -> ValidatorConfig {
    ValidatorConfig {
        sample_size: 10,
        moving_average_alpha: 0.1,
        block_time_ms: 1_000,
        forward_timeout_ms: 500,
        shutdown_grace_ms: 5_000,
        epoch_length: 100,
        trending_query_limit: 2,
        volume_sample_size: 10,
        volume_item_count: 5,
        ..Default::default()
    }
}

pub struct Harness {
    pub ledger: Arc<MockLedger>,
    pub transport: Arc<MockTransport>,
    pub validator: Arc<Validator>,
}

pub async fn harness(
    config: ValidatorConfig,
    workers: WorkerSnapshot,
    store: Arc<dyn StateStore>,
) -> anyhow::Result<Harness> {
    harness_with_queries(config, workers, store, StaticQuerySource::new(["rust", "tokio", "sled"])).await
}

pub async fn harness_with_queries(
    config: ValidatorConfig,
    workers: WorkerSnapshot,
    store: Arc<dyn StateStore>,
    queries: StaticQuerySource,
) -> anyhow::Result<Harness> {
    let ledger = Arc::new(MockLedger::new(workers));
    let transport = Arc::new(MockTransport::new());
    let validator = Validator::new(
        config,
        Collaborators {
            ledger: ledger.clone(),
            transport: transport.clone(),
            sampler: Arc::new(FirstSampler),
            store,
            queries: Arc::new(queries),
        },
    )
    .await?;
    Ok(Harness {
        ledger,
        transport,
        validator: Arc::new(validator),
    })
}
