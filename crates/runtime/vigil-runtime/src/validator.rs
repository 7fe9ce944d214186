use anyhow::Context;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vigil_types::{ValidatorError, ValidatorResult, WorkerId, WorkerRequest, WorkerSnapshot};

use crate::config::ValidatorConfig;
use crate::forwarder::Forwarder;
use crate::ledger::LedgerClient;
use crate::membership::Reconciliation;
use crate::metrics;
use crate::publisher::WeightPublisher;
use crate::queries::QuerySource;
use crate::reputation::ReputationTable;
use crate::sampler::Sampler;
use crate::scoring::{score_volumes, VolumeScore};
use crate::store::StateStore;
use crate::transport::Transport;

/// External collaborators a validator is built from.
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerClient>,
    pub transport: Arc<dyn Transport>,
    pub sampler: Arc<dyn Sampler>,
    pub store: Arc<dyn StateStore>,
    pub queries: Arc<dyn QuerySource>,
}

/// The validator node: cached registry, reputation, and the units of work the
/// scheduler drives.
pub struct Validator {
    config: ValidatorConfig,
    ledger: Arc<dyn LedgerClient>,
    query_source: Arc<dyn QuerySource>,
    registry: Arc<RwLock<WorkerSnapshot>>,
    reputation: ReputationTable,
    forwarder: Forwarder,
    versions: RwLock<BTreeMap<WorkerId, String>>,
    queries: RwLock<Vec<String>>,
}

impl Validator {
    /// Reads the live registry, restores persisted state and wires components.
    pub async fn new(config: ValidatorConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        config.validate()?;
        let Collaborators {
            ledger,
            transport,
            sampler,
            store,
            queries,
        } = collaborators;

        let snapshot = ledger
            .workers()
            .await
            .context("Failed to read worker registry from ledger")?;
        let state = store
            .load(&snapshot)
            .context("Failed to load validator state")?;
        tracing::info!(
            step = state.step,
            workers = snapshot.len(),
            "Validator state restored"
        );

        let registry = Arc::new(RwLock::new(snapshot));
        let reputation = ReputationTable::new(state, store, config.moving_average_alpha);
        let publisher = Arc::new(WeightPublisher::new(
            ledger.clone(),
            config.epoch_length,
            config.disable_set_weights,
        ));
        let forwarder = Forwarder::new(
            transport,
            sampler,
            registry.clone(),
            reputation.clone(),
            publisher,
            config.sample_size,
            config.networking_disabled,
        );

        Ok(Self {
            config,
            ledger,
            query_source: queries,
            registry,
            reputation,
            forwarder,
            versions: RwLock::new(BTreeMap::new()),
            queries: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn reputation(&self) -> &ReputationTable {
        &self.reputation
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub async fn registry(&self) -> WorkerSnapshot {
        self.registry.read().await.clone()
    }

    pub async fn versions(&self) -> BTreeMap<WorkerId, String> {
        self.versions.read().await.clone()
    }

    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }

    pub async fn set_queries(&self, queries: Vec<String>) {
        *self.queries.write().await = queries;
    }

    /// Pulls the registry from the ledger, reconciles reputation against it,
    /// advances the step and persists. A failed attempt is retried once with a
    /// freshly fetched registry.
    pub async fn sync(&self) -> ValidatorResult<Reconciliation> {
        match self.sync_once().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!("Sync failed, rebuilding worker snapshot: {}", e);
                self.sync_once().await
            }
        }
    }

    async fn sync_once(&self) -> ValidatorResult<Reconciliation> {
        let snapshot = self.ledger.workers().await?;
        let identities = snapshot.identities();
        // Reconciliation is applied even when the save fails, so the cached
        // endpoints must follow the identities first.
        *self.registry.write().await = snapshot;
        let outcome = self.reputation.sync(&identities).await?;
        if !outcome.is_noop() {
            tracing::info!(
                replaced = outcome.replaced.len(),
                added = outcome.added,
                "Worker registry reconciled"
            );
        }
        Ok(outcome)
    }

    /// Pings every serving worker and records the versions they report.
    /// Returns the number of workers that answered.
    pub async fn health_check(&self) -> usize {
        let replies = self.forwarder.ping_workers(self.config.forward_timeout()).await;
        let mut versions = self.versions.write().await;
        versions.clear();
        for (worker, reply) in replies {
            if let Some(version) = reply.response.version() {
                versions.insert(worker, version.to_string());
            }
        }
        metrics::set_live_workers(versions.len());
        tracing::info!(live = versions.len(), "Worker health check complete");
        versions.len()
    }

    /// Sends a trending query to a sample of workers and credits each one with
    /// the number of items it delivered that it had not delivered before.
    pub async fn sample_volumes(&self) -> ValidatorResult<Vec<(WorkerId, u64)>> {
        let query = {
            let queries = self.queries.read().await;
            queries.choose(&mut rand::thread_rng()).cloned()
        };
        let Some(query) = query else {
            tracing::warn!("No trending queries available, skipping volume sampling");
            return Ok(Vec::new());
        };

        let request = WorkerRequest::Scrape {
            query: query.clone(),
            count: self.config.volume_item_count,
        };
        let replies = self
            .forwarder
            .collect(&request, self.config.volume_sample_size, self.config.forward_timeout())
            .await;
        if replies.is_empty() {
            return Ok(Vec::new());
        }

        let tempo = self.current_tempo().await?;
        let credited = self
            .reputation
            .record_round(
                tempo,
                replies
                    .iter()
                    .map(|(worker, reply)| (*worker, reply.response.fingerprints())),
            )
            .await?;
        tracing::info!(query = %query, tempo, workers = credited.len(), "Recorded worker volumes");
        Ok(credited)
    }

    /// Index of the tempo the current block falls in.
    async fn current_tempo(&self) -> ValidatorResult<u64> {
        let block = self.ledger.current_block().await?;
        let tempo_length = self.ledger.tempo().await?;
        if tempo_length == 0 {
            return Err(ValidatorError::Ledger("ledger reported a tempo of 0".into()));
        }
        Ok(block / tempo_length)
    }

    /// Scores recorded volumes, applies the rewards and publishes weights if due.
    pub async fn score_volumes(&self) -> ValidatorResult<Vec<VolumeScore>> {
        let totals = self.reputation.volume_totals().await;
        if totals.is_empty() {
            tracing::info!("No volumes to score yet");
            self.reputation.persist().await?;
            return Ok(Vec::new());
        }

        let scores = score_volumes(&totals);
        let worker_ids: Vec<WorkerId> = scores.iter().map(|s| s.worker_id).collect();
        let rewards: Vec<f64> = scores.iter().map(|s| s.reward).collect();
        self.reputation.update(&rewards, &worker_ids).await?;
        self.forwarder.publish_if_due().await;
        Ok(scores)
    }

    /// Refreshes the trending query list. Returns how many queries are kept.
    pub async fn refresh_queries(&self) -> ValidatorResult<usize> {
        if !self.config.auto_update {
            tracing::debug!("Auto-update disabled, keeping current queries");
            return Ok(self.queries.read().await.len());
        }
        let mut fetched = self.query_source.fetch().await?;
        fetched.truncate(self.config.trending_query_limit);
        let count = fetched.len();
        tracing::info!(count, "Refreshed trending queries");
        self.set_queries(fetched).await;
        Ok(count)
    }
}
