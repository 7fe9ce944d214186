//! Drives the validator's periodic work as independent background loops.
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::metrics_server::run_metrics_server;
use crate::validator::Validator;

/// The fraction of a tempo between two scoring rounds is `1 / SCORING_ROUNDS_PER_TEMPO`.
pub const SCORING_ROUNDS_PER_TEMPO: u64 = 50;

/// Block-gated loops run by the [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLoop {
    Sync,
    HealthCheck,
    Volume,
    Scoring,
}

impl BlockLoop {
    pub const ALL: [BlockLoop; 4] = [
        BlockLoop::Sync,
        BlockLoop::HealthCheck,
        BlockLoop::Volume,
        BlockLoop::Scoring,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlockLoop::Sync => "sync",
            BlockLoop::HealthCheck => "health",
            BlockLoop::Volume => "volume",
            BlockLoop::Scoring => "scoring",
        }
    }

    /// Blocks that must elapse between two runs of this loop.
    async fn threshold(self, validator: &Validator) -> anyhow::Result<u64> {
        let config = validator.config();
        Ok(match self {
            BlockLoop::Sync => config.sync_interval_blocks,
            BlockLoop::HealthCheck => config.healthcheck_blocks,
            BlockLoop::Volume => config.volume_blocks,
            BlockLoop::Scoring => {
                let tempo = validator.ledger().tempo().await?;
                tempo.div_ceil(SCORING_ROUNDS_PER_TEMPO)
            }
        })
    }

    async fn run_once(self, validator: &Validator) -> anyhow::Result<()> {
        match self {
            BlockLoop::Sync => {
                validator.sync().await.context("registry sync failed")?;
            }
            BlockLoop::HealthCheck => {
                validator.health_check().await;
            }
            BlockLoop::Volume => {
                validator
                    .sample_volumes()
                    .await
                    .context("volume sampling failed")?;
            }
            BlockLoop::Scoring => {
                validator
                    .score_volumes()
                    .await
                    .context("volume scoring failed")?;
            }
        }
        Ok(())
    }
}

/// Block-count gate for one loop.
///
/// The checkpoint starts at 0 and only moves when [`Cadence::mark`] is called,
/// i.e. after a unit of work succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cadence {
    last_checkpoint: u64,
}

impl Cadence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_checkpoint(&self) -> u64 {
        self.last_checkpoint
    }

    pub fn is_due(&self, current_block: u64, threshold: u64) -> bool {
        current_block.saturating_sub(self.last_checkpoint) >= threshold
    }

    pub fn mark(&mut self, block: u64) {
        self.last_checkpoint = block;
    }
}

/// Runs one block-gated loop until `shutdown` is cancelled.
///
/// Every iteration reads the current block, runs the unit of work if the loop
/// is due, and then sleeps one block time whether or not work ran. Errors are
/// logged and never end the loop.
pub async fn run_block_loop(validator: Arc<Validator>, kind: BlockLoop, shutdown: CancellationToken) {
    let name = kind.name();
    let block_time = validator.config().block_time();
    let mut cadence = Cadence::new();
    tracing::info!("[{}] loop started", name);

    while !shutdown.is_cancelled() {
        if let Err(e) = tick(&validator, kind, &mut cadence).await {
            metrics::record_loop_run(name, false);
            tracing::error!("[{}] Error running loop iteration: {:#}", name, e);
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(block_time) => {}
        }
    }
    tracing::info!("[{}] loop stopped", name);
}

async fn tick(validator: &Validator, kind: BlockLoop, cadence: &mut Cadence) -> anyhow::Result<()> {
    let block = validator
        .ledger()
        .current_block()
        .await
        .context("failed to read current block")?;
    let threshold = kind.threshold(validator).await?;
    if !cadence.is_due(block, threshold) {
        return Ok(());
    }

    tracing::debug!(block, loop_name = kind.name(), "Running scheduled work");
    kind.run_once(validator).await?;
    cadence.mark(block);
    metrics::record_loop_run(kind.name(), true);
    Ok(())
}

/// Refreshes trending queries once per tempo of wall-clock time.
pub async fn run_auto_update_loop(validator: Arc<Validator>, shutdown: CancellationToken) {
    let block_time = validator.config().block_time();
    tracing::info!("[auto_update] loop started");

    while !shutdown.is_cancelled() {
        let ok = match validator.refresh_queries().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("[auto_update] Error refreshing queries: {}", e);
                false
            }
        };
        metrics::record_loop_run("auto_update", ok);

        let interval = match validator.ledger().tempo().await {
            Ok(tempo) => block_time.saturating_mul(u32::try_from(tempo.max(1)).unwrap_or(u32::MAX)),
            Err(e) => {
                tracing::warn!("[auto_update] Failed to read tempo, retrying after one block: {}", e);
                block_time
            }
        };
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!("[auto_update] loop stopped");
}

/// Owns the validator's background tasks and their shared shutdown signal.
pub struct Scheduler {
    validator: Arc<Validator>,
    token: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    grace: Duration,
}

impl Scheduler {
    pub fn new(validator: Arc<Validator>) -> Self {
        let grace = validator.config().shutdown_grace();
        Self {
            validator,
            token: CancellationToken::new(),
            handles: Vec::new(),
            grace,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Spawns the five loops, plus the metrics endpoint when a port is configured.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("Scheduler already running");
            return;
        }

        for kind in BlockLoop::ALL {
            let handle = tokio::spawn(run_block_loop(self.validator.clone(), kind, self.token.clone()));
            self.handles.push((kind.name(), handle));
        }
        let handle = tokio::spawn(run_auto_update_loop(self.validator.clone(), self.token.clone()));
        self.handles.push(("auto_update", handle));

        if let Some(port) = self.validator.config().metrics_port {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let handle = tokio::spawn(run_metrics_server(addr, self.token.clone()));
            self.handles.push(("metrics", handle));
        }
        tracing::info!(tasks = self.handles.len(), "Validator scheduler started");
    }

    /// Signals every loop to stop and waits up to the grace period for each.
    /// Loops that do not finish in time are aborted.
    pub async fn shutdown(mut self) {
        tracing::info!("Stopping validator scheduler");
        self.token.cancel();
        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout(self.grace, &mut handle).await {
                Ok(Ok(())) => tracing::debug!("[{}] joined", name),
                Ok(Err(e)) => tracing::error!("[{}] task panicked: {}", name, e),
                Err(_) => {
                    tracing::warn!("[{}] did not stop within {:?}, abandoning", name, self.grace);
                    handle.abort();
                }
            }
        }
        if let Err(e) = self.validator.reputation().persist().await {
            tracing::error!("Failed to persist state on shutdown: {}", e);
        }
        tracing::info!("Validator scheduler stopped");
    }

    /// Runs until `signal` resolves, then shuts down.
    pub async fn run_until<F>(mut self, signal: F)
    where
        F: std::future::Future<Output = ()>,
    {
        self.start();
        signal.await;
        self.shutdown().await;
    }
}
