//! EMA reputation table shared by every validator loop.
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vigil_types::{ValidatorError, ValidatorResult, ValidatorState, WorkerId, WorkerIdentity};

use crate::membership::{MembershipReconciler, Reconciliation};
use crate::metrics;
use crate::store::StateStore;

/// Applies one round of rewards to `scores` as an exponential moving average.
///
/// Non-finite rewards (NaN or infinite) count as zero. Positions not named in `worker_ids` decay by
/// `(1 - alpha)`. The vector grows, zero-filled, to cover the largest id.
/// Returns the number of rewards that had to be sanitized.
pub fn apply_ema(
    scores: &mut Vec<f64>,
    rewards: &[f64],
    worker_ids: &[WorkerId],
    alpha: f64,
) -> ValidatorResult<usize> {
    if rewards.len() != worker_ids.len() {
        return Err(ValidatorError::LengthMismatch {
            rewards: rewards.len(),
            workers: worker_ids.len(),
        });
    }

    let mut sanitized = 0;
    let rewards: Vec<f64> = rewards
        .iter()
        .map(|r| {
            if !r.is_finite() {
                sanitized += 1;
                0.0
            } else {
                *r
            }
        })
        .collect();
    if sanitized > 0 {
        tracing::warn!(count = sanitized, "Non-finite values detected in rewards, replaced with 0");
    }

    if let Some(max_index) = worker_ids.iter().map(|id| id.index()).max() {
        if max_index >= scores.len() {
            scores.resize(max_index + 1, 0.0);
        }
    }

    let mut scattered = vec![0.0; scores.len()];
    for (worker, reward) in worker_ids.iter().zip(&rewards) {
        scattered[worker.index()] = *reward;
    }

    for (score, target) in scores.iter_mut().zip(&scattered) {
        *score = alpha * target + (1.0 - alpha) * *score;
    }
    Ok(sanitized)
}

/// Owns the shared [`ValidatorState`] and the rules for mutating it.
///
/// All writes happen under the write lock and are persisted before the lock
/// is released, so readers never observe a state that was not saved.
#[derive(Clone)]
pub struct ReputationTable {
    state: Arc<RwLock<ValidatorState>>,
    store: Arc<dyn StateStore>,
    alpha: f64,
    reconciler: MembershipReconciler,
}

impl ReputationTable {
    pub fn new(state: ValidatorState, store: Arc<dyn StateStore>, alpha: f64) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            store,
            alpha,
            reconciler: MembershipReconciler,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Applies `rewards` for `worker_ids` and persists the result.
    pub async fn update(&self, rewards: &[f64], worker_ids: &[WorkerId]) -> ValidatorResult<()> {
        let mut state = self.state.write().await;
        let sanitized = apply_ema(&mut state.scores, rewards, worker_ids, self.alpha)?;
        metrics::record_non_finite_rewards(sanitized);

        for worker in worker_ids {
            let dropped = state.dedupe_set_mut(*worker).enforce_cap();
            if dropped > 0 {
                tracing::debug!(worker = %worker, dropped, "Truncated dedupe set");
            }
        }

        metrics::record_reputation_update();
        tracing::debug!(workers = worker_ids.len(), "Updated reputation scores");
        self.store.save(&state)
    }

    /// Reconciles against the live registry, advances the step and persists.
    ///
    /// The step only stays advanced if the save succeeds. Reconciliation is
    /// kept either way, so a retry takes the fast path.
    pub async fn sync(&self, current: &[WorkerIdentity]) -> ValidatorResult<Reconciliation> {
        let mut state = self.state.write().await;
        let outcome = self.reconciler.reconcile(&mut state, current);
        state.step += 1;
        if let Err(e) = self.store.save(&state) {
            state.step -= 1;
            return Err(e);
        }
        Ok(outcome)
    }

    /// Credits `worker` with every fingerprint it has not delivered before and
    /// adds the novel count to the volume record for `tempo`. Persists.
    pub async fn record_activity<'a, I>(&self, tempo: u64, worker: WorkerId, fingerprints: I) -> ValidatorResult<u64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.write().await;
        let novel = Self::credit(&mut state, tempo, worker, fingerprints);
        self.store.save(&state)?;
        Ok(novel)
    }

    /// Same as [`record_activity`](Self::record_activity) for a whole round,
    /// persisting once at the end.
    pub async fn record_round<'a, I, F>(&self, tempo: u64, round: I) -> ValidatorResult<Vec<(WorkerId, u64)>>
    where
        I: IntoIterator<Item = (WorkerId, F)>,
        F: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.write().await;
        let credited = round
            .into_iter()
            .map(|(worker, fingerprints)| (worker, Self::credit(&mut state, tempo, worker, fingerprints)))
            .collect();
        self.store.save(&state)?;
        Ok(credited)
    }

    fn credit<'a>(
        state: &mut ValidatorState,
        tempo: u64,
        worker: WorkerId,
        fingerprints: impl IntoIterator<Item = &'a str>,
    ) -> u64 {
        let set = state.dedupe_set_mut(worker);
        let novel = fingerprints.into_iter().filter(|fp| set.insert(*fp)).count() as u64;
        set.enforce_cap();
        state.volumes.record(tempo, worker, novel);
        novel
    }

    pub async fn persist(&self) -> ValidatorResult<()> {
        let state = self.state.read().await;
        self.store.save(&state)
    }

    pub async fn scores(&self) -> Vec<f64> {
        self.state.read().await.scores.clone()
    }

    pub async fn score(&self, worker: WorkerId) -> f64 {
        self.state.read().await.score(worker)
    }

    pub async fn step(&self) -> u64 {
        self.state.read().await.step
    }

    pub async fn identities(&self) -> Vec<WorkerIdentity> {
        self.state.read().await.identities.clone()
    }

    /// Activity per worker across the retained volume window.
    pub async fn volume_totals(&self) -> BTreeMap<WorkerId, u64> {
        self.state.read().await.volumes.totals()
    }

    /// A consistent copy of the whole state.
    pub async fn snapshot(&self) -> ValidatorState {
        self.state.read().await.clone()
    }
}
