//! Contract for the ledger the validator reads blocks and the registry from,
//! and submits weights to.
use async_trait::async_trait;
use vigil_types::{ValidatorResult, WorkerId, WorkerSnapshot};

/// Outcome of a weight submission as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub message: String,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current block number. Monotonically increasing.
    async fn current_block(&self) -> ValidatorResult<u64>;

    /// Ordered worker registry (identities and endpoints).
    async fn workers(&self) -> ValidatorResult<WorkerSnapshot>;

    /// Blocks per epoch.
    async fn tempo(&self) -> ValidatorResult<u64>;

    /// Block at which this validator's weights were last accepted.
    async fn last_weight_update(&self) -> ValidatorResult<u64>;

    /// Ledger-side normalization and clamping of a weight vector.
    async fn process_weights(
        &self,
        worker_ids: Vec<WorkerId>,
        weights: Vec<f64>,
    ) -> ValidatorResult<(Vec<WorkerId>, Vec<f64>)>;

    /// Integer quantization applied before submission.
    fn quantize_weights(&self, worker_ids: &[WorkerId], weights: &[f64]) -> (Vec<u16>, Vec<u16>) {
        quantize_u16(worker_ids, weights)
    }

    /// Submit weights without waiting for inclusion or finalization.
    async fn submit_weights(&self, worker_ids: Vec<u16>, weights: Vec<u16>) -> ValidatorResult<SubmitOutcome>;
}

/// Scales weights so the largest maps to `u16::MAX`, dropping entries that round to zero.
/// Returns empty vectors when nothing is positive.
pub fn quantize_u16(worker_ids: &[WorkerId], weights: &[f64]) -> (Vec<u16>, Vec<u16>) {
    let max_weight = weights
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(0.0_f64, f64::max);
    if max_weight <= 0.0 {
        return (Vec::new(), Vec::new());
    }

    let mut ids = Vec::new();
    let mut values = Vec::new();
    for (id, weight) in worker_ids.iter().zip(weights) {
        if !weight.is_finite() || *weight <= 0.0 {
            continue;
        }
        let scaled = (weight / max_weight * u16::MAX as f64).round() as u16;
        if scaled != 0 {
            ids.push(id.0);
            values.push(scaled);
        }
    }
    (ids, values)
}
