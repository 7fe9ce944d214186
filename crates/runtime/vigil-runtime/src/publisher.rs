use std::sync::Arc;
use vigil_types::{ValidatorError, ValidatorResult, WorkerId};

use crate::ledger::{LedgerClient, SubmitOutcome};
use crate::metrics;

/// L1 normalization. A vector summing to zero normalizes to all zeros.
pub fn normalize_l1(scores: &[f64]) -> Vec<f64> {
    let norm: f64 = scores.iter().map(|s| s.abs()).sum();
    if norm <= f64::EPSILON || !norm.is_finite() {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s / norm).collect()
}

/// Turns the reputation vector into an on-ledger weight submission.
pub struct WeightPublisher {
    ledger: Arc<dyn LedgerClient>,
    epoch_length: u64,
    disabled: bool,
}

impl WeightPublisher {
    pub fn new(ledger: Arc<dyn LedgerClient>, epoch_length: u64, disabled: bool) -> Self {
        Self {
            ledger,
            epoch_length,
            disabled,
        }
    }

    /// Weights go out once per epoch, never on step 0 and never when disabled.
    pub async fn should_publish(&self, step: u64) -> ValidatorResult<bool> {
        if step == 0 || self.disabled {
            return Ok(false);
        }
        let current = self.ledger.current_block().await?;
        let last = self.ledger.last_weight_update().await?;
        Ok(current.saturating_sub(last) > self.epoch_length)
    }

    /// Normalizes `scores` over the first `worker_count` slots and submits them.
    ///
    /// Does not wait for inclusion. A rejected submission is an error; the next
    /// scheduled publish is the retry.
    pub async fn publish(&self, scores: &[f64], worker_count: usize) -> ValidatorResult<SubmitOutcome> {
        if scores.iter().any(|s| s.is_nan()) {
            tracing::warn!("Scores contain NaN values, they will be published as zero");
        }
        let mut live: Vec<f64> = scores
            .iter()
            .take(worker_count)
            .map(|s| if s.is_nan() { 0.0 } else { *s })
            .collect();
        live.resize(worker_count, 0.0);

        let raw_weights = normalize_l1(&live);
        let worker_ids: Vec<WorkerId> = (0..worker_count)
            .filter_map(|i| u16::try_from(i).ok().map(WorkerId))
            .collect();
        let raw_weights = raw_weights[..worker_ids.len()].to_vec();

        metrics::record_weight_submission("attempt");
        let (processed_ids, processed_weights) = self.ledger.process_weights(worker_ids, raw_weights).await?;
        let (uint_ids, uint_weights) = self.ledger.quantize_weights(&processed_ids, &processed_weights);
        tracing::info!("Setting weights: {:?} for uids: {:?}", uint_weights, uint_ids);

        let outcome = self.ledger.submit_weights(uint_ids, uint_weights).await?;
        if outcome.accepted {
            metrics::record_weight_submission("success");
            tracing::info!("set_weights on ledger successfully");
            Ok(outcome)
        } else {
            metrics::record_weight_submission("failure");
            tracing::error!("set_weights failed: {}", outcome.message);
            Err(ValidatorError::Ledger(format!("weight submission rejected: {}", outcome.message)))
        }
    }

    /// Publishes if due. Failures are logged and reported as `false`.
    pub async fn publish_if_due(&self, step: u64, scores: &[f64], worker_count: usize) -> bool {
        match self.should_publish(step).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::error!("Failed to check weight-setting cadence: {}", e);
                return false;
            }
        }
        match self.publish(scores, worker_count).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to set weights: {}", e);
                false
            }
        }
    }
}
