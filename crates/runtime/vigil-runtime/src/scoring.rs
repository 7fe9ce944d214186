//! Volume-based reward policy.
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use vigil_types::WorkerId;

/// Smallest standard deviation used when normalizing volumes.
pub const MIN_STD_DEV: f64 = 1e-8;

/// Reward assigned to one worker in a scoring round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeScore {
    pub worker_id: WorkerId,
    pub volume: f64,
    pub reward: f64,
}

/// Rewards each worker by where its total volume sits in the population.
///
/// A lone worker gets `1.0`. Otherwise the reward is the standard normal CDF
/// of the worker's z-score, using the population standard deviation.
pub fn score_volumes(totals: &BTreeMap<WorkerId, u64>) -> Vec<VolumeScore> {
    if totals.is_empty() {
        return Vec::new();
    }

    let count = totals.len() as f64;
    let mean = totals.values().map(|v| *v as f64).sum::<f64>() / count;
    let variance = totals
        .values()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt().max(MIN_STD_DEV);
    tracing::debug!(mean, std_dev, workers = totals.len(), "Volume distribution");

    if totals.len() == 1 {
        return totals
            .iter()
            .map(|(worker, volume)| VolumeScore {
                worker_id: *worker,
                volume: *volume as f64,
                reward: 1.0,
            })
            .collect();
    }

    totals
        .iter()
        .map(|(worker, volume)| {
            let volume = *volume as f64;
            VolumeScore {
                worker_id: *worker,
                volume,
                reward: normal_cdf_score(volume, mean, std_dev),
            }
        })
        .collect()
}

fn normal_cdf_score(volume: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev < MIN_STD_DEV {
        return 0.0;
    }
    match Normal::new(0.0, 1.0) {
        Ok(standard) => standard.cdf((volume - mean) / std_dev),
        Err(e) => {
            tracing::error!("Failed to build standard normal distribution: {}", e);
            0.0
        }
    }
}
