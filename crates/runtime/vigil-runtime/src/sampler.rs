use rand::seq::SliceRandom;
use vigil_types::WorkerId;

/// Chooses which workers take part in a round.
pub trait Sampler: Send + Sync {
    /// Up to `k` distinct ids from `candidates`.
    fn sample(&self, candidates: &[WorkerId], k: usize) -> Vec<WorkerId>;
}

/// Uniform sampling without replacement. `k` is clamped to the candidate count.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformSampler;

impl Sampler for UniformSampler {
    fn sample(&self, candidates: &[WorkerId], k: usize) -> Vec<WorkerId> {
        let k = k.min(candidates.len());
        let mut rng = rand::thread_rng();
        let selected: Vec<WorkerId> = candidates.choose_multiple(&mut rng, k).copied().collect();
        tracing::debug!(
            "Selected {} unique workers for calling, {} remaining",
            selected.len(),
            candidates.len() - selected.len()
        );
        selected
    }
}
