use crate::dedupe::DedupeSet;
use crate::volume::VolumeHistory;
use crate::worker::{WorkerId, WorkerIdentity, WorkerSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the validator persists between restarts.
///
/// `scores.len() >= identities.len()` holds at all times; positions past the
/// live registry are inert. Growth always zero-fills and never truncates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorState {
    pub step: u64,
    pub scores: Vec<f64>,
    pub identities: Vec<WorkerIdentity>,
    pub volumes: VolumeHistory,
    pub dedupe: BTreeMap<WorkerId, DedupeSet>,
}

impl ValidatorState {
    /// First-run state for the given registry: zero scores, nothing seen yet.
    pub fn fresh(snapshot: &WorkerSnapshot) -> Self {
        Self {
            step: 0,
            scores: vec![0.0; snapshot.len()],
            identities: snapshot.identities(),
            volumes: VolumeHistory::new(),
            dedupe: BTreeMap::new(),
        }
    }

    /// Grows the score vector to at least `len` entries, zero-filling new slots.
    pub fn ensure_score_len(&mut self, len: usize) {
        if self.scores.len() < len {
            self.scores.resize(len, 0.0);
        }
    }

    pub fn score(&self, worker: WorkerId) -> f64 {
        self.scores.get(worker.index()).copied().unwrap_or(0.0)
    }

    pub fn dedupe_set(&self, worker: WorkerId) -> Option<&DedupeSet> {
        self.dedupe.get(&worker)
    }

    /// The worker's dedupe set, created empty on first use.
    pub fn dedupe_set_mut(&mut self, worker: WorkerId) -> &mut DedupeSet {
        self.dedupe.entry(worker).or_default()
    }
}
