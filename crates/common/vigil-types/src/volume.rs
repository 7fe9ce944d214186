use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of tempo snapshots kept for volume scoring.
pub const VOLUME_WINDOW: usize = 6;

/// Activity observed per worker during one tempo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub tempo: u64,
    pub activity: BTreeMap<WorkerId, u64>,
}

impl VolumeRecord {
    pub fn new(tempo: u64) -> Self {
        Self {
            tempo,
            activity: BTreeMap::new(),
        }
    }
}

/// Bounded, oldest-first sequence of [`VolumeRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHistory {
    records: Vec<VolumeRecord>,
}

impl VolumeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from stored records, keeping only the newest window.
    pub fn from_records(records: Vec<VolumeRecord>) -> Self {
        let mut history = Self { records };
        history.truncate_to_window();
        history
    }

    pub fn records(&self) -> &[VolumeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds `count` to the worker's activity for `tempo`.
    ///
    /// A new record is opened whenever `tempo` differs from the newest record's;
    /// the oldest record is dropped once the window is exceeded.
    pub fn record(&mut self, tempo: u64, worker: WorkerId, count: u64) {
        let needs_new = self.records.last().map_or(true, |r| r.tempo != tempo);
        if needs_new {
            self.records.push(VolumeRecord::new(tempo));
            self.truncate_to_window();
        }
        if let Some(current) = self.records.last_mut() {
            *current.activity.entry(worker).or_insert(0) += count;
        }
    }

    /// Resets the worker's activity to zero in every record of the window.
    /// Workers without an entry are left absent.
    pub fn zero_worker(&mut self, worker: WorkerId) {
        let start = self.records.len().saturating_sub(VOLUME_WINDOW);
        for record in &mut self.records[start..] {
            if let Some(count) = record.activity.get_mut(&worker) {
                *count = 0;
            }
        }
    }

    /// Total activity per worker across the window.
    pub fn totals(&self) -> BTreeMap<WorkerId, u64> {
        let start = self.records.len().saturating_sub(VOLUME_WINDOW);
        let mut totals = BTreeMap::new();
        for record in &self.records[start..] {
            for (worker, count) in &record.activity {
                *totals.entry(*worker).or_insert(0) += *count;
            }
        }
        totals
    }

    fn truncate_to_window(&mut self) {
        if self.records.len() > VOLUME_WINDOW {
            let excess = self.records.len() - VOLUME_WINDOW;
            self.records.drain(..excess);
        }
    }
}
