use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Upper bound on fingerprints remembered per worker.
pub const MAX_DEDUPE_ENTRIES: usize = 100_000;

/// Content fingerprints already credited to one worker.
///
/// Remembers insertion order so that the cap evicts the oldest entries.
/// Serialized as the ordered list of fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct DedupeSet {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Returns `true` if the fingerprint was not seen before.
    pub fn insert(&mut self, fingerprint: impl Into<String>) -> bool {
        let fingerprint = fingerprint.into();
        if self.seen.contains(&fingerprint) {
            return false;
        }
        self.seen.insert(fingerprint.clone());
        self.order.push_back(fingerprint);
        true
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    /// Fingerprints from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Drops the oldest fingerprints until at most [`MAX_DEDUPE_ENTRIES`]
    /// remain. Returns how many were dropped.
    pub fn enforce_cap(&mut self) -> usize {
        let mut dropped = 0;
        while self.order.len() > MAX_DEDUPE_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
                dropped += 1;
            }
        }
        dropped
    }
}

impl FromIterator<String> for DedupeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for fingerprint in iter {
            set.insert(fingerprint);
        }
        set
    }
}

impl From<Vec<String>> for DedupeSet {
    fn from(fingerprints: Vec<String>) -> Self {
        fingerprints.into_iter().collect()
    }
}

impl From<DedupeSet> for Vec<String> {
    fn from(set: DedupeSet) -> Self {
        set.order.into()
    }
}
