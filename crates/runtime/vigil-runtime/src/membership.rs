//! Keeps per-slot reputation consistent with the live worker registry.
use vigil_types::{ValidatorState, WorkerId, WorkerIdentity};

use crate::metrics;

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Slots whose identity changed and whose history was wiped.
    pub replaced: Vec<WorkerId>,
    /// Number of zero-filled score slots added for new registrations.
    pub added: usize,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.replaced.is_empty() && self.added == 0
    }
}

/// Applies registry changes to a [`ValidatorState`].
///
/// A slot is "replaced" when the identity cached at that index differs from the
/// live one. Replaced slots lose their score, their volume history and their
/// dedupe set, since the new holder must not inherit the old holder's standing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MembershipReconciler;

impl MembershipReconciler {
    /// Reconciles `state` (whose `identities` are the previously cached list)
    /// against the `current` registry, then caches `current`.
    pub fn reconcile(&self, state: &mut ValidatorState, current: &[WorkerIdentity]) -> Reconciliation {
        if state.identities.as_slice() == current {
            return Reconciliation::default();
        }

        let previous_len = state.identities.len();
        state.ensure_score_len(previous_len);

        let mut outcome = Reconciliation::default();
        for (index, (old, new)) in state.identities.iter().zip(current).enumerate() {
            if old == new {
                continue;
            }
            let Ok(slot) = u16::try_from(index) else {
                tracing::warn!(index, "Registry slot out of WorkerId range, skipping");
                continue;
            };
            outcome.replaced.push(WorkerId(slot));
        }

        for &worker in &outcome.replaced {
            state.scores[worker.index()] = 0.0;
            state.volumes.zero_worker(worker);
            if let Some(set) = state.dedupe.get_mut(&worker) {
                set.clear();
            }
            tracing::info!(worker = %worker, identity = %current[worker.index()], "Worker slot replaced, reputation reset");
        }

        if current.len() > previous_len {
            let before = state.scores.len();
            state.ensure_score_len(current.len());
            outcome.added = state.scores.len() - before;
            tracing::info!(
                previous = previous_len,
                current = current.len(),
                "Worker registry grew"
            );
        }

        state.identities = current.to_vec();
        metrics::record_reconciliation(outcome.replaced.len());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(keys: &[&str]) -> Vec<WorkerIdentity> {
        keys.iter().map(|k| WorkerIdentity::from(*k)).collect()
    }

    fn state_with(keys: &[&str], scores: Vec<f64>) -> ValidatorState {
        ValidatorState {
            scores,
            identities: ids(keys),
            ..Default::default()
        }
    }

    #[test]
    fn unchanged_registry_is_left_untouched() {
        let mut state = state_with(&["a", "b", "c"], vec![0.1, 0.2, 0.3]);
        state.volumes.record(1, WorkerId(1), 4);
        state.dedupe_set_mut(WorkerId(2)).insert("fp");
        let before = state.clone();

        let outcome = MembershipReconciler.reconcile(&mut state, &ids(&["a", "b", "c"]));
        assert!(outcome.is_noop());
        assert_eq!(state, before);
    }

    #[test]
    fn replaced_slot_is_reset_and_neighbours_kept() {
        let mut state = state_with(&["A", "B", "C"], vec![0.18, 0.55, 0.27]);
        for worker in 0..3u16 {
            state.volumes.record(7, WorkerId(worker), 10);
            state.dedupe_set_mut(WorkerId(worker)).insert(format!("fp-{}", worker));
        }

        let outcome = MembershipReconciler.reconcile(&mut state, &ids(&["A", "X", "C"]));
        assert_eq!(outcome.replaced, vec![WorkerId(1)]);
        assert_eq!(state.scores, vec![0.18, 0.0, 0.27]);
        assert!(state.dedupe[&WorkerId(1)].is_empty());
        assert_eq!(state.dedupe[&WorkerId(0)].len(), 1);
        assert_eq!(state.dedupe[&WorkerId(2)].len(), 1);
        let totals = state.volumes.totals();
        assert_eq!(totals[&WorkerId(1)], 0);
        assert_eq!(totals[&WorkerId(0)], 10);
        assert_eq!(state.identities, ids(&["A", "X", "C"]));
    }

    #[test]
    fn growth_zero_fills_and_preserves_prefix() {
        let mut state = state_with(&["a", "b"], vec![0.4, 0.6]);
        let outcome = MembershipReconciler.reconcile(&mut state, &ids(&["a", "b", "c", "d"]));
        assert!(outcome.replaced.is_empty());
        assert_eq!(outcome.added, 2);
        assert_eq!(state.scores, vec![0.4, 0.6, 0.0, 0.0]);
        assert_eq!(state.identities.len(), 4);
    }

    #[test]
    fn shrink_keeps_scores_inert() {
        let mut state = state_with(&["a", "b", "c"], vec![0.1, 0.2, 0.3]);
        let outcome = MembershipReconciler.reconcile(&mut state, &ids(&["a", "b"]));
        assert!(outcome.replaced.is_empty());
        assert_eq!(state.scores, vec![0.1, 0.2, 0.3]);
        assert_eq!(state.identities, ids(&["a", "b"]));
    }
}
