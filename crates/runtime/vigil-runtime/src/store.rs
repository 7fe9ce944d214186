use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Db};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use vigil_types::{ValidatorError, ValidatorResult, ValidatorState, VolumeHistory, WorkerSnapshot};

use crate::metrics;

const STATE_TREE_NAME: &str = "validator_state";

const STEP_KEY: &str = "step";
const SCORES_KEY: &str = "scores";
const IDENTITIES_KEY: &str = "identities";
const VOLUMES_KEY: &str = "volumes";
const DEDUPE_KEY: &str = "dedupe";

/// Durable home of the [`ValidatorState`].
///
/// Writes replace the whole record. Loads default every field independently,
/// so a partially written or older record still yields a usable state.
pub trait StateStore: Send + Sync {
    fn save(&self, state: &ValidatorState) -> ValidatorResult<()>;

    /// Reads the stored state. `live` supplies defaults for a first run.
    fn load(&self, live: &WorkerSnapshot) -> ValidatorResult<ValidatorState>;
}

/// A StateStore implementation using Sled persistent storage.
#[derive(Clone)] // sled::Db is Arc internally
pub struct SledStateStore {
    db: Db,
    path: PathBuf,
}

impl SledStateStore {
    /// Opens or creates a Sled database at the given path.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::info!("Opening validator state database at: {:?}", path);
        let db = sled::open(&path)
            .with_context(|| format!("Failed to open sled database at {:?}", path))?;
        db.open_tree(STATE_TREE_NAME)
            .context("Failed to open validator_state tree in Sled database")?;
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&self) -> ValidatorResult<sled::Tree> {
        self.db
            .open_tree(STATE_TREE_NAME)
            .map_err(|e| ValidatorError::Storage(format!("Failed to access {} tree: {}", STATE_TREE_NAME, e)))
    }

    fn read_field<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> ValidatorResult<Option<T>> {
        match tree.get(key) {
            Ok(Some(ivec)) => bincode::deserialize::<T>(&ivec).map(Some).map_err(|e| {
                tracing::error!(key, error = %e, "Failed to deserialize validator state field");
                ValidatorError::Serialization(format!("Failed to deserialize state field {}: {}", key, e))
            }),
            Ok(None) => Ok(None),
            Err(e) => Err(ValidatorError::Storage(format!("Sled read error for {}: {}", key, e))),
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> ValidatorResult<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| ValidatorError::Serialization(format!("Failed to serialize state field {}: {}", key, e)))
    }
}

impl StateStore for SledStateStore {
    fn save(&self, state: &ValidatorState) -> ValidatorResult<()> {
        let result = (|| -> ValidatorResult<()> {
            let tree = self.tree()?;
            let mut batch = Batch::default();
            batch.insert(STEP_KEY, Self::encode(STEP_KEY, &state.step)?);
            batch.insert(SCORES_KEY, Self::encode(SCORES_KEY, &state.scores)?);
            batch.insert(IDENTITIES_KEY, Self::encode(IDENTITIES_KEY, &state.identities)?);
            batch.insert(VOLUMES_KEY, Self::encode(VOLUMES_KEY, &state.volumes)?);
            batch.insert(DEDUPE_KEY, Self::encode(DEDUPE_KEY, &state.dedupe)?);
            tree.apply_batch(batch)
                .map_err(|e| ValidatorError::Storage(format!("Sled batch write failed: {}", e)))?;
            tree.flush()
                .map_err(|e| ValidatorError::Storage(format!("Sled flush failed: {}", e)))?;
            Ok(())
        })();

        metrics::record_state_save(result.is_ok());
        match &result {
            Ok(()) => tracing::debug!(step = state.step, "Saved validator state"),
            Err(e) => tracing::error!(error = %e, "Failed to save validator state"),
        }
        result
    }

    fn load(&self, live: &WorkerSnapshot) -> ValidatorResult<ValidatorState> {
        let tree = self.tree()?;
        let step: Option<u64> = Self::read_field(&tree, STEP_KEY)?;
        let scores: Option<Vec<f64>> = Self::read_field(&tree, SCORES_KEY)?;
        let identities = Self::read_field(&tree, IDENTITIES_KEY)?;
        let volumes: Option<VolumeHistory> = Self::read_field(&tree, VOLUMES_KEY)?;
        let dedupe = Self::read_field(&tree, DEDUPE_KEY)?;

        if step.is_none() && scores.is_none() && identities.is_none() && volumes.is_none() && dedupe.is_none() {
            tracing::warn!("No validator state found at: {:?}", self.path);
            return Ok(ValidatorState::fresh(live));
        }

        let mut state = ValidatorState {
            step: step.unwrap_or(0),
            scores: scores.unwrap_or_else(|| vec![0.0; live.len()]),
            identities: identities.unwrap_or_else(|| live.identities()),
            volumes: volumes
                .map(|v| VolumeHistory::from_records(v.records().to_vec()))
                .unwrap_or_default(),
            dedupe: dedupe.unwrap_or_default(),
        };
        let identity_count = state.identities.len();
        state.ensure_score_len(identity_count);
        tracing::info!(
            step = state.step,
            workers = identity_count,
            "Loaded validator state from {:?}",
            self.path
        );
        Ok(state)
    }
}

/// Process-local store, for tests and dry runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<Option<ValidatorState>>,
    saves: Mutex<u64>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }

    /// The most recently saved state, if any.
    pub fn stored(&self) -> Option<ValidatorState> {
        self.state.lock().ok().and_then(|guard| guard.clone())
    }
}

impl StateStore for InMemoryStateStore {
    fn save(&self, state: &ValidatorState) -> ValidatorResult<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| ValidatorError::Storage("in-memory state lock poisoned".into()))?;
        *guard = Some(state.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }

    fn load(&self, live: &WorkerSnapshot) -> ValidatorResult<ValidatorState> {
        let guard = self
            .state
            .lock()
            .map_err(|_| ValidatorError::Storage("in-memory state lock poisoned".into()))?;
        match guard.as_ref() {
            Some(state) => Ok(state.clone()),
            None => {
                tracing::warn!("No validator state found in memory");
                Ok(ValidatorState::fresh(live))
            }
        }
    }
}
