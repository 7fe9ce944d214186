pub mod dedupe;
pub mod error;
pub mod protocol;
pub mod state;
pub mod volume;
pub mod worker;

pub use dedupe::{DedupeSet, MAX_DEDUPE_ENTRIES};
pub use error::{ValidatorError, ValidatorResult};
pub use protocol::{ScrapedItem, WorkerRequest, WorkerResponse};
pub use state::ValidatorState;
pub use volume::{VolumeHistory, VolumeRecord, VOLUME_WINDOW};
pub use worker::{WorkerEndpoint, WorkerId, WorkerIdentity, WorkerInfo, WorkerSnapshot};
