//! Sampling, scoring and weight-setting engine of a Vigil validator node.
//!
//! The [`Validator`] owns the reputation table and the cached worker registry;
//! the [`Scheduler`] drives it with five independently-cadenced loops. Ledger,
//! transport, query feed and storage are collaborators behind traits so the
//! engine can run against real networks or in-memory doubles.

pub mod config;
pub mod forwarder;
pub mod ledger;
pub mod membership;
pub mod metrics;
pub mod metrics_server;
pub mod publisher;
pub mod queries;
pub mod reputation;
pub mod sampler;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod transport;
pub mod validator;

pub use config::ValidatorConfig;
pub use forwarder::{rank, Forwarder, RankedResponse, ResponseTransform};
pub use ledger::{quantize_u16, LedgerClient, SubmitOutcome};
pub use membership::{MembershipReconciler, Reconciliation};
pub use publisher::{normalize_l1, WeightPublisher};
pub use queries::{QuerySource, StaticQuerySource};
pub use reputation::{apply_ema, ReputationTable};
pub use sampler::{Sampler, UniformSampler};
pub use scheduler::{BlockLoop, Cadence, Scheduler};
pub use scoring::{score_volumes, VolumeScore};
pub use store::{InMemoryStateStore, SledStateStore, StateStore};
pub use transport::{Transport, WorkerReply};
pub use validator::{Collaborators, Validator};
