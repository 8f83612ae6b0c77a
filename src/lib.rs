// src/lib.rs
// Public library surface for integration tests (and the wrapper-service
// collaborator, which triggers the same orchestration call).

pub mod extract;
pub mod harvest;
pub mod intervals;
pub mod signals;
pub mod sink;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::harvest::config::{load_config_default, load_config_from, HarvestConfig};
pub use crate::harvest::types::{
    HarvestRecord, HarvestSummary, HarvestTask, TaskOutcome, VolumeReading, TIMESTAMP_FORMAT,
};
pub use crate::harvest::{run, HarvestJob};
pub use crate::transport::{RetryPolicy, Transport, TransportError};
