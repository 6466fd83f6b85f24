//! Sync engine and its periodic trigger.

pub mod engine;
pub mod scheduler;

pub use engine::{SaveOutcome, SyncEngine, SyncReport, VerifyOutcome, VerifyReport, ADD_JOB_PATH};
pub use scheduler::{SyncScheduler, DEFAULT_SYNC_INTERVAL};
