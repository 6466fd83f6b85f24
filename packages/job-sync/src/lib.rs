//! Local-First Job Capture and Sync
//!
//! Captures job applications from job-board pages, keeps them in a local
//! queue, and delivers them to the TrackRuit backend over signed,
//! replay-resistant requests with bounded retries.
//!
//! # Design
//!
//! - Local first: a capture is persisted before any network call can lose it
//! - At-least-once delivery, with a retry ceiling after which a job is
//!   abandoned but kept for inspection
//! - Every remote call is signed and timestamped
//! - One message-passing entry point; failures come back as responses
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use job_sync::{BackgroundService, ExtensionCredentials, FileStore, HttpTransport};
//! use job_sync::{Request, RequestSigner, SignatureScheme, SyncEngine};
//!
//! let credentials = ExtensionCredentials::new(secret, "1.0.0")?;
//! let signer = RequestSigner::new(credentials, SignatureScheme::HmacSha256)?;
//! let store = Arc::new(FileStore::new("trackruit-data.json"));
//! let engine = Arc::new(SyncEngine::new(store, signer, HttpTransport::new()?));
//!
//! let (handle, _task) = BackgroundService::spawn(engine);
//! let response = handle.call(Request::SyncJobs).await;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Job records, settings, stats and validation
//! - [`traits`] - Storage, transport and page document abstractions
//! - [`stores`] - Storage implementations (MemoryStore, FileStore, SqliteStore)
//! - [`job_store`] - Pending/tracked queues over a store
//! - [`settings_service`] - Cached settings access
//! - [`security`] - Credentials and request signing
//! - [`transport`] - HTTP transport
//! - [`sync`] - Sync engine and scheduler
//! - [`capture`] - Page capture detector
//! - [`channel`] - Request/response front door
//! - [`testing`] - Mock implementations for testing

pub mod capture;
pub mod channel;
pub mod error;
pub mod job_store;
pub mod security;
pub mod settings_service;
pub mod stores;
pub mod sync;
pub mod testing;
pub mod traits;
pub mod transport;
pub mod types;

// Re-export core types at crate root
pub use capture::{
    is_supported_page, sanitize_url, CaptureDetector, CaptureEvent, PageEvent, PageNotice,
    PageWatcher,
};
pub use channel::{BackgroundHandle, BackgroundService, Request, Response};
pub use error::{ImportError, SignerError, StoreError, SyncError, TransportError, ValidationError};
pub use job_store::JobStore;
pub use security::{ExtensionCredentials, RequestSigner, SignatureScheme, SignedRequest};
pub use settings_service::SettingsService;
pub use stores::{FileStore, MemoryStore};
pub use sync::{
    SaveOutcome, SyncEngine, SyncReport, SyncScheduler, VerifyOutcome, VerifyReport,
    DEFAULT_SYNC_INTERVAL,
};
pub use traits::{
    document::DocumentSource,
    store::KeyValueStore,
    transport::{Transport, TransportResponse},
};
pub use transport::HttpTransport;
pub use types::{
    job::{JobDraft, JobPayload, JobSource, JobStatus, PendingJob, Platform, TrackedJob},
    settings::{Settings, SettingsPatch},
    stats::Stats,
    validation::validate_job,
};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
