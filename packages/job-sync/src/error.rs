//! Typed errors for the job-sync library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can surface from the sync engine to its callers.
///
/// Transient delivery failures (network errors, non-2xx responses) are
/// deliberately absent: they are recorded on the job and retried, never
/// returned to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Extension toggled off; rejected before any I/O
    #[error("extension disabled")]
    Disabled,

    /// No bearer token available for a remote operation
    #[error("no authentication token")]
    Unauthenticated,

    /// Another sync pass is already running
    #[error("sync already in progress")]
    SyncInProgress,

    /// Job data failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Local persistence failed; the job may be lost
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Errors from a key-value storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized
    #[error("serialization failed for key {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Persisted document is corrupt
    #[error("corrupt store document: {0}")]
    Corrupt(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub(crate) fn serde(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serde {
            key: key.into(),
            source,
        }
    }
}

/// Malformed job data. All field problems are collected together.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid job data: {}", .errors.join(", "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Errors building a request signer.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The shared extension secret is empty
    #[error("extension secret is missing")]
    MissingSecret,

    /// Unknown signature scheme name
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(String),
}

/// Network-level failure talking to the backend.
///
/// Non-2xx responses are not transport errors; they come back as
/// responses so the body can be recorded.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed to complete
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request exceeded the per-request timeout
    #[error("request timed out: {url}")]
    Timeout { url: String },

    /// Invalid header produced by the signer
    #[error("invalid header {name}")]
    InvalidHeader { name: String },

    /// Request body could not be encoded
    #[error("could not encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Rejected backup payload. Nothing is written when this is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Payload is not a JSON object
    #[error("import payload is not an object")]
    NotAnObject,

    /// Declared schema version is absent or does not match
    #[error("unsupported export version: {found:?} (expected {expected})")]
    VersionMismatch {
        found: Option<String>,
        expected: &'static str,
    },

    /// A recognised key holds a value of the wrong shape
    #[error("invalid value for {key}: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the imported data failed
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
