//! Transport trait for delivering signed requests to the backend.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::security::signer::SignedRequest;

/// Raw HTTP response from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Failure text recorded on a job as `lastError`.
    pub fn error_summary(&self) -> String {
        let body = self.body.trim();
        if body.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {}: {}", self.status, body)
        }
    }
}

/// Sends one signed request and returns whatever the backend answered.
///
/// Implementations return `Err` only for network-level failures; a
/// non-2xx answer is still `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SignedRequest) -> TransportResult<TransportResponse>;
}
