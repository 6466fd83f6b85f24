//! HTTP transport built on `reqwest`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::security::signer::SignedRequest;
use crate::traits::transport::{Transport, TransportResponse};

/// Default per-request timeout. Bounds the worst-case length of a sync
/// pass to `pending × timeout`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// POSTs signed JSON requests to the backend.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> TransportResult<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with an explicit per-request timeout.
    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trackruit-job-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Http(Box::new(e)))?;
        Ok(Self { client })
    }

    fn header_map(request: &SignedRequest) -> TransportResult<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let invalid = || TransportError::InvalidHeader {
                name: name.to_string(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SignedRequest) -> TransportResult<TransportResponse> {
        let headers = Self::header_map(&request)?;
        let url = request.url;

        debug!(url = %url, "POST starting");
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                if e.is_timeout() {
                    TransportError::Timeout { url: url.clone() }
                } else {
                    TransportError::Http(Box::new(e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(Box::new(e)))?;

        debug!(url = %url, status, "POST finished");
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_rejects_control_characters() {
        let request = SignedRequest {
            url: "http://localhost:3000/api/jobs/add".to_string(),
            headers: vec![("Authorization", "Bearer bad\ntoken".to_string())],
            body: "{}".to_string(),
        };
        assert!(matches!(
            HttpTransport::header_map(&request),
            Err(TransportError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let request = SignedRequest {
            // Nothing listens on the discard port.
            url: "http://127.0.0.1:9/api/jobs/add".to_string(),
            headers: vec![("Content-Type", "application/json".to_string())],
            body: "{}".to_string(),
        };
        assert!(transport.send(request).await.is_err());
    }
}
