//! Testing utilities including mock implementations.
//!
//! These are useful for testing code built on the sync engine without
//! talking to a real backend or touching disk.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{StoreError, StoreResult, TransportError, TransportResult};
use crate::security::signer::{within_replay_window, SignedRequest, HEADER_EXTENSION_SECRET};
use crate::stores::MemoryStore;
use crate::traits::store::KeyValueStore;
use crate::traits::transport::{Transport, TransportResponse};

enum Behavior {
    Always(u16),
    Scripted(VecDeque<TransportResult<TransportResponse>>),
    Unreachable,
}

/// A mock transport for testing.
///
/// Answers from a fixed status, a script, or as an unreachable host, and
/// records every request it receives.
pub struct MockTransport {
    behavior: RwLock<Behavior>,

    /// Answer once the script runs out
    fallback_status: u16,

    /// Artificial latency per request
    delay: Option<Duration>,

    /// Call tracking for assertions
    requests: Arc<RwLock<Vec<SignedRequest>>>,
}

impl MockTransport {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior: RwLock::new(behavior),
            fallback_status: 200,
            delay: None,
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Answer every request with `status` and an empty body.
    pub fn always(status: u16) -> Self {
        Self::with_behavior(Behavior::Always(status))
    }

    /// Answer requests in order from `responses`, then with 200.
    pub fn scripted(responses: Vec<TransportResult<TransportResponse>>) -> Self {
        Self::with_behavior(Behavior::Scripted(responses.into()))
    }

    /// Fail every request as a network error.
    pub fn unreachable() -> Self {
        Self::with_behavior(Behavior::Unreachable)
    }

    /// Status used once a script is exhausted.
    pub fn with_fallback_status(mut self, status: u16) -> Self {
        self.fallback_status = status;
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<SignedRequest> {
        self.requests.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.requests.write().unwrap().clear();
    }

    fn next_response(&self) -> TransportResult<TransportResponse> {
        let mut behavior = self.behavior.write().unwrap();
        match &mut *behavior {
            Behavior::Always(status) => Ok(TransportResponse::new(*status, "")),
            Behavior::Scripted(script) => script
                .pop_front()
                .unwrap_or_else(|| Ok(TransportResponse::new(self.fallback_status, ""))),
            Behavior::Unreachable => Err(unreachable_error()),
        }
    }
}

/// A network-level failure as the HTTP transport would report it.
pub fn unreachable_error() -> TransportError {
    TransportError::Http(Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: SignedRequest) -> TransportResult<TransportResponse> {
        self.requests.write().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response()
    }
}

/// An in-process stand-in for the ingestion endpoint.
///
/// Applies the backend's acceptance rules: extension secret, replay window
/// and bearer token, then rejects `platform: test` jobs as invalid data.
pub struct SimulatedBackend {
    secret: String,
    tokens: RwLock<HashSet<String>>,
    stored: Arc<RwLock<Vec<Value>>>,
    requests: Arc<RwLock<Vec<SignedRequest>>>,
}

impl SimulatedBackend {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tokens: RwLock::new(HashSet::new()),
            stored: Arc::new(RwLock::new(Vec::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Accept `token` as an active user.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.tokens.write().unwrap().insert(token.into());
        self
    }

    pub fn revoke_token(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }

    /// Job bodies persisted so far.
    pub fn stored_jobs(&self) -> Vec<Value> {
        self.stored.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }

    fn answer(&self, request: &SignedRequest) -> TransportResponse {
        if request.header(HEADER_EXTENSION_SECRET) != Some(self.secret.as_str()) {
            return TransportResponse::new(401, r#"{"message":"Unauthorized extension"}"#);
        }
        let fresh = request
            .timestamp()
            .is_some_and(|ts| within_replay_window(ts, Utc::now().timestamp_millis()));
        if !fresh {
            return TransportResponse::new(401, r#"{"message":"Request expired"}"#);
        }
        let authorized = request
            .bearer_token()
            .is_some_and(|token| self.tokens.read().unwrap().contains(token));
        if !authorized {
            return TransportResponse::new(401, r#"{"message":"Invalid token"}"#);
        }

        let body: Value = match serde_json::from_str(&request.body) {
            Ok(body) => body,
            Err(_) => return TransportResponse::new(400, r#"{"message":"Malformed JSON"}"#),
        };
        if body["platform"] == "test" {
            return TransportResponse::new(400, r#"{"message":"Invalid platform"}"#);
        }

        self.stored.write().unwrap().push(body.clone());
        TransportResponse::new(201, body.to_string())
    }
}

#[async_trait]
impl Transport for SimulatedBackend {
    async fn send(&self, request: SignedRequest) -> TransportResult<TransportResponse> {
        let response = self.answer(&request);
        self.requests.write().unwrap().push(request);
        Ok(response)
    }
}

/// A store that fails on demand.
///
/// `new()` fails every operation; `read_only` serves reads from the given
/// store and fails every write.
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: bool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads: true,
        }
    }

    pub fn read_only(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_reads: false,
        }
    }

    fn injected() -> StoreError {
        StoreError::Io(std::io::Error::other("injected storage failure"))
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.fail_reads {
            Err(Self::injected())
        } else {
            Ok(())
        }
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, _key: &str, _value: Value) -> StoreResult<()> {
        Err(Self::injected())
    }

    async fn set_many(&self, _entries: Vec<(String, Value)>) -> StoreResult<()> {
        Err(Self::injected())
    }

    async fn remove(&self, _key: &str) -> StoreResult<()> {
        Err(Self::injected())
    }

    async fn clear(&self) -> StoreResult<()> {
        Err(Self::injected())
    }

    async fn snapshot(&self) -> StoreResult<Map<String, Value>> {
        self.check_read()?;
        self.inner.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::credentials::ExtensionCredentials;
    use crate::security::signer::{RequestSigner, SignatureScheme};
    use serde_json::json;

    fn signer(secret: &str) -> RequestSigner {
        let credentials = ExtensionCredentials::new(secret, "1.0.0").unwrap();
        RequestSigner::new(credentials, SignatureScheme::HmacSha256).unwrap()
    }

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let transport = MockTransport::scripted(vec![Err(unreachable_error())])
            .with_fallback_status(503);
        let request = signer("s").sign("http://b/api/jobs/add", &json!({}), None);

        assert!(transport.send(request.clone()).await.is_err());
        assert_eq!(transport.send(request).await.unwrap().status, 503);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_backend_rejects_wrong_secret_and_stale_timestamp() {
        let backend = SimulatedBackend::new("right").with_token("tok1");
        let body = json!({"title": "Engineer", "platform": "linkedin"});

        let wrong = signer("wrong").sign("http://b/api/jobs/add", &body, Some("tok1"));
        assert_eq!(backend.send(wrong).await.unwrap().status, 401);

        let stale_ts = Utc::now().timestamp_millis() - 301_000;
        let stale = signer("right").sign_at("http://b/api/jobs/add", &body, Some("tok1"), stale_ts);
        assert_eq!(backend.send(stale).await.unwrap().status, 401);

        let good = signer("right").sign("http://b/api/jobs/add", &body, Some("tok1"));
        assert_eq!(backend.send(good).await.unwrap().status, 201);
        assert_eq!(backend.stored_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_store_fails_writes() {
        let store = FailingStore::read_only(MemoryStore::new());
        assert!(store.get("settings").await.unwrap().is_none());
        tokio_test::assert_err!(store.set("settings", json!({})).await);
        tokio_test::assert_err!(FailingStore::new().get("settings").await);
    }
}
