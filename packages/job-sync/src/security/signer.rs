//! Request signing for extension-originated calls.
//!
//! Every request carries the shared extension secret, a timestamp the
//! backend checks against its replay window, a random request id, and a
//! signature over `JSON(body) ‖ timestamp`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::error::SignerError;
use crate::security::credentials::ExtensionCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Backend rejects timestamps further than this from its clock.
pub const REPLAY_WINDOW_MS: i64 = 300_000;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_EXTENSION_SECRET: &str = "X-Extension-Secret";
pub const HEADER_EXTENSION_VERSION: &str = "X-Extension-Version";
pub const HEADER_TIMESTAMP: &str = "X-Request-Timestamp";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
pub const HEADER_SIGNATURE: &str = "X-Signature";

/// How `X-Signature` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureScheme {
    /// hex(HMAC-SHA256(secret, body ‖ timestamp))
    #[default]
    HmacSha256,
    /// hex(SHA-256(body ‖ timestamp ‖ secret)); what older backends expect.
    Sha256Digest,
}

impl FromStr for SignatureScheme {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hmac-sha256" | "hmac" => Ok(SignatureScheme::HmacSha256),
            "sha256" | "sha256-digest" => Ok(SignatureScheme::Sha256Digest),
            other => Err(SignerError::UnknownScheme(other.to_string())),
        }
    }
}

/// A fully prepared POST: target URL, headers and JSON body.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.header(HEADER_TIMESTAMP).and_then(|ts| ts.parse().ok())
    }

    /// Bearer token without the `Bearer ` prefix.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(HEADER_AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if *name == HEADER_EXTENSION_SECRET || *name == HEADER_AUTHORIZATION {
                    (*name, "[REDACTED]")
                } else {
                    (*name, value.as_str())
                }
            })
            .collect();
        f.debug_struct("SignedRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Builds authenticated, replay-resistant requests.
///
/// Pure apart from timestamp and request-id generation: no I/O, and
/// signing cannot fail once the signer exists.
pub struct RequestSigner {
    credentials: ExtensionCredentials,
    scheme: SignatureScheme,
    mac: HmacSha256,
    last_timestamp: AtomicI64,
}

impl RequestSigner {
    pub fn new(
        credentials: ExtensionCredentials,
        scheme: SignatureScheme,
    ) -> Result<Self, SignerError> {
        if credentials.secret.is_blank() {
            return Err(SignerError::MissingSecret);
        }
        let mac = HmacSha256::new_from_slice(credentials.secret.expose().as_bytes())
            .map_err(|_| SignerError::MissingSecret)?;

        Ok(Self {
            credentials,
            scheme,
            mac,
            last_timestamp: AtomicI64::new(0),
        })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Sign a request stamped with the current time.
    pub fn sign(&self, url: &str, body: &Value, token: Option<&str>) -> SignedRequest {
        let timestamp = self.next_timestamp(Utc::now().timestamp_millis());
        self.sign_at(url, body, token, timestamp)
    }

    /// Sign with an explicit timestamp.
    pub fn sign_at(
        &self,
        url: &str,
        body: &Value,
        token: Option<&str>,
        timestamp_ms: i64,
    ) -> SignedRequest {
        let body = body.to_string();
        let timestamp = timestamp_ms.to_string();
        let signature = self.signature(&body, &timestamp);

        let mut headers = vec![
            (HEADER_CONTENT_TYPE, "application/json".to_string()),
            (
                HEADER_EXTENSION_SECRET,
                self.credentials.secret.expose().to_string(),
            ),
            (HEADER_EXTENSION_VERSION, self.credentials.version.clone()),
            (HEADER_TIMESTAMP, timestamp),
            (HEADER_REQUEST_ID, format!("req_{}", Uuid::new_v4().simple())),
            (HEADER_SIGNATURE, signature),
        ];
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            headers.push((HEADER_AUTHORIZATION, format!("Bearer {}", token)));
        }

        SignedRequest {
            url: url.to_string(),
            headers,
            body,
        }
    }

    /// Check a signature the way a receiving backend would.
    pub fn verify(&self, body: &str, timestamp: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        match self.scheme {
            SignatureScheme::HmacSha256 => {
                let mut mac = self.mac.clone();
                mac.update(body.as_bytes());
                mac.update(timestamp.as_bytes());
                mac.verify_slice(&expected).is_ok()
            }
            SignatureScheme::Sha256Digest => {
                self.digest(body, timestamp).as_slice() == expected.as_slice()
            }
        }
    }

    fn signature(&self, body: &str, timestamp: &str) -> String {
        match self.scheme {
            SignatureScheme::HmacSha256 => {
                let mut mac = self.mac.clone();
                mac.update(body.as_bytes());
                mac.update(timestamp.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            SignatureScheme::Sha256Digest => hex::encode(self.digest(body, timestamp)),
        }
    }

    fn digest(&self, body: &str, timestamp: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update(timestamp.as_bytes());
        hasher.update(self.credentials.secret.expose().as_bytes());
        hasher.finalize().to_vec()
    }

    /// Strictly increasing per signer, even if the wall clock stalls or
    /// steps backwards.
    fn next_timestamp(&self, now_ms: i64) -> i64 {
        let mut last = self.last_timestamp.load(Ordering::Acquire);
        loop {
            let next = now_ms.max(last + 1);
            match self.last_timestamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("credentials", &self.credentials)
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Whether a request timestamp falls inside the backend's replay window.
pub fn within_replay_window(timestamp_ms: i64, now_ms: i64) -> bool {
    (now_ms - timestamp_ms).abs() <= REPLAY_WINDOW_MS
}
