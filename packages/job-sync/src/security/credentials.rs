//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate so the extension secret and bearer tokens are
//! never accidentally exposed in logs, debug output, or error messages.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::SignerError;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (signing, headers).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity the extension presents to the backend.
///
/// The shared secret ships with every install, so it is only an
/// anti-abuse signal; the bearer token is the real authentication factor.
#[derive(Clone)]
pub struct ExtensionCredentials {
    pub secret: SecretString,
    pub version: String,
}

impl ExtensionCredentials {
    /// Fails when the secret is blank.
    pub fn new(secret: impl Into<String>, version: impl Into<String>) -> Result<Self, SignerError> {
        let secret = SecretString::new(secret);
        if secret.is_blank() {
            return Err(SignerError::MissingSecret);
        }
        Ok(Self {
            secret,
            version: version.into(),
        })
    }
}

impl fmt::Debug for ExtensionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCredentials")
            .field("secret", &"[REDACTED]")
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug_or_display() {
        let secret = SecretString::new("4ca1c9ea616f");
        assert!(!format!("{:?}", secret).contains("4ca1"));
        assert!(!format!("{}", secret).contains("4ca1"));
        assert_eq!(secret.expose(), "4ca1c9ea616f");
    }

    #[test]
    fn test_blank_secret_rejected() {
        assert!(matches!(
            ExtensionCredentials::new("  ", "1.0.0"),
            Err(SignerError::MissingSecret)
        ));
    }

    #[test]
    fn test_credentials_debug_shows_version_only() {
        let creds = ExtensionCredentials::new("s3cret", "1.0.0").unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("1.0.0"));
    }
}
