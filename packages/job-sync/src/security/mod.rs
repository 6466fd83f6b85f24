//! Credentials and request signing.

pub mod credentials;
pub mod signer;

pub use credentials::{ExtensionCredentials, SecretString};
pub use signer::{RequestSigner, SignatureScheme, SignedRequest};
