//! Access to the live page document.

use async_trait::async_trait;

/// Host page that can be read on demand, beyond the snapshots it pushes
/// with each mutation batch.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Current document HTML, or `None` once the page is gone.
    async fn snapshot(&self) -> Option<String>;
}
