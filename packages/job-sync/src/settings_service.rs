//! Typed configuration service over the `settings` key.
//!
//! The only component that reads or writes the stored settings. Holds a
//! single in-memory copy that is replaced on every write.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::job_store::SETTINGS_KEY;
use crate::traits::store::KeyValueStore;
use crate::types::settings::{Settings, SettingsPatch};

pub struct SettingsService<S> {
    store: Arc<S>,
    cache: RwLock<Option<Settings>>,
}

impl<S: KeyValueStore> SettingsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// Current settings. Loaded from storage once, then served from cache.
    ///
    /// A missing or unreadable document yields defaults.
    pub async fn get(&self) -> StoreResult<Settings> {
        if let Some(settings) = self.cache.read().await.as_ref() {
            return Ok(settings.clone());
        }

        let mut cache = self.cache.write().await;
        if let Some(settings) = cache.as_ref() {
            return Ok(settings.clone());
        }
        let settings = self.load().await?;
        *cache = Some(settings.clone());
        Ok(settings)
    }

    /// Apply a partial update and return the result.
    pub async fn update(&self, patch: &SettingsPatch) -> StoreResult<Settings> {
        self.modify(|settings| patch.apply(settings)).await
    }

    /// Restore secure defaults.
    pub async fn reset(&self) -> StoreResult<Settings> {
        self.modify(|settings| *settings = Settings::default()).await
    }

    /// Stamp `security.lastVerified`.
    pub async fn mark_verified(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.modify(|settings| settings.security.last_verified = Some(at))
            .await?;
        Ok(())
    }

    /// Read, change and write back under the cache lock, so concurrent
    /// changes are applied one after the other.
    async fn modify<F>(&self, change: F) -> StoreResult<Settings>
    where
        F: FnOnce(&mut Settings) + Send,
    {
        let mut cache = self.cache.write().await;
        let mut settings = match cache.as_ref() {
            Some(settings) => settings.clone(),
            None => self.load().await?,
        };
        change(&mut settings);

        let value =
            serde_json::to_value(&settings).map_err(|e| StoreError::serde(SETTINGS_KEY, e))?;
        self.store.set(SETTINGS_KEY, value).await?;
        *cache = Some(settings.clone());
        debug!("settings updated");
        Ok(settings)
    }

    async fn load(&self) -> StoreResult<Settings> {
        let settings = match self.store.get(SETTINGS_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "stored settings unreadable, using defaults");
                Settings::default()
            }),
            None => Settings::default(),
        };
        Ok(settings)
    }

    /// Drop the cached copy, e.g. after the store was cleared or imported.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
