//! Typed access to the job queues held in a [`KeyValueStore`].
//!
//! Storage layout (key → value):
//!
//! ```text
//! settings     Settings object (owned by SettingsService)
//! pendingJobs  [PendingJob]   jobs awaiting backend confirmation
//! trackedJobs  [TrackedJob]   jobs confirmed at least once
//! stats        Stats          cache of the two queue lengths
//! lastSync     ISO timestamp  end of the last sync pass
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ImportError, StoreError, StoreResult};
use crate::traits::store::KeyValueStore;
use crate::types::job::{JobPayload, PendingJob, TrackedJob};
use crate::types::settings::Settings;
use crate::types::stats::Stats;

pub const SETTINGS_KEY: &str = "settings";
pub const PENDING_JOBS_KEY: &str = "pendingJobs";
pub const TRACKED_JOBS_KEY: &str = "trackedJobs";
pub const STATS_KEY: &str = "stats";
pub const LAST_SYNC_KEY: &str = "lastSync";

/// Schema stamp written by `export_data` and required by `import_data`.
pub const EXPORT_VERSION: &str = "1.0";

/// Job queues over a key-value backend.
///
/// Read-modify-write cycles on the queues are serialised by an internal
/// lock, so a job appended while a sync pass is in flight is kept and
/// left for the next pass.
pub struct JobStore<S> {
    store: Arc<S>,
    queue_lock: Mutex<()>,
}

impl<S: KeyValueStore> JobStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            queue_lock: Mutex::new(()),
        }
    }

    /// The underlying key-value backend.
    pub fn backend(&self) -> &Arc<S> {
        &self.store
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Vec<T>> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| StoreError::serde(key, e)),
        }
    }

    pub async fn pending_jobs(&self) -> StoreResult<Vec<PendingJob>> {
        self.read_list(PENDING_JOBS_KEY).await
    }

    pub async fn tracked_jobs(&self) -> StoreResult<Vec<TrackedJob>> {
        self.read_list(TRACKED_JOBS_KEY).await
    }

    pub async fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        match self.store.get(LAST_SYNC_KEY).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::serde(LAST_SYNC_KEY, e)),
        }
    }

    /// Append a new job to the pending queue with `attempts = 0`.
    pub async fn save_job_locally(&self, job: JobPayload) -> StoreResult<PendingJob> {
        self.enqueue(PendingJob::new(job)).await
    }

    /// Append an already-built pending job to the queue.
    pub async fn enqueue(&self, job: PendingJob) -> StoreResult<PendingJob> {
        let _guard = self.queue_lock.lock().await;

        let mut pending = self.pending_jobs().await?;
        let tracked = self.tracked_jobs().await?;
        pending.push(job.clone());

        let stats = Stats::compute(pending.len(), tracked.len());
        self.store
            .set_many(vec![
                entry(PENDING_JOBS_KEY, &pending)?,
                entry(STATS_KEY, &stats)?,
            ])
            .await?;

        debug!(job_id = %job.id, pending = pending.len(), "job saved locally");
        Ok(job)
    }

    /// Append a delivered job to the tracked list.
    pub async fn record_tracked(&self, job: PendingJob) -> StoreResult<TrackedJob> {
        let _guard = self.queue_lock.lock().await;

        let pending = self.pending_jobs().await?;
        let mut tracked = self.tracked_jobs().await?;
        let now = Utc::now();
        let job = job.into_tracked(now);
        tracked.push(job.clone());

        let stats = Stats::compute(pending.len(), tracked.len());
        self.store
            .set_many(vec![
                entry(TRACKED_JOBS_KEY, &tracked)?,
                entry(LAST_SYNC_KEY, &now)?,
                entry(STATS_KEY, &stats)?,
            ])
            .await?;

        Ok(job)
    }

    /// Persist the outcome of a sync pass in one atomic write.
    ///
    /// `snapshot_ids` are the ids the pass started with. Jobs appended to
    /// the pending queue since then are kept after `retained`, in their
    /// original order; `delivered` is appended to the current tracked list.
    pub async fn commit_sync_pass(
        &self,
        snapshot_ids: &HashSet<String>,
        retained: Vec<PendingJob>,
        delivered: Vec<TrackedJob>,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<Stats> {
        let _guard = self.queue_lock.lock().await;

        let arrivals: Vec<PendingJob> = self
            .pending_jobs()
            .await?
            .into_iter()
            .filter(|job| !snapshot_ids.contains(&job.id))
            .collect();
        if !arrivals.is_empty() {
            debug!(count = arrivals.len(), "keeping jobs queued during sync pass");
        }

        let mut pending = retained;
        pending.extend(arrivals);

        let mut tracked = self.tracked_jobs().await?;
        tracked.extend(delivered);

        let stats = Stats::compute(pending.len(), tracked.len());
        self.store
            .set_many(vec![
                entry(PENDING_JOBS_KEY, &pending)?,
                entry(TRACKED_JOBS_KEY, &tracked)?,
                entry(LAST_SYNC_KEY, &finished_at)?,
                entry(STATS_KEY, &stats)?,
            ])
            .await?;

        Ok(stats)
    }

    /// Run `modify` over the pending queue under the queue lock and persist
    /// the result.
    pub async fn modify_pending<R, F>(&self, modify: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Vec<PendingJob>) -> R + Send,
        R: Send,
    {
        let _guard = self.queue_lock.lock().await;

        let mut pending = self.pending_jobs().await?;
        let result = modify(&mut pending);
        let tracked = self.tracked_jobs().await?;
        let stats = Stats::compute(pending.len(), tracked.len());

        self.store
            .set_many(vec![
                entry(PENDING_JOBS_KEY, &pending)?,
                entry(STATS_KEY, &stats)?,
            ])
            .await?;
        Ok(result)
    }

    /// Recompute stats from the live queue lengths and persist them.
    pub async fn update_stats(&self) -> StoreResult<Stats> {
        let pending = self.pending_jobs().await?.len();
        let tracked = self.tracked_jobs().await?.len();
        let stats = Stats::compute(pending, tracked);
        self.store.set(STATS_KEY, to_value(STATS_KEY, &stats)?).await?;
        Ok(stats)
    }

    /// Cached stats, recomputed first if they disagree with the queues.
    pub async fn get_stats(&self) -> StoreResult<Stats> {
        let cached: Option<Stats> = match self.store.get(STATS_KEY).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable stats cache");
                    None
                }
            },
            None => Some(Stats::default()),
        };

        let pending = self.pending_jobs().await?.len();
        let tracked = self.tracked_jobs().await?.len();

        match cached {
            Some(stats) if stats.matches(pending, tracked) => Ok(stats),
            _ => self.update_stats().await,
        }
    }

    /// Remove everything, settings included.
    pub async fn clear_all_data(&self) -> StoreResult<()> {
        let _guard = self.queue_lock.lock().await;
        self.store.clear().await?;
        info!("all local data cleared");
        Ok(())
    }

    /// Every stored key plus `exportTime` and the schema `version`.
    pub async fn export_data(&self) -> StoreResult<Value> {
        let mut document = self.store.snapshot().await?;
        document.insert("exportTime".to_string(), json!(Utc::now()));
        document.insert("version".to_string(), json!(EXPORT_VERSION));
        Ok(Value::Object(document))
    }

    /// Restore a backup produced by [`export_data`](Self::export_data).
    ///
    /// Fails closed: a payload that is not an object, carries the wrong
    /// version, or holds a malformed queue is rejected and nothing is
    /// written. Unrecognised keys are ignored.
    pub async fn import_data(&self, data: Value) -> Result<Stats, ImportError> {
        let Value::Object(document) = data else {
            return Err(ImportError::NotAnObject);
        };

        match document.get("version").and_then(Value::as_str) {
            Some(EXPORT_VERSION) => {}
            other => {
                return Err(ImportError::VersionMismatch {
                    found: other.map(str::to_string),
                    expected: EXPORT_VERSION,
                })
            }
        }

        let mut entries = Vec::new();
        for (key, value) in document {
            let checked = match key.as_str() {
                PENDING_JOBS_KEY => check::<Vec<PendingJob>>(&key, &value),
                TRACKED_JOBS_KEY => check::<Vec<TrackedJob>>(&key, &value),
                SETTINGS_KEY => check::<Settings>(&key, &value),
                STATS_KEY => check::<Stats>(&key, &value),
                LAST_SYNC_KEY => check::<Option<DateTime<Utc>>>(&key, &value),
                "version" | "exportTime" => continue,
                _ => {
                    warn!(key = %key, "ignoring unrecognised key in import");
                    continue;
                }
            };
            checked?;
            entries.push((key, value));
        }

        {
            let _guard = self.queue_lock.lock().await;
            self.store.set_many(entries).await?;
        }

        let stats = self.update_stats().await?;
        info!(
            pending = stats.pending_sync,
            tracked = stats.total_tracked,
            "local data imported"
        );
        Ok(stats)
    }
}

fn check<T: DeserializeOwned>(key: &str, value: &Value) -> Result<(), ImportError> {
    serde_json::from_value::<T>(value.clone())
        .map(|_| ())
        .map_err(|source| ImportError::InvalidValue {
            key: key.to_string(),
            source,
        })
}

fn to_value<T: Serialize>(key: &str, value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::serde(key, e))
}

fn entry<T: Serialize>(key: &str, value: &T) -> StoreResult<(String, Value)> {
    Ok((key.to_string(), to_value(key, value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::job::{JobSource, JobStatus, Platform};

    fn payload(title: &str) -> JobPayload {
        JobPayload {
            title: title.to_string(),
            company: "Acme".to_string(),
            platform: Platform::Linkedin,
            url: "https://x.com/job/1".to_string(),
            applied_at: Utc::now(),
            status: JobStatus::Applied,
            source: JobSource::AutoDetect,
            location: None,
            description: None,
            salary: None,
        }
    }

    fn job_store() -> JobStore<MemoryStore> {
        JobStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_save_job_locally_appends_and_updates_stats() {
        let store = job_store();
        let first = store.save_job_locally(payload("One")).await.unwrap();
        store.save_job_locally(payload("Two")).await.unwrap();

        let pending = store.pending_jobs().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[0].attempts, 0);

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.pending_sync, 2);
        assert_eq!(stats.total_tracked, 0);
    }

    #[tokio::test]
    async fn test_get_stats_is_idempotent() {
        let store = job_store();
        store.save_job_locally(payload("One")).await.unwrap();

        let first = store.get_stats().await.unwrap();
        let second = store.get_stats().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_stats_repairs_stale_cache() {
        let store = job_store();
        store.save_job_locally(payload("One")).await.unwrap();
        store
            .backend()
            .set(STATS_KEY, json!({"totalTracked": 7, "pendingSync": 0, "lastUpdated": null}))
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_tracked, 0);
        assert_eq!(stats.pending_sync, 1);

        let persisted: Stats =
            serde_json::from_value(store.backend().get(STATS_KEY).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(persisted, stats);
    }

    #[tokio::test]
    async fn test_commit_keeps_jobs_queued_during_pass() {
        let store = job_store();
        let before = store.save_job_locally(payload("Before")).await.unwrap();
        let snapshot: HashSet<String> = [before.id.clone()].into_iter().collect();

        // Arrives while the pass is "in flight".
        let during = store.save_job_locally(payload("During")).await.unwrap();

        let delivered = vec![before.into_tracked(Utc::now())];
        let stats = store
            .commit_sync_pass(&snapshot, Vec::new(), delivered, Utc::now())
            .await
            .unwrap();

        let pending = store.pending_jobs().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, during.id);
        assert_eq!(stats.total_tracked, 1);
        assert!(store.last_sync().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_export_then_import_restores_queues() {
        let source = job_store();
        source.save_job_locally(payload("One")).await.unwrap();
        let exported = source.export_data().await.unwrap();
        assert_eq!(exported["version"], EXPORT_VERSION);
        assert!(exported.get("exportTime").is_some());

        let target = job_store();
        let stats = target.import_data(exported).await.unwrap();
        assert_eq!(stats.pending_sync, 1);
        assert!(target.backend().get("version").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_rejects_wrong_version_without_writing() {
        let store = job_store();
        let err = store
            .import_data(json!({"version": "2.0", "pendingJobs": []}))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::VersionMismatch { .. }));
        assert!(store.backend().is_empty().await);
    }

    #[tokio::test]
    async fn test_import_rejects_non_object() {
        let store = job_store();
        assert!(matches!(
            store.import_data(json!(["version", "1.0"])).await,
            Err(ImportError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_queue_without_partial_merge() {
        let store = job_store();
        let err = store
            .import_data(json!({
                "version": "1.0",
                "settings": {"autoTrack": false},
                "pendingJobs": [{"title": "missing everything else"}]
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::InvalidValue { ref key, .. } if key == PENDING_JOBS_KEY));
        assert!(store.backend().get(SETTINGS_KEY).await.unwrap().is_none());
    }
}
