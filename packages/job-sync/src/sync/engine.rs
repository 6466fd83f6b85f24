//! The sync engine: local-first save, queued retries, and the backend
//! connectivity probe.
//!
//! Every remote call goes through the [`RequestSigner`] and a
//! [`Transport`]. Delivery failures never escape as errors; they are
//! recorded on the job (`attempts`, `lastError`) and the job stays queued
//! until it is delivered or hits the retry ceiling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{ImportError, Result, StoreResult, SyncError, TransportError};
use crate::job_store::JobStore;
use crate::security::signer::RequestSigner;
use crate::settings_service::SettingsService;
use crate::traits::store::KeyValueStore;
use crate::traits::transport::{Transport, TransportResponse};
use crate::types::job::{JobDraft, JobPayload, PendingJob, TrackedJob};
use crate::types::stats::Stats;
use crate::types::validation::validate_job;

/// Ingestion endpoint, relative to the configured backend URL.
pub const ADD_JOB_PATH: &str = "/api/jobs/add";

/// Result of [`SyncEngine::save_job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub job_id: String,
    /// The job went to the pending queue instead of the backend.
    pub saved_locally: bool,
    /// Why immediate delivery failed, when it was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    /// Jobs left in the queue, abandoned ones included.
    pub failed: usize,
    pub abandoned: usize,
    /// Queue length when the pass started.
    pub total: usize,
}

/// How the backend answered the connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// Reached the backend with valid credentials; the probe was rejected
    /// as invalid data.
    Verified,
    /// Credentials refused (401/403).
    Unauthorized,
    /// The backend stored the probe job.
    ProbeAccepted,
    ServerError,
    Unreachable,
}

/// Result of [`SyncEngine::verify_backend_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub outcome: VerifyOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl VerifyReport {
    pub fn is_verified(&self) -> bool {
        self.outcome == VerifyOutcome::Verified
    }
}

/// One delivery attempt, classified.
enum Delivery {
    Accepted(TransportResponse),
    Rejected(TransportResponse),
    Failed(TransportError),
}

impl Delivery {
    fn failure(&self) -> Option<String> {
        match self {
            Delivery::Accepted(_) => None,
            Delivery::Rejected(response) => Some(response.error_summary()),
            Delivery::Failed(e) => Some(e.to_string()),
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            Delivery::Accepted(r) | Delivery::Rejected(r) => Some(r.status),
            Delivery::Failed(_) => None,
        }
    }
}

/// Coordinates settings, the local job store, signing and transport.
///
/// Share it behind an `Arc`; all operations take `&self`.
pub struct SyncEngine<S, T> {
    jobs: JobStore<S>,
    settings: SettingsService<S>,
    signer: RequestSigner,
    transport: T,
    sync_guard: Mutex<()>,
}

impl<S, T> SyncEngine<S, T>
where
    S: KeyValueStore,
    T: Transport,
{
    pub fn new(store: Arc<S>, signer: RequestSigner, transport: T) -> Self {
        Self {
            jobs: JobStore::new(store.clone()),
            settings: SettingsService::new(store),
            signer,
            transport,
            sync_guard: Mutex::new(()),
        }
    }

    pub fn job_store(&self) -> &JobStore<S> {
        &self.jobs
    }

    pub fn settings(&self) -> &SettingsService<S> {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Save a captured job, delivering it immediately when a token is set.
    ///
    /// Returns an error only when the job is rejected up front or could not
    /// be persisted anywhere.
    #[instrument(skip(self, draft), fields(platform = %draft.platform))]
    pub async fn save_job(&self, draft: JobDraft) -> Result<SaveOutcome> {
        let settings = self.settings.get().await?;
        if !settings.is_enabled {
            return Err(SyncError::Disabled);
        }
        let payload = validate_job(&draft)?;

        let Some(token) = settings.token() else {
            let job = self.jobs.save_job_locally(payload).await?;
            info!(job_id = %job.id, "no token, job queued for later sync");
            return Ok(SaveOutcome {
                job_id: job.id,
                saved_locally: true,
                delivery_error: None,
            });
        };

        let mut job = PendingJob::new(payload);
        let delivery = self
            .deliver(settings.backend_base(), &job.job, token)
            .await;

        match delivery.failure() {
            None => {
                let job_id = job.id.clone();
                match self.jobs.record_tracked(job).await {
                    Ok(_) => info!(job_id = %job_id, "job delivered"),
                    // Delivered remotely, so nothing is lost.
                    Err(e) => warn!(job_id = %job_id, error = %e, "job delivered but not recorded locally"),
                }
                Ok(SaveOutcome {
                    job_id,
                    saved_locally: false,
                    delivery_error: None,
                })
            }
            Some(error) => {
                job.record_failure(error.clone());
                warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    status = ?delivery.status(),
                    error = %error,
                    "immediate delivery failed, job queued"
                );
                let job = self.jobs.enqueue(job).await?;
                Ok(SaveOutcome {
                    job_id: job.id,
                    saved_locally: true,
                    delivery_error: Some(error),
                })
            }
        }
    }

    /// Deliver the pending queue in insertion order.
    ///
    /// Only one pass runs at a time; a concurrent call fails with
    /// [`SyncError::SyncInProgress`] instead of waiting.
    pub async fn sync_pending_jobs(&self) -> Result<SyncReport> {
        let _guard = self
            .sync_guard
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let pending = self.jobs.pending_jobs().await?;
        if pending.is_empty() {
            debug!("sync skipped, queue empty");
            return Ok(SyncReport::default());
        }

        let settings = self.settings.get().await?;
        let token = settings.token().ok_or(SyncError::Unauthenticated)?;
        let base = settings.backend_base();

        let total = pending.len();
        let snapshot_ids: HashSet<String> = pending.iter().map(|job| job.id.clone()).collect();
        let mut retained: Vec<PendingJob> = Vec::with_capacity(total);
        let mut delivered: Vec<TrackedJob> = Vec::new();
        let mut abandoned = 0;

        info!(total, "sync pass starting");
        for mut job in pending {
            if job.is_abandoned() {
                debug!(job_id = %job.id, attempts = job.attempts, "skipping abandoned job");
                abandoned += 1;
                retained.push(job);
                continue;
            }

            let payload = match validate_job(&job.job.to_draft()) {
                Ok(payload) => payload,
                Err(e) => {
                    job.record_failure(e.to_string());
                    warn!(job_id = %job.id, attempts = job.attempts, error = %e, "stored job failed validation");
                    retained.push(job);
                    continue;
                }
            };

            let delivery = self.deliver(base, &payload, token).await;
            match delivery.failure() {
                None => {
                    debug!(job_id = %job.id, attempts = job.attempts, status = ?delivery.status(), "job delivered");
                    delivered.push(job.into_tracked(Utc::now()));
                }
                Some(error) => {
                    job.record_failure(error);
                    warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        status = ?delivery.status(),
                        error = ?job.last_error,
                        "delivery failed"
                    );
                    if job.is_abandoned() {
                        warn!(job_id = %job.id, "retry ceiling reached, job abandoned");
                    }
                    retained.push(job);
                }
            }
        }

        let report = SyncReport {
            synced: delivered.len(),
            failed: retained.len(),
            abandoned,
            total,
        };
        let stats = self
            .jobs
            .commit_sync_pass(&snapshot_ids, retained, delivered, Utc::now())
            .await?;

        info!(
            synced = report.synced,
            failed = report.failed,
            abandoned = report.abandoned,
            total = report.total,
            pending = stats.pending_sync,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Make abandoned jobs eligible for automatic retry again.
    ///
    /// Waits for a running sync pass to commit first.
    pub async fn retry_abandoned(&self) -> Result<usize> {
        let _guard = self.sync_guard.lock().await;
        let reset = self
            .jobs
            .modify_pending(|jobs| {
                let mut reset = 0;
                for job in jobs.iter_mut().filter(|job| job.is_abandoned()) {
                    job.attempts = 0;
                    job.last_error = None;
                    reset += 1;
                }
                reset
            })
            .await?;
        if reset > 0 {
            info!(count = reset, "abandoned jobs reset for retry");
        }
        Ok(reset)
    }

    /// Probe the ingestion endpoint with a synthetic job.
    ///
    /// A 4xx other than 401/403 means the request got past authentication
    /// and was refused as bad data, which is the expected answer.
    pub async fn verify_backend_connection(&self) -> Result<VerifyReport> {
        let settings = self.settings.get().await?;
        let token = settings.token().ok_or(SyncError::Unauthenticated)?;

        let probe = JobPayload::connectivity_probe(Utc::now());
        let delivery = self.deliver(settings.backend_base(), &probe, token).await;

        let report = match delivery {
            Delivery::Accepted(response) => {
                warn!(status = response.status, "backend accepted the connectivity probe");
                VerifyReport {
                    outcome: VerifyOutcome::ProbeAccepted,
                    status: Some(response.status),
                    message: "Backend stored the test job; check its platform validation".to_string(),
                    verified_at: None,
                }
            }
            Delivery::Rejected(response) if matches!(response.status, 401 | 403) => VerifyReport {
                outcome: VerifyOutcome::Unauthorized,
                status: Some(response.status),
                message: response.error_summary(),
                verified_at: None,
            },
            Delivery::Rejected(response) if response.status >= 500 => VerifyReport {
                outcome: VerifyOutcome::ServerError,
                status: Some(response.status),
                message: response.error_summary(),
                verified_at: None,
            },
            Delivery::Rejected(response) => {
                let now = Utc::now();
                self.settings.mark_verified(now).await?;
                VerifyReport {
                    outcome: VerifyOutcome::Verified,
                    status: Some(response.status),
                    message: "Backend connection verified".to_string(),
                    verified_at: Some(now),
                }
            }
            Delivery::Failed(e) => VerifyReport {
                outcome: VerifyOutcome::Unreachable,
                status: None,
                message: e.to_string(),
                verified_at: None,
            },
        };

        info!(outcome = ?report.outcome, status = ?report.status, "connectivity probe finished");
        Ok(report)
    }

    pub async fn get_stats(&self) -> StoreResult<Stats> {
        self.jobs.get_stats().await
    }

    pub async fn export_data(&self) -> StoreResult<Value> {
        self.jobs.export_data().await
    }

    /// Restore a backup. Settings are reloaded from the imported data.
    pub async fn import_data(&self, data: Value) -> std::result::Result<Stats, ImportError> {
        let _guard = self.sync_guard.lock().await;
        let stats = self.jobs.import_data(data).await?;
        self.settings.invalidate().await;
        Ok(stats)
    }

    /// Wipe all local state and write default settings back.
    ///
    /// Like [`import_data`](Self::import_data), this waits for a running
    /// sync pass so the pass cannot write back jobs it no longer owns.
    pub async fn clear_all_data(&self) -> StoreResult<()> {
        let _guard = self.sync_guard.lock().await;
        self.jobs.clear_all_data().await?;
        self.settings.reset().await?;
        Ok(())
    }

    async fn deliver(&self, base: &str, payload: &JobPayload, token: &str) -> Delivery {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => return Delivery::Failed(TransportError::from(e)),
        };
        let url = format!("{}{}", base, ADD_JOB_PATH);
        let request = self.signer.sign(&url, &body, Some(token));

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => Delivery::Accepted(response),
            Ok(response) => Delivery::Rejected(response),
            Err(e) => Delivery::Failed(e),
        }
    }
}
