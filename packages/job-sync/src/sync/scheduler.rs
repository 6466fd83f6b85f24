//! Periodic and startup sync triggers.
//!
//! ```text
//! SyncScheduler::run
//!     ├─► startup pass
//!     └─► every `interval` ─► sync_pending_jobs()
//! ```
//!
//! Both triggers go through the engine's reentrancy guard, so an overlap
//! with a user-initiated sync is skipped rather than doubled up.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::sync::engine::SyncEngine;
use crate::traits::store::KeyValueStore;
use crate::traits::transport::Transport;

/// Default period between automatic sync passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Runs sync passes on a fixed period until cancelled.
pub struct SyncScheduler<S, T> {
    engine: Arc<SyncEngine<S, T>>,
    interval: Duration,
}

impl<S, T> SyncScheduler<S, T>
where
    S: KeyValueStore + 'static,
    T: Transport + 'static,
{
    pub fn new(engine: Arc<SyncEngine<S, T>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run on a background task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "sync scheduler starting");

        self.run_pass("startup").await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.run_pass("periodic").await,
            }
        }

        info!("sync scheduler stopped");
    }

    async fn run_pass(&self, trigger: &'static str) {
        match self.engine.sync_pending_jobs().await {
            Ok(report) if report.total == 0 => debug!(trigger, "nothing to sync"),
            Ok(report) => info!(
                trigger,
                synced = report.synced,
                failed = report.failed,
                total = report.total,
                "scheduled sync finished"
            ),
            Err(SyncError::SyncInProgress) => debug!(trigger, "sync already running, skipped"),
            Err(SyncError::Unauthenticated) => debug!(trigger, "no token, scheduled sync skipped"),
            Err(e) => error!(trigger, error = %e, "scheduled sync failed"),
        }
    }
}
