//! Integration tests for the capture → queue → sync pipeline.
//!
//! These tests drive the public API end to end:
//! 1. Capture or save a job while offline
//! 2. Authenticate
//! 3. Drain the queue against a mock or simulated backend
//! 4. Check the queues, stats and retry ceiling

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use job_sync::{
    sanitize_url,
    testing::{MockTransport, SimulatedBackend},
    BackgroundService, CaptureDetector, CaptureEvent, ExtensionCredentials, FileStore,
    JobDraft, KeyValueStore, MemoryStore, Request, RequestSigner, Response, SettingsPatch,
    SignatureScheme, SyncEngine, SyncError, SyncReport, Transport, TransportResponse,
    VerifyOutcome,
};

const SECRET: &str = "integration-secret";

fn signer() -> RequestSigner {
    let credentials = ExtensionCredentials::new(SECRET, "1.0.0").unwrap();
    RequestSigner::new(credentials, SignatureScheme::HmacSha256).unwrap()
}

fn engine_with<S: KeyValueStore, T: Transport>(store: S, transport: T) -> Arc<SyncEngine<S, T>> {
    Arc::new(SyncEngine::new(Arc::new(store), signer(), transport))
}

fn job(n: usize) -> JobDraft {
    JobDraft::new(
        format!("Engineer {}", n),
        "Acme",
        "linkedin",
        format!("https://www.linkedin.com/jobs/view/{}", n),
    )
}

async fn login<S: KeyValueStore, T: Transport>(engine: &SyncEngine<S, T>, token: &str) {
    engine
        .settings()
        .update(&SettingsPatch::token(token))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_offline_to_online_reconciliation() {
    let engine = engine_with(MemoryStore::new(), MockTransport::always(200));
    let (handle, _task) = BackgroundService::spawn(engine.clone());

    let response = handle
        .call(Request::SaveJob(JobDraft::new(
            "Backend Engineer",
            "Acme",
            "linkedin",
            "https://x.com/job/1",
        )))
        .await;
    assert!(response.is_success());
    let Response::JobSaved(outcome) = response else {
        panic!("expected JobSaved");
    };
    assert!(outcome.saved_locally);
    assert_eq!(engine.job_store().pending_jobs().await.unwrap().len(), 1);

    handle
        .call(Request::UpdateSettings(SettingsPatch::token("tok1")))
        .await;

    let Response::Synced(report) = handle.call(Request::SyncJobs).await else {
        panic!("expected Synced");
    };
    assert_eq!(
        report,
        SyncReport {
            synced: 1,
            failed: 0,
            abandoned: 0,
            total: 1
        }
    );
    assert!(engine.job_store().pending_jobs().await.unwrap().is_empty());

    let tracked = engine.job_store().tracked_jobs().await.unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].id(), outcome.job_id);
    assert!(tracked[0].synced_at >= tracked[0].pending.local_save_time);
}

#[tokio::test]
async fn test_exhausted_retries_make_no_further_calls() {
    let seeded = json!({
        "settings": { "userToken": "tok1" },
        "pendingJobs": [{
            "id": "job_1700000000000_abcdefghi",
            "title": "Backend Engineer",
            "company": "Acme",
            "platform": "linkedin",
            "url": "https://x.com/job/1",
            "appliedAt": "2024-01-01T00:00:00Z",
            "status": "applied",
            "source": "auto_detect",
            "localSaveTime": "2024-01-01T00:00:00Z",
            "attempts": 2
        }],
        "trackedJobs": []
    });
    let serde_json::Value::Object(entries) = seeded else {
        unreachable!()
    };
    let engine = engine_with(MemoryStore::with_entries(entries), MockTransport::always(500));

    let report = engine.sync_pending_jobs().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(engine.transport().call_count(), 1);

    let pending = engine.job_store().pending_jobs().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 3);
    assert_eq!(pending[0].last_error.as_deref(), Some("HTTP 500"));
    assert!(engine.job_store().tracked_jobs().await.unwrap().is_empty());

    engine.transport().clear_calls();
    let report = engine.sync_pending_jobs().await.unwrap();
    assert_eq!(engine.transport().call_count(), 0);
    assert_eq!(report.abandoned, 1);
    assert_eq!(engine.job_store().pending_jobs().await.unwrap()[0].attempts, 3);
}

#[tokio::test]
async fn test_every_job_ends_tracked_xor_abandoned() {
    // Job 1 never gets through; the others eventually do.
    let transport = MockTransport::scripted(vec![
        Ok(TransportResponse::new(500, "")),
        Ok(TransportResponse::new(503, "")),
        Ok(TransportResponse::new(200, "{}")),
        Ok(TransportResponse::new(500, "")),
        Ok(TransportResponse::new(200, "{}")),
        Err(job_sync::testing::unreachable_error()),
    ])
    .with_fallback_status(200);
    let engine = engine_with(MemoryStore::new(), transport);

    let mut ids = Vec::new();
    for n in 1..=3 {
        ids.push(engine.save_job(job(n)).await.unwrap().job_id);
    }
    login(&engine, "tok1").await;

    for _ in 0..5 {
        engine.sync_pending_jobs().await.unwrap();
    }

    let pending = engine.job_store().pending_jobs().await.unwrap();
    let tracked = engine.job_store().tracked_jobs().await.unwrap();
    let pending_ids: HashSet<_> = pending.iter().map(|j| j.id.clone()).collect();
    let tracked_ids: HashSet<_> = tracked.iter().map(|j| j.id().to_string()).collect();

    for id in &ids {
        assert!(
            pending_ids.contains(id) ^ tracked_ids.contains(id),
            "job {} must be in exactly one list",
            id
        );
    }
    assert_eq!(tracked.len(), 2);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 3);
    assert_eq!(pending[0].job.title, "Engineer 1");
}

#[tokio::test]
async fn test_stats_idempotent_and_consistent() {
    let engine = engine_with(MemoryStore::new(), MockTransport::always(200));
    engine.save_job(job(1)).await.unwrap();
    engine.save_job(job(2)).await.unwrap();
    login(&engine, "tok1").await;
    engine.save_job(job(3)).await.unwrap();

    let first = engine.get_stats().await.unwrap();
    let second = engine.get_stats().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.pending_sync, 2);
    assert_eq!(first.total_tracked, 1);

    engine.sync_pending_jobs().await.unwrap();
    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.pending_sync, engine.job_store().pending_jobs().await.unwrap().len());
    assert_eq!(stats.total_tracked, engine.job_store().tracked_jobs().await.unwrap().len());
}

#[test]
fn test_sanitizer_fails_open() {
    for raw in ["ht!tp://bad url", "javascript", "%%%?token=x"] {
        assert_eq!(sanitize_url(raw), raw);
    }
}

#[test]
fn test_single_capture_per_page() {
    let page = r#"<div class="jobs-details-top-card__job-title">Platform Engineer</div>
        <a class="jobs-details-top-card__company-url">Globex</a>
        <button class="jobs-apply-button">Apply</button>"#;
    let mut detector = CaptureDetector::new("https://www.linkedin.com/jobs/view/77");

    let mut candidates = 0;
    let snapshots = std::iter::once("<div>loading</div>").chain(std::iter::repeat(page).take(9));
    for html in snapshots {
        candidates += detector
            .observe(html)
            .into_iter()
            .filter(|e| matches!(e, CaptureEvent::Detected(_)))
            .count();
    }
    assert_eq!(candidates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sync_is_rejected() {
    let transport = MockTransport::always(200).with_delay(Duration::from_secs(5));
    let engine = engine_with(MemoryStore::new(), transport);
    engine.save_job(job(1)).await.unwrap();
    login(&engine, "tok1").await;

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync_pending_jobs().await }
    });
    while engine.transport().call_count() == 0 {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        engine.sync_pending_jobs().await,
        Err(SyncError::SyncInProgress)
    ));
    assert_eq!(first.await.unwrap().unwrap().synced, 1);
    assert_eq!(engine.transport().call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_job_saved_during_sync_is_kept() {
    let transport = MockTransport::always(500).with_delay(Duration::from_secs(5));
    let engine = engine_with(MemoryStore::new(), transport);
    engine.save_job(job(1)).await.unwrap();
    login(&engine, "tok1").await;

    let pass = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync_pending_jobs().await }
    });
    while engine.transport().call_count() == 0 {
        tokio::task::yield_now().await;
    }

    let payload = job_sync::validate_job(&job(2)).unwrap();
    let late = engine.job_store().save_job_locally(payload).await.unwrap();
    pass.await.unwrap().unwrap();

    let pending = engine.job_store().pending_jobs().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[1].id, late.id);
    assert_eq!(pending[1].attempts, 0);
    assert_eq!(engine.get_stats().await.unwrap().pending_sync, 2);
}

#[tokio::test]
async fn test_signed_requests_against_simulated_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("data.json"));
    let engine = engine_with(store, SimulatedBackend::new(SECRET).with_token("tok1"));

    engine.save_job(job(1)).await.unwrap();
    login(&engine, "tok1").await;
    assert_eq!(engine.sync_pending_jobs().await.unwrap().synced, 1);
    assert_eq!(engine.transport().stored_jobs().len(), 1);

    let report = engine.verify_backend_connection().await.unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Verified);
    assert_eq!(engine.transport().stored_jobs().len(), 1);

    engine.transport().revoke_token("tok1");
    let outcome = engine.save_job(job(2)).await.unwrap();
    assert!(outcome.saved_locally);
    assert!(outcome.delivery_error.unwrap().starts_with("HTTP 401"));

    let report = engine.verify_backend_connection().await.unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Unauthorized);
}

#[tokio::test]
async fn test_wrong_secret_never_delivers() {
    let backend = SimulatedBackend::new("server-side-secret").with_token("tok1");
    let engine = engine_with(MemoryStore::new(), backend);
    login(&engine, "tok1").await;

    let outcome = engine.save_job(job(1)).await.unwrap();
    assert!(outcome.saved_locally);
    for _ in 0..4 {
        engine.sync_pending_jobs().await.unwrap();
    }

    assert!(engine.transport().stored_jobs().is_empty());
    // One immediate attempt plus two sync passes reach the ceiling.
    assert_eq!(engine.transport().call_count(), 3);
    assert!(engine.job_store().pending_jobs().await.unwrap()[0].is_abandoned());

    assert_eq!(engine.retry_abandoned().await.unwrap(), 1);
    assert!(!engine.job_store().pending_jobs().await.unwrap()[0].is_abandoned());
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trackruit-data.json");

    {
        let engine = engine_with(FileStore::new(&path), MockTransport::unreachable());
        login(&engine, "tok1").await;
        engine.save_job(job(1)).await.unwrap();
    }

    let engine = engine_with(FileStore::new(&path), MockTransport::always(201));
    let pending = engine.job_store().pending_jobs().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    assert_eq!(engine.sync_pending_jobs().await.unwrap().synced, 1);
}

#[tokio::test]
async fn test_export_import_round_trip_restores_queues() {
    let source = engine_with(MemoryStore::new(), MockTransport::always(200));
    source.save_job(job(1)).await.unwrap();
    login(&source, "tok1").await;
    source.save_job(job(2)).await.unwrap();
    let backup = source.export_data().await.unwrap();

    let target = engine_with(MemoryStore::new(), MockTransport::always(200));
    let stats = target.import_data(backup).await.unwrap();
    assert_eq!(stats.pending_sync, 1);
    assert_eq!(stats.total_tracked, 1);
    assert_eq!(
        target.settings().get().await.unwrap().token(),
        Some("tok1")
    );
}
