//! Message-passing front door to the sync engine.
//!
//! Page drivers, the options UI and the CLI talk to the engine only
//! through [`BackgroundHandle::call`]. Each request runs on its own task
//! and is answered over a oneshot channel; every failure comes back as
//! [`Response::Failed`] rather than an error or panic.
//!
//! ```text
//! BackgroundHandle::call(Request)
//!     └─► mpsc ─► BackgroundService::run
//!                     └─► spawn(handle_request) ─► oneshot ─► Response
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::sync::engine::{SaveOutcome, SyncEngine, SyncReport, VerifyReport};
use crate::traits::store::KeyValueStore;
use crate::traits::transport::Transport;
use crate::types::job::JobDraft;
use crate::types::settings::{Settings, SettingsPatch};
use crate::types::stats::Stats;

/// Requests are queued up to this depth before callers wait.
const REQUEST_QUEUE_DEPTH: usize = 64;

/// A message to the background service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Request {
    SaveJob(JobDraft),
    GetSettings,
    UpdateSettings(SettingsPatch),
    SyncJobs,
    VerifyConnection,
    GetStats,
    RetryAbandoned,
    ExportData,
    ImportData(Value),
    ClearData,
}

impl Request {
    /// Short name for logs. Never includes payload data.
    pub fn action(&self) -> &'static str {
        match self {
            Request::SaveJob(_) => "saveJob",
            Request::GetSettings => "getSettings",
            Request::UpdateSettings(_) => "updateSettings",
            Request::SyncJobs => "syncJobs",
            Request::VerifyConnection => "verifyConnection",
            Request::GetStats => "getStats",
            Request::RetryAbandoned => "retryAbandoned",
            Request::ExportData => "exportData",
            Request::ImportData(_) => "importData",
            Request::ClearData => "clearData",
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Response {
    JobSaved(SaveOutcome),
    Settings(Settings),
    SettingsUpdated(Settings),
    Synced(SyncReport),
    Verified(VerifyReport),
    Stats(Stats),
    RetryScheduled { reset: usize },
    Exported(Value),
    Imported(Stats),
    Cleared,
    Failed { error: String },
}

impl Response {
    pub fn failed(error: impl Into<String>) -> Self {
        Response::Failed {
            error: error.into(),
        }
    }

    /// False for failures and for a connectivity check that did not verify.
    pub fn is_success(&self) -> bool {
        match self {
            Response::Failed { .. } => false,
            Response::Verified(report) => report.is_verified(),
            _ => true,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Failed { error } => Some(error),
            Response::Verified(report) if !report.is_verified() => Some(&report.message),
            _ => None,
        }
    }
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Cheap, cloneable sender side of the background service.
#[derive(Clone)]
pub struct BackgroundHandle {
    sender: mpsc::Sender<Envelope>,
}

impl BackgroundHandle {
    /// Send a request and wait for its response.
    pub async fn call(&self, request: Request) -> Response {
        let (reply, receiver) = oneshot::channel();
        if self.sender.send(Envelope { request, reply }).await.is_err() {
            return Response::failed("background service is not running");
        }
        receiver
            .await
            .unwrap_or_else(|_| Response::failed("background service dropped the request"))
    }
}

/// Owns the engine and serves requests until every handle is dropped.
pub struct BackgroundService<S, T> {
    engine: Arc<SyncEngine<S, T>>,
    receiver: mpsc::Receiver<Envelope>,
}

impl<S, T> BackgroundService<S, T>
where
    S: KeyValueStore + 'static,
    T: Transport + 'static,
{
    /// Start the service on a background task.
    pub fn spawn(engine: Arc<SyncEngine<S, T>>) -> (BackgroundHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let service = Self { engine, receiver };
        let task = tokio::spawn(service.run());
        (BackgroundHandle { sender }, task)
    }

    async fn run(mut self) {
        debug!("background service started");
        while let Some(Envelope { request, reply }) = self.receiver.recv().await {
            let engine = self.engine.clone();
            tokio::spawn(async move {
                let action = request.action();
                let response = handle_request(&engine, request).await;
                if let Some(error) = response.error() {
                    warn!(action, error, "request failed");
                }
                if reply.send(response).is_err() {
                    debug!(action, "caller went away before the response");
                }
            });
        }
        debug!("background service stopped");
    }
}

/// Run one request against the engine.
pub async fn handle_request<S, T>(engine: &SyncEngine<S, T>, request: Request) -> Response
where
    S: KeyValueStore,
    T: Transport,
{
    match request {
        Request::SaveJob(draft) => match engine.save_job(draft).await {
            Ok(outcome) => Response::JobSaved(outcome),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::GetSettings => match engine.settings().get().await {
            Ok(settings) => Response::Settings(settings),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::UpdateSettings(patch) => match engine.settings().update(&patch).await {
            Ok(settings) => Response::SettingsUpdated(settings),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::SyncJobs => match engine.sync_pending_jobs().await {
            Ok(report) => Response::Synced(report),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::VerifyConnection => match engine.verify_backend_connection().await {
            Ok(report) => Response::Verified(report),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::GetStats => match engine.get_stats().await {
            Ok(stats) => Response::Stats(stats),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::RetryAbandoned => match engine.retry_abandoned().await {
            Ok(reset) => Response::RetryScheduled { reset },
            Err(e) => Response::failed(e.to_string()),
        },
        Request::ExportData => match engine.export_data().await {
            Ok(data) => Response::Exported(data),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::ImportData(data) => match engine.import_data(data).await {
            Ok(stats) => Response::Imported(stats),
            Err(e) => Response::failed(e.to_string()),
        },
        Request::ClearData => match engine.clear_all_data().await {
            Ok(()) => Response::Cleared,
            Err(e) => {
                error!(error = %e, "clearing local data failed");
                Response::failed(e.to_string())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::credentials::ExtensionCredentials;
    use crate::security::signer::{RequestSigner, SignatureScheme};
    use crate::stores::MemoryStore;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn spawn_service(transport: MockTransport) -> (BackgroundHandle, JoinHandle<()>) {
        let credentials = ExtensionCredentials::new("test-secret", "1.0.0").unwrap();
        let signer = RequestSigner::new(credentials, SignatureScheme::HmacSha256).unwrap();
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()), signer, transport);
        BackgroundService::spawn(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_save_then_stats_round_trip() {
        let (handle, _task) = spawn_service(MockTransport::always(200));

        let response = handle
            .call(Request::SaveJob(JobDraft::new(
                "Backend Engineer",
                "Acme",
                "linkedin",
                "https://x.com/job/1",
            )))
            .await;
        let Response::JobSaved(outcome) = response else {
            panic!("unexpected response: {:?}", response);
        };
        assert!(outcome.saved_locally);

        let Response::Stats(stats) = handle.call(Request::GetStats).await else {
            panic!("expected stats");
        };
        assert_eq!(stats.pending_sync, 1);
    }

    #[tokio::test]
    async fn test_errors_become_failed_responses() {
        let (handle, _task) = spawn_service(MockTransport::always(200));
        handle
            .call(Request::UpdateSettings(SettingsPatch::token("tok1")))
            .await;

        let response = handle
            .call(Request::SaveJob(JobDraft::new("", "Acme", "linkedin", "https://x.com/1")))
            .await;
        assert!(!response.is_success());
        assert!(response.error().unwrap().contains("title is required"));

        let response = handle.call(Request::ImportData(json!([1, 2]))).await;
        assert!(matches!(response, Response::Failed { .. }));
    }

    #[tokio::test]
    async fn test_unverified_connection_is_not_success() {
        let (handle, _task) = spawn_service(MockTransport::always(401));
        handle
            .call(Request::UpdateSettings(SettingsPatch::token("expired")))
            .await;

        let response = handle.call(Request::VerifyConnection).await;
        assert!(matches!(response, Response::Verified(_)));
        assert!(!response.is_success());
        assert!(response.error().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_call_after_shutdown_fails_cleanly() {
        let (handle, task) = spawn_service(MockTransport::always(200));
        task.abort();
        let _ = task.await;

        let response = handle.call(Request::GetStats).await;
        assert!(matches!(response, Response::Failed { .. }));
    }

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_value(json!({
            "action": "saveJob",
            "data": {
                "title": "SDE",
                "company": "Acme",
                "platform": "unstop",
                "url": "https://unstop.com/jobs/1"
            }
        }))
        .unwrap();
        assert_eq!(request.action(), "saveJob");

        let request: Request = serde_json::from_value(json!({"action": "syncJobs"})).unwrap();
        assert_eq!(request, Request::SyncJobs);
    }
}
