//! Async driver for one page load.
//!
//! Feeds DOM snapshots and clicks into a [`CaptureDetector`] and hands
//! captured applications to the background service.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::detector::{CaptureDetector, CaptureEvent};
use crate::channel::{BackgroundHandle, Request, Response};
use crate::traits::document::DocumentSource;
use crate::types::job::{JobDraft, Platform};

/// Delay after the first snapshot before the document is read once more.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Delay between an apply click and the handoff, to let the submission go
/// through.
pub const SUBMIT_DELAY: Duration = Duration::from_secs(1);

/// Input from the host page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Document snapshot after a mutation batch.
    Mutation(String),
    /// Click on the element with this key (its `id`, or `tag:label`).
    Click(String),
    /// The user pressed "Save to TrackRuit".
    ManualSave,
}

/// What the on-page notification would show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageNotice {
    /// Show the save button.
    JobDetected { title: String, company: String },
    Tracked { job_id: String, saved_locally: bool },
    Skipped { reason: &'static str },
    Failed { error: String },
}

/// The part of a watcher that outlives a single event: talking to the
/// background service and the page.
#[derive(Clone)]
struct Handoff {
    background: BackgroundHandle,
    notices: Option<mpsc::Sender<PageNotice>>,
    platform: Platform,
}

impl Handoff {
    /// Hand off an apply click, subject to the tracking toggles.
    async fn auto_save(&self, job: JobDraft) {
        let settings = match self.background.call(Request::GetSettings).await {
            Response::Settings(settings) => settings,
            other => {
                let error = other.error().unwrap_or("unexpected response").to_string();
                warn!(error = %error, "could not read settings, capture dropped");
                self.notify(PageNotice::Failed { error }).await;
                return;
            }
        };

        let reason = if !settings.is_enabled {
            Some("extension disabled")
        } else if !settings.auto_track {
            Some("auto-tracking off")
        } else if !settings.tracks(self.platform) {
            Some("platform tracking off")
        } else {
            None
        };
        if let Some(reason) = reason {
            debug!(platform = %self.platform, reason, "auto capture skipped");
            self.notify(PageNotice::Skipped { reason }).await;
            return;
        }

        self.hand_off(job).await;
    }

    async fn hand_off(&self, job: JobDraft) {
        match self.background.call(Request::SaveJob(job)).await {
            Response::JobSaved(outcome) => {
                info!(job_id = %outcome.job_id, saved_locally = outcome.saved_locally, "application captured");
                self.notify(PageNotice::Tracked {
                    job_id: outcome.job_id,
                    saved_locally: outcome.saved_locally,
                })
                .await;
            }
            other => {
                let error = other.error().unwrap_or("unexpected response").to_string();
                self.notify(PageNotice::Failed { error }).await;
            }
        }
    }

    async fn notify(&self, notice: PageNotice) {
        if let Some(notices) = &self.notices {
            // The page may already be gone.
            let _ = notices.send(notice).await;
        }
    }
}

pub struct PageWatcher {
    detector: CaptureDetector,
    handoff: Handoff,
    document: Option<Arc<dyn DocumentSource>>,
}

impl PageWatcher {
    pub fn new(page_url: impl Into<String>, background: BackgroundHandle) -> Self {
        let detector = CaptureDetector::new(page_url);
        let handoff = Handoff {
            background,
            notices: None,
            platform: detector.platform(),
        };
        Self {
            detector,
            handoff,
            document: None,
        }
    }

    pub fn with_notices(mut self, notices: mpsc::Sender<PageNotice>) -> Self {
        self.handoff.notices = Some(notices);
        self
    }

    /// Read the document once more after the settle delay. Without a
    /// source only pushed snapshots are observed.
    pub fn with_document(mut self, document: Arc<dyn DocumentSource>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn spawn(self, events: mpsc::Receiver<PageEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Process events until the page goes away (the sender is dropped).
    ///
    /// Handoffs run on their own tasks so a slow save never holds up page
    /// events; they are awaited before this returns.
    pub async fn run(mut self, mut events: mpsc::Receiver<PageEvent>) {
        let mut settle_armed = self.document.is_none();
        let mut settle_at: Option<Instant> = None;
        let mut handoffs = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        PageEvent::Mutation(html) => {
                            if !settle_armed {
                                settle_armed = true;
                                settle_at = Some(Instant::now() + SETTLE_DELAY);
                            }
                            self.observe(&html).await;
                        }
                        PageEvent::Click(target) => {
                            if let Some(job) = self.detector.click(&target) {
                                let handoff = self.handoff.clone();
                                handoffs.spawn(async move {
                                    tokio::time::sleep(SUBMIT_DELAY).await;
                                    handoff.auto_save(job).await;
                                });
                            }
                        }
                        PageEvent::ManualSave => match self.detector.manual_save() {
                            Some(job) => {
                                let handoff = self.handoff.clone();
                                handoffs.spawn(async move { handoff.hand_off(job).await });
                            }
                            None => self.handoff.notify(PageNotice::Skipped { reason: "no job detected on this page" }).await,
                        },
                    }
                }
                _ = tokio::time::sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                    settle_at = None;
                    self.settle_pass().await;
                }
                Some(joined) = handoffs.join_next(), if !handoffs.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "capture handoff task failed");
                    }
                }
            }
        }

        while let Some(joined) = handoffs.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "capture handoff task failed");
            }
        }
        debug!(platform = %self.detector.platform(), "page watcher finished");
    }

    async fn settle_pass(&mut self) {
        let Some(document) = self.document.clone() else {
            return;
        };
        match document.snapshot().await {
            Some(html) => {
                debug!("settle pass");
                self.observe(&html).await;
            }
            None => debug!("document gone, settle pass skipped"),
        }
    }

    async fn observe(&mut self, html: &str) {
        for event in self.detector.observe(html) {
            if let CaptureEvent::Detected(job) = event {
                self.handoff
                    .notify(PageNotice::JobDetected {
                        title: job.title,
                        company: job.company,
                    })
                    .await;
            }
        }
    }
}

/// Whether a page URL is on a platform with capture support.
pub fn is_supported_page(url: &str) -> bool {
    Platform::SUPPORTED.contains(&Platform::from_url(url))
}
