//! TrackRuit Sync Agent
//!
//! Hosts the job sync pipeline: a file-backed local store, the background
//! request service, and the periodic sync scheduler. One-shot subcommands
//! send a single request through the same service and print the response.

mod config;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use job_sync::capture::SETTLE_DELAY;
use job_sync::{
    is_supported_page, BackgroundHandle, BackgroundService, DocumentSource, FileStore,
    HttpTransport, JobDraft, PageEvent, PageNotice, PageWatcher, Request, RequestSigner,
    Response, SettingsPatch, SyncEngine, SyncScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AgentConfig;

#[derive(Parser)]
#[command(name = "sync-agent")]
#[command(about = "Local-first job capture and sync for TrackRuit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background service and periodic sync until interrupted
    Run,

    /// Save a job application
    Save {
        #[arg(long)]
        title: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        platform: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        location: Option<String>,
    },

    /// Deliver pending jobs now
    Sync,

    /// Check the backend connection and credentials
    Verify,

    /// Show queue counts
    Stats,

    /// Make abandoned jobs eligible for retry
    Retry,

    /// Export all local data as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Restore local data from an export
    Import { path: PathBuf },

    /// Delete all local data, settings included
    Clear {
        #[arg(long)]
        yes: bool,
    },

    /// Run the capture detector over a saved job page
    Capture {
        /// URL the page was loaded from
        #[arg(long)]
        url: String,
        /// HTML snapshot of the page
        #[arg(long)]
        html: PathBuf,
        /// Click the apply control with this key (`id` or `tag:label`, e.g. `button:apply`)
        #[arg(long)]
        click: Option<String>,
        /// Save the detected job manually
        #[arg(long)]
        manual: bool,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,

    /// Store a bearer token
    Login { token: String },

    /// Forget the bearer token
    Logout,

    /// Update individual settings
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        auto_track: Option<bool>,
        #[arg(long)]
        notifications: Option<bool>,
        #[arg(long)]
        backend_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::from_env().context("Failed to load configuration")?;

    tracing::info!(
        data_path = %config.data_path.display(),
        scheme = ?config.signature_scheme,
        "Starting TrackRuit sync agent"
    );

    let store = Arc::new(FileStore::new(&config.data_path));
    let signer = RequestSigner::new(config.credentials.clone(), config.signature_scheme)
        .context("Failed to create request signer")?;
    let transport = HttpTransport::with_timeout(config.request_timeout)
        .context("Failed to create HTTP client")?;
    let engine = Arc::new(SyncEngine::new(store, signer, transport));

    let (handle, service) = BackgroundService::spawn(engine.clone());

    if let Some(url) = &config.backend_url {
        expect_success(
            handle
                .call(Request::UpdateSettings(SettingsPatch {
                    backend_url: Some(url.clone()),
                    ..Default::default()
                }))
                .await,
        )?;
    }

    match cli.command {
        Commands::Run => {
            let shutdown = CancellationToken::new();
            let scheduler =
                SyncScheduler::new(engine.clone(), config.sync_interval).spawn(shutdown.clone());

            println!("{}", "Sync agent running. Press Ctrl-C to stop.".bright_green());
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;

            tracing::info!("Shutting down");
            shutdown.cancel();
            scheduler.await.context("Scheduler task failed")?;
        }
        Commands::Save {
            title,
            company,
            platform,
            url,
            location,
        } => {
            let mut draft = JobDraft::new(title, company, platform, url);
            if let Some(location) = location {
                draft = draft.with_location(location);
            }
            print_response(handle.call(Request::SaveJob(draft)).await)?;
        }
        Commands::Sync => print_response(handle.call(Request::SyncJobs).await)?,
        Commands::Verify => print_response(handle.call(Request::VerifyConnection).await)?,
        Commands::Stats => print_response(handle.call(Request::GetStats).await)?,
        Commands::Retry => print_response(handle.call(Request::RetryAbandoned).await)?,
        Commands::Export { output } => {
            let response = expect_success(handle.call(Request::ExportData).await)?;
            let Response::Exported(data) = response else {
                return Err(anyhow!("unexpected response to export"));
            };
            let json = serde_json::to_string_pretty(&data)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} {}", "Exported to".bright_green(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Import { path } => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let data = serde_json::from_str(&raw).context("Import file is not valid JSON")?;
            print_response(handle.call(Request::ImportData(data)).await)?;
        }
        Commands::Clear { yes } => {
            if !yes {
                return Err(anyhow!("refusing to clear local data without --yes"));
            }
            print_response(handle.call(Request::ClearData).await)?;
        }
        Commands::Capture {
            url,
            html,
            click,
            manual,
        } => {
            run_capture(handle.clone(), url, html, click, manual).await?;
        }
        Commands::Settings { action } => {
            let request = match action.unwrap_or(SettingsAction::Show) {
                SettingsAction::Show => Request::GetSettings,
                SettingsAction::Login { token } => {
                    Request::UpdateSettings(SettingsPatch::token(token))
                }
                SettingsAction::Logout => Request::UpdateSettings(SettingsPatch {
                    user_token: Some(None),
                    ..Default::default()
                }),
                SettingsAction::Set {
                    enabled,
                    auto_track,
                    notifications,
                    backend_url,
                } => Request::UpdateSettings(SettingsPatch {
                    is_enabled: enabled,
                    auto_track,
                    show_notifications: notifications,
                    backend_url,
                    ..Default::default()
                }),
            };
            print_response(handle.call(request).await)?;
        }
    }

    drop(handle);
    service.await.context("Background service task failed")?;
    Ok(())
}

/// A saved page, re-read whenever the watcher asks for the document.
struct HtmlFile {
    path: PathBuf,
}

#[async_trait]
impl DocumentSource for HtmlFile {
    async fn snapshot(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "page snapshot unreadable");
                None
            }
        }
    }
}

/// Feed a saved page (and optional click) through a page watcher.
async fn run_capture(
    handle: BackgroundHandle,
    url: String,
    html_path: PathBuf,
    click: Option<String>,
    manual: bool,
) -> Result<()> {
    if !is_supported_page(&url) {
        println!("{}", "Not a supported job board; nothing will be detected".yellow());
    }
    let html = tokio::fs::read_to_string(&html_path)
        .await
        .with_context(|| format!("Failed to read {}", html_path.display()))?;

    let (event_tx, event_rx) = mpsc::channel(8);
    let (notice_tx, mut notice_rx) = mpsc::channel(8);
    let watcher = PageWatcher::new(url, handle)
        .with_notices(notice_tx)
        .with_document(Arc::new(HtmlFile { path: html_path }))
        .spawn(event_rx);

    event_tx.send(PageEvent::Mutation(html)).await?;
    // Keep the page open until the settle pass has read it again.
    tokio::time::sleep(SETTLE_DELAY + Duration::from_millis(250)).await;
    if let Some(target) = &click {
        event_tx.send(PageEvent::Click(target.clone())).await?;
    }
    if manual {
        event_tx.send(PageEvent::ManualSave).await?;
    }
    drop(event_tx);

    let mut captured = false;
    while let Some(notice) = notice_rx.recv().await {
        match notice {
            PageNotice::JobDetected { title, company } => {
                println!("{} {} at {}", "Detected".bright_cyan(), title.bold(), company);
            }
            PageNotice::Tracked {
                job_id,
                saved_locally,
            } => {
                captured = true;
                let how = if saved_locally { "saved locally" } else { "synced" };
                println!("{} {} ({})", "Captured".bright_green(), job_id, how);
            }
            PageNotice::Skipped { reason } => println!("{} {}", "Skipped:".yellow(), reason),
            PageNotice::Failed { error } => println!("{} {}", "Failed:".red(), error),
        }
    }
    watcher.await.context("Page watcher task failed")?;

    if !captured && (manual || click.is_some()) {
        println!("{}", "No job was captured".yellow());
    }
    Ok(())
}

fn expect_success(response: Response) -> Result<Response> {
    if response.is_success() {
        return Ok(response);
    }
    Err(anyhow!(response
        .error()
        .unwrap_or("request failed")
        .to_string()))
}

fn print_response(response: Response) -> Result<()> {
    let success = response.is_success();
    let json = serde_json::to_string_pretty(&response)?;
    if success {
        println!("{}", "✓ ok".bright_green().bold());
        println!("{}", json);
        Ok(())
    } else {
        println!("{}", json);
        Err(anyhow!(response
            .error()
            .unwrap_or("request failed")
            .to_string()))
    }
}
