//! Job records as they move through capture, the pending queue and the
//! tracked list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Delivery attempts after which a pending job is abandoned.
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

/// Job board a posting was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Internshala,
    Unstop,
    Indeed,
    Other,
    /// Reserved for connectivity probes; never a real job.
    Test,
}

impl Platform {
    /// Platforms the capture detector has selectors for.
    pub const SUPPORTED: [Platform; 4] = [
        Platform::Linkedin,
        Platform::Internshala,
        Platform::Unstop,
        Platform::Indeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Internshala => "internshala",
            Platform::Unstop => "unstop",
            Platform::Indeed => "indeed",
            Platform::Other => "other",
            Platform::Test => "test",
        }
    }

    /// Detect the platform from a page URL by host substring.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains("linkedin.com") {
            Platform::Linkedin
        } else if lower.contains("internshala.com") {
            Platform::Internshala
        } else if lower.contains("unstop.com") {
            Platform::Unstop
        } else if lower.contains("indeed.com") {
            Platform::Indeed
        } else {
            Platform::Other
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::Linkedin),
            "internshala" => Ok(Platform::Internshala),
            "unstop" => Ok(Platform::Unstop),
            "indeed" => Ok(Platform::Indeed),
            "other" => Ok(Platform::Other),
            "test" => Ok(Platform::Test),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Capture lifecycle tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Detected,
    Applied,
    ManualSave,
    /// Connectivity probe marker.
    Test,
}

/// How a job entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    AutoDetect,
    Manual,
}

/// Caller-supplied job data, before validation and local metadata.
///
/// Fields are kept loose (plain strings) so that malformed input can be
/// reported field by field by [`crate::types::validation::validate_job`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<JobSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
}

impl JobDraft {
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        platform: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            platform: platform.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: JobSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_applied_at(mut self, applied_at: DateTime<Utc>) -> Self {
        self.applied_at = Some(applied_at);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Validated body sent to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub title: String,
    pub company: String,
    pub platform: Platform,
    pub url: String,
    pub applied_at: DateTime<Utc>,
    pub status: JobStatus,
    pub source: JobSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
}

impl JobPayload {
    /// The synthetic job used to probe the ingestion endpoint.
    pub fn connectivity_probe(now: DateTime<Utc>) -> Self {
        Self {
            title: "Connection Test".to_string(),
            company: "TrackRuit".to_string(),
            platform: Platform::Test,
            url: "https://trackruit.invalid/connectivity-probe".to_string(),
            applied_at: now,
            status: JobStatus::Test,
            source: JobSource::AutoDetect,
            location: None,
            description: None,
            salary: None,
        }
    }

    /// Loosen back into a draft, e.g. to re-validate a stored job.
    pub fn to_draft(&self) -> JobDraft {
        JobDraft {
            title: self.title.clone(),
            company: self.company.clone(),
            platform: self.platform.as_str().to_string(),
            url: self.url.clone(),
            applied_at: Some(self.applied_at),
            status: Some(self.status),
            source: Some(self.source),
            location: self.location.clone(),
            description: self.description.clone(),
            salary: self.salary.clone(),
        }
    }
}

/// A captured job not yet confirmed persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub id: String,
    #[serde(flatten)]
    pub job: JobPayload,
    pub local_save_time: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PendingJob {
    pub fn new(job: JobPayload) -> Self {
        Self {
            id: generate_job_id(),
            job,
            local_save_time: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Excluded from automatic retries once the ceiling is reached.
    pub fn is_abandoned(&self) -> bool {
        self.attempts >= MAX_SYNC_ATTEMPTS
    }

    /// Record a failed delivery attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }

    pub fn into_tracked(self, synced_at: DateTime<Utc>) -> TrackedJob {
        TrackedJob {
            pending: self,
            synced_at,
        }
    }
}

/// A job the backend has confirmed at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedJob {
    #[serde(flatten)]
    pub pending: PendingJob,
    pub synced_at: DateTime<Utc>,
}

impl TrackedJob {
    pub fn id(&self) -> &str {
        &self.pending.id
    }
}

/// Opaque local id: `job_<epoch-ms>_<9 random chars>`.
pub fn generate_job_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("job_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}
