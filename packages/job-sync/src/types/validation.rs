//! Job data validation and sanitisation, applied before any network call.

use chrono::Utc;
use url::Url;

use crate::error::ValidationError;
use crate::types::job::{JobDraft, JobPayload, JobSource, JobStatus, Platform};

/// Maximum length of free-text fields after sanitisation.
pub const MAX_FIELD_LEN: usize = 500;

/// Validate a draft and turn it into an ingestion payload.
///
/// `title`, `company`, `platform` and `url` are required; `url` must be an
/// absolute URL. Every problem is reported, not just the first.
pub fn validate_job(draft: &JobDraft) -> Result<JobPayload, ValidationError> {
    let mut errors = Vec::new();

    // Checked after sanitising, so markup-only text counts as missing.
    let title = sanitize_text(&draft.title);
    let company = sanitize_text(&draft.company);
    for (field, missing) in [
        ("title", title.is_empty()),
        ("company", company.is_empty()),
        ("platform", draft.platform.trim().is_empty()),
        ("url", draft.url.trim().is_empty()),
    ] {
        if missing {
            errors.push(format!("{} is required", field));
        }
    }

    let platform = if draft.platform.trim().is_empty() {
        None
    } else {
        match draft.platform.parse::<Platform>() {
            Ok(Platform::Test) => {
                errors.push("platform \"test\" is reserved".to_string());
                None
            }
            Ok(platform) => Some(platform),
            // Unknown boards are still jobs worth tracking.
            Err(_) => Some(Platform::Other),
        }
    };

    let url = draft.url.trim();
    if !url.is_empty() && Url::parse(url).is_err() {
        errors.push("Invalid URL format".to_string());
    }

    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    Ok(JobPayload {
        title,
        company,
        platform: platform.unwrap_or(Platform::Other),
        url: url.to_string(),
        applied_at: draft.applied_at.unwrap_or_else(Utc::now),
        status: draft.status.unwrap_or(JobStatus::Applied),
        source: draft.source.unwrap_or(JobSource::AutoDetect),
        location: draft.location.as_deref().map(sanitize_text),
        description: draft.description.clone(),
        salary: draft.salary.as_deref().map(sanitize_text),
    })
}

/// Strip angle brackets, trim, and cap the length.
pub fn sanitize_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_FIELD_LEN)
        .collect()
}
