//! User-facing extension settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::types::job::Platform;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Process-wide configuration, persisted under the `settings` key.
///
/// Fields missing from a stored document fall back to their defaults,
/// so older documents keep loading.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub is_enabled: bool,
    pub auto_track: bool,
    pub show_notifications: bool,
    pub user_token: Option<String>,
    pub backend_url: String,
    pub track_linked_in: bool,
    pub track_internshala: bool,
    pub track_unstop: bool,
    pub track_indeed: bool,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    pub last_verified: Option<DateTime<Utc>>,
    pub encryption_enabled: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            last_verified: None,
            encryption_enabled: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            auto_track: true,
            show_notifications: true,
            user_token: None,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            track_linked_in: true,
            track_internshala: true,
            track_unstop: true,
            track_indeed: true,
            security: SecuritySettings::default(),
        }
    }
}

impl Settings {
    /// The bearer token, if one is set and non-blank.
    pub fn token(&self) -> Option<&str> {
        self.user_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Whether automatic capture is allowed on this platform.
    pub fn tracks(&self, platform: Platform) -> bool {
        match platform {
            Platform::Linkedin => self.track_linked_in,
            Platform::Internshala => self.track_internshala,
            Platform::Unstop => self.track_unstop,
            Platform::Indeed => self.track_indeed,
            Platform::Other => true,
            Platform::Test => false,
        }
    }

    /// Base URL without a trailing slash.
    pub fn backend_base(&self) -> &str {
        self.backend_url.trim().trim_end_matches('/')
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("is_enabled", &self.is_enabled)
            .field("auto_track", &self.auto_track)
            .field("show_notifications", &self.show_notifications)
            .field("user_token", &self.user_token.as_ref().map(|_| "[REDACTED]"))
            .field("backend_url", &self.backend_url)
            .field("track_linked_in", &self.track_linked_in)
            .field("track_internshala", &self.track_internshala)
            .field("track_unstop", &self.track_unstop)
            .field("track_indeed", &self.track_indeed)
            .field("security", &self.security)
            .finish()
    }
}

/// Partial settings update. Absent fields are left untouched.
///
/// `user_token` distinguishes "leave alone" (`None`) from "log out"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub is_enabled: Option<bool>,
    pub auto_track: Option<bool>,
    pub show_notifications: Option<bool>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub user_token: Option<Option<String>>,
    pub backend_url: Option<String>,
    pub track_linked_in: Option<bool>,
    pub track_internshala: Option<bool>,
    pub track_unstop: Option<bool>,
    pub track_indeed: Option<bool>,
}

impl SettingsPatch {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            user_token: Some(Some(token.into())),
            ..Default::default()
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.is_enabled {
            settings.is_enabled = v;
        }
        if let Some(v) = self.auto_track {
            settings.auto_track = v;
        }
        if let Some(v) = self.show_notifications {
            settings.show_notifications = v;
        }
        if let Some(token) = &self.user_token {
            settings.user_token = token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
        }
        if let Some(url) = &self.backend_url {
            settings.backend_url = url.trim().to_string();
        }
        if let Some(v) = self.track_linked_in {
            settings.track_linked_in = v;
        }
        if let Some(v) = self.track_internshala {
            settings.track_internshala = v;
        }
        if let Some(v) = self.track_unstop {
            settings.track_unstop = v;
        }
        if let Some(v) = self.track_indeed {
            settings.track_indeed = v;
        }
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
