//! Job capture from job-board pages.
//!
//! - [`sanitize`] - URL cleanup before anything is stored
//! - [`selectors`] - Per-platform CSS selectors
//! - [`detector`] - Snapshot-driven detection state machine
//! - [`page`] - Async per-page driver that hands captures to the background service

pub mod detector;
pub mod page;
pub mod sanitize;
pub mod selectors;

pub use detector::{CaptureDetector, CaptureEvent};
pub use page::{is_supported_page, PageEvent, PageNotice, PageWatcher, SETTLE_DELAY, SUBMIT_DELAY};
pub use sanitize::sanitize_url;
pub use selectors::{selectors_for, SelectorSet};
