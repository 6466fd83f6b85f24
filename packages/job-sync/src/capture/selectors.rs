//! Per-platform CSS selectors for job pages.

use crate::types::job::Platform;

/// Where a platform renders the job title, company and apply control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorSet {
    pub title: &'static str,
    pub company: &'static str,
    pub apply: &'static str,
}

/// Substrings (lowercase) that mark a clickable as an apply control.
pub const APPLY_KEYWORDS: [&str; 3] = ["apply", "submit", "application"];

/// Elements checked for apply intent.
pub const CLICKABLE_SELECTOR: &str = r#"button, a, [role="button"], input[type="submit"]"#;

const LINKEDIN: SelectorSet = SelectorSet {
    title: ".jobs-details-top-card__job-title, .job-details-jobs-unified-top-card__job-title",
    company: ".jobs-details-top-card__company-url, .job-details-jobs-unified-top-card__company-name",
    apply: ".jobs-apply-button, button[aria-label*='Apply']",
};

const INTERNSHALA: SelectorSet = SelectorSet {
    title: ".profile_on_detail_page h1",
    company: ".profile_on_detail_page .company_name",
    apply: "#apply_now_button",
};

const UNSTOP: SelectorSet = SelectorSet {
    title: ".contest-header-title",
    company: ".host-information",
    apply: ".apply-now-btn",
};

const INDEED: SelectorSet = SelectorSet {
    title: ".jobsearch-JobInfoHeader-title",
    company: "[data-company-name]",
    apply: "#indeed-apply-button, .ia-IndeedApplyButton",
};

/// Selectors for a supported platform; `None` for anything else.
pub fn selectors_for(platform: Platform) -> Option<&'static SelectorSet> {
    match platform {
        Platform::Linkedin => Some(&LINKEDIN),
        Platform::Internshala => Some(&INTERNSHALA),
        Platform::Unstop => Some(&UNSTOP),
        Platform::Indeed => Some(&INDEED),
        Platform::Other | Platform::Test => None,
    }
}

/// Whether visible text or a label reads like an apply control.
pub fn is_apply_text(text: &str) -> bool {
    let text = text.to_lowercase();
    APPLY_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}
