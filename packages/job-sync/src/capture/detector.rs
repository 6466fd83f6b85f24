//! Page-level job detection over HTML snapshots.
//!
//! One [`CaptureDetector`] lives for one page load. It is fed a snapshot
//! of the document after every mutation batch, extracts the job title and
//! company with the platform's selectors, and watches apply controls so
//! that a click can be turned into an application record.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::capture::sanitize::sanitize_url;
use crate::capture::selectors::{is_apply_text, selectors_for, SelectorSet, CLICKABLE_SELECTOR};
use crate::types::job::{JobDraft, JobSource, JobStatus, Platform};

/// Something the page driver should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Title and company resolved. Emitted at most once per page load.
    Detected(JobDraft),
    /// Apply controls seen for the first time, by element key.
    ApplyControlsWatched(Vec<String>),
}

struct CompiledSelectors {
    title: Selector,
    company: Selector,
    apply: Option<Selector>,
    clickable: Selector,
}

impl CompiledSelectors {
    fn compile(set: &SelectorSet) -> Option<Self> {
        let parse = |css: &str| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!(selector = css, error = %e, "invalid selector, capture disabled");
                None
            }
        };
        Some(Self {
            title: parse(set.title)?,
            company: parse(set.company)?,
            // Keyword matching still works without it.
            apply: parse(set.apply),
            clickable: parse(CLICKABLE_SELECTOR)?,
        })
    }
}

pub struct CaptureDetector {
    page_url: String,
    platform: Platform,
    selectors: Option<CompiledSelectors>,
    candidate: Option<JobDraft>,
    watched: HashSet<String>,
}

impl CaptureDetector {
    /// Detector for the page at `page_url`. Pages on unsupported platforms
    /// get an inert detector.
    pub fn new(page_url: impl Into<String>) -> Self {
        let page_url = page_url.into();
        let platform = Platform::from_url(&page_url);
        let selectors = selectors_for(platform).and_then(CompiledSelectors::compile);
        if selectors.is_none() {
            debug!(url = %page_url, "no selectors for page, detector inert");
        }
        Self {
            page_url,
            platform,
            selectors,
            candidate: None,
            watched: HashSet::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The frozen candidate, once detected.
    pub fn candidate(&self) -> Option<&JobDraft> {
        self.candidate.as_ref()
    }

    pub fn is_watched(&self, key: &str) -> bool {
        self.watched.contains(key)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Process a document snapshot.
    pub fn observe(&mut self, html: &str) -> Vec<CaptureEvent> {
        self.observe_at(html, Utc::now())
    }

    pub fn observe_at(&mut self, html: &str, now: DateTime<Utc>) -> Vec<CaptureEvent> {
        let Some(selectors) = &self.selectors else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let mut events = Vec::new();

        let fresh = watch_apply_controls(&document, selectors, &mut self.watched);
        if !fresh.is_empty() {
            debug!(count = fresh.len(), "watching apply controls");
            events.push(CaptureEvent::ApplyControlsWatched(fresh));
        }

        if self.candidate.is_none() {
            let title = first_text(&document, &selectors.title);
            let company = first_text(&document, &selectors.company);
            if let (Some(title), Some(company)) = (title, company) {
                let job = JobDraft::new(
                    title,
                    company,
                    self.platform.as_str(),
                    sanitize_url(&self.page_url),
                )
                .with_status(JobStatus::Detected)
                .with_source(JobSource::AutoDetect)
                .with_applied_at(now);

                info!(platform = %self.platform, title = %job.title, company = %job.company, "job detected");
                self.candidate = Some(job.clone());
                events.push(CaptureEvent::Detected(job));
            }
        }

        events
    }

    /// Record a click on a watched apply control.
    ///
    /// Returns the application to hand off, or `None` if the target is not
    /// watched or no job was detected.
    pub fn click(&mut self, target: &str) -> Option<JobDraft> {
        self.click_at(target, Utc::now())
    }

    pub fn click_at(&mut self, target: &str, at: DateTime<Utc>) -> Option<JobDraft> {
        if !self.watched.contains(target) {
            return None;
        }
        let job = self.candidate.as_mut()?;
        job.status = Some(JobStatus::Applied);
        job.applied_at = Some(at);
        debug!(target, "apply control clicked");
        Some(job.clone())
    }

    /// The candidate as a manual save, if one was detected.
    pub fn manual_save(&self) -> Option<JobDraft> {
        self.candidate.clone().map(|job| {
            job.with_status(JobStatus::ManualSave)
                .with_source(JobSource::Manual)
        })
    }
}

/// Key for a clickable that stays put when the DOM around it changes: its
/// `id`, otherwise tag and label, e.g. `button:easy apply`.
fn element_key(element: &ElementRef<'_>) -> String {
    let attrs = element.value();
    if let Some(id) = attrs.id().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    let label = if text.is_empty() {
        attrs
            .attr("aria-label")
            .or_else(|| attrs.attr("value"))
            .map(normalize_whitespace)
            .unwrap_or_default()
    } else {
        text
    };
    format!("{}:{}", attrs.name(), label.to_lowercase())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_apply_control(element: &ElementRef<'_>, apply: Option<&Selector>) -> bool {
    if apply.is_some_and(|selector| selector.matches(element)) {
        return true;
    }
    let attrs = element.value();
    let text: String = element.text().collect();
    is_apply_text(&text)
        || attrs.attr("aria-label").is_some_and(is_apply_text)
        || attrs.attr("value").is_some_and(is_apply_text)
}

fn watch_apply_controls(
    document: &Html,
    selectors: &CompiledSelectors,
    watched: &mut HashSet<String>,
) -> Vec<String> {
    let mut fresh = Vec::new();
    for element in document.select(&selectors.clickable) {
        if !is_apply_control(&element, selectors.apply.as_ref()) {
            continue;
        }
        let key = element_key(&element);
        if watched.insert(key.clone()) {
            fresh.push(key);
        }
    }
    fresh
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKEDIN_URL: &str = "https://www.linkedin.com/jobs/view/3921/?utm_source=share&trk=x";

    fn linkedin_page(title: &str, company: &str) -> String {
        format!(
            r#"<html><body>
                <div class="job-details-jobs-unified-top-card__job-title"><h1>{}</h1></div>
                <div class="job-details-jobs-unified-top-card__company-name"><a>{}</a></div>
                <button id="jobs-apply" aria-label="Easy Apply to this job">Easy Apply</button>
                <button>Save</button>
                <a href="/help">Help</a>
            </body></html>"#,
            title, company
        )
    }

    const LOADING_PAGE: &str = r#"<html><body><div class="spinner"></div></body></html>"#;

    fn detected(events: &[CaptureEvent]) -> Vec<&JobDraft> {
        events
            .iter()
            .filter_map(|e| match e {
                CaptureEvent::Detected(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_detects_once_per_page_load() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        let mut detections = 0;

        detections += detected(&detector.observe(LOADING_PAGE)).len();
        for _ in 0..5 {
            detections += detected(&detector.observe(&linkedin_page("Backend Engineer", "Acme")))
                .len();
        }
        assert_eq!(detections, 1);
    }

    #[test]
    fn test_candidate_is_frozen_after_detection() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        detector.observe(&linkedin_page("Backend Engineer", "Acme"));
        detector.observe(&linkedin_page("Frontend Engineer", "Other Co"));

        let job = detector.candidate().unwrap();
        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.company, "Acme");
    }

    #[test]
    fn test_candidate_fields() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        let events = detector.observe(&linkedin_page("  Backend\n  Engineer ", "Acme"));
        let job = detected(&events)[0];

        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.platform, "linkedin");
        assert_eq!(job.url, "https://www.linkedin.com/jobs/view/3921/?trk=x");
        assert_eq!(job.status, Some(JobStatus::Detected));
        assert_eq!(job.source, Some(JobSource::AutoDetect));
    }

    #[test]
    fn test_missing_company_does_not_detect() {
        let mut detector = CaptureDetector::new("https://unstop.com/jobs/1");
        let html = r#"<div class="contest-header-title">SDE Intern</div><div class="host-information">  </div>"#;
        assert!(detected(&detector.observe(html)).is_empty());
        assert!(detector.candidate().is_none());
    }

    #[test]
    fn test_apply_controls_watched_once() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        let page = linkedin_page("Backend Engineer", "Acme");

        let first = detector.observe(&page);
        assert!(first.contains(&CaptureEvent::ApplyControlsWatched(vec![
            "jobs-apply".to_string()
        ])));
        let second = detector.observe(&page);
        assert!(!second
            .iter()
            .any(|e| matches!(e, CaptureEvent::ApplyControlsWatched(_))));
        assert_eq!(detector.watched_count(), 1);
    }

    #[test]
    fn test_apply_controls_matched_by_value_and_selector() {
        let mut detector = CaptureDetector::new("https://internshala.com/job/detail/9");
        detector.observe(
            r##"<form><input type="submit" value="Submit"></form>
               <a id="apply_now_button" href="#">Continue</a>
               <button>Cancel</button>"##,
        );
        assert!(detector.is_watched("input:submit"));
        assert!(detector.is_watched("apply_now_button"));
        assert_eq!(detector.watched_count(), 2);
    }

    #[test]
    fn test_apply_control_key_survives_dom_changes() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        detector.observe("<button>Apply</button>");
        let events = detector.observe("<button>Help</button><button>Apply</button>");
        assert!(!events
            .iter()
            .any(|e| matches!(e, CaptureEvent::ApplyControlsWatched(_))));
        assert_eq!(detector.watched_count(), 1);
        assert!(detector.is_watched("button:apply"));

        detector.observe(&linkedin_page("Backend Engineer", "Acme"));
        assert!(detector.click("button:help").is_none());
        assert!(detector.click("button:apply").is_some());
    }

    #[test]
    fn test_click_marks_applied() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        detector.observe(&linkedin_page("Backend Engineer", "Acme"));

        let at = Utc::now();
        let job = detector.click_at("jobs-apply", at).unwrap();
        assert_eq!(job.status, Some(JobStatus::Applied));
        assert_eq!(job.applied_at, Some(at));
    }

    #[test]
    fn test_click_ignored_without_candidate_or_watch() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        detector.observe(r#"<button id="jobs-apply">Apply</button>"#);
        assert!(detector.click("jobs-apply").is_none());

        detector.observe(&linkedin_page("Backend Engineer", "Acme"));
        assert!(detector.click("not-watched").is_none());
    }

    #[test]
    fn test_manual_save() {
        let mut detector = CaptureDetector::new(LINKEDIN_URL);
        assert!(detector.manual_save().is_none());

        detector.observe(&linkedin_page("Backend Engineer", "Acme"));
        let job = detector.manual_save().unwrap();
        assert_eq!(job.status, Some(JobStatus::ManualSave));
        assert_eq!(job.source, Some(JobSource::Manual));
    }

    #[test]
    fn test_unsupported_site_is_inert() {
        let mut detector = CaptureDetector::new("https://example.com/careers/1");
        assert_eq!(detector.platform(), Platform::Other);
        assert!(detector
            .observe(r#"<h1>Engineer</h1><button>Apply</button>"#)
            .is_empty());
    }
}
