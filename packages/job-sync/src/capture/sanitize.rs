//! Captured-URL cleanup.

use tracing::debug;
use url::Url;

fn is_sensitive_param(name: &str) -> bool {
    name.starts_with("utm_") || name == "auth" || name == "token"
}

/// Strip tracking (`utm_*`) and credential (`auth`, `token`) query
/// parameters from a captured URL.
///
/// Fails open: input that does not parse as a URL is returned unchanged,
/// and so is a URL with nothing to strip.
pub fn sanitize_url(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            debug!(error = %e, "URL not parseable, keeping as captured");
            return raw.to_string();
        }
    };

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(name, _)| !is_sensitive_param(name))
        .collect();
    if kept.len() == pairs.len() {
        return raw.to_string();
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url.to_string()
}
