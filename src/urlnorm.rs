//! URL validation, normalization, and hostname helpers.

use url::Url;

use crate::config::MAX_URL_LENGTH;
use crate::error::AnalysisError;

/// Validates and normalizes a URL.
///
/// Adds an `https://` prefix if missing, then validates syntax and scheme.
/// Rejects URLs longer than [`MAX_URL_LENGTH`].
///
/// # Returns
///
/// The parsed URL, or `AnalysisError::Validation` describing the rejection.
pub fn validate_and_normalize_url(raw: &str) -> Result<Url, AnalysisError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::Validation("URL is empty".into()));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(AnalysisError::Validation(format!(
            "URL exceeds maximum length ({} > {})",
            trimmed.len(),
            MAX_URL_LENGTH
        )));
    }

    // Only prepend a scheme when none is present; an input like
    // "ftp://example.com" must reach the scheme check intact instead of
    // being mangled into an https URL with host "ftp".
    let normalized = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&normalized)
        .map_err(|e| AnalysisError::Validation(format!("Invalid URL '{trimmed}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AnalysisError::Validation(format!(
                "Unsupported scheme '{other}' for URL '{trimmed}'"
            )))
        }
    }

    if parsed.host_str().is_none() {
        return Err(AnalysisError::Validation(format!(
            "URL '{trimmed}' has no host"
        )));
    }

    Ok(parsed)
}

/// Extracts the lowercase hostname from a parsed URL.
pub fn host_of(url: &Url) -> Result<String, AnalysisError> {
    url.host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| AnalysisError::Validation(format!("URL '{url}' has no host")))
}

/// Toggles a leading `www.` on a hostname.
///
/// This is the alternate hostname variant tried by the one-shot DNS fallback
/// retry: `example.com` becomes `www.example.com` and vice versa.
pub fn toggle_www(host: &str) -> String {
    match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => format!("www.{host}"),
    }
}

/// Rewrites the host of a URL, preserving everything else.
pub fn with_host(url: &Url, host: &str) -> Result<Url, AnalysisError> {
    let mut swapped = url.clone();
    swapped.set_host(Some(host)).map_err(|e| {
        AnalysisError::Validation(format!("Cannot set host '{host}' on '{url}': {e}"))
    })?;
    Ok(swapped)
}

/// Display name derived from a hostname: the bare domain without a leading
/// `www.`.
pub fn display_name(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Normalizes a URL for the crawl queue and visited set.
///
/// Strips the fragment, and normalizes a bare-origin URL so `https://a.com`
/// and `https://a.com/` dedupe to the same key.
pub fn normalize_for_visit(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if normalized.path() == "/" && normalized.query().is_none() && !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// True for schemes the crawler can fetch. Filters out `mailto:`, `tel:`,
/// `javascript:` and the like before they reach the queue.
pub fn is_fetchable_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// True for href values that cannot lead anywhere new: empty links and
/// fragment-only self references.
pub fn is_inert_href(href: &str) -> bool {
    let trimmed = href.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
