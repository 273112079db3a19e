//! Page extraction: titles, meta description, headings, and hyperlinks.
//!
//! Parsing goes through a real DOM parser rather than regexes, so malformed
//! or deeply nested markup degrades to "fewer elements found" instead of
//! mis-extraction.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::urlnorm::{is_fetchable_scheme, is_inert_href};

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("title").expect("Failed to parse title selector - this is a bug")
});

static META_DESCRIPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[name='description']")
        .expect("Failed to parse meta description selector - this is a bug")
});

static HEADING_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3").expect("Failed to parse heading selector - this is a bug")
});

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("Failed to parse anchor selector - this is a bug")
});

/// Everything extracted from one HTML page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<String>,
    /// Absolute, fetchable hyperlinks resolved against the page URL,
    /// deduplicated in document order of first appearance.
    pub links: Vec<Url>,
}

/// Parses an HTML body and extracts metadata plus hyperlinks.
///
/// Relative hrefs are resolved against `base`; non-fetchable schemes
/// (`mailto:`, `tel:`, `javascript:`) and fragment-only self references are
/// skipped. Synchronous on purpose: the parsed DOM is not `Send` and must not
/// be held across an await point.
pub fn extract_page(body: &str, base: &Url, include_metadata: bool) -> PageExtraction {
    let document = Html::parse_document(body);
    let mut extraction = PageExtraction::default();

    if include_metadata {
        extraction.title = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|el| el.inner_html().trim().to_string())
            .filter(|t| !t.is_empty());

        extraction.description = document
            .select(&META_DESCRIPTION_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|d| !d.is_empty());

        extraction.headings = document
            .select(&HEADING_SELECTOR)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
    }

    let mut seen = BTreeSet::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if is_inert_href(href) {
            continue;
        }
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if !is_fetchable_scheme(resolved.scheme()) {
            continue;
        }
        let mut link = resolved;
        link.set_fragment(None);
        if seen.insert(link.to_string()) {
            extraction.links.push(link);
        }
    }

    extraction
}
