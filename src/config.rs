//! Configuration types and operational constants.
//!
//! Option structs mirror the request shapes consumed by the transport layer;
//! constants centralize timeouts and limits so they can be reasoned about in
//! one place.

use std::time::Duration;

/// Freshness window for cached `site-analysis` results. A result younger
/// than this is returned without re-running any probe.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Operation-level deadline for one full `analyze` call. Distinct from each
/// probe's own timeout; tripping it yields best-effort partial aggregation.
pub const ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-probe execution timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-page fetch timeout inside a crawl. A page that exceeds it is recorded
/// as a page error; the crawl continues.
pub const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for a browser session from the shared pool. Bounded
/// so a full pool cannot deadlock a bulk run.
pub const SESSION_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);

/// Simultaneous full analyses in a bulk run.
pub const BULK_CONCURRENCY: usize = 3;

/// Deadline for an entire bulk run. Items still queued when it trips are
/// reported as failed with a timeout reason.
pub const BULK_TIMEOUT: Duration = Duration::from_secs(600);

/// Default page budget for domain discovery crawls.
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Hard ceiling on the crawl page budget regardless of caller input.
pub const MAX_PAGE_BUDGET: usize = 50;

/// Maximum URL length to prevent abuse via extremely long URLs. Matches
/// common browser and server limits.
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum response body size in bytes (2MB). Larger bodies are truncated
/// before parsing to prevent memory exhaustion.
pub const MAX_RESPONSE_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Default User-Agent for crawl fetches.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Options for a single-site analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Bypass the freshness cache and re-run all probes.
    pub force: bool,
    /// Dispatch the accessibility probe.
    pub include_accessibility: bool,
    /// Dispatch the performance (Lighthouse-style) probe.
    pub include_lighthouse: bool,
    /// Dispatch the DNS probe.
    pub include_dns: bool,
    /// Crawl page budget for domain discovery. Zero disables the crawler.
    pub max_pages: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            force: false,
            include_accessibility: false,
            include_lighthouse: false,
            include_dns: false,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Options for a standalone crawl.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum distinct pages to visit.
    pub max_pages: usize,
    /// Enqueue external links for traversal (still within the page budget).
    pub follow_external_links: bool,
    /// Discovery mode also traverses external links to widen the set of
    /// observed hostnames.
    pub discovery_mode: bool,
    /// Extract titles, descriptions, and headings per page.
    pub include_metadata: bool,
    /// Per-page fetch timeout.
    pub page_timeout: Duration,
    /// Overrides the client's User-Agent for this crawl.
    pub user_agent: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            follow_external_links: false,
            discovery_mode: false,
            include_metadata: true,
            page_timeout: PAGE_FETCH_TIMEOUT,
            user_agent: None,
        }
    }
}

impl CrawlOptions {
    /// Page budget clamped to the hard ceiling.
    pub fn effective_budget(&self) -> usize {
        self.max_pages.min(MAX_PAGE_BUDGET)
    }
}

/// Options for a bulk analysis run.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Per-URL analysis options.
    pub analyze: AnalyzeOptions,
    /// Simultaneous analyses allowed.
    pub concurrency: usize,
    /// Deadline for the whole batch.
    pub timeout: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            analyze: AnalyzeOptions::default(),
            concurrency: BULK_CONCURRENCY,
            timeout: BULK_TIMEOUT,
        }
    }
}
