//! Breadth-first site crawler.
//!
//! Traverses same-site pages in strict FIFO discovery order under a shared
//! page budget, extracts per-page metadata and links, and classifies off-site
//! hyperlinks into deduplicated [`DiscoveredDomain`]s. Page-level failures
//! are recorded and never abort the crawl; only caller cancellation does.

mod extract;

pub use extract::{extract_page, PageExtraction};

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};
use url::Url;

use crate::config::{CrawlOptions, DEFAULT_USER_AGENT, MAX_RESPONSE_BODY_SIZE};
use crate::context::{AnalysisContext, Interrupted};
use crate::error::AnalysisError;
use crate::models::{CrawlPageError, CrawlResult, DiscoveredDomain, PageData};
use crate::urlnorm::{host_of, normalize_for_visit, validate_and_normalize_url};

/// TCP connect timeout for crawl fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One fetched page before extraction.
struct FetchedPage {
    status: u16,
    content_type: Option<String>,
    body: Option<String>,
}

/// Builds the HTTP client used for crawl fetches.
pub fn default_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
}

/// BFS crawler over same-site pages.
pub struct Crawler {
    client: reqwest::Client,
}

impl Crawler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Crawls from `start_url` under the given options.
    ///
    /// Visits at most `max_pages` distinct normalized URLs and never revisits
    /// one. A single page's fetch or parse failure is recorded in the
    /// result's `errors` and traversal continues; a tripped cancellation
    /// signal aborts immediately with [`AnalysisError::Cancelled`].
    pub async fn crawl(
        &self,
        start_url: &str,
        options: &CrawlOptions,
        ctx: &AnalysisContext,
    ) -> Result<CrawlResult, AnalysisError> {
        let start = validate_and_normalize_url(start_url)?;
        let start_host = host_of(&start)?;
        let budget = options.effective_budget();
        let follow_external = options.follow_external_links || options.discovery_mode;
        let started_at = Instant::now();

        let mut queue: VecDeque<Url> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pages: Vec<PageData> = Vec::new();
        let mut discovered: Vec<DiscoveredDomain> = Vec::new();
        let mut discovered_hosts: HashSet<String> = HashSet::new();
        let mut errors: Vec<CrawlPageError> = Vec::new();
        let mut attempted = 0usize;

        queue.push_back(start.clone());

        while let Some(url) = queue.pop_front() {
            if attempted >= budget {
                break;
            }
            let visit_key = normalize_for_visit(&url);
            if !visited.insert(visit_key) {
                continue;
            }
            ctx.ensure_active()?;
            attempted += 1;

            let fetched = match ctx
                .bounded(
                    options.page_timeout,
                    self.fetch(&url, options.user_agent.as_deref()),
                )
                .await
            {
                Err(Interrupted::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(Interrupted::TimedOut) => {
                    debug!("Page fetch timed out: {url}");
                    errors.push(CrawlPageError {
                        url: url.to_string(),
                        message: format!("Fetch timed out after {:?}", options.page_timeout),
                    });
                    continue;
                }
                Ok(Err(e)) => {
                    debug!("Page fetch failed: {url}: {e}");
                    errors.push(CrawlPageError {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
                Ok(Ok(fetched)) => fetched,
            };

            if fetched.status >= 400 {
                errors.push(CrawlPageError {
                    url: url.to_string(),
                    message: format!("HTTP status {}", fetched.status),
                });
            }

            let mut page = PageData {
                url: url.to_string(),
                title: None,
                description: None,
                headings: Vec::new(),
                internal_links: Vec::new(),
                external_links: Vec::new(),
                status: fetched.status,
                content_type: fetched.content_type.clone(),
            };

            // Non-HTML responses count against the budget but are not parsed.
            if let Some(body) = fetched.body.filter(|_| fetched.status < 400) {
                let extraction = extract_page(&body, &url, options.include_metadata);
                page.title = extraction.title;
                page.description = extraction.description;
                page.headings = extraction.headings;

                for link in extraction.links {
                    let Ok(link_host) = host_of(&link) else {
                        continue;
                    };
                    if link_host == start_host {
                        page.internal_links.push(link.to_string());
                        queue.push_back(link);
                    } else {
                        page.external_links.push(link.to_string());
                        if discovered_hosts.insert(link_host.clone()) {
                            // First source URL wins for each unique hostname.
                            discovered.push(DiscoveredDomain {
                                domain: link_host,
                                source_url: url.to_string(),
                                discovered_at: Utc::now(),
                                internal: false,
                            });
                        }
                        if follow_external {
                            queue.push_back(link);
                        }
                    }
                }
            }

            pages.push(page);
        }

        let result = CrawlResult {
            start_url: start.to_string(),
            pages_analyzed: pages.len(),
            pages,
            discovered_domains: discovered,
            errors,
            elapsed: started_at.elapsed(),
        };
        debug!(
            "Crawl of {} finished: {} pages, {} discovered domains, {} errors in {:?}",
            result.start_url,
            result.pages_analyzed,
            result.discovered_domains.len(),
            result.errors.len(),
            result.elapsed
        );
        Ok(result)
    }

    /// Fetches one page, capping the body size and skipping body download for
    /// non-HTML content types.
    async fn fetch(
        &self,
        url: &Url,
        user_agent: Option<&str>,
    ) -> Result<FetchedPage, reqwest::Error> {
        let mut request = self.client.get(url.clone());
        if let Some(ua) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false);

        if !is_html {
            return Ok(FetchedPage {
                status,
                content_type,
                body: None,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_RESPONSE_BODY_SIZE {
            warn!(
                "Truncating oversized body ({} bytes) from {url}",
                bytes.len()
            );
        }
        let capped = &bytes[..bytes.len().min(MAX_RESPONSE_BODY_SIZE)];
        Ok(FetchedPage {
            status,
            content_type,
            body: Some(String::from_utf8_lossy(capped).to_string()),
        })
    }
}
