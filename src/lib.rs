//! site_audit: site analysis orchestration engine
//!
//! Analyzes a website (or a batch of websites) by running independent,
//! network-bound probes — link discovery/crawling, technology fingerprinting,
//! DNS lookup, accessibility and performance auditing — and assembling their
//! outputs into one durable result per domain.
//!
//! The crate owns the breadth-first crawler and the probe orchestrator:
//! per-target scheduling, partial-failure tolerance, a one-shot www-toggle
//! fallback on DNS-class failures, freshness-based caching, and bounded
//! concurrency for batches. Transport (HTTP/CLI), the concrete browser-bound
//! probe engines, and the browser session pool's internals are collaborators
//! wired in through traits.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use site_audit::{
//!     init_db_pool, run_schema, AnalysisContext, AnalyzeOptions, Analyzer, DnsLookupProbe,
//!     SqliteRepository,
//! };
//!
//! # async fn example(technology_probe: Arc<dyn site_audit::Probe>) -> anyhow::Result<()> {
//! let pool = init_db_pool(Path::new("./site_audit.db")).await?;
//! run_schema(&pool).await?;
//!
//! let analyzer = Analyzer::builder(Arc::new(SqliteRepository::new(pool)))
//!     .technology_probe(technology_probe)
//!     .dns_probe(Arc::new(DnsLookupProbe::new()))
//!     .build()?;
//!
//! let ctx = AnalysisContext::for_org("org-1");
//! let options = AnalyzeOptions {
//!     include_dns: true,
//!     ..Default::default()
//! };
//! let result = analyzer.analyze("example.com", &options, &ctx).await?;
//! println!(
//!     "{}: {} technologies, {} discovered domains",
//!     result.domain,
//!     result.technologies.len(),
//!     result.discovered_domains.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your
//! application or call into it from an async context.

mod bulk;
pub mod config;
mod context;
mod crawler;
mod error;
pub mod logging;
mod models;
mod orchestrator;
mod probe;
pub mod probes;
mod repository;
pub mod storage;
mod urlnorm;

// Re-export public API
pub use config::{AnalyzeOptions, BulkOptions, CrawlOptions};
pub use context::{AnalysisContext, Interrupted};
pub use crawler::{extract_page, Crawler, PageExtraction};
pub use error::{AnalysisError, ProbeError, RepositoryError};
pub use models::{
    AccessibilityReport, AccessibilityViolation, AuditCategory, AuditResult, AuditStatus,
    BulkItem, BulkResult, CombinedResult, CrawlPageError, CrawlResult, DiscoveredDomain,
    DiscoveryReport, DnsReport, DomainRecord, PageData, PerformanceReport, ProbeOutput,
    Technology, TechnologyReport,
};
pub use orchestrator::{Analyzer, AnalyzerBuilder};
pub use probe::{
    default_dns_failure_predicate, BrowserSessionPool, DnsFailurePredicate, PoolError, Probe,
    SessionHandle, StaticSessionPool,
};
pub use probes::DnsLookupProbe;
pub use repository::{NewAuditResult, Repository};
pub use storage::{init_db_pool, run_schema, SqliteRepository};
pub use urlnorm::{toggle_www, validate_and_normalize_url};
