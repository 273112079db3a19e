//! Data model for domains, audit results, crawl output, and probe reports.
//!
//! Probe reports are typed values with an explicit empty shape per category,
//! so the fallback policy's degraded output is a real value rather than an ad
//! hoc object literal.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Audit category, one per probe plus the combined `site-analysis` row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AuditCategory {
    #[strum(serialize = "technology-detection")]
    #[serde(rename = "technology-detection")]
    TechnologyDetection,
    #[strum(serialize = "domain-discovery")]
    #[serde(rename = "domain-discovery")]
    DomainDiscovery,
    #[strum(serialize = "accessibility")]
    #[serde(rename = "accessibility")]
    Accessibility,
    #[strum(serialize = "performance")]
    #[serde(rename = "performance")]
    Performance,
    #[strum(serialize = "dns")]
    #[serde(rename = "dns")]
    Dns,
    #[strum(serialize = "site-analysis")]
    #[serde(rename = "site-analysis")]
    SiteAnalysis,
}

/// Outcome of one audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum AuditStatus {
    /// The probe ran and produced a real result.
    #[strum(serialize = "completed")]
    #[serde(rename = "completed")]
    Completed,
    /// The probe (and its fallback retry) failed; the payload is the
    /// category's empty shape.
    #[strum(serialize = "degraded")]
    #[serde(rename = "degraded")]
    Degraded,
    /// The probe failed in a way that produced no payload at all.
    #[strum(serialize = "failed")]
    #[serde(rename = "failed")]
    Failed,
}

/// Canonical per-organization entity for a hostname.
///
/// Created on first analysis of a hostname (idempotent upsert), never deleted
/// by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    pub org_id: String,
    pub domain: String,
    pub display_name: String,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

/// Immutable, append-only record of one probe execution for a domain.
///
/// Multiple rows accumulate per domain/category; "current" state is the most
/// recent row per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub id: i64,
    pub domain_id: i64,
    pub category: AuditCategory,
    pub status: AuditStatus,
    pub score: Option<f64>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditResult {
    /// Age of this row relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// One detected technology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Detection confidence in percent, when the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

/// Technology detection probe report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnologyReport {
    pub technologies: Vec<Technology>,
}

impl TechnologyReport {
    /// Documented empty shape used when detection degrades.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Accessibility probe report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityReport {
    /// Overall score in `[0, 100]`, absent when the audit degraded.
    pub score: Option<f64>,
    pub violation_count: u32,
    pub violations: Vec<AccessibilityViolation>,
}

/// One accessibility rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityViolation {
    pub rule: String,
    pub impact: String,
    pub description: String,
}

impl AccessibilityReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Performance (Lighthouse-style) probe report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Category scores in `[0, 100]`, keyed by category name.
    pub scores: BTreeMap<String, f64>,
    /// Timing metrics in milliseconds, keyed by metric name.
    pub metrics_ms: BTreeMap<String, f64>,
}

impl PerformanceReport {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The headline performance score, when present.
    pub fn performance_score(&self) -> Option<f64> {
        self.scores.get("performance").copied()
    }
}

/// DNS probe report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsReport {
    /// The hostname the records were resolved for. Records which variant
    /// (www-toggled or not) actually answered after a fallback retry.
    pub resolved_host: String,
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<String>,
    pub ns: Vec<String>,
    pub txt: Vec<String>,
}

impl DnsReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.a.len() + self.aaaa.len() + self.mx.len() + self.ns.len() + self.txt.len()
    }
}

/// Domain discovery report distilled from a crawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub pages_crawled: usize,
    pub discovered_domains: Vec<DiscoveredDomain>,
}

impl DiscoveryReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Tagged union over the per-category probe reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProbeOutput {
    Technologies(TechnologyReport),
    Discovery(DiscoveryReport),
    Accessibility(AccessibilityReport),
    Performance(PerformanceReport),
    Dns(DnsReport),
}

impl ProbeOutput {
    /// The audit category this output belongs to.
    pub fn category(&self) -> AuditCategory {
        match self {
            ProbeOutput::Technologies(_) => AuditCategory::TechnologyDetection,
            ProbeOutput::Discovery(_) => AuditCategory::DomainDiscovery,
            ProbeOutput::Accessibility(_) => AuditCategory::Accessibility,
            ProbeOutput::Performance(_) => AuditCategory::Performance,
            ProbeOutput::Dns(_) => AuditCategory::Dns,
        }
    }

    /// The documented empty shape for a category. Used by the fallback policy
    /// when both the primary and alternate hostname attempts fail.
    pub fn empty(category: AuditCategory) -> Self {
        match category {
            AuditCategory::TechnologyDetection => {
                ProbeOutput::Technologies(TechnologyReport::empty())
            }
            AuditCategory::DomainDiscovery => ProbeOutput::Discovery(DiscoveryReport::empty()),
            AuditCategory::Accessibility => ProbeOutput::Accessibility(AccessibilityReport::empty()),
            AuditCategory::Performance => ProbeOutput::Performance(PerformanceReport::empty()),
            AuditCategory::Dns => ProbeOutput::Dns(DnsReport::empty()),
            // The combined row is assembled by the orchestrator, never by a
            // probe; an empty technology report is the closest neutral value.
            AuditCategory::SiteAnalysis => ProbeOutput::Technologies(TechnologyReport::empty()),
        }
    }

    /// The numeric score persisted alongside the payload, when the category
    /// has one.
    pub fn score(&self) -> Option<f64> {
        match self {
            ProbeOutput::Accessibility(report) => report.score,
            ProbeOutput::Performance(report) => report.performance_score(),
            _ => None,
        }
    }
}

/// A unique off-site hostname observed during crawling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDomain {
    /// Hostname, the deduplication key within one crawl.
    pub domain: String,
    /// First page URL that revealed this hostname.
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
    /// Whether the hostname matches the crawl's start host.
    pub internal: bool,
}

/// One crawled page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub status: u16,
    pub content_type: Option<String>,
}

/// A non-fatal failure on a single page during a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlPageError {
    pub url: String,
    pub message: String,
}

/// Ephemeral output of one crawl. Not persisted directly; the orchestrator
/// turns parts of it into audit results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub start_url: String,
    pub pages_analyzed: usize,
    pub pages: Vec<PageData>,
    pub discovered_domains: Vec<DiscoveredDomain>,
    pub errors: Vec<CrawlPageError>,
    pub elapsed: Duration,
}

impl CrawlResult {
    /// Distills the crawl into the persisted discovery report.
    pub fn to_discovery_report(&self) -> DiscoveryReport {
        DiscoveryReport {
            pages_crawled: self.pages_analyzed,
            discovered_domains: self.discovered_domains.clone(),
        }
    }
}

/// The per-call aggregate returned to the caller.
///
/// Invariant: structurally complete — every requested field is present,
/// possibly in its documented empty shape, even under partial probe failure.
/// Fields for probes that were not requested stay `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedResult {
    pub domain: String,
    pub display_name: String,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub technologies: Vec<Technology>,
    pub discovered_domains: Vec<DiscoveredDomain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilityReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighthouse: Option<PerformanceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsReport>,
    /// False when the final `site-analysis` write failed; the result itself
    /// is still complete.
    #[serde(default = "default_persisted")]
    pub persisted: bool,
}

fn default_persisted() -> bool {
    true
}

/// Per-item outcome within a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CombinedResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItem {
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }
}

/// Structured summary of a bulk run. Always returned, even under partial
/// failure; `results` preserves input order, one entry per input URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResult {
    pub success: bool,
    pub message: String,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
}
