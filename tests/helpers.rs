// Shared test helpers: in-memory repository and instrumented stub probes.
//
// Used by the other test files via `mod helpers;` to reduce duplication.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use site_audit::{
    AuditCategory, AuditResult, AuditStatus, DomainRecord, NewAuditResult, Probe, ProbeError,
    ProbeOutput, Repository, RepositoryError, Technology, TechnologyReport,
};

#[derive(Default)]
struct MemoryInner {
    domains: Vec<DomainRecord>,
    audits: Vec<AuditResult>,
    next_domain_id: i64,
    next_audit_id: i64,
}

/// In-memory Repository with call instrumentation and a failure switch for
/// persistence-error tests.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryInner>,
    fail_audit_inserts: AtomicBool,
}

#[allow(dead_code)] // Used by other test files
impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent audit insert fail.
    pub fn set_fail_audit_inserts(&self, fail: bool) {
        self.fail_audit_inserts.store(fail, Ordering::SeqCst);
    }

    /// Seeds a domain row directly, bypassing the trait.
    pub fn seed_domain(&self, org_id: &str, domain: &str) -> DomainRecord {
        let mut inner = self.inner.lock().unwrap();
        inner.next_domain_id += 1;
        let record = DomainRecord {
            id: inner.next_domain_id,
            org_id: org_id.to_string(),
            domain: domain.to_string(),
            display_name: domain.to_string(),
            last_analyzed_at: None,
        };
        inner.domains.push(record.clone());
        record
    }

    /// Seeds an audit row with an explicit creation time, for freshness
    /// tests.
    pub fn seed_audit(
        &self,
        domain_id: i64,
        category: AuditCategory,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_audit_id += 1;
        let id = inner.next_audit_id;
        inner.audits.push(AuditResult {
            id,
            domain_id,
            category,
            status: AuditStatus::Completed,
            score: None,
            payload,
            metadata: serde_json::json!({}),
            created_at,
        });
    }

    /// All audit rows recorded for a category.
    pub fn audits_in(&self, category: AuditCategory) -> Vec<AuditResult> {
        self.inner
            .lock()
            .unwrap()
            .audits
            .iter()
            .filter(|a| a.category == category)
            .cloned()
            .collect()
    }

    pub fn audit_count(&self) -> usize {
        self.inner.lock().unwrap().audits.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_domain(
        &self,
        org_id: &str,
        domain: &str,
    ) -> Result<Option<DomainRecord>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .domains
            .iter()
            .find(|d| d.org_id == org_id && d.domain == domain)
            .cloned())
    }

    async fn upsert_domain(
        &self,
        org_id: &str,
        domain: &str,
        display_name: &str,
    ) -> Result<DomainRecord, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .domains
            .iter()
            .find(|d| d.org_id == org_id && d.domain == domain)
        {
            return Ok(existing.clone());
        }
        inner.next_domain_id += 1;
        let record = DomainRecord {
            id: inner.next_domain_id,
            org_id: org_id.to_string(),
            domain: domain.to_string(),
            display_name: display_name.to_string(),
            last_analyzed_at: None,
        };
        inner.domains.push(record.clone());
        Ok(record)
    }

    async fn touch_last_analyzed(
        &self,
        domain_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(domain) = inner.domains.iter_mut().find(|d| d.id == domain_id) {
            domain.last_analyzed_at = Some(at);
        }
        Ok(())
    }

    async fn insert_audit(&self, entry: NewAuditResult) -> Result<AuditResult, RepositoryError> {
        if self.fail_audit_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("disk full (simulated)".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.next_audit_id += 1;
        let audit = AuditResult {
            id: inner.next_audit_id,
            domain_id: entry.domain_id,
            category: entry.category,
            status: entry.status,
            score: entry.score,
            payload: entry.payload,
            metadata: entry.metadata,
            created_at: Utc::now(),
        };
        inner.audits.push(audit.clone());
        Ok(audit)
    }

    async fn latest_audit(
        &self,
        domain_id: i64,
        category: AuditCategory,
    ) -> Result<Option<AuditResult>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .audits
            .iter()
            .filter(|a| a.domain_id == domain_id && a.category == category)
            .max_by_key(|a| (a.created_at, a.id))
            .cloned())
    }
}

type StubBehavior = Box<dyn Fn(&Url) -> Result<ProbeOutput, ProbeError> + Send + Sync>;

/// Instrumented probe stub: counts calls, tracks peak concurrency, and can
/// delay before answering.
pub struct StubProbe {
    category: AuditCategory,
    behavior: StubBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)] // Used by other test files
impl StubProbe {
    pub fn with_behavior(
        category: AuditCategory,
        behavior: impl Fn(&Url) -> Result<ProbeOutput, ProbeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            behavior: Box::new(behavior),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// A probe that always succeeds with the given output.
    pub fn succeeding(category: AuditCategory, output: ProbeOutput) -> Self {
        Self::with_behavior(category, move |_| Ok(output.clone()))
    }

    /// A probe that always fails with the given message.
    pub fn failing(category: AuditCategory, message: &str) -> Self {
        let message = message.to_string();
        Self::with_behavior(category, move |_| {
            Err(ProbeError::new(category, message.clone()))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for StubProbe {
    fn category(&self) -> AuditCategory {
        self.category
    }

    async fn run(&self, url: &Url) -> Result<ProbeOutput, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = (self.behavior)(url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A one-technology report for succeeding stubs.
#[allow(dead_code)] // Used by other test files
pub fn sample_tech_output() -> ProbeOutput {
    ProbeOutput::Technologies(TechnologyReport {
        technologies: vec![Technology {
            name: "nginx".into(),
            version: Some("1.27".into()),
            category: Some("Web servers".into()),
            confidence: Some(100),
        }],
    })
}
