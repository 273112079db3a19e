//! Probe orchestrator.
//!
//! Per-URL coordinator: freshness cache check, domain-record resolution,
//! parallel dispatch of probes (including the crawler for domain discovery),
//! one-shot www-toggle fallback on DNS-class failures, settle-all fan-in with
//! partial-failure tolerance, and persistence of each probe's result plus the
//! combined `site-analysis` row.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use log::{debug, info, warn};
use url::Url;

use crate::config::{
    AnalyzeOptions, CrawlOptions, ANALYZE_TIMEOUT, FRESHNESS_WINDOW_HOURS, PROBE_TIMEOUT,
    SESSION_ACQUIRE_TIMEOUT,
};
use crate::context::{AnalysisContext, Interrupted};
use crate::crawler::{default_client, Crawler};
use crate::error::{AnalysisError, ProbeError};
use crate::models::{
    AccessibilityReport, AuditCategory, AuditStatus, CombinedResult, DnsReport, PerformanceReport,
    ProbeOutput,
};
use crate::probe::{
    default_dns_failure_predicate, BrowserSessionPool, DnsFailurePredicate, Probe,
    StaticSessionPool,
};
use crate::repository::{NewAuditResult, Repository};
use crate::urlnorm::{display_name, host_of, toggle_www, validate_and_normalize_url, with_host};

/// Default browser session pool capacity when none is supplied.
const DEFAULT_SESSION_POOL_CAPACITY: usize = 4;

/// One settled probe unit.
struct SettledUnit {
    output: ProbeOutput,
    status: AuditStatus,
}

/// Site analysis orchestrator. Construct via [`Analyzer::builder`].
pub struct Analyzer {
    repo: Arc<dyn Repository>,
    crawler: Crawler,
    technology: Arc<dyn Probe>,
    accessibility: Option<Arc<dyn Probe>>,
    performance: Option<Arc<dyn Probe>>,
    dns: Option<Arc<dyn Probe>>,
    session_pool: Arc<dyn BrowserSessionPool>,
    dns_failure: DnsFailurePredicate,
    freshness_window: chrono::Duration,
    analyze_timeout: Duration,
    probe_timeout: Duration,
    session_acquire_timeout: Duration,
}

/// Builder for [`Analyzer`].
pub struct AnalyzerBuilder {
    repo: Arc<dyn Repository>,
    http_client: Option<reqwest::Client>,
    technology: Option<Arc<dyn Probe>>,
    accessibility: Option<Arc<dyn Probe>>,
    performance: Option<Arc<dyn Probe>>,
    dns: Option<Arc<dyn Probe>>,
    session_pool: Option<Arc<dyn BrowserSessionPool>>,
    dns_failure: Option<DnsFailurePredicate>,
    freshness_window: chrono::Duration,
    analyze_timeout: Duration,
    probe_timeout: Duration,
    session_acquire_timeout: Duration,
}

impl AnalyzerBuilder {
    /// The technology probe is always dispatched, so it is required.
    pub fn technology_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.technology = Some(probe);
        self
    }

    pub fn accessibility_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.accessibility = Some(probe);
        self
    }

    pub fn performance_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.performance = Some(probe);
        self
    }

    pub fn dns_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.dns = Some(probe);
        self
    }

    /// HTTP client used by the crawler.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn session_pool(mut self, pool: Arc<dyn BrowserSessionPool>) -> Self {
        self.session_pool = Some(pool);
        self
    }

    /// Replaces the heuristic deciding which probe failures are DNS-class
    /// and therefore eligible for the www-toggle fallback retry.
    pub fn dns_failure_predicate(mut self, predicate: DnsFailurePredicate) -> Self {
        self.dns_failure = Some(predicate);
        self
    }

    pub fn freshness_window(mut self, window: chrono::Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn analyze_timeout(mut self, timeout: Duration) -> Self {
        self.analyze_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn session_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.session_acquire_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Analyzer, AnalysisError> {
        let technology = self.technology.ok_or_else(|| {
            AnalysisError::Validation("Analyzer requires a technology probe".into())
        })?;
        let client = match self.http_client {
            Some(client) => client,
            None => default_client().map_err(|e| {
                AnalysisError::Validation(format!("Cannot build default HTTP client: {e}"))
            })?,
        };
        Ok(Analyzer {
            repo: self.repo,
            crawler: Crawler::new(client),
            technology,
            accessibility: self.accessibility,
            performance: self.performance,
            dns: self.dns,
            session_pool: self
                .session_pool
                .unwrap_or_else(|| Arc::new(StaticSessionPool::new(DEFAULT_SESSION_POOL_CAPACITY))),
            dns_failure: self.dns_failure.unwrap_or_else(default_dns_failure_predicate),
            freshness_window: self.freshness_window,
            analyze_timeout: self.analyze_timeout,
            probe_timeout: self.probe_timeout,
            session_acquire_timeout: self.session_acquire_timeout,
        })
    }
}

impl Analyzer {
    pub fn builder(repo: Arc<dyn Repository>) -> AnalyzerBuilder {
        AnalyzerBuilder {
            repo,
            http_client: None,
            technology: None,
            accessibility: None,
            performance: None,
            dns: None,
            session_pool: None,
            dns_failure: None,
            freshness_window: chrono::Duration::hours(FRESHNESS_WINDOW_HOURS),
            analyze_timeout: ANALYZE_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            session_acquire_timeout: SESSION_ACQUIRE_TIMEOUT,
        }
    }

    /// The crawler used for domain discovery, also usable standalone.
    pub fn crawler(&self) -> &Crawler {
        &self.crawler
    }

    /// Analyzes one URL.
    ///
    /// Returns a structurally complete [`CombinedResult`]: every requested
    /// field is present, possibly in its documented empty shape. Only
    /// invalid input, cancellation, a wholly-failed persistence layer, or a
    /// deadline with zero settled units produce an error.
    pub async fn analyze(
        &self,
        url: &str,
        options: &AnalyzeOptions,
        ctx: &AnalysisContext,
    ) -> Result<CombinedResult, AnalysisError> {
        ctx.ensure_active()?;
        let target = validate_and_normalize_url(url)?;
        let host = host_of(&target)?;
        let display = display_name(&host);

        // Freshness check: a recent combined result is returned unchanged,
        // with no probe invoked. Coarse whole-result caching keeps the
        // combined result internally consistent.
        if !options.force {
            if let Some(cached) = self.fresh_result(ctx.org_id(), &host).await? {
                info!("Returning cached site-analysis for {host}");
                return Ok(cached);
            }
        }

        let domain = self
            .repo
            .upsert_domain(ctx.org_id(), &host, &display)
            .await?;

        let requested = requested_categories(options);
        let mut units: FuturesUnordered<BoxFuture<'_, Result<SettledUnit, AnalysisError>>> =
            FuturesUnordered::new();

        units.push(
            self.run_probe_unit(self.technology.as_ref(), &target, &host, domain.id, ctx)
                .boxed(),
        );
        if options.max_pages > 0 {
            units.push(
                self.run_crawl_unit(&target, domain.id, options.max_pages, ctx)
                    .boxed(),
            );
        }
        if options.include_accessibility {
            units.push(
                self.run_optional_unit(
                    self.accessibility.as_deref(),
                    AuditCategory::Accessibility,
                    &target,
                    &host,
                    domain.id,
                    ctx,
                )
                .boxed(),
            );
        }
        if options.include_lighthouse {
            units.push(
                self.run_optional_unit(
                    self.performance.as_deref(),
                    AuditCategory::Performance,
                    &target,
                    &host,
                    domain.id,
                    ctx,
                )
                .boxed(),
            );
        }
        if options.include_dns {
            units.push(
                self.run_optional_unit(
                    self.dns.as_deref(),
                    AuditCategory::Dns,
                    &target,
                    &host,
                    domain.id,
                    ctx,
                )
                .boxed(),
            );
        }

        // Settle-all fan-in under the operation deadline. A failing unit
        // never cancels its siblings; successes have already persisted their
        // own audit rows by the time they settle.
        let deadline = tokio::time::sleep(self.analyze_timeout);
        tokio::pin!(deadline);
        let mut settled: Vec<SettledUnit> = Vec::new();
        let mut deadline_tripped = false;

        while !units.is_empty() {
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => return Err(AnalysisError::Cancelled),
                _ = &mut deadline => {
                    deadline_tripped = true;
                    break;
                }
                Some(unit) = units.next() => settled.push(unit?),
            }
        }

        if deadline_tripped {
            if settled.is_empty() {
                return Err(AnalysisError::Timeout(self.analyze_timeout));
            }
            warn!(
                "Analyze deadline tripped for {host}; assembling best-effort result from {} settled unit(s)",
                settled.len()
            );
        }

        let all_completed = settled
            .iter()
            .all(|unit| unit.status == AuditStatus::Completed)
            && !deadline_tripped;
        let now = Utc::now();
        let mut combined = empty_combined(&host, &domain.display_name, options);
        combined.last_analyzed_at = Some(now);
        for unit in settled {
            apply_output(&mut combined, unit.output);
        }

        // The combined row is written regardless of how many units degraded;
        // its metadata records what was requested.
        let metadata = serde_json::json!({
            "url": target.as_str(),
            "requested": requested,
            "deadline_tripped": deadline_tripped,
        });
        let payload = serde_json::to_value(&combined).unwrap_or(serde_json::Value::Null);
        let write = self
            .repo
            .insert_audit(NewAuditResult {
                domain_id: domain.id,
                category: AuditCategory::SiteAnalysis,
                status: if all_completed {
                    AuditStatus::Completed
                } else {
                    AuditStatus::Degraded
                },
                score: None,
                payload,
                metadata,
            })
            .await;
        if let Err(e) = write {
            warn!("Failed to persist site-analysis result for {host}: {e}");
            combined.persisted = false;
        }
        if let Err(e) = self.repo.touch_last_analyzed(domain.id, now).await {
            warn!("Failed to update last-analyzed timestamp for {host}: {e}");
        }

        Ok(combined)
    }

    /// Returns the cached combined result when the latest `site-analysis`
    /// row is younger than the freshness window.
    async fn fresh_result(
        &self,
        org_id: &str,
        host: &str,
    ) -> Result<Option<CombinedResult>, AnalysisError> {
        let Some(existing) = self.repo.find_domain(org_id, host).await? else {
            return Ok(None);
        };
        let Some(audit) = self
            .repo
            .latest_audit(existing.id, AuditCategory::SiteAnalysis)
            .await?
        else {
            return Ok(None);
        };
        if audit.age(Utc::now()) >= self.freshness_window {
            return Ok(None);
        }
        match serde_json::from_value::<CombinedResult>(audit.payload) {
            Ok(cached) => Ok(Some(cached)),
            Err(e) => {
                warn!("Cached site-analysis payload for {host} is unreadable ({e}); re-running");
                Ok(None)
            }
        }
    }

    /// Runs a flagged probe that may not be configured. A requested category
    /// with no probe wired in degrades to its empty shape.
    async fn run_optional_unit(
        &self,
        probe: Option<&dyn Probe>,
        category: AuditCategory,
        url: &Url,
        host: &str,
        domain_id: i64,
        ctx: &AnalysisContext,
    ) -> Result<SettledUnit, AnalysisError> {
        match probe {
            Some(probe) => self.run_probe_unit(probe, url, host, domain_id, ctx).await,
            None => {
                warn!("{category} requested but no probe is configured; returning empty shape");
                let unit = SettledUnit {
                    output: ProbeOutput::empty(category),
                    status: AuditStatus::Degraded,
                };
                self.persist_unit(domain_id, &unit, host).await;
                Ok(unit)
            }
        }
    }

    /// Runs one probe with session acquisition, per-probe timeout, the
    /// one-shot DNS fallback, degradation to the empty shape, and immediate
    /// persistence of the outcome.
    async fn run_probe_unit(
        &self,
        probe: &dyn Probe,
        url: &Url,
        host: &str,
        domain_id: i64,
        ctx: &AnalysisContext,
    ) -> Result<SettledUnit, AnalysisError> {
        let category = probe.category();

        // Browser-bound probes draw from the shared session pool; the
        // acquisition itself is bounded so a full pool degrades instead of
        // deadlocking a bulk run.
        let session = if needs_browser_session(category) {
            match ctx
                .bounded(self.session_acquire_timeout, self.session_pool.acquire())
                .await
            {
                Err(Interrupted::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(Interrupted::TimedOut) => {
                    warn!("{category}: session pool exhausted for {host}; degrading");
                    let unit = SettledUnit {
                        output: ProbeOutput::empty(category),
                        status: AuditStatus::Degraded,
                    };
                    self.persist_unit(domain_id, &unit, host).await;
                    return Ok(unit);
                }
                Ok(Err(e)) => {
                    warn!("{category}: session pool error for {host}: {e}; degrading");
                    let unit = SettledUnit {
                        output: ProbeOutput::empty(category),
                        status: AuditStatus::Degraded,
                    };
                    self.persist_unit(domain_id, &unit, host).await;
                    return Ok(unit);
                }
                Ok(Ok(session)) => Some(session),
            }
        } else {
            None
        };

        let outcome = self.attempt_with_fallback(probe, url, host, ctx).await;

        if let Some(session) = session {
            self.session_pool.release(session);
        }

        let unit = match outcome {
            Ok(output) => SettledUnit {
                output,
                status: AuditStatus::Completed,
            },
            Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
            Err(e) => {
                warn!("{category} degraded for {host}: {e}");
                SettledUnit {
                    output: ProbeOutput::empty(category),
                    status: AuditStatus::Degraded,
                }
            }
        };
        self.persist_unit(domain_id, &unit, host).await;
        Ok(unit)
    }

    /// One probe attempt plus at most one retry against the www-toggled host
    /// when the failure matches the DNS predicate.
    async fn attempt_with_fallback(
        &self,
        probe: &dyn Probe,
        url: &Url,
        host: &str,
        ctx: &AnalysisContext,
    ) -> Result<ProbeOutput, AnalysisError> {
        let category = probe.category();
        let first = self.attempt(probe, url, ctx).await;
        let err = match first {
            Ok(output) => return Ok(output),
            Err(AnalysisError::Probe(e)) if (self.dns_failure)(&e) => e,
            Err(e) => return Err(e),
        };

        let alternate = toggle_www(host);
        info!("{category}: DNS-class failure on {host} ({err}); retrying once against {alternate}");
        let alternate_url = with_host(url, &alternate)?;
        self.attempt(probe, &alternate_url, ctx).await
    }

    /// One probe execution under the per-probe timeout composed with the
    /// caller's cancellation.
    async fn attempt(
        &self,
        probe: &dyn Probe,
        url: &Url,
        ctx: &AnalysisContext,
    ) -> Result<ProbeOutput, AnalysisError> {
        match ctx.bounded(self.probe_timeout, probe.run(url)).await {
            Err(Interrupted::Cancelled) => Err(AnalysisError::Cancelled),
            Err(Interrupted::TimedOut) => Err(AnalysisError::Probe(ProbeError::new(
                probe.category(),
                format!("probe timed out after {:?}", self.probe_timeout),
            ))),
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(AnalysisError::Probe(e)),
        }
    }

    /// Runs the crawler as the domain-discovery unit.
    async fn run_crawl_unit(
        &self,
        url: &Url,
        domain_id: i64,
        max_pages: usize,
        ctx: &AnalysisContext,
    ) -> Result<SettledUnit, AnalysisError> {
        let options = CrawlOptions {
            max_pages,
            ..CrawlOptions::default()
        };
        let host = host_of(url).unwrap_or_default();
        let unit = match self.crawler.crawl(url.as_str(), &options, ctx).await {
            Ok(crawl) => SettledUnit {
                output: ProbeOutput::Discovery(crawl.to_discovery_report()),
                status: AuditStatus::Completed,
            },
            Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
            Err(e) => {
                warn!("Domain discovery degraded for {host}: {e}");
                SettledUnit {
                    output: ProbeOutput::empty(AuditCategory::DomainDiscovery),
                    status: AuditStatus::Degraded,
                }
            }
        };
        self.persist_unit(domain_id, &unit, &host).await;
        Ok(unit)
    }

    /// Persists one unit's audit row. Write failures are logged, never
    /// propagated; the in-memory result is kept either way.
    async fn persist_unit(&self, domain_id: i64, unit: &SettledUnit, host: &str) {
        let payload = serde_json::to_value(&unit.output).unwrap_or(serde_json::Value::Null);
        let entry = NewAuditResult {
            domain_id,
            category: unit.output.category(),
            status: unit.status,
            score: unit.output.score(),
            payload,
            metadata: serde_json::json!({}),
        };
        if let Err(e) = self.repo.insert_audit(entry).await {
            warn!(
                "Failed to persist {} audit for {host}: {e}",
                unit.output.category()
            );
        } else {
            debug!("Persisted {} audit for {host}", unit.output.category());
        }
    }
}

/// Which categories an options set dispatches.
fn requested_categories(options: &AnalyzeOptions) -> Vec<AuditCategory> {
    let mut requested = vec![AuditCategory::TechnologyDetection];
    if options.max_pages > 0 {
        requested.push(AuditCategory::DomainDiscovery);
    }
    if options.include_accessibility {
        requested.push(AuditCategory::Accessibility);
    }
    if options.include_lighthouse {
        requested.push(AuditCategory::Performance);
    }
    if options.include_dns {
        requested.push(AuditCategory::Dns);
    }
    requested
}

/// Probes that execute inside a shared headless-browser session.
fn needs_browser_session(category: AuditCategory) -> bool {
    matches!(
        category,
        AuditCategory::TechnologyDetection
            | AuditCategory::Accessibility
            | AuditCategory::Performance
    )
}

/// A structurally complete result with every requested field in its empty
/// shape. Settled units overwrite their own field.
fn empty_combined(host: &str, display_name: &str, options: &AnalyzeOptions) -> CombinedResult {
    CombinedResult {
        domain: host.to_string(),
        display_name: display_name.to_string(),
        last_analyzed_at: None,
        technologies: Vec::new(),
        discovered_domains: Vec::new(),
        accessibility: options
            .include_accessibility
            .then(AccessibilityReport::empty),
        lighthouse: options.include_lighthouse.then(PerformanceReport::empty),
        dns: options.include_dns.then(DnsReport::empty),
        persisted: true,
    }
}

fn apply_output(combined: &mut CombinedResult, output: ProbeOutput) {
    match output {
        ProbeOutput::Technologies(report) => combined.technologies = report.technologies,
        ProbeOutput::Discovery(report) => combined.discovered_domains = report.discovered_domains,
        ProbeOutput::Accessibility(report) => combined.accessibility = Some(report),
        ProbeOutput::Performance(report) => combined.lighthouse = Some(report),
        ProbeOutput::Dns(report) => combined.dns = Some(report),
    }
}
