//! Orchestrator behavior: freshness caching, fallback policy, partial
//! failure, and persistence.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use helpers::{sample_tech_output, MemoryRepository, StubProbe};
use site_audit::{
    AnalysisContext, AnalyzeOptions, Analyzer, AuditCategory, AuditStatus, DnsReport, ProbeOutput,
};

fn cached_payload(domain: &str) -> serde_json::Value {
    serde_json::json!({
        "domain": domain,
        "display_name": domain,
        "last_analyzed_at": Utc::now(),
        "technologies": [{"name": "cached-tech"}],
        "discovered_domains": []
    })
}

/// Options that dispatch no network-touching crawler unit.
fn no_crawl_options() -> AnalyzeOptions {
    AnalyzeOptions {
        max_pages: 0,
        ..Default::default()
    }
}

fn analyzer_with(
    repo: Arc<MemoryRepository>,
    tech: Arc<StubProbe>,
    dns: Option<Arc<StubProbe>>,
) -> Analyzer {
    let mut builder = Analyzer::builder(repo).technology_probe(tech);
    if let Some(dns) = dns {
        builder = builder.dns_probe(dns);
    }
    builder.build().expect("analyzer should build")
}

#[tokio::test]
async fn fresh_cached_result_invokes_zero_probes() {
    let repo = Arc::new(MemoryRepository::new());
    let domain = repo.seed_domain("org-1", "example.com");
    repo.seed_audit(
        domain.id,
        AuditCategory::SiteAnalysis,
        cached_payload("example.com"),
        Utc::now() - chrono::Duration::hours(1),
    );

    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), Arc::clone(&tech), None);
    let ctx = AnalysisContext::for_org("org-1");

    let result = analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap();

    assert_eq!(tech.calls(), 0, "cached result must not invoke any probe");
    assert_eq!(result.technologies[0].name, "cached-tech");
    // No new audit rows either.
    assert_eq!(repo.audit_count(), 1);
}

#[tokio::test]
async fn stale_cached_result_reruns_probes() {
    let repo = Arc::new(MemoryRepository::new());
    let domain = repo.seed_domain("org-1", "example.com");
    repo.seed_audit(
        domain.id,
        AuditCategory::SiteAnalysis,
        cached_payload("example.com"),
        Utc::now() - chrono::Duration::hours(25),
    );

    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), Arc::clone(&tech), None);
    let ctx = AnalysisContext::for_org("org-1");

    let result = analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap();

    assert_eq!(tech.calls(), 1);
    assert_eq!(result.technologies[0].name, "nginx");
}

#[tokio::test]
async fn force_bypasses_fresh_cache() {
    let repo = Arc::new(MemoryRepository::new());
    let domain = repo.seed_domain("org-1", "example.com");
    repo.seed_audit(
        domain.id,
        AuditCategory::SiteAnalysis,
        cached_payload("example.com"),
        Utc::now() - chrono::Duration::minutes(5),
    );

    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), Arc::clone(&tech), None);
    let ctx = AnalysisContext::for_org("org-1");

    let options = AnalyzeOptions {
        force: true,
        max_pages: 0,
        ..Default::default()
    };
    analyzer
        .analyze("https://example.com", &options, &ctx)
        .await
        .unwrap();

    assert_eq!(tech.calls(), 1);
}

#[tokio::test]
async fn dns_fallback_retries_once_against_www_variant() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    // Fails on the bare hostname, succeeds on the www-toggled variant.
    let dns = Arc::new(StubProbe::with_behavior(AuditCategory::Dns, |url| {
        let host = url.host_str().unwrap_or_default().to_string();
        if host.starts_with("www.") {
            Ok(ProbeOutput::Dns(DnsReport {
                resolved_host: host,
                a: vec!["93.184.216.34".into()],
                ..DnsReport::empty()
            }))
        } else {
            Err(site_audit::ProbeError::new(
                AuditCategory::Dns,
                "no record found for example.com",
            ))
        }
    }));
    let analyzer = analyzer_with(Arc::clone(&repo), tech, Some(Arc::clone(&dns)));
    let ctx = AnalysisContext::for_org("org-1");

    let options = AnalyzeOptions {
        include_dns: true,
        max_pages: 0,
        ..Default::default()
    };
    let result = analyzer
        .analyze("https://example.com", &options, &ctx)
        .await
        .unwrap();

    assert_eq!(dns.calls(), 2, "exactly one retry");
    let dns_report = result.dns.expect("dns field must be present");
    assert_eq!(dns_report.resolved_host, "www.example.com");
    assert_eq!(dns_report.a, vec!["93.184.216.34".to_string()]);
}

#[tokio::test]
async fn dns_failure_on_both_variants_degrades_to_empty_shape() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let dns = Arc::new(StubProbe::failing(
        AuditCategory::Dns,
        "net::ERR_NAME_NOT_RESOLVED",
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), tech, Some(Arc::clone(&dns)));
    let ctx = AnalysisContext::for_org("org-1");

    let options = AnalyzeOptions {
        include_dns: true,
        max_pages: 0,
        ..Default::default()
    };
    let result = analyzer
        .analyze("https://example.com", &options, &ctx)
        .await
        .unwrap();

    assert_eq!(dns.calls(), 2);
    assert_eq!(
        result.dns,
        Some(DnsReport::empty()),
        "degraded probe contributes its empty shape, never null"
    );
    // Technologies still arrived.
    assert_eq!(result.technologies.len(), 1);

    // The degraded outcome is persisted as such.
    let dns_audits = repo.audits_in(AuditCategory::Dns);
    assert_eq!(dns_audits.len(), 1);
    assert_eq!(dns_audits[0].status, AuditStatus::Degraded);
}

#[tokio::test]
async fn non_dns_probe_failure_degrades_without_retry() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let accessibility = Arc::new(StubProbe::failing(
        AuditCategory::Accessibility,
        "browser crashed",
    ));
    let analyzer = Analyzer::builder(Arc::clone(&repo) as Arc<dyn site_audit::Repository>)
        .technology_probe(Arc::clone(&tech) as Arc<dyn site_audit::Probe>)
        .accessibility_probe(Arc::clone(&accessibility) as Arc<dyn site_audit::Probe>)
        .build()
        .unwrap();
    let ctx = AnalysisContext::for_org("org-1");

    let options = AnalyzeOptions {
        include_accessibility: true,
        max_pages: 0,
        ..Default::default()
    };
    let result = analyzer
        .analyze("https://example.com", &options, &ctx)
        .await
        .unwrap();

    assert_eq!(accessibility.calls(), 1, "no fallback for non-DNS failures");
    let report = result.accessibility.expect("field must be present");
    assert_eq!(report.score, None);
    assert_eq!(report.violation_count, 0);
}

#[tokio::test]
async fn successful_probes_persist_their_own_audit_rows() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), tech, None);
    let ctx = AnalysisContext::for_org("org-1");

    analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap();

    let tech_audits = repo.audits_in(AuditCategory::TechnologyDetection);
    assert_eq!(tech_audits.len(), 1);
    assert_eq!(tech_audits[0].status, AuditStatus::Completed);

    let combined = repo.audits_in(AuditCategory::SiteAnalysis);
    assert_eq!(combined.len(), 1);
    let requested = combined[0].metadata["requested"]
        .as_array()
        .expect("metadata records requested categories");
    assert!(requested.iter().any(|v| v == "technology-detection"));
}

#[tokio::test]
async fn persistence_failure_keeps_in_memory_result() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), tech, None);
    let ctx = AnalysisContext::for_org("org-1");

    repo.set_fail_audit_inserts(true);
    let result = analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap();

    assert!(!result.persisted, "caller is told the write was not durable");
    assert_eq!(result.technologies.len(), 1);
}

#[tokio::test]
async fn invalid_url_is_rejected_before_any_probe_runs() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    let analyzer = analyzer_with(Arc::clone(&repo), Arc::clone(&tech), None);
    let ctx = AnalysisContext::for_org("org-1");

    let err = analyzer
        .analyze("exa mple .com", &no_crawl_options(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, site_audit::AnalysisError::Validation(_)));
    assert_eq!(tech.calls(), 0);
}

#[tokio::test]
async fn analyze_deadline_aggregates_settled_units_best_effort() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(StubProbe::succeeding(
        AuditCategory::TechnologyDetection,
        sample_tech_output(),
    ));
    // Never settles within the analyze deadline.
    let dns = Arc::new(
        StubProbe::succeeding(
            AuditCategory::Dns,
            ProbeOutput::Dns(DnsReport {
                resolved_host: "example.com".into(),
                a: vec!["93.184.216.34".into()],
                ..DnsReport::empty()
            }),
        )
        .with_delay(Duration::from_secs(30)),
    );
    let analyzer = Analyzer::builder(Arc::clone(&repo) as Arc<dyn site_audit::Repository>)
        .technology_probe(Arc::clone(&tech) as Arc<dyn site_audit::Probe>)
        .dns_probe(Arc::clone(&dns) as Arc<dyn site_audit::Probe>)
        .analyze_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let ctx = AnalysisContext::for_org("org-1");

    let options = AnalyzeOptions {
        include_dns: true,
        max_pages: 0,
        ..Default::default()
    };
    let result = analyzer
        .analyze("https://example.com", &options, &ctx)
        .await
        .unwrap();

    // The settled unit's output is kept; the unsettled one stays at its
    // empty shape instead of discarding the whole result.
    assert_eq!(result.technologies.len(), 1);
    assert_eq!(result.dns, Some(DnsReport::empty()));

    let combined = repo.audits_in(AuditCategory::SiteAnalysis);
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].status, AuditStatus::Degraded);
    assert_eq!(combined[0].metadata["deadline_tripped"], true);
}

#[tokio::test]
async fn analyze_deadline_with_zero_settled_units_raises_timeout() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(
        StubProbe::succeeding(AuditCategory::TechnologyDetection, sample_tech_output())
            .with_delay(Duration::from_secs(30)),
    );
    let analyzer = Analyzer::builder(Arc::clone(&repo) as Arc<dyn site_audit::Repository>)
        .technology_probe(Arc::clone(&tech) as Arc<dyn site_audit::Probe>)
        .analyze_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let ctx = AnalysisContext::for_org("org-1");

    let err = analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, site_audit::AnalysisError::Timeout(_)));
    assert!(
        repo.audits_in(AuditCategory::SiteAnalysis).is_empty(),
        "nothing settled, so no combined row is written"
    );
}

#[tokio::test]
async fn probe_timeout_degrades_instead_of_failing() {
    let repo = Arc::new(MemoryRepository::new());
    let tech = Arc::new(
        StubProbe::succeeding(AuditCategory::TechnologyDetection, sample_tech_output())
            .with_delay(Duration::from_secs(30)),
    );
    let analyzer = Analyzer::builder(Arc::clone(&repo) as Arc<dyn site_audit::Repository>)
        .technology_probe(Arc::clone(&tech) as Arc<dyn site_audit::Probe>)
        .probe_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let ctx = AnalysisContext::for_org("org-1");

    let result = analyzer
        .analyze("https://example.com", &no_crawl_options(), &ctx)
        .await
        .unwrap();

    assert!(result.technologies.is_empty(), "timed-out probe degrades");
    let tech_audits = repo.audits_in(AuditCategory::TechnologyDetection);
    assert_eq!(tech_audits[0].status, AuditStatus::Degraded);
}
