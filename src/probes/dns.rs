//! DNS record probe backed by hickory-resolver.
//!
//! Queries A/AAAA/MX/NS/TXT records for the target hostname. Absent records
//! (`no records found`, NXDomain on a secondary type) are normal for many
//! domains and yield empty vectors; a failure to resolve the host at all is
//! surfaced as a probe error so the orchestrator's fallback retry can toggle
//! the `www.` prefix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use url::Url;

use crate::error::ProbeError;
use crate::models::{AuditCategory, DnsReport, ProbeOutput};
use crate::probe::Probe;
use crate::urlnorm::host_of;

/// DNS query timeout. Most queries complete in under a second; failing fast
/// keeps one slow resolver from eating the probe budget.
const DNS_QUERY_TIMEOUT_SECS: u64 = 3;

/// Built-in DNS probe.
pub struct DnsLookupProbe {
    resolver: Arc<TokioAsyncResolver>,
}

impl DnsLookupProbe {
    /// Creates a probe with an aggressive-timeout resolver on the default
    /// (Google) upstream configuration.
    pub fn new() -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(DNS_QUERY_TIMEOUT_SECS);
        opts.attempts = 2;
        // Prevent search-domain appending on bare hostnames.
        opts.ndots = 0;
        Self {
            resolver: Arc::new(TokioAsyncResolver::tokio(ResolverConfig::default(), opts)),
        }
    }

    /// Creates a probe around an existing shared resolver.
    pub fn with_resolver(resolver: Arc<TokioAsyncResolver>) -> Self {
        Self { resolver }
    }

    /// Looks up one record type, treating "no records" responses as empty
    /// rather than as failures.
    async fn lookup_records(
        &self,
        host: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, ProbeError> {
        match self.resolver.lookup(host, record_type).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::A(a) => Some(a.to_string()),
                    RData::AAAA(aaaa) => Some(aaaa.to_string()),
                    RData::NS(ns) => Some(ns.to_utf8()),
                    RData::MX(mx) => Some(mx.exchange().to_utf8()),
                    RData::TXT(txt) => Some(
                        txt.iter()
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                            .collect::<Vec<String>>()
                            .join(""),
                    ),
                    _ => None,
                })
                .collect()),
            Err(e) => {
                let message = e.to_string();
                if message.contains("no records found") || message.contains("NXDomain") {
                    // Expected for domains without this record type.
                    Ok(Vec::new())
                } else {
                    log::warn!("{record_type} lookup failed for {host}: {e}");
                    Err(ProbeError::new(AuditCategory::Dns, message))
                }
            }
        }
    }
}

impl Default for DnsLookupProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for DnsLookupProbe {
    fn category(&self) -> AuditCategory {
        AuditCategory::Dns
    }

    async fn run(&self, url: &Url) -> Result<ProbeOutput, ProbeError> {
        let host = host_of(url)
            .map_err(|e| ProbeError::new(AuditCategory::Dns, e.to_string()))?;

        // A-record resolution decides whether the host exists; its failure is
        // the signal the fallback predicate matches on.
        let a = self.lookup_records(&host, RecordType::A).await?;
        let aaaa = self
            .lookup_records(&host, RecordType::AAAA)
            .await
            .unwrap_or_default();
        let mx = self
            .lookup_records(&host, RecordType::MX)
            .await
            .unwrap_or_default();
        let ns = self
            .lookup_records(&host, RecordType::NS)
            .await
            .unwrap_or_default();
        let txt = self
            .lookup_records(&host, RecordType::TXT)
            .await
            .unwrap_or_default();

        if a.is_empty() && aaaa.is_empty() && ns.is_empty() {
            return Err(ProbeError::new(
                AuditCategory::Dns,
                format!("no record found for {host}"),
            ));
        }

        Ok(ProbeOutput::Dns(DnsReport {
            resolved_host: host,
            a,
            aaaa,
            mx,
            ns,
            txt,
        }))
    }
}
