//! Probe and browser-session-pool contracts.
//!
//! Concrete probe engines (headless-browser automation, Lighthouse-style
//! auditing, accessibility rule engines) live outside this crate; the
//! orchestrator consumes them through the narrow [`Probe`] trait. The
//! DNS-failure detection that triggers the fallback retry is an injectable
//! predicate rather than hard-coded string matching, so a different resolver
//! implementation's phrasing can be accommodated without code changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::error::ProbeError;
use crate::models::{AuditCategory, ProbeOutput};

/// An independent, external analysis capability invoked per URL.
#[async_trait]
pub trait Probe: Send + Sync {
    /// The audit category this probe produces.
    fn category(&self) -> AuditCategory;

    /// Runs the probe against one URL.
    async fn run(&self, url: &Url) -> Result<ProbeOutput, ProbeError>;
}

/// Decides whether a probe failure is DNS-class and therefore eligible for
/// the one-shot www-toggle fallback retry.
pub type DnsFailurePredicate = Arc<dyn Fn(&ProbeError) -> bool + Send + Sync>;

/// Error-message substrings that indicate a DNS resolution failure across
/// common resolver implementations.
const DNS_FAILURE_PATTERNS: &[&str] = &[
    "name not resolved",
    "name or service not known",
    "nxdomain",
    "no record found",
    "no records found",
    "failed to lookup address",
    "dns error",
];

/// The default DNS-failure predicate: case-insensitive substring matching
/// over the probe error message. Underscores and hyphens are folded to
/// spaces first so Chromium's `ERR_NAME_NOT_RESOLVED` matches the same
/// pattern as a resolver's "name not resolved".
pub fn default_dns_failure_predicate() -> DnsFailurePredicate {
    Arc::new(|err: &ProbeError| {
        let message = err.message.to_ascii_lowercase().replace(['_', '-'], " ");
        DNS_FAILURE_PATTERNS
            .iter()
            .any(|pattern| message.contains(pattern))
    })
}

/// Failure to obtain a browser session from the shared pool.
#[derive(Error, Debug, Clone)]
#[error("Browser session pool error: {0}")]
pub struct PoolError(pub String);

/// An opaque handle to one acquired browser session.
///
/// Dropping the handle releases whatever capacity backs it.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    _permit: Option<OwnedSemaphorePermit>,
}

impl SessionHandle {
    /// Creates a handle with no backing permit, for pool implementations that
    /// track capacity themselves.
    pub fn new(id: u64) -> Self {
        Self { id, _permit: None }
    }

    /// Session identifier assigned by the pool.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Bounded pool of headless-browser execution sessions shared by the
/// browser-bound probes.
///
/// The orchestrator only acquires and releases through this interface and
/// wraps acquisition in its cancellation/timeout composer, so a full pool can
/// never deadlock a bulk run.
#[async_trait]
pub trait BrowserSessionPool: Send + Sync {
    /// Waits for a free session. May suspend indefinitely; callers bound it.
    async fn acquire(&self) -> Result<SessionHandle, PoolError>;

    /// Returns a session to the pool.
    fn release(&self, session: SessionHandle);
}

/// Semaphore-backed pool that only bounds concurrency, for deployments where
/// the probe engines manage their own browser processes.
pub struct StaticSessionPool {
    semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl StaticSessionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl BrowserSessionPool for StaticSessionPool {
    async fn acquire(&self) -> Result<SessionHandle, PoolError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| PoolError(format!("Session pool closed: {e}")))?;
        Ok(SessionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            _permit: Some(permit),
        })
    }

    fn release(&self, session: SessionHandle) {
        // Dropping the handle returns the permit.
        drop(session);
    }
}
