//! Persistence contract consumed by the orchestrator.
//!
//! The orchestrator never talks to a database directly; it writes through
//! this trait. The crate ships a SQLite implementation in
//! [`storage`](crate::storage), and tests use an in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::models::{AuditCategory, AuditResult, AuditStatus, DomainRecord};

/// A new audit row to append. `id` and `created_at` are assigned by the
/// repository.
#[derive(Debug, Clone)]
pub struct NewAuditResult {
    pub domain_id: i64,
    pub category: AuditCategory,
    pub status: AuditStatus,
    pub score: Option<f64>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Storage of domain records and append-only audit results.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Looks up the domain record for a hostname within an organization.
    async fn find_domain(
        &self,
        org_id: &str,
        domain: &str,
    ) -> Result<Option<DomainRecord>, RepositoryError>;

    /// Creates the domain record if absent, otherwise returns the existing
    /// one. Idempotent; concurrent upserts of the same hostname are benign.
    async fn upsert_domain(
        &self,
        org_id: &str,
        domain: &str,
        display_name: &str,
    ) -> Result<DomainRecord, RepositoryError>;

    /// Updates a domain's last-analyzed timestamp. Last write wins.
    async fn touch_last_analyzed(
        &self,
        domain_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Appends one audit row. Rows are never mutated afterwards.
    async fn insert_audit(&self, entry: NewAuditResult) -> Result<AuditResult, RepositoryError>;

    /// Returns the most recent audit row for a domain and category, if any.
    async fn latest_audit(
        &self,
        domain_id: i64,
        category: AuditCategory,
    ) -> Result<Option<AuditResult>, RepositoryError>;
}
