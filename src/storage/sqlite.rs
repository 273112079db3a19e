// storage/sqlite.rs
// Repository implementation over the SQLite schema in pool.rs

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::error;
use sqlx::{Pool, Row, Sqlite};

use crate::error::RepositoryError;
use crate::models::{AuditCategory, AuditResult, DomainRecord};
use crate::repository::{NewAuditResult, Repository};

/// SQLite-backed [`Repository`].
#[derive(Clone)]
pub struct SqliteRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRepository {
    /// Wraps an initialized pool. Run
    /// [`run_schema`](crate::storage::run_schema) first.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn domain_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DomainRecord, RepositoryError> {
    let last_analyzed: Option<i64> = row.try_get("last_analyzed_at")?;
    Ok(DomainRecord {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        domain: row.try_get("domain")?,
        display_name: row.try_get("display_name")?,
        last_analyzed_at: last_analyzed.map(millis_to_utc),
    })
}

fn audit_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditResult, RepositoryError> {
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let payload: String = row.try_get("payload")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: i64 = row.try_get("created_at")?;
    Ok(AuditResult {
        id: row.try_get("id")?,
        domain_id: row.try_get("domain_id")?,
        category: category
            .parse()
            .map_err(|_| RepositoryError::Backend(format!("Unknown audit category '{category}'")))?,
        status: status
            .parse()
            .map_err(|_| RepositoryError::Backend(format!("Unknown audit status '{status}'")))?,
        score: row.try_get("score")?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| RepositoryError::Backend(format!("Corrupt audit payload: {e}")))?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| RepositoryError::Backend(format!("Corrupt audit metadata: {e}")))?,
        created_at: millis_to_utc(created_at),
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_domain(
        &self,
        org_id: &str,
        domain: &str,
    ) -> Result<Option<DomainRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, domain, display_name, last_analyzed_at
             FROM domains WHERE org_id = ? AND domain = ?",
        )
        .bind(org_id)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(domain_from_row).transpose()
    }

    async fn upsert_domain(
        &self,
        org_id: &str,
        domain: &str,
        display_name: &str,
    ) -> Result<DomainRecord, RepositoryError> {
        // Insert-if-absent; the conflict target makes concurrent upserts of
        // the same hostname converge on one row.
        sqlx::query(
            "INSERT INTO domains (org_id, domain, display_name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(org_id, domain) DO NOTHING",
        )
        .bind(org_id)
        .bind(domain)
        .bind(display_name)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.find_domain(org_id, domain).await?.ok_or_else(|| {
            RepositoryError::Backend(format!("Domain '{domain}' missing after upsert"))
        })
    }

    async fn touch_last_analyzed(
        &self,
        domain_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE domains SET last_analyzed_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_audit(&self, entry: NewAuditResult) -> Result<AuditResult, RepositoryError> {
        let created_at = Utc::now();
        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| RepositoryError::Backend(format!("Unserializable payload: {e}")))?;
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|e| RepositoryError::Backend(format!("Unserializable metadata: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO audit_results
                 (domain_id, category, status, score, payload, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(entry.domain_id)
        .bind(entry.category.to_string())
        .bind(entry.status.to_string())
        .bind(entry.score)
        .bind(&payload)
        .bind(&metadata)
        .bind(created_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Audit insert failed for domain {}: {e}", entry.domain_id);
            RepositoryError::from(e)
        })?;

        Ok(AuditResult {
            id: row.try_get("id")?,
            domain_id: entry.domain_id,
            category: entry.category,
            status: entry.status,
            score: entry.score,
            payload: entry.payload,
            metadata: entry.metadata,
            created_at,
        })
    }

    async fn latest_audit(
        &self,
        domain_id: i64,
        category: AuditCategory,
    ) -> Result<Option<AuditResult>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, domain_id, category, status, score, payload, metadata, created_at
             FROM audit_results
             WHERE domain_id = ? AND category = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(domain_id)
        .bind(category.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(audit_from_row).transpose()
    }
}
