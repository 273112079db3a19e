// storage/pool.rs
// SQLite pool initialization and schema creation

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use log::info;
use sqlx::{Pool, Sqlite, SqlitePool};

use crate::error::RepositoryError;

/// Initializes a SQLite pool at the given path, creating the file if needed
/// and enabling WAL mode.
pub async fn init_db_pool(db_path: &Path) -> Result<Pool<Sqlite>, RepositoryError> {
    match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(db_path)
    {
        Ok(_) => info!("Database file created: {}", db_path.display()),
        Err(ref e) if e.kind() == ErrorKind::AlreadyExists => {
            info!("Database file already exists: {}", db_path.display())
        }
        Err(e) => {
            return Err(RepositoryError::Backend(format!(
                "Database file creation error: {e}"
            )))
        }
    }

    let pool = SqlitePool::connect(&format!("sqlite:{}", db_path.display())).await?;

    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    Ok(pool)
}

/// Creates the schema if it doesn't exist.
///
/// `domains` is the canonical per-organization hostname table;
/// `audit_results` is append-only, with an index supporting the
/// latest-row-per-category query.
pub async fn run_schema(pool: &Pool<Sqlite>) -> Result<(), RepositoryError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS domains (
            id INTEGER PRIMARY KEY,
            org_id TEXT NOT NULL,
            domain TEXT NOT NULL,
            display_name TEXT NOT NULL,
            last_analyzed_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(org_id, domain)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_results (
            id INTEGER PRIMARY KEY,
            domain_id INTEGER NOT NULL REFERENCES domains(id),
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            score REAL,
            payload TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_domain_category
         ON audit_results(domain_id, category, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
