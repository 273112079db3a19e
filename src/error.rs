//! Error type definitions.
//!
//! This module defines the failure taxonomy used throughout the crate. The
//! orchestrator distinguishes three stop reasons (cancelled, timed out, probe
//! error) because each one has a different propagation policy.

use std::time::Duration;

use thiserror::Error;

use crate::models::AuditCategory;

/// A single probe's technical failure.
///
/// Probe errors are eligible for the one-shot www-toggle fallback retry when
/// they match the DNS-failure predicate; otherwise the probe's contribution
/// degrades to its documented empty shape.
#[derive(Error, Debug, Clone)]
#[error("{category} probe failed: {message}")]
pub struct ProbeError {
    /// Category of the probe that failed.
    pub category: AuditCategory,
    /// Human-readable failure description, matched against the DNS-failure
    /// predicate to decide whether the fallback retry applies.
    pub message: String,
}

impl ProbeError {
    pub fn new(category: AuditCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Error types for repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// SQL execution error.
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Non-SQL backend failure (file creation, in-memory store poisoning).
    #[error("Repository backend error: {0}")]
    Backend(String),
}

/// Top-level error type for analysis operations.
///
/// Individual probe failures degrade to empty shapes inside
/// [`Analyzer::analyze`](crate::Analyzer::analyze); what escapes is invalid
/// input, cancellation, a persistence layer that cannot resolve the domain
/// record, or a deadline that tripped before any unit settled.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Malformed URL or input. Surfaced immediately, never retried.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Single-probe technical failure that could not be degraded.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The caller aborted the operation. Never retried, never falls back.
    #[error("Operation cancelled by caller")]
    Cancelled,

    /// An operation-level deadline elapsed before anything settled.
    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// An audit write failed. The in-memory result is preserved; the caller
    /// is informed the write may not be durable.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl AnalysisError {
    /// True when the error is caller-driven cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}
