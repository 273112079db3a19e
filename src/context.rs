//! Analysis context: organization scope plus the cancellation/timeout
//! composer.
//!
//! Every operation in the crate threads an explicit [`AnalysisContext`]
//! instead of pulling scope or cancellation from ambient state. The composer
//! combines the caller's cancellation signal with a per-operation deadline
//! into one effective abort condition, keeping the two stop reasons
//! distinguishable all the way up.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AnalysisError;

/// Why a bounded operation stopped before producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The caller's cancellation signal tripped. Never retried.
    Cancelled,
    /// The deadline elapsed first. May trigger best-effort aggregation one
    /// level up.
    TimedOut,
}

/// Explicit per-call context carrying organization scope and the caller's
/// cancellation signal.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    org_id: String,
    cancel: CancellationToken,
}

impl AnalysisContext {
    /// Creates a context bound to an externally owned cancellation token.
    pub fn new(org_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            org_id: org_id.into(),
            cancel,
        }
    }

    /// Creates a context with a fresh, never-cancelled token. Useful for
    /// callers that only rely on timeouts.
    pub fn for_org(org_id: impl Into<String>) -> Self {
        Self::new(org_id, CancellationToken::new())
    }

    /// Organization scope for this call.
    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// The underlying cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the caller has aborted.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `Err(Cancelled)` if the caller has aborted. Checked at every
    /// blocking network boundary.
    pub fn ensure_active(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Derives a child context whose token is cancelled when the parent's is,
    /// but which can also be cancelled independently.
    pub fn child(&self) -> Self {
        Self {
            org_id: self.org_id.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Runs `fut` until it completes, the deadline elapses, or the caller
    /// cancels — whichever comes first.
    ///
    /// The select is biased toward cancellation so a parent's cancellation
    /// always wins over a child's own timeout.
    pub async fn bounded<F, T>(&self, limit: Duration, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep(limit) => Err(Interrupted::TimedOut),
            out = fut => Ok(out),
        }
    }
}
