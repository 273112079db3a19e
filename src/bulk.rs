//! Bulk coordinator: bounded-concurrency batches of full analyses.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};
use tokio::sync::Semaphore;

use crate::config::BulkOptions;
use crate::context::AnalysisContext;
use crate::models::{BulkItem, BulkResult};
use crate::orchestrator::Analyzer;

impl Analyzer {
    /// Analyzes a batch of URLs under a fixed concurrency bound.
    ///
    /// A per-URL failure (after the orchestrator's own fallback is exhausted)
    /// is captured as a per-item failure and never aborts the batch. Items
    /// still queued when the batch deadline trips are reported as failed with
    /// a timeout reason. The summary always contains one entry per input URL,
    /// in input order.
    pub async fn bulk_analyze(
        &self,
        urls: &[String],
        options: &BulkOptions,
        ctx: &AnalysisContext,
    ) -> BulkResult {
        let total = urls.len();
        info!(
            "Starting bulk analysis of {total} URL(s), concurrency {}",
            options.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut units = FuturesUnordered::new();
        for (index, url) in urls.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let analyze_options = options.analyze.clone();
            units.push(async move {
                // Excess requests queue here for a free slot.
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    return (index, Err("Bulk semaphore closed".to_string()));
                }
                let outcome = self
                    .analyze(url, &analyze_options, ctx)
                    .await
                    .map_err(|e| e.to_string());
                (index, outcome)
            });
        }

        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);
        let mut slots: Vec<Option<BulkItem>> = vec![None; total];
        let mut cancelled = false;
        let mut deadline_tripped = false;

        while !units.is_empty() {
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = &mut deadline => {
                    deadline_tripped = true;
                    break;
                }
                Some((index, outcome)) = units.next() => {
                    slots[index] = Some(match outcome {
                        Ok(result) => BulkItem {
                            url: urls[index].clone(),
                            result: Some(result),
                            error: None,
                        },
                        Err(message) => BulkItem {
                            url: urls[index].clone(),
                            result: None,
                            error: Some(message),
                        },
                    });
                }
            }
        }

        if deadline_tripped {
            warn!(
                "Bulk deadline of {:?} tripped with {} item(s) unfinished",
                options.timeout,
                slots.iter().filter(|s| s.is_none()).count()
            );
        }

        let unfinished_reason = if cancelled {
            "Bulk analysis cancelled by caller"
        } else {
            "Bulk deadline exceeded before this URL completed"
        };
        let results: Vec<BulkItem> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BulkItem {
                    url: urls[index].clone(),
                    result: None,
                    error: Some(unfinished_reason.to_string()),
                })
            })
            .collect();

        let processed = results.iter().filter(|item| item.succeeded()).count();
        let failed = total - processed;
        let message = if cancelled {
            format!("Bulk analysis cancelled: {processed} of {total} URL(s) completed")
        } else {
            format!("Analyzed {processed} of {total} URL(s), {failed} failed")
        };
        info!("{message}");

        BulkResult {
            success: failed == 0,
            message,
            processed,
            failed,
            results,
        }
    }
}
