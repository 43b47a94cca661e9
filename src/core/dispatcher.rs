//! Bounded concurrent validation of address lists.

use crate::core::models::{dedup_key, Category, StageCell, ValidationOutcome};
use crate::core::pipeline::Validator;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative stop flag. Once triggered, no new addresses are started;
/// addresses already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drops case-insensitive duplicates, keeping the first spelling seen.
pub fn dedup_emails<I>(emails: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    emails
        .into_iter()
        .filter(|email| seen.insert(dedup_key(email)))
        .collect()
}

/// Validates `emails` with at most `max_workers` in flight, yielding each
/// outcome as soon as it is ready. Order is not preserved.
///
/// Every address runs on its own task, so a panic while validating one
/// address becomes an `unknown` outcome, labelled with the stage it had
/// reached, instead of tearing down the batch.
pub fn validate_batch<I>(
    validator: Arc<Validator>,
    emails: I,
    shutdown: ShutdownSignal,
) -> BoxStream<'static, ValidationOutcome>
where
    I: IntoIterator<Item = String>,
{
    let unique = dedup_emails(emails);
    let workers = validator.config().max_workers.max(1);
    tracing::info!(target: "batch", "Validating {} unique addresses with up to {} workers", unique.len(), workers);

    stream::iter(unique)
        .take_while(move |_| {
            let stop = shutdown.is_triggered();
            if stop {
                tracing::info!(target: "batch", "Shutdown requested; not starting further addresses");
            }
            futures::future::ready(!stop)
        })
        .map(move |email| {
            let validator = validator.clone();
            async move {
                let task_email = email.clone();
                let progress = Arc::new(StageCell::default());
                let task_progress = progress.clone();
                let handle = tokio::spawn(async move {
                    validator.validate_tracked(&task_email, &task_progress).await
                });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let stage = progress.get();
                        tracing::error!(target: "batch", "Validation task for <{}> failed at {}: {}", email, stage, e);
                        ValidationOutcome {
                            email: email.trim().to_string(),
                            category: Category::Unknown,
                            reason: format!("Validation task failed during {} stage: {}", stage, e),
                            stage,
                            smtp_code: None,
                            elapsed: Duration::ZERO,
                        }
                    }
                }
            }
        })
        .buffer_unordered(workers)
        .boxed()
}
