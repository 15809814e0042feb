//! The scheduling loop: reclaim, admit, claim, fan out, record.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use herald_common::{SenderId, Signal};
use herald_store::{QueueItem, QueueStore};
use herald_tracking::{TrackingToken, inject_tracking};
use tokio::{sync::broadcast, task::JoinSet, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    completion::CompletionMonitor,
    config::DeliveryConfig,
    error::DeliveryError,
    progress::{ProgressBus, ProgressSnapshot, ProgressStatus},
    rate_limiter::RateLimiter,
    retry::{RetryDecision, RetryPolicy},
    transport::{MailTransport, OutboundEmail},
};

/// Everything a scheduling pass needs, shared between the timer loop and the
/// spawned send tasks.
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) transport: Arc<dyn MailTransport>,
    pub(crate) completion: CompletionMonitor,
    pub(crate) progress: ProgressBus,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) sender_id: SenderId,
    pub(crate) config: DeliveryConfig,
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Stuck items returned to pending before this pass.
    pub reclaimed: usize,
    /// Items claimed and attempted.
    pub attempted: usize,
    pub sent: usize,
    pub requeued: usize,
    pub failed: usize,
}

enum ItemOutcome {
    Sent,
    Requeued,
    Failed,
}

/// Shared per-tick counters feeding progress snapshots.
struct TickProgress {
    total: usize,
    sent: AtomicUsize,
    done: AtomicUsize,
}

impl TickProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            sent: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        }
    }

    fn record_success(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn publish(&self, bus: &ProgressBus, status: ProgressStatus, email: &str, error: Option<String>) {
        let sent = self.sent.load(Ordering::SeqCst);
        let done = self.done.load(Ordering::SeqCst);

        #[allow(
            clippy::cast_precision_loss,
            reason = "progress percentage is for display only"
        )]
        let percentage = if self.total == 0 {
            0.0
        } else {
            (done as f32 / self.total as f32) * 100.0
        };

        bus.publish(&ProgressSnapshot {
            status,
            current_email: email.to_string(),
            total_emails: self.total,
            sent_emails: sent,
            percentage,
            error,
        });
    }
}

/// One scheduling pass: reclaim stuck work, admit a rate-limited batch, send
/// it with bounded concurrency, and record the results.
///
/// # Errors
/// Only structural failures (the store refusing an operation) abort the pass.
/// Per-item transport failures are recorded on the items and never propagate
/// here.
pub(crate) async fn run_tick(dispatcher: &Arc<Dispatcher>) -> Result<TickReport, DeliveryError> {
    let mut report = TickReport::default();

    let reclaimed = dispatcher
        .store
        .reclaim_stuck(Duration::from_secs(dispatcher.config.stale_after_secs))
        .await?;
    if !reclaimed.is_empty() {
        warn!(count = reclaimed.len(), "reclaimed items stuck in processing");
        report.reclaimed = reclaimed.len();
    }

    let admitted = dispatcher.rate_limiter.admit(dispatcher.config.max_batch_size);
    if admitted == 0 {
        debug!("rate window exhausted, skipping tick");
        return Ok(report);
    }

    let batch = dispatcher
        .store
        .fetch_pending_batch(admitted as usize)
        .await?;
    if batch.is_empty() {
        return Ok(report);
    }

    // Claimed items spend window budget whether their sends succeed or not.
    dispatcher
        .rate_limiter
        .record(u32::try_from(batch.len()).unwrap_or(u32::MAX));

    debug!(batch = batch.len(), admitted, "dispatching batch");
    report.attempted = batch.len();

    let progress = Arc::new(TickProgress::new(batch.len()));

    // Bounded fan-out: each sub-group runs concurrently and is awaited before
    // the next begins.
    for chunk in batch.chunks(dispatcher.config.send_concurrency.max(1)) {
        let mut tasks: JoinSet<ItemOutcome> = JoinSet::new();

        for item in chunk {
            let dispatcher = Arc::clone(dispatcher);
            let progress = Arc::clone(&progress);
            let item = item.clone();
            tasks.spawn(async move { dispatcher.send_item(item, &progress).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ItemOutcome::Sent) => report.sent += 1,
                Ok(ItemOutcome::Requeued) => report.requeued += 1,
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Err(e) => error!(error = %e, "send task panicked"),
            }
        }
    }

    Ok(report)
}

impl Dispatcher {
    /// Attempt delivery of one claimed item and write the result back.
    async fn send_item(&self, item: QueueItem, progress: &TickProgress) -> ItemOutcome {
        progress.publish(&self.progress, ProgressStatus::Sending, &item.email, None);

        let token = TrackingToken::new(item.campaign_id, item.contact_id, &self.sender_id);
        let email = OutboundEmail {
            to: item.email.clone(),
            subject: item.subject.clone(),
            html: inject_tracking(&item.body, &token, &self.config.tracking),
        };

        match self.transport.send_one(&email).await {
            Ok(()) => {
                if let Err(e) = self.store.mark_sent(item.id, Utc::now()).await {
                    // The item stays in processing; the reclamation sweep
                    // will return it to pending.
                    error!(item = %item.id, error = %e, "failed to record successful send");
                }
                progress.record_success();
                progress.publish(&self.progress, ProgressStatus::Success, &item.email, None);
                self.completion.on_item_terminal(item.campaign_id).await;
                ItemOutcome::Sent
            }
            Err(send_error) => {
                let reason = send_error.to_string();
                debug!(
                    item = %item.id,
                    attempt = item.retry_count + 1,
                    error = %reason,
                    "send attempt failed"
                );

                let outcome = match self.retry_policy.decide(item.retry_count) {
                    RetryDecision::Requeue => {
                        if let Err(e) = self.store.mark_pending(item.id, Some(&reason)).await {
                            error!(item = %item.id, error = %e, "failed to requeue item");
                        }
                        ItemOutcome::Requeued
                    }
                    RetryDecision::Fail { retry_count } => {
                        if let Err(e) = self.store.mark_failed(item.id, &reason, retry_count).await
                        {
                            error!(item = %item.id, error = %e, "failed to record terminal failure");
                        }
                        warn!(
                            item = %item.id,
                            email = %item.email,
                            retries = retry_count,
                            "retries exhausted, item failed permanently"
                        );
                        self.completion.on_item_terminal(item.campaign_id).await;
                        ItemOutcome::Failed
                    }
                };

                progress.record_failure();
                progress.publish(
                    &self.progress,
                    ProgressStatus::Error,
                    &item.email,
                    Some(reason),
                );
                outcome
            }
        }
    }
}

/// Timer-driven scheduling loop.
///
/// The tick body runs inline in the select arm, so ticks never overlap; a
/// shutdown signal takes effect at the next tick boundary and an in-flight
/// tick always finishes.
pub(crate) async fn serve(dispatcher: Arc<Dispatcher>, mut shutdown: broadcast::Receiver<Signal>) {
    info!(
        interval_secs = dispatcher.config.tick_interval_secs,
        concurrency = dispatcher.config.send_concurrency,
        "delivery dispatcher started"
    );

    let mut timer =
        tokio::time::interval(Duration::from_secs(dispatcher.config.tick_interval_secs.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the loop waits a
    // full interval before its first pass.
    timer.tick().await;

    loop {
        tokio::select! {
            // A pending shutdown wins over a due timer so stop never starts
            // a fresh tick.
            biased;

            signal = shutdown.recv() => {
                match signal {
                    Ok(Signal::Shutdown) => info!("delivery dispatcher received shutdown signal"),
                    Err(e) => error!(error = %e, "shutdown channel closed unexpectedly"),
                }
                break;
            }
            _ = timer.tick() => {
                match run_tick(&dispatcher).await {
                    Ok(report) if report.attempted > 0 => {
                        debug!(
                            attempted = report.attempted,
                            sent = report.sent,
                            requeued = report.requeued,
                            failed = report.failed,
                            "tick complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "scheduling tick aborted"),
                }
            }
        }
    }

    dispatcher.progress.publish(&ProgressSnapshot::idle());
    info!("delivery dispatcher stopped");
}
