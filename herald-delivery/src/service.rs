//! Public queue service: enqueue, lifecycle, progress, operator maintenance.

use std::sync::Arc;

use herald_common::{CampaignId, SenderId, Signal};
use herald_store::{NewQueueItem, QueueStats, QueueStore, StoreError, ValidationError};
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    campaign::CampaignStore,
    completion::CompletionMonitor,
    config::DeliveryConfig,
    dispatch::{Dispatcher, TickReport, run_tick, serve},
    error::DeliveryError,
    progress::{ProgressBus, ProgressSnapshot, SubscriptionId},
    rate_limiter::RateLimiter,
    retry::RetryPolicy,
    settings::{
        DEFAULT_EMAIL_RETRY_ATTEMPTS, DEFAULT_MAX_EMAILS_PER_HOUR, EMAIL_RETRY_ATTEMPTS,
        MAX_EMAILS_PER_HOUR, SettingsStore, read_u32,
    },
    transport::MailTransport,
};

/// One campaign recipient handed to [`QueueService::enqueue_campaign`].
#[derive(Debug, Clone)]
pub struct Recipient {
    pub contact_id: herald_common::ContactId,
    pub email: String,
}

/// Pre-rendered subject and body for a campaign send.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

struct Running {
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<()>,
}

/// The delivery queue's public face.
///
/// Owns its own lifecycle state: constructed once per process and passed by
/// reference, never reached through globals. `start`/`stop` are idempotent.
pub struct QueueService {
    dispatcher: Arc<Dispatcher>,
    campaigns: Arc<dyn CampaignStore>,
    runtime: Mutex<Option<Running>>,
}

impl QueueService {
    /// Build a service, reading the rate and retry budgets from settings
    /// (defaults: 300 emails/hour, 3 retry attempts).
    pub async fn new(
        store: Arc<dyn QueueStore>,
        campaigns: Arc<dyn CampaignStore>,
        settings: Arc<dyn SettingsStore>,
        transport: Arc<dyn MailTransport>,
        sender_id: SenderId,
        config: DeliveryConfig,
    ) -> Self {
        let max_per_hour = read_u32(
            settings.as_ref(),
            MAX_EMAILS_PER_HOUR,
            DEFAULT_MAX_EMAILS_PER_HOUR,
        )
        .await;
        let max_retries = read_u32(
            settings.as_ref(),
            EMAIL_RETRY_ATTEMPTS,
            DEFAULT_EMAIL_RETRY_ATTEMPTS,
        )
        .await;

        info!(max_per_hour, max_retries, "queue service configured");

        let completion = CompletionMonitor::new(Arc::clone(&store), Arc::clone(&campaigns));
        let dispatcher = Arc::new(Dispatcher {
            store,
            transport,
            completion,
            progress: ProgressBus::new(),
            rate_limiter: RateLimiter::new(max_per_hour),
            retry_policy: RetryPolicy::new(max_retries),
            sender_id,
            config,
        });

        Self {
            dispatcher,
            campaigns,
            runtime: Mutex::new(None),
        }
    }

    /// Queue one item per recipient for a campaign.
    ///
    /// Recipients are validated before anything is written, so a malformed
    /// address rejects the whole call and no partial campaign enters the
    /// queue.
    ///
    /// # Errors
    /// `DeliveryError::Campaign` when the campaign does not exist,
    /// `DeliveryError::Store` for validation or store failures.
    pub async fn enqueue_campaign(
        &self,
        campaign_id: CampaignId,
        recipients: &[Recipient],
        email: &RenderedEmail,
        priority: i32,
    ) -> Result<usize, DeliveryError> {
        self.campaigns.get_campaign(campaign_id).await?;

        for recipient in recipients {
            validate_recipient(recipient)?;
        }

        let mut queued = 0;
        for recipient in recipients {
            self.dispatcher
                .store
                .enqueue(NewQueueItem {
                    campaign_id,
                    contact_id: recipient.contact_id,
                    email: recipient.email.clone(),
                    subject: email.subject.clone(),
                    body: email.body.clone(),
                    priority,
                    scheduled_at: None,
                })
                .await?;
            queued += 1;
        }

        info!(campaign = %campaign_id, queued, "campaign enqueued");
        Ok(queued)
    }

    /// Start the scheduling loop. No-op when already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            debug!("queue already running, start ignored");
            return;
        }

        let (shutdown, receiver) = broadcast::channel(1);
        let handle = tokio::spawn(serve(Arc::clone(&self.dispatcher), receiver));
        *runtime = Some(Running { shutdown, handle });
    }

    /// Stop the scheduling loop at the next tick boundary; an in-flight tick
    /// finishes first. No-op when already stopped.
    pub async fn stop(&self) {
        let running = self.runtime.lock().take();
        let Some(running) = running else {
            debug!("queue already stopped, stop ignored");
            return;
        };

        if running.shutdown.send(Signal::Shutdown).is_err() {
            warn!("dispatcher task already exited");
        }
        if let Err(e) = running.handle.await {
            warn!(error = %e, "dispatcher task did not shut down cleanly");
        }
    }

    /// Whether the scheduling loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Run one scheduling pass immediately, outside the timer.
    ///
    /// # Errors
    /// Structural store failures; see [`TickReport`] for the per-pass counts.
    pub async fn run_tick(&self) -> Result<TickReport, DeliveryError> {
        run_tick(&self.dispatcher).await
    }

    /// Register a progress observer.
    pub fn subscribe_progress(
        &self,
        callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.progress.subscribe(callback)
    }

    /// Remove a progress observer. Returns whether it was registered.
    pub fn unsubscribe_progress(&self, id: SubscriptionId) -> bool {
        self.dispatcher.progress.unsubscribe(id)
    }

    /// Per-status item counts.
    ///
    /// # Errors
    /// Store failures.
    pub async fn stats(&self) -> Result<QueueStats, DeliveryError> {
        Ok(self.dispatcher.store.stats().await?)
    }

    /// Return all failed items to pending with a fresh retry budget.
    ///
    /// # Errors
    /// Store failures.
    pub async fn retry_all_failed(&self) -> Result<usize, DeliveryError> {
        let retried = self.dispatcher.store.retry_failed().await?;
        if retried > 0 {
            info!(retried, "failed items returned to pending");
        }
        Ok(retried)
    }

    /// Delete all failed items.
    ///
    /// # Errors
    /// Store failures.
    pub async fn clear_failed(&self) -> Result<usize, DeliveryError> {
        Ok(self.dispatcher.store.clear_failed().await?)
    }

    /// Delete all sent items.
    ///
    /// # Errors
    /// Store failures.
    pub async fn clear_sent(&self) -> Result<usize, DeliveryError> {
        Ok(self.dispatcher.store.clear_sent().await?)
    }
}

fn validate_recipient(recipient: &Recipient) -> Result<(), StoreError> {
    let email = recipient.email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyEmail.into());
    }
    if !email.contains('@') {
        return Err(ValidationError::MalformedEmail(recipient.email.clone()).into());
    }
    Ok(())
}
