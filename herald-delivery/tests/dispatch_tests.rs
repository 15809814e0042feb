//! End-to-end dispatch scenarios against an in-memory store and a scripted
//! transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_common::{CampaignId, ContactId, SenderId};
use herald_delivery::{
    Campaign, CampaignStatus, CampaignStore, DeliveryConfig, MailTransport, MemoryCampaignStore,
    MemorySettings, OutboundEmail, ProgressStatus, QueueService, Recipient, RenderedEmail,
    TransportError,
};
use herald_store::{MemoryQueueStore, QueueStatus, QueueStore};
use parking_lot::Mutex;

/// Transport that fails the first `failures` calls per recipient, then
/// succeeds, recording everything it was asked to send.
struct ScriptedTransport {
    failures: usize,
    calls: AtomicUsize,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl ScriptedTransport {
    fn always_ok() -> Arc<Self> {
        Arc::new(Self {
            failures: 0,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send_one(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryQueueStore>,
    campaigns: Arc<MemoryCampaignStore>,
    service: QueueService,
}

async fn harness(
    transport: Arc<dyn MailTransport>,
    settings: MemorySettings,
    config: DeliveryConfig,
) -> Harness {
    let store = Arc::new(MemoryQueueStore::new());
    let campaigns = Arc::new(MemoryCampaignStore::new());
    campaigns.insert(Campaign {
        id: CampaignId(1),
        name: "launch".to_string(),
        status: CampaignStatus::Sending,
        sent_at: None,
    });

    let service = QueueService::new(
        Arc::clone(&store) as Arc<dyn QueueStore>,
        Arc::clone(&campaigns) as Arc<dyn CampaignStore>,
        Arc::new(settings),
        transport,
        SenderId::new("operator-1"),
        config,
    )
    .await;

    Harness {
        store,
        campaigns,
        service,
    }
}

fn recipients(count: i64) -> Vec<Recipient> {
    (0..count)
        .map(|i| Recipient {
            contact_id: ContactId(i),
            email: format!("user{i}@example.com"),
        })
        .collect()
}

fn email() -> RenderedEmail {
    RenderedEmail {
        subject: "Spring launch".to_string(),
        body: "<p>Hello!</p><a href=\"https://example.com/shop\">shop</a></body>".to_string(),
    }
}

#[tokio::test]
async fn five_items_sent_in_one_tick_and_campaign_promoted() {
    let transport = ScriptedTransport::always_ok();
    let settings = MemorySettings::new();
    settings.set("max_emails_per_hour", "300"); // 5 per one-minute window

    let h = harness(transport.clone(), settings, DeliveryConfig::default()).await;

    let queued = h
        .service
        .enqueue_campaign(CampaignId(1), &recipients(5), &email(), 0)
        .await
        .unwrap();
    assert_eq!(queued, 5);

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.pending, 5);

    let report = h.service.run_tick().await.unwrap();
    assert_eq!(report.attempted, 5);
    assert_eq!(report.sent, 5);

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.failed, 0);

    let campaign = h.campaigns.get_campaign(CampaignId(1)).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Sent);
    assert!(campaign.sent_at.is_some());

    // Every delivered body went out tracked.
    for sent in transport.sent() {
        assert!(sent.html.contains("/track/click?token="));
        assert!(sent.html.contains("/track/open?token="));
    }
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let transport = ScriptedTransport::failing_first(2);
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(1), &email(), 0)
        .await
        .unwrap();

    // Attempt 1 and 2 fail and requeue, attempt 3 succeeds.
    assert_eq!(h.service.run_tick().await.unwrap().requeued, 1);
    assert_eq!(h.service.run_tick().await.unwrap().requeued, 1);
    assert_eq!(h.service.run_tick().await.unwrap().sent, 1);

    let items = h.store.items_for_campaign(CampaignId(1)).await.unwrap();
    let item = items.first().unwrap();
    assert_eq!(item.status, QueueStatus::Sent);
    assert_eq!(item.retry_count, 2);
    assert!(item.sent_at.is_some());
}

#[tokio::test]
async fn exhausted_retries_fail_terminally() {
    let transport = ScriptedTransport::failing_first(usize::MAX);
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(1), &email(), 0)
        .await
        .unwrap();

    // Default retry cap is 3: two requeues, then terminal failure.
    assert_eq!(h.service.run_tick().await.unwrap().requeued, 1);
    assert_eq!(h.service.run_tick().await.unwrap().requeued, 1);
    assert_eq!(h.service.run_tick().await.unwrap().failed, 1);

    let items = h.store.items_for_campaign(CampaignId(1)).await.unwrap();
    let item = items.first().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.retry_count, 3);
    assert!(item.error.as_deref().is_some_and(|e| !e.is_empty()));

    // All items terminal (even all-failed) closes the campaign.
    let campaign = h.campaigns.get_campaign(CampaignId(1)).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Sent);

    // Nothing further to do on the next tick.
    assert_eq!(h.service.run_tick().await.unwrap().attempted, 0);
}

#[tokio::test]
async fn rate_limit_bounds_each_window() {
    let transport = ScriptedTransport::always_ok();
    let settings = MemorySettings::new();
    settings.set("max_emails_per_hour", "120"); // 2 per window

    let h = harness(transport, settings, DeliveryConfig::default()).await;

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(5), &email(), 0)
        .await
        .unwrap();

    assert_eq!(h.service.run_tick().await.unwrap().sent, 2);
    // Same window: budget is spent, the tick skips.
    assert_eq!(h.service.run_tick().await.unwrap().attempted, 0);

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.pending, 3);
}

#[tokio::test]
async fn retry_attempts_setting_is_honored() {
    let transport = ScriptedTransport::failing_first(usize::MAX);
    let settings = MemorySettings::new();
    settings.set("email_retry_attempts", "1");

    let h = harness(transport, settings, DeliveryConfig::default()).await;

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(1), &email(), 0)
        .await
        .unwrap();

    assert_eq!(h.service.run_tick().await.unwrap().failed, 1);

    let items = h.store.items_for_campaign(CampaignId(1)).await.unwrap();
    assert_eq!(items.first().unwrap().retry_count, 1);
}

#[tokio::test]
async fn progress_events_flow_and_tolerate_broken_subscribers() {
    let transport = ScriptedTransport::always_ok();
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    h.service.subscribe_progress(|_| panic!("broken observer"));

    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        h.service.subscribe_progress(move |snapshot| {
            events.lock().push((snapshot.status, snapshot.sent_emails));
        });
    }

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(2), &email(), 0)
        .await
        .unwrap();
    h.service.run_tick().await.unwrap();

    let events = events.lock().clone();
    let sending = events
        .iter()
        .filter(|(status, _)| *status == ProgressStatus::Sending)
        .count();
    let succeeded = events
        .iter()
        .filter(|(status, _)| *status == ProgressStatus::Success)
        .count();
    assert_eq!(sending, 2, "a sending event per item");
    assert_eq!(succeeded, 2, "a completion event per item");

    // Whichever task records the second success publishes a snapshot that
    // counts both sends.
    assert!(
        events
            .iter()
            .any(|(status, sent)| *status == ProgressStatus::Success && *sent == 2),
        "some snapshot must count every send"
    );
}

#[tokio::test]
async fn unsubscribed_observer_stops_receiving() {
    let transport = ScriptedTransport::always_ok();
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    let events = Arc::new(AtomicUsize::new(0));
    let id = {
        let events = Arc::clone(&events);
        h.service.subscribe_progress(move |_| {
            events.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert!(h.service.unsubscribe_progress(id));

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(1), &email(), 0)
        .await
        .unwrap();
    h.service.run_tick().await.unwrap();

    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn enqueue_validates_before_writing_anything() {
    let transport = ScriptedTransport::always_ok();
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    let mixed = vec![
        Recipient {
            contact_id: ContactId(1),
            email: "good@example.com".to_string(),
        },
        Recipient {
            contact_id: ContactId(2),
            email: String::new(),
        },
    ];

    let result = h
        .service
        .enqueue_campaign(CampaignId(1), &mixed, &email(), 0)
        .await;
    assert!(result.is_err());

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.pending, 0, "no partial campaign may enter the queue");
}

#[tokio::test]
async fn enqueue_rejects_unknown_campaign() {
    let transport = ScriptedTransport::always_ok();
    let h = harness(transport, MemorySettings::new(), DeliveryConfig::default()).await;

    let result = h
        .service
        .enqueue_campaign(CampaignId(99), &recipients(1), &email(), 0)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn operator_maintenance_round_trip() {
    let transport = ScriptedTransport::failing_first(usize::MAX);
    let settings = MemorySettings::new();
    settings.set("email_retry_attempts", "1");

    let h = harness(transport, settings, DeliveryConfig::default()).await;

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(2), &email(), 0)
        .await
        .unwrap();
    h.service.run_tick().await.unwrap();

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.failed, 2);

    assert_eq!(h.service.retry_all_failed().await.unwrap(), 2);
    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.failed, 0);

    h.service.run_tick().await.unwrap();
    assert_eq!(h.service.clear_failed().await.unwrap(), 2);
    assert_eq!(h.service.stats().await.unwrap().failed, 0);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let transport = ScriptedTransport::always_ok();
    let config = DeliveryConfig {
        tick_interval_secs: 1,
        ..DeliveryConfig::default()
    };

    let h = harness(transport, MemorySettings::new(), config).await;

    assert!(!h.service.is_running());
    h.service.start();
    h.service.start(); // second call is a no-op
    assert!(h.service.is_running());

    h.service
        .enqueue_campaign(CampaignId(1), &recipients(1), &email(), 0)
        .await
        .unwrap();

    // Wait past the first interval for the loop to pick the item up.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    h.service.stop().await;
    h.service.stop().await; // second call is a no-op
    assert!(!h.service.is_running());

    assert_eq!(h.service.stats().await.unwrap().sent, 1);

    // The queue can be started again after a stop.
    h.service.start();
    assert!(h.service.is_running());
    h.service.stop().await;
}
