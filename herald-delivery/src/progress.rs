//! Progress broadcasting.
//!
//! Observers register callbacks and receive every snapshot synchronously as
//! it is published. There is no buffering or replay: a subscriber added after
//! an event never sees it. A panicking subscriber is isolated — logged and
//! skipped — so one broken observer cannot stop the broadcast or take the
//! dispatcher down with it.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Phase of the event being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Idle,
    Sending,
    Success,
    Error,
}

/// A point-in-time view of the current scheduling run.
///
/// Rebuilt on every dispatch event; consumers must tolerate high-frequency
/// updates.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub status: ProgressStatus,
    /// Address of the item this event is about.
    pub current_email: String,
    /// Items in the current run.
    pub total_emails: usize,
    /// Successful sends so far in the current run.
    pub sent_emails: usize,
    /// Completed items (success or failure) over the total, as a percentage.
    pub percentage: f32,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// The snapshot published outside any scheduling run.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            status: ProgressStatus::Idle,
            current_email: String::new(),
            total_emails: 0,
            sent_emails: 0,
            percentage: 0.0,
            error: None,
        }
    }
}

/// Handle returned by [`ProgressBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Observer registry for dispatch progress.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: Mutex<HashMap<u64, Callback>>,
    next_id: AtomicU64,
}

impl ProgressBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future snapshot.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Arc::new(callback));
        SubscriptionId(id)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(&id.0).is_some()
    }

    /// Deliver a snapshot to every current subscriber.
    pub fn publish(&self, snapshot: &ProgressSnapshot) {
        // Callbacks run outside the lock so a subscriber may (un)subscribe
        // from within its own callback.
        let callbacks: Vec<Callback> = self.subscribers.lock().values().cloned().collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                warn!("progress subscriber panicked, continuing broadcast");
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn every_subscriber_receives_published_snapshots() {
        let bus = ProgressBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        {
            let first = Arc::clone(&first);
            bus.subscribe(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let second = Arc::clone(&second);
            bus.subscribe(move |_| {
                second.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&ProgressSnapshot::idle());
        bus.publish(&ProgressSnapshot::idle());

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_broadcast() {
        let bus = ProgressBus::new();
        let survivor = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("broken observer"));
        {
            let survivor = Arc::clone(&survivor);
            bus.subscribe(move |_| {
                survivor.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&ProgressSnapshot::idle());
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = ProgressBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let id = {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.publish(&ProgressSnapshot::idle());
        assert!(bus.unsubscribe(id));
        bus.publish(&ProgressSnapshot::idle());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn late_subscriber_sees_no_past_events() {
        let bus = ProgressBus::new();
        bus.publish(&ProgressSnapshot::idle());

        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
