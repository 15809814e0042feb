//! In-memory queue store.
//!
//! Items live in a `DashMap` keyed by id. Per-item shard locking is what makes
//! the claim in [`fetch_pending_batch`](QueueStore::fetch_pending_batch)
//! atomic: candidates are collected first, then each is re-checked and
//! transitioned under its own entry lock, so a concurrent claimer that got
//! there first simply wins.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use herald_common::{CampaignId, QueueItemId};
use tracing::debug;

use crate::{
    error::{Result, StoreError, ValidationError},
    item::{NewQueueItem, QueueItem, QueueStats, QueueStatus},
    store::QueueStore,
};

/// Error text recorded on items returned to pending by the reclamation sweep.
pub const RECLAIMED_ERROR: &str = "reclaimed: processing timed out";

/// In-memory [`QueueStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    items: DashMap<QueueItemId, QueueItem>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Number of items currently stored, regardless of status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn with_item<T>(&self, id: QueueItemId, f: impl FnOnce(&mut QueueItem) -> T) -> Result<T> {
        self.items
            .get_mut(&id)
            .map(|mut entry| f(entry.value_mut()))
            .ok_or(StoreError::NotFound(id))
    }
}

fn validate(input: &NewQueueItem) -> Result<()> {
    let email = input.email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyEmail.into());
    }
    if !email.contains('@') {
        return Err(ValidationError::MalformedEmail(input.email.clone()).into());
    }
    Ok(())
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, input: NewQueueItem) -> Result<QueueItemId> {
        validate(&input)?;

        let item = QueueItem::new(input);
        let id = item.id;
        self.items.insert(id, item);

        Ok(id)
    }

    async fn get(&self, id: QueueItemId) -> Result<QueueItem> {
        self.items
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn fetch_pending_batch(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let now = Utc::now();

        // Candidate pass: ids only, no entry locks held while sorting.
        let mut candidates: Vec<(i32, DateTime<Utc>, QueueItemId)> = self
            .items
            .iter()
            .filter(|entry| {
                entry.value().status == QueueStatus::Pending && entry.value().scheduled_at <= now
            })
            .map(|entry| (entry.value().priority, entry.value().scheduled_at, *entry.key()))
            .collect();
        candidates.sort_unstable();

        // Claim pass: re-check under the entry lock. A candidate another
        // caller claimed in the meantime fails the status check and is
        // skipped.
        let mut claimed = Vec::with_capacity(limit.min(candidates.len()));
        for (_, _, id) in candidates {
            if claimed.len() == limit {
                break;
            }
            if let Some(mut entry) = self.items.get_mut(&id) {
                let item = entry.value_mut();
                if item.status == QueueStatus::Pending && item.scheduled_at <= now {
                    item.status = QueueStatus::Processing;
                    item.updated_at = now;
                    claimed.push(item.clone());
                }
            }
        }

        Ok(claimed)
    }

    async fn mark_processing(&self, id: QueueItemId) -> Result<()> {
        self.with_item(id, |item| {
            item.status = QueueStatus::Processing;
            item.updated_at = Utc::now();
        })
    }

    async fn mark_sent(&self, id: QueueItemId, sent_at: DateTime<Utc>) -> Result<()> {
        self.with_item(id, |item| {
            item.status = QueueStatus::Sent;
            item.sent_at = Some(sent_at);
            item.updated_at = Utc::now();
        })
    }

    async fn mark_failed(&self, id: QueueItemId, error: &str, retry_count: u32) -> Result<()> {
        self.with_item(id, |item| {
            item.status = QueueStatus::Failed;
            item.error = Some(error.to_string());
            item.retry_count = retry_count;
            item.updated_at = Utc::now();
        })
    }

    async fn mark_pending(&self, id: QueueItemId, error: Option<&str>) -> Result<()> {
        self.with_item(id, |item| {
            item.status = QueueStatus::Pending;
            if let Some(error) = error {
                item.error = Some(error.to_string());
                item.retry_count += 1;
            }
            item.updated_at = Utc::now();
        })
    }

    async fn reclaim_stuck(&self, older_than: Duration) -> Result<Vec<QueueItem>> {
        let cutoff = Utc::now() - TimeDelta::from_std(older_than).unwrap_or(TimeDelta::MAX);

        let stuck: Vec<QueueItemId> = self
            .items
            .iter()
            .filter(|entry| {
                entry.value().status == QueueStatus::Processing
                    && entry.value().updated_at < cutoff
            })
            .map(|entry| *entry.key())
            .collect();

        let mut reclaimed = Vec::with_capacity(stuck.len());
        for id in stuck {
            if let Some(mut entry) = self.items.get_mut(&id) {
                let item = entry.value_mut();
                if item.status == QueueStatus::Processing && item.updated_at < cutoff {
                    item.status = QueueStatus::Pending;
                    item.error = Some(RECLAIMED_ERROR.to_string());
                    item.updated_at = Utc::now();
                    debug!(item = %id, "reclaimed stuck item");
                    reclaimed.push(item.clone());
                }
            }
        }

        Ok(reclaimed)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for entry in &self.items {
            match entry.value().status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Sent => stats.sent += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn items_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<QueueItem>> {
        Ok(self
            .items
            .iter()
            .filter(|entry| entry.value().campaign_id == campaign_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn retry_failed(&self) -> Result<usize> {
        let failed: Vec<QueueItemId> = self
            .items
            .iter()
            .filter(|entry| entry.value().status == QueueStatus::Failed)
            .map(|entry| *entry.key())
            .collect();

        let mut retried = 0;
        for id in failed {
            if let Some(mut entry) = self.items.get_mut(&id) {
                let item = entry.value_mut();
                if item.status == QueueStatus::Failed {
                    item.status = QueueStatus::Pending;
                    item.retry_count = 0;
                    item.updated_at = Utc::now();
                    retried += 1;
                }
            }
        }

        Ok(retried)
    }

    async fn clear_failed(&self) -> Result<usize> {
        let before = self.items.len();
        self.items
            .retain(|_, item| item.status != QueueStatus::Failed);
        Ok(before - self.items.len())
    }

    async fn clear_sent(&self) -> Result<usize> {
        let before = self.items.len();
        self.items.retain(|_, item| item.status != QueueStatus::Sent);
        Ok(before - self.items.len())
    }
}
