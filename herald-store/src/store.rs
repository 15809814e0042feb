//! The queue store contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::{CampaignId, QueueItemId};

use crate::{
    error::Result,
    item::{NewQueueItem, QueueItem, QueueStats},
};

/// Backing store for queue items.
///
/// Implementations own all status transitions. Each `mark_*` method updates
/// only the fields that transition owns, plus `updated_at`.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Insert a new pending item and return its id.
    ///
    /// # Errors
    /// `StoreError::Validation` when the recipient email is empty or
    /// malformed; nothing is written in that case.
    async fn enqueue(&self, input: NewQueueItem) -> Result<QueueItemId>;

    /// Fetch a single item by id.
    ///
    /// # Errors
    /// `StoreError::NotFound` when the item does not exist.
    async fn get(&self, id: QueueItemId) -> Result<QueueItem>;

    /// Claim up to `limit` eligible pending items for dispatch.
    ///
    /// Eligible means `status = pending` and `scheduled_at <= now`. Items are
    /// served in `priority` ascending, then `scheduled_at` ascending, then id
    /// ascending order. Every returned item has been transitioned to
    /// `processing` atomically with the read, so concurrent callers can never
    /// claim the same item twice.
    async fn fetch_pending_batch(&self, limit: usize) -> Result<Vec<QueueItem>>;

    /// Transition an item to `processing`.
    async fn mark_processing(&self, id: QueueItemId) -> Result<()>;

    /// Transition an item to `sent`, recording the send time.
    async fn mark_sent(&self, id: QueueItemId, sent_at: DateTime<Utc>) -> Result<()>;

    /// Transition an item to terminal `failed`, recording the last error and
    /// final retry count.
    async fn mark_failed(&self, id: QueueItemId, error: &str, retry_count: u32) -> Result<()>;

    /// Return an item to `pending`.
    ///
    /// With `Some(error)` this is a failure requeue: the error text is
    /// recorded and `retry_count` is incremented. With `None` the item is
    /// requeued as-is (operator action), leaving both untouched.
    async fn mark_pending(&self, id: QueueItemId, error: Option<&str>) -> Result<()>;

    /// Return items stuck in `processing` longer than `older_than` to
    /// `pending`, leaving `retry_count` unchanged and noting the reclamation
    /// in `error`. Returns the reclaimed items.
    async fn reclaim_stuck(&self, older_than: Duration) -> Result<Vec<QueueItem>>;

    /// Per-status item counts.
    async fn stats(&self) -> Result<QueueStats>;

    /// Every item belonging to a campaign, in no particular order.
    async fn items_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<QueueItem>>;

    /// Return all `failed` items to `pending` with a fresh retry budget.
    /// Returns how many were requeued.
    async fn retry_failed(&self) -> Result<usize>;

    /// Delete all `failed` items. Returns how many were removed.
    async fn clear_failed(&self) -> Result<usize>;

    /// Delete all `sent` items. Returns how many were removed.
    async fn clear_sent(&self) -> Result<usize>;
}
