//! Queue item model and status state machine.

use core::fmt;

use chrono::{DateTime, Utc};
use herald_common::{CampaignId, ContactId, QueueItemId};
use serde::{Deserialize, Serialize};

/// Delivery state of a queue item.
///
/// ```text
/// pending --(claimed for a send attempt)--> processing
/// processing --(send succeeds)--> sent                    [terminal]
/// processing --(send fails, retries left)--> pending
/// processing --(send fails, retries exhausted)--> failed  [terminal]
/// processing --(stuck past staleness threshold)--> pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl QueueStatus {
    /// Whether no further transitions can occur from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A unit of work: one email owed to one recipient of one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    /// Destination address.
    pub email: String,
    pub subject: String,
    /// Pre-rendered content, before tracking injection.
    pub body: String,
    pub status: QueueStatus,
    /// Lower value is served first among pending items.
    pub priority: i32,
    /// The item is not eligible for dispatch before this time.
    pub scheduled_at: DateTime<Utc>,
    /// Set only on transition to `sent`.
    pub sent_at: Option<DateTime<Utc>>,
    /// Last failure message; present only if a failure ever occurred.
    pub error: Option<String>,
    /// Number of failed attempts so far. Monotonic.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Bumped on every status transition; staleness is measured against it.
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Create a fresh pending item from enqueue input.
    #[must_use]
    pub fn new(input: NewQueueItem) -> Self {
        let now = Utc::now();
        Self {
            id: QueueItemId::generate(),
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            email: input.email,
            subject: input.subject,
            body: input.body,
            status: QueueStatus::Pending,
            priority: input.priority,
            scheduled_at: input.scheduled_at.unwrap_or(now),
            sent_at: None,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for [`crate::QueueStore::enqueue`].
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub priority: i32,
    /// Defaults to the insertion time when `None`.
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
}
