//! Campaign closure detection.

use std::sync::Arc;

use chrono::Utc;
use herald_common::CampaignId;
use herald_store::QueueStore;
use tracing::{debug, info, warn};

use crate::campaign::{CampaignStatus, CampaignStore};

/// Promotes a campaign to Sent once every one of its items is terminal.
///
/// Each check is a full re-scan of the campaign's items. At the scale this
/// system targets (hundreds to low thousands of items per campaign) the scan
/// is cheaper than keeping an incremental counter consistent across retries
/// and reclamations.
pub struct CompletionMonitor {
    store: Arc<dyn QueueStore>,
    campaigns: Arc<dyn CampaignStore>,
}

impl CompletionMonitor {
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>, campaigns: Arc<dyn CampaignStore>) -> Self {
        Self { store, campaigns }
    }

    /// Re-evaluate a campaign after one of its items reached `sent` or
    /// `failed`.
    ///
    /// Errors are logged and swallowed: the next terminal transition runs the
    /// same check again.
    pub async fn on_item_terminal(&self, campaign_id: CampaignId) {
        let items = match self.store.items_for_campaign(campaign_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "completion check could not read items");
                return;
            }
        };

        if items.is_empty() || !items.iter().all(|item| item.status.is_terminal()) {
            return;
        }

        let campaign = match self.campaigns.get_campaign(campaign_id).await {
            Ok(campaign) => campaign,
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "completion check could not read campaign");
                return;
            }
        };

        if campaign.status != CampaignStatus::Sending {
            debug!(
                campaign = %campaign_id,
                status = ?campaign.status,
                "campaign not in sending state, leaving it untouched"
            );
            return;
        }

        match self
            .campaigns
            .update_campaign_status(campaign_id, CampaignStatus::Sent, Some(Utc::now()))
            .await
        {
            Ok(()) => {
                info!(
                    campaign = %campaign_id,
                    items = items.len(),
                    "every item terminal, campaign promoted to sent"
                );
            }
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "failed to promote campaign");
            }
        }
    }
}
