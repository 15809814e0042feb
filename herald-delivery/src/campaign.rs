//! The externally-owned campaign aggregate.
//!
//! Campaigns live outside the queue core — the UI and its CRUD storage own
//! them. The core only reads a campaign to validate an enqueue and writes one
//! status transition: Sending → Sent when every item is terminal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herald_common::CampaignId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a campaign as its owner tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Sent,
    Cancelled,
}

/// The slice of a campaign the queue core needs to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Campaign store failures.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("campaign store unavailable: {0}")]
    Unavailable(String),
}

/// Access to the externally-owned campaign records.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Fetch a campaign.
    ///
    /// # Errors
    /// `CampaignError::NotFound` when no such campaign exists.
    async fn get_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError>;

    /// Transition a campaign's status, optionally recording completion time.
    async fn update_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), CampaignError>;
}

/// In-memory [`CampaignStore`].
#[derive(Debug, Default)]
pub struct MemoryCampaignStore {
    campaigns: DashMap<CampaignId, Campaign>,
}

impl MemoryCampaignStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            campaigns: DashMap::new(),
        }
    }

    /// Seed a campaign record.
    pub fn insert(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn get_campaign(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.campaigns
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(CampaignError::NotFound(id))
    }

    async fn update_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), CampaignError> {
        let mut entry = self.campaigns.get_mut(&id).ok_or(CampaignError::NotFound(id))?;
        let campaign = entry.value_mut();
        campaign.status = status;
        if sent_at.is_some() {
            campaign.sent_at = sent_at;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryCampaignStore::new();
        store.insert(Campaign {
            id: CampaignId(1),
            name: "spring launch".to_string(),
            status: CampaignStatus::Sending,
            sent_at: None,
        });

        let campaign = store.get_campaign(CampaignId(1)).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sending);

        let now = Utc::now();
        store
            .update_campaign_status(CampaignId(1), CampaignStatus::Sent, Some(now))
            .await
            .unwrap();

        let campaign = store.get_campaign(CampaignId(1)).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Sent);
        assert_eq!(campaign.sent_at, Some(now));
    }

    #[tokio::test]
    async fn missing_campaign_is_not_found() {
        let store = MemoryCampaignStore::new();
        assert!(matches!(
            store.get_campaign(CampaignId(42)).await,
            Err(CampaignError::NotFound(_))
        ));
    }
}
