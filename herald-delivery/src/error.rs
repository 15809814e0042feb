//! Typed error handling for delivery operations.
//!
//! Per-item send failures never appear here: a transient transport error is
//! recovered through the retry policy and an exhausted item surfaces only as
//! terminal `failed` status plus recorded error text. What does surface is
//! structural — the queue store or campaign store refusing an operation.

use herald_store::StoreError;
use thiserror::Error;

use crate::campaign::CampaignError;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The queue store failed. Aborts the current tick; the next tick retries
    /// against unchanged state.
    #[error("queue store error: {0}")]
    Store(#[from] StoreError),

    /// The externally-owned campaign store failed.
    #[error("campaign store error: {0}")]
    Campaign(#[from] CampaignError),
}

#[cfg(test)]
mod tests {
    use herald_common::CampaignId;

    use super::*;

    #[test]
    fn store_error_converts() {
        let err: DeliveryError = StoreError::Unavailable("connection reset".to_string()).into();
        assert!(matches!(err, DeliveryError::Store(_)));
        assert_eq!(
            err.to_string(),
            "queue store error: store unavailable: connection reset"
        );
    }

    #[test]
    fn campaign_error_converts() {
        let err: DeliveryError = CampaignError::NotFound(CampaignId(4)).into();
        assert!(matches!(err, DeliveryError::Campaign(_)));
        assert_eq!(err.to_string(), "campaign store error: campaign not found: 4");
    }
}
