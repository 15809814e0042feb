//! Attribution token embedded in beacon and redirect URLs.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use herald_common::{CampaignId, ContactId, SenderId};
use serde::{Deserialize, Serialize};

/// Opaque payload identifying campaign, recipient, and sender.
///
/// Encoded as URL-safe base64 over a small JSON object. It either decodes or
/// it does not; there is no confidentiality or integrity guarantee. This is
/// attribution, not authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingToken {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub sender_id: String,
    /// Seconds since the Unix epoch at token creation.
    pub timestamp: u64,
}

impl TrackingToken {
    /// Create a token stamped with the current time.
    #[must_use]
    pub fn new(campaign_id: CampaignId, contact_id: ContactId, sender_id: &SenderId) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self::with_timestamp(campaign_id, contact_id, sender_id, timestamp)
    }

    /// Create a token with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        campaign_id: CampaignId,
        contact_id: ContactId,
        sender_id: &SenderId,
        timestamp: u64,
    ) -> Self {
        Self {
            campaign_id,
            contact_id,
            sender_id: sender_id.as_str().to_string(),
            timestamp,
        }
    }

    /// Encode for embedding in a URL query parameter.
    #[must_use]
    pub fn encode(&self) -> String {
        // A struct of integers and a string cannot fail to serialize.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token previously produced by [`encode`](Self::encode).
    ///
    /// Returns `None` for anything that is not valid base64-wrapped JSON of
    /// the expected shape.
    #[must_use]
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
