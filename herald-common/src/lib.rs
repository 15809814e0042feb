//! Shared identifiers and process-wide primitives for the herald workspace.

pub mod ids;
pub mod log;

pub use ids::{CampaignId, ContactId, QueueItemId, SenderId};
pub use tracing;

/// Control signal delivered to long-running service loops.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
