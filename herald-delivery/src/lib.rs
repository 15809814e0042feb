//! Delivery queue core: scheduling, throttling, retries, tracking, progress.
//!
//! The [`QueueService`] is the public face. A producer enqueues one item per
//! targeted contact; the dispatcher's timer loop periodically reclaims stuck
//! work, admits a rate-limited batch, claims it from the store, injects
//! tracking, fans sends out with bounded concurrency, and feeds results back
//! through the retry policy. Observers subscribe for per-item progress, and
//! the completion monitor promotes a campaign once every one of its items is
//! terminal.

pub mod campaign;
pub mod completion;
pub mod config;
mod dispatch;
pub mod error;
pub mod progress;
pub mod rate_limiter;
pub mod retry;
pub mod service;
pub mod settings;
pub mod transport;

pub use campaign::{Campaign, CampaignError, CampaignStatus, CampaignStore, MemoryCampaignStore};
pub use config::DeliveryConfig;
pub use dispatch::TickReport;
pub use error::DeliveryError;
pub use progress::{ProgressBus, ProgressSnapshot, ProgressStatus, SubscriptionId};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use service::{QueueService, Recipient, RenderedEmail};
pub use settings::{
    DEFAULT_EMAIL_RETRY_ATTEMPTS, DEFAULT_MAX_EMAILS_PER_HOUR, EMAIL_RETRY_ATTEMPTS,
    MAX_EMAILS_PER_HOUR, MemorySettings, SettingsStore,
};
pub use transport::{MailTransport, OutboundEmail, SmtpConfig, SmtpMailTransport, TransportError};
