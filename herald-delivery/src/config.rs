//! Scheduling configuration for the delivery dispatcher.

use herald_tracking::TrackingConfig;
use serde::Deserialize;

const fn default_tick_interval() -> u64 {
    5
}

const fn default_stale_after() -> u64 {
    300 // 5 minutes
}

const fn default_send_concurrency() -> usize {
    3
}

const fn default_max_batch_size() -> u32 {
    10
}

/// Tuning knobs for the scheduling loop.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Seconds between scheduling ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Items stuck in `processing` longer than this many seconds are
    /// reclaimed at the start of each tick.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Simultaneous sends within a tick. Each sub-group of this size is
    /// awaited before the next begins.
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// Upper bound on items requested per tick, before rate limiting.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,

    /// Tracking endpoint locations.
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            stale_after_secs: default_stale_after(),
            send_concurrency: default_send_concurrency(),
            max_batch_size: default_max_batch_size(),
            tracking: TrackingConfig::default(),
        }
    }
}
