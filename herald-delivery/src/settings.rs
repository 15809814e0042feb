//! Operator-configurable settings.

use async_trait::async_trait;
use dashmap::DashMap;

/// Setting key for the hourly send budget.
pub const MAX_EMAILS_PER_HOUR: &str = "max_emails_per_hour";

/// Setting key for the retry cap.
pub const EMAIL_RETRY_ATTEMPTS: &str = "email_retry_attempts";

/// Hourly send budget used when the setting is absent or unparseable.
pub const DEFAULT_MAX_EMAILS_PER_HOUR: u32 = 300;

/// Retry cap used when the setting is absent or unparseable.
pub const DEFAULT_EMAIL_RETRY_ATTEMPTS: u32 = 3;

/// Read access to operator settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Raw setting lookup; `None` means "use the documented default".
    async fn get_setting(&self, key: &str) -> Option<String>;
}

/// Parse a numeric setting, falling back to its default.
pub(crate) async fn read_u32(settings: &dyn SettingsStore, key: &str, default: u32) -> u32 {
    settings
        .get_setting(key)
        .await
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: DashMap<String, String>,
}

impl MemorySettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get_setting(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|entry| entry.value().clone())
    }
}
