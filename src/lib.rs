//! Herald: a campaign delivery queue for bulk email.
//!
//! The workspace crates do the work; this crate wires them into a runnable
//! daemon and re-exports the public surface.

use std::{collections::HashMap, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub use herald_common as common;
pub use herald_delivery as delivery;
pub use herald_store as store;
pub use herald_tracking as tracking;

use herald_delivery::{DeliveryConfig, SmtpConfig};

/// Top-level daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    /// Operator identifier stamped into tracking tokens.
    pub sender_id: String,

    pub smtp: SmtpConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Seed values for the settings store, e.g. `max_emails_per_hour`.
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl HeraldConfig {
    /// Load and parse a configuration file.
    ///
    /// # Errors
    /// When the file cannot be read or does not parse as TOML.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
