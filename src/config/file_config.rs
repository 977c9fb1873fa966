use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub logging_level: Option<String>,

    // Feature configs
    pub dispatcher: Option<DispatcherConfig>,
    pub reservation_notices: Option<ReservationNoticesConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatcherConfig {
    pub run_tick_interval_ms: Option<u64>,
    pub expire_tick_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ReservationNoticesConfig {
    /// How long after the reservation event the notice is sent.
    pub delay_secs: Option<u64>,
    /// How long after the reservation event the notice is dropped if still unsent.
    pub ttl_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
