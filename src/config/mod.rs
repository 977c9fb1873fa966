mod file_config;

pub use file_config::{DispatcherConfig, FileConfig, ReservationNoticesConfig};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::Level;

/// Upper bound for reservation notice delay and ttl: 100 years.
pub const MAX_NOTICE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub logging_level: Level,
    pub run_tick_interval_ms: u64,
    pub expire_tick_interval_ms: u64,
    pub reservation_notice_delay_secs: u64,
    pub reservation_notice_ttl_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            logging_level: Level::INFO,
            run_tick_interval_ms: 1000,
            expire_tick_interval_ms: 1000,
            reservation_notice_delay_secs: 0,
            reservation_notice_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub logging_level: Level,

    // Feature configs (with defaults)
    pub dispatcher: DispatcherSettings,
    pub reservation_notices: ReservationNoticeSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let logging_level = match file.logging_level {
            Some(level) => parse_logging_level(&level)
                .with_context(|| format!("Invalid logging_level in config file: {}", level))?,
            None => cli.logging_level,
        };

        let dispatcher_file = file.dispatcher.unwrap_or_default();
        let run_tick_interval_ms = dispatcher_file
            .run_tick_interval_ms
            .unwrap_or(cli.run_tick_interval_ms);
        let expire_tick_interval_ms = dispatcher_file
            .expire_tick_interval_ms
            .unwrap_or(cli.expire_tick_interval_ms);

        if run_tick_interval_ms == 0 {
            bail!("run_tick_interval_ms must be greater than zero");
        }
        if expire_tick_interval_ms == 0 {
            bail!("expire_tick_interval_ms must be greater than zero");
        }

        let dispatcher = DispatcherSettings {
            run_tick_interval: Duration::from_millis(run_tick_interval_ms),
            expire_tick_interval: Duration::from_millis(expire_tick_interval_ms),
        };

        let notices_file = file.reservation_notices.unwrap_or_default();
        let reservation_notices = ReservationNoticeSettings {
            delay_secs: notices_file
                .delay_secs
                .unwrap_or(cli.reservation_notice_delay_secs),
            ttl_secs: notices_file
                .ttl_secs
                .unwrap_or(cli.reservation_notice_ttl_secs),
        };

        if reservation_notices.delay_secs > MAX_NOTICE_SECS {
            bail!(
                "Reservation notice delay ({}s) must not exceed {}s",
                reservation_notices.delay_secs,
                MAX_NOTICE_SECS
            );
        }
        if reservation_notices.ttl_secs > MAX_NOTICE_SECS {
            bail!(
                "Reservation notice ttl ({}s) must not exceed {}s",
                reservation_notices.ttl_secs,
                MAX_NOTICE_SECS
            );
        }
        if reservation_notices.ttl_secs <= reservation_notices.delay_secs {
            bail!(
                "Reservation notice ttl ({}s) must be greater than its delay ({}s)",
                reservation_notices.ttl_secs,
                reservation_notices.delay_secs
            );
        }

        Ok(Self {
            logging_level,
            dispatcher,
            reservation_notices,
        })
    }
}

/// Tick periods of the dispatching service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub run_tick_interval: Duration,
    pub expire_tick_interval: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            run_tick_interval: Duration::from_secs(1),
            expire_tick_interval: Duration::from_secs(1),
        }
    }
}

/// Timing of the notices sent after a reservation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationNoticeSettings {
    pub delay_secs: u64,
    pub ttl_secs: u64,
}

impl Default for ReservationNoticeSettings {
    fn default() -> Self {
        Self {
            delay_secs: 0,
            ttl_secs: 3600,
        }
    }
}

impl ReservationNoticeSettings {
    /// Scheduled time and deadline for a notice about an event that happened at `event_at`.
    pub fn window(&self, event_at: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((
            offset(event_at, self.delay_secs)?,
            offset(event_at, self.ttl_secs)?,
        ))
    }
}

fn offset(at: DateTime<Utc>, secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .and_then(|delta| at.checked_add_signed(delta))
        .with_context(|| format!("{}s after {} is out of range", secs, at))
}

/// Parses a logging level string ("info", "DEBUG", ...).
fn parse_logging_level(s: &str) -> Option<Level> {
    s.parse::<Level>().ok()
}
