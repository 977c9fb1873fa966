use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wishlist_server::background_jobs::{create_dispatcher, Reactor, ResourceScope};
use wishlist_server::config;
use wishlist_server::metrics;
use wishlist_server::notifications::{LogNotificationSink, NotificationSink};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Default log level, used when LOG_LEVEL is not set.
    #[clap(long, default_value = "info")]
    pub logging_level: Level,

    /// Milliseconds between two "run due jobs" ticks.
    #[clap(long, default_value_t = 1000)]
    pub run_tick_interval_ms: u64,

    /// Milliseconds between two "expire overdue jobs" ticks.
    #[clap(long, default_value_t = 1000)]
    pub expire_tick_interval_ms: u64,

    /// Seconds between a reservation event and its notice.
    #[clap(long, default_value_t = 0)]
    pub reservation_notice_delay_secs: u64,

    /// Seconds after a reservation event past which its notice is dropped.
    #[clap(long, default_value_t = 3600)]
    pub reservation_notice_ttl_secs: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            logging_level: args.logging_level,
            run_tick_interval_ms: args.run_tick_interval_ms,
            expire_tick_interval_ms: args.expire_tick_interval_ms,
            reservation_notice_delay_secs: args.reservation_notice_delay_secs,
            reservation_notice_ttl_secs: args.reservation_notice_ttl_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => Some(config::FileConfig::load(path)?),
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(app_config.logging_level).into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some(path) = &cli_args.config {
        info!("Loaded configuration from {:?}", path);
    }
    info!("Configuration loaded:");
    info!(
        "  run tick: {:?}, expire tick: {:?}",
        app_config.dispatcher.run_tick_interval, app_config.dispatcher.expire_tick_interval
    );
    info!(
        "  reservation notices: delay {}s, ttl {}s",
        app_config.reservation_notices.delay_secs, app_config.reservation_notices.ttl_secs
    );

    // Initialize metrics system
    info!("Initializing metrics...");
    metrics::init_metrics();

    let reactor = Reactor::current().context("Dispatcher must run inside a tokio runtime")?;
    let (dispatcher, handle) = create_dispatcher(app_config.dispatcher.clone(), reactor);

    let sink: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
    dispatcher.attach(ResourceScope::new().with(sink));
    dispatcher.start();

    info!("Dispatcher ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping dispatcher...");
    dispatcher.stop().await;

    let pending = handle.pending_jobs();
    if !pending.is_empty() {
        info!(
            "{} pending jobs dropped: {}",
            pending.len(),
            serde_json::to_string(&pending)?
        );
    }
    tracing::debug!("Final metrics:\n{}", metrics::gather_metrics());

    Ok(())
}
