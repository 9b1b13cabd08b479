//! # Webchannel Hub
//!
//! WebSocket hub that lets remote contexts share named channels.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! webchannel-hub
//!
//! # Run with custom config
//! webchannel-hub --config /path/to/webchannel.toml
//!
//! # Run with environment overrides
//! WEBCHANNEL_PORT=8080 WEBCHANNEL_HOST=0.0.0.0 webchannel-hub
//! WEBCHANNEL_LIMITS__MAX_CHANNELS=100 webchannel-hub
//! ```

mod config;
mod handlers;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webchannel_hub=debug,webchannel_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match config_path() {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!(
        "Starting webchannel hub on {}:{}",
        config.host,
        config.port
    );

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

/// Path given with `--config`, if any.
fn config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}
