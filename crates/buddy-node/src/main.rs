//! # Buddy Node
//!
//! Presence console: a local buddy and a few simulated ones sharing an
//! in-process channel.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! buddy
//!
//! # Run with a custom config
//! BUDDY_CONFIG=/path/to/buddy.toml buddy
//!
//! # Run with environment variables
//! BUDDY_NAME=Dana BUDDY_STRICT=true buddy
//! ```

mod app;
mod config;
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
                .unwrap_or_else(|_| "buddy=debug,buddy_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        name = %config.presence.display_name,
        session = %config.session.session_id,
        "Starting buddy node"
    );

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::warn!(error = %e, "Failed to start metrics server");
        }
    }

    app::run(config).await?;

    Ok(())
}
