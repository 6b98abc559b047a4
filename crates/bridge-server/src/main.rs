//! # LED Bridge Server
//!
//! Bridges an MQTT broker of LED controllers and web viewers.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (broker on localhost:1883, HTTP on 127.0.0.1:3000)
//! ledbridge
//!
//! # Run with a config file
//! LEDBRIDGE_CONFIG=/path/to/ledbridge.toml ledbridge
//!
//! # Run with environment overrides
//! LEDBRIDGE_PORT=8080 LEDBRIDGE_BROKER__HOST=broker.local ledbridge
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ledbridge=debug,ledbridge_core=debug,ledbridge_transport=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting LED bridge on {}:{} (broker {}:{})",
        config.host,
        config.port,
        config.broker.host,
        config.broker.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the bridge
    handlers::run_server(config).await?;

    Ok(())
}
