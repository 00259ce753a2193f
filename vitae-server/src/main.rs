//! Vitae Server - main entry point.

use anyhow::Result;
use vitae_common::config::Settings;
use vitae_common::logging::init_logging;
use vitae_server::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    init_logging(
        &settings.observability.log_level,
        &settings.observability.log_format,
    );

    tracing::info!("Vitae Server v{}", env!("CARGO_PKG_VERSION"));

    // Start the WebSocket chat server
    start_server(settings).await
}
