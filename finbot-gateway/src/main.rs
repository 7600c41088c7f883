//! FinBot Gateway - Main entry point.

use anyhow::Result;
use finbot_common::config::Config;
use finbot_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let config = Config::load_and_validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("FinBot Gateway v{}", env!("CARGO_PKG_VERSION"));

    finbot_gateway::start_server(&config).await
}
