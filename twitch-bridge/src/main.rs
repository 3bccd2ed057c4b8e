use tracing::{error, info};
use twitch_bridge::config::BridgeConfig;
use twitch_bridge::logging;
use twitch_bridge::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = BridgeConfig::from_env()?;
    logging::init_logging(&config.log_level)?;

    info!(node = %config.node_id(), "Starting twitch-bridge");
    let container = ServiceContainer::new(config);

    if let Err(e) = container.start().await {
        error!(error = %e, "Failed to start services");
        container.shutdown().await?;
        return Err(e.into());
    }

    let fault = container.cancellation_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received shutdown signal");
        }
        _ = fault.cancelled() => error!("Service fault, shutting down"),
    }

    container.shutdown().await?;
    if let Some(e) = container.take_fault() {
        return Err(e.into());
    }
    Ok(())
}
