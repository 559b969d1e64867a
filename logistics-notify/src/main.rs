use std::sync::Arc;

use logistics_notify::api::ApiServer;
use logistics_notify::config::AppConfig;
use logistics_notify::services::ServiceContainer;
use logistics_notify::{logging, panic_hook};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;
    panic_hook::install();

    let retention_token = CancellationToken::new();
    logging_config.start_retention_cleanup(retention_token.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        timezone = %config.timezone,
        "Starting logistics-notify"
    );

    let api_config = config.api.clone();
    let services = ServiceContainer::new(config)?;
    services.start();

    let server = Arc::new(ApiServer::with_state(
        api_config,
        services.app_state(Some(logging_config)),
    ));
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "API server stopped with error");
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    services.shutdown();
    server.shutdown();
    retention_token.cancel();
    if let Err(e) = server_task.await {
        error!(error = %e, "API server task failed");
    }

    info!("logistics-notify stopped");
    Ok(())
}
