//! Watcher binary that polls a Nano node for funds sent to invoice pay
//! addresses.

use std::io;

use nanopay_domain::config::WatcherConfig;
use nanopay_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use nanopay_storage::SeaOrmStorage;
use nanopay_watcher::{run_watcher, NodeRpcClient, WatcherError, WebhookDispatcher};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[watcher] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), WatcherError> {
    let config = WatcherConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("WATCHER");
    init_telemetry(&telemetry_config)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let ledger = NodeRpcClient::new(config.nano_rpc_url())?;
    let dispatcher = WebhookDispatcher::new(storage.clone(), config.webhook_timeout())?
        .with_site_url(config.site_url());
    run_watcher(&config, storage, ledger, dispatcher).await
}
