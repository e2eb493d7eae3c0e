pub mod catalog;
pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use catalog::{QueryEngine, TrinoClient};
use common::config::Settings;
use common::Result;
use services::{CycleReport, Poller, ShipmentConverter};
use tokio_util::sync::CancellationToken;

/// Connects to storage and the query engine and makes sure the table
/// exists. Any failure here is fatal to the process.
pub async fn build_poller(settings: &Settings) -> Result<Poller> {
    let storage = storage::open_bucket(&settings.minio).await?;
    let engine: Arc<dyn QueryEngine> = Arc::new(TrinoClient::new(&settings.trino)?);

    let converter = ShipmentConverter::new(storage.clone(), engine, settings);
    converter.ensure_table().await?;

    Ok(Poller::new(storage, converter, &settings.pipeline))
}

/// Runs the converter until `shutdown` is cancelled.
pub async fn run_converter(config_path: &str, shutdown: CancellationToken) -> Result<()> {
    let settings = Settings::new(config_path)?;
    let poller = build_poller(&settings).await?;

    poller.run(shutdown).await;
    Ok(())
}

/// Runs a single poll cycle and returns what it did.
pub async fn run_single_cycle(config_path: &str) -> Result<CycleReport> {
    let settings = Settings::new(config_path)?;
    let poller = build_poller(&settings).await?;

    poller.run_cycle(&CancellationToken::new()).await
}
