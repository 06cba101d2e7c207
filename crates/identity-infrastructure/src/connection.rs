//! Store entry point: connect to the backend and build the gateway

use std::sync::Arc;

use identity_core::{StoreGateway, StoreResult};
use identity_shared::config::StoreConfig;
use tracing::info;

use crate::redis_backend::RedisBackend;

/// Opens a gateway on `address` (host:port) with default settings.
pub async fn open(address: &str) -> StoreResult<StoreGateway> {
    let mut config = StoreConfig::default();
    config.backend.address = address.to_string();
    open_with_config(&config).await
}

/// Opens a gateway from loaded configuration. The connection stays open
/// until `StoreGateway::close`.
pub async fn open_with_config(config: &StoreConfig) -> StoreResult<StoreGateway> {
    info!("Connecting to backend at {}...", config.backend.address);
    let backend = RedisBackend::connect(&config.backend.address).await?;
    Ok(StoreGateway::with_config(Arc::new(backend), config))
}
