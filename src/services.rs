//! Builds the stores and the sync engine from configuration.

use std::sync::Arc;

use todo_sync_core::{
    HttpBlobStore, LocalStore, NetworkConfig, RetryOperator, RpcLedgerClient, SyncEngine,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn local_store(config: &Config) -> LocalStore {
    LocalStore::new(config.data_dir.value.clone())
}

/// Connects the engine to the configured network.
pub fn engine(config: &Config) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let owner = config.owner()?;
    let network = NetworkConfig::from_env(config.network.value)?;
    let blobs = HttpBlobStore::from_config(&network)?;
    let ledger = RpcLedgerClient::from_config(&network, owner, config.private_key())?;
    debug!(network = %network.network, owner, "connected services");

    Ok(SyncEngine::new(
        local_store(config),
        Arc::new(blobs),
        Arc::new(ledger),
        RetryOperator::default(),
    ))
}

pub fn runtime() -> Result<Runtime, Box<dyn std::error::Error>> {
    Ok(Runtime::new()?)
}

/// A token cancelled on Ctrl-C. Must be called inside the runtime.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}
