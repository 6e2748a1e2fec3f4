//! Environment-driven endpoint configuration for the blob store and ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TodoError;

pub const ENV_NETWORK: &str = "TODO_SYNC_NETWORK";
pub const ENV_RPC_URL: &str = "TODO_SYNC_RPC_URL";
pub const ENV_PACKAGE_ID: &str = "TODO_SYNC_PACKAGE_ID";
pub const ENV_MODULE: &str = "TODO_SYNC_MODULE";
pub const ENV_STORAGE_URL: &str = "TODO_SYNC_STORAGE_URL";
pub const ENV_STORAGE_EPOCHS: &str = "TODO_SYNC_STORAGE_EPOCHS";

const DEFAULT_MODULE: &str = "todo_list";
const DEFAULT_EPOCHS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
    Devnet,
    Local,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
            Network::Devnet => write!(f, "devnet"),
            Network::Local => write!(f, "local"),
        }
    }
}

impl FromStr for Network {
    type Err = TodoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testnet" | "test" => Ok(Network::Testnet),
            "mainnet" | "main" => Ok(Network::Mainnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            "local" | "localnet" => Ok(Network::Local),
            _ => Err(TodoError::validation(format!(
                "Invalid network '{}'. Valid options: testnet, mainnet, devnet, local",
                s
            ))),
        }
    }
}

impl Network {
    fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            Network::Local => Some("http://127.0.0.1:9000"),
            _ => None,
        }
    }

    fn default_storage(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Network::Testnet => Some((
                "https://publisher.walrus-testnet.walrus.space",
                "https://aggregator.walrus-testnet.walrus.space",
            )),
            Network::Local => Some(("http://127.0.0.1:31415", "http://127.0.0.1:31415")),
            _ => None,
        }
    }
}

/// Endpoints and identifiers used by the network-backed stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    pub network: Network,
    pub rpc_url: Option<String>,
    pub package_id: Option<String>,
    pub module: String,
    pub publisher_url: Option<String>,
    pub aggregator_url: Option<String>,
    pub epochs: u32,
}

impl NetworkConfig {
    /// Defaults for a network with no overrides applied.
    pub fn for_network(network: Network) -> Self {
        let (publisher_url, aggregator_url) = match network.default_storage() {
            Some((p, a)) => (Some(p.to_string()), Some(a.to_string())),
            None => (None, None),
        };
        Self {
            network,
            rpc_url: network.default_rpc_url().map(str::to_string),
            package_id: None,
            module: DEFAULT_MODULE.to_string(),
            publisher_url,
            aggregator_url,
            epochs: DEFAULT_EPOCHS,
        }
    }

    /// Builds the configuration from the process environment.
    ///
    /// `fallback` is the network used when `TODO_SYNC_NETWORK` is unset.
    pub fn from_env(fallback: Network) -> Result<Self, TodoError> {
        Self::from_lookup(fallback, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(fallback: Network, lookup: F) -> Result<Self, TodoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match lookup(ENV_NETWORK) {
            Some(value) => value.parse()?,
            None => fallback,
        };
        let mut config = Self::for_network(network);

        if let Some(url) = lookup(ENV_RPC_URL) {
            config.rpc_url = Some(url);
        }
        if let Some(package_id) = lookup(ENV_PACKAGE_ID) {
            config.package_id = Some(package_id);
        }
        if let Some(module) = lookup(ENV_MODULE) {
            config.module = module;
        }
        if let Some(url) = lookup(ENV_STORAGE_URL) {
            config.publisher_url = Some(url.clone());
            config.aggregator_url = Some(url);
        }
        if let Some(epochs) = lookup(ENV_STORAGE_EPOCHS) {
            config.epochs = epochs.parse().map_err(|_| {
                TodoError::validation(format!("{} must be a number, got '{}'", ENV_STORAGE_EPOCHS, epochs))
            })?;
        }

        Ok(config)
    }

    pub fn require_rpc_url(&self) -> Result<&str, TodoError> {
        self.rpc_url.as_deref().ok_or_else(|| {
            TodoError::validation(format!(
                "no ledger RPC endpoint for {}. Set {}",
                self.network, ENV_RPC_URL
            ))
        })
    }

    pub fn require_package_id(&self) -> Result<&str, TodoError> {
        self.package_id.as_deref().ok_or_else(|| {
            TodoError::validation(format!("no package id configured. Set {}", ENV_PACKAGE_ID))
        })
    }

    pub fn require_storage(&self) -> Result<(&str, &str), TodoError> {
        match (self.publisher_url.as_deref(), self.aggregator_url.as_deref()) {
            (Some(p), Some(a)) => Ok((p, a)),
            _ => Err(TodoError::validation(format!(
                "no storage endpoint for {}. Set {}",
                self.network, ENV_STORAGE_URL
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!(Network::from_str("test").unwrap(), Network::Testnet);
        assert_eq!(Network::from_str("MAINNET").unwrap(), Network::Mainnet);
        assert_eq!(Network::from_str("dev").unwrap(), Network::Devnet);
        assert_eq!(Network::from_str("local").unwrap(), Network::Local);
        assert!(Network::from_str("moon").is_err());
    }

    #[test]
    fn test_defaults_without_env() {
        let config = NetworkConfig::from_lookup(Network::Local, lookup(&[])).unwrap();
        assert_eq!(config.network, Network::Local);
        assert_eq!(config.rpc_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.module, "todo_list");
        assert_eq!(config.epochs, 5);
        assert!(config.require_package_id().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = NetworkConfig::from_lookup(
            Network::Testnet,
            lookup(&[
                (ENV_NETWORK, "devnet"),
                (ENV_RPC_URL, "https://rpc.example"),
                (ENV_PACKAGE_ID, "0x42"),
                (ENV_MODULE, "lists"),
                (ENV_STORAGE_URL, "https://storage.example"),
                (ENV_STORAGE_EPOCHS, "10"),
            ]),
        )
        .unwrap();

        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.require_rpc_url().unwrap(), "https://rpc.example");
        assert_eq!(config.require_package_id().unwrap(), "0x42");
        assert_eq!(config.module, "lists");
        assert_eq!(
            config.require_storage().unwrap(),
            ("https://storage.example", "https://storage.example")
        );
        assert_eq!(config.epochs, 10);
    }

    #[test]
    fn test_mainnet_requires_overrides() {
        let config = NetworkConfig::for_network(Network::Mainnet);
        assert!(config.require_rpc_url().is_err());
        assert!(config.require_storage().is_err());
    }

    #[test]
    fn test_bad_epochs_rejected() {
        let result =
            NetworkConfig::from_lookup(Network::Local, lookup(&[(ENV_STORAGE_EPOCHS, "many")]));
        assert!(result.is_err());
    }
}
