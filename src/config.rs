use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use todo_sync_core::Network;

pub const ENV_WALLET: &str = "TODO_SYNC_WALLET";
pub const ENV_PRIVATE_KEY: &str = "TODO_SYNC_PRIVATE_KEY";
pub const ENV_DATA_DIR: &str = "TODO_SYNC_DATA_DIR";
pub const ENV_NETWORK: &str = "TODO_SYNC_NETWORK";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Network whose endpoints are used by default
    pub network: ConfigValue<Network>,
    /// Account that owns new lists
    pub wallet_address: ConfigValue<String>,
    /// Hex signing key for ledger writes
    #[serde(skip_serializing)]
    pub private_key: Option<ConfigValue<String>>,
    /// Mark new todos as encrypted
    pub encrypted_storage: ConfigValue<bool>,
    /// Directory holding list documents
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    network: Option<String>,
    #[serde(alias = "walletAddress")]
    wallet_address: Option<String>,
    #[serde(alias = "privateKey")]
    private_key: Option<String>,
    #[serde(alias = "encryptedStorage")]
    encrypted_storage: Option<bool>,
    #[serde(alias = "dataDir")]
    data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    fn load_with<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut network = ConfigValue::new(Network::default(), ConfigSource::Default);
        let mut wallet_address = ConfigValue::new(String::new(), ConfigSource::Default);
        let mut private_key = None;
        let mut encrypted_storage = ConfigValue::new(false, ConfigSource::Default);
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(name) = file_config.network {
                network = ConfigValue::new(parse_network(&name)?, ConfigSource::File);
            }
            if let Some(address) = file_config.wallet_address {
                wallet_address = ConfigValue::new(address, ConfigSource::File);
            }
            if let Some(key) = file_config.private_key {
                private_key = Some(ConfigValue::new(key, ConfigSource::File));
            }
            if let Some(encrypted) = file_config.encrypted_storage {
                encrypted_storage = ConfigValue::new(encrypted, ConfigSource::File);
            }
            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
        }

        if let Some(name) = env(ENV_NETWORK) {
            network = ConfigValue::new(parse_network(&name)?, ConfigSource::Environment);
        }
        if let Some(address) = env(ENV_WALLET) {
            wallet_address = ConfigValue::new(address, ConfigSource::Environment);
        }
        if let Some(key) = env(ENV_PRIVATE_KEY) {
            private_key = Some(ConfigValue::new(key, ConfigSource::Environment));
        }
        if let Some(dir) = env(ENV_DATA_DIR) {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }

        Ok(Self {
            network,
            wallet_address,
            private_key,
            encrypted_storage,
            data_dir,
            config_file,
        })
    }

    /// Owner recorded on new lists and used for ledger lookups.
    pub fn owner(&self) -> Result<&str, ConfigError> {
        let address = self.wallet_address.value.trim();
        if address.is_empty() {
            Err(ConfigError::MissingValue("wallet_address", ENV_WALLET))
        } else {
            Ok(address)
        }
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_ref().map(|k| k.value.as_str())
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/todo-sync/
    /// - macOS: ~/Library/Application Support/todo-sync/
    /// - Windows: %APPDATA%/todo-sync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todo-sync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/todo-sync/
    /// - macOS: ~/Library/Application Support/todo-sync/
    /// - Windows: %APPDATA%/todo-sync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todo-sync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_network(name: &str) -> Result<Network, ConfigError> {
    name.parse()
        .map_err(|_| ConfigError::InvalidValue("network", name.to_string()))
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    MissingValue(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
            ConfigError::MissingValue(key, env) => {
                write!(
                    f,
                    "{} is not set. Add it to the config file or export {}",
                    key, env
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with(Some(config_path), no_env).unwrap();
        assert_eq!(config.network.value, Network::Testnet);
        assert_eq!(config.network.source, ConfigSource::Default);
        assert!(config
            .data_dir
            .value
            .to_string_lossy()
            .contains("todo-sync"));
        assert!(!config.encrypted_storage.value);
        assert!(config.private_key.is_none());
        assert!(config.config_file.is_none());
        assert!(config.owner().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "network: local").unwrap();
        writeln!(file, "wallet_address: '0xabc'").unwrap();
        writeln!(file, "encrypted_storage: true").unwrap();
        writeln!(file, "data_dir: lists").unwrap();

        let config = Config::load_with(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.network.value, Network::Local);
        assert_eq!(config.network.source, ConfigSource::File);
        assert_eq!(config.owner().unwrap(), "0xabc");
        assert!(config.encrypted_storage.value);
        assert_eq!(config.data_dir.value, temp_dir.path().join("lists"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_camel_case_keys() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "walletAddress: '0xdef'").unwrap();
        writeln!(file, "privateKey: '0x01'").unwrap();

        let config = Config::load_with(Some(config_path), no_env).unwrap();
        assert_eq!(config.owner().unwrap(), "0xdef");
        assert_eq!(config.private_key(), Some("0x01"));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "wallet_address: '0xfile'").unwrap();
        writeln!(file, "network: mainnet").unwrap();

        let env = |key: &str| match key {
            ENV_WALLET => Some("0xenv".to_string()),
            ENV_NETWORK => Some("devnet".to_string()),
            ENV_PRIVATE_KEY => Some("0x02".to_string()),
            _ => None,
        };
        let config = Config::load_with(Some(config_path), env).unwrap();
        assert_eq!(config.owner().unwrap(), "0xenv");
        assert_eq!(config.wallet_address.source, ConfigSource::Environment);
        assert_eq!(config.network.value, Network::Devnet);
        assert_eq!(
            config.private_key.as_ref().unwrap().source,
            ConfigSource::Environment
        );
    }

    #[test]
    fn test_private_key_not_serialized() {
        let env = |key: &str| (key == ENV_PRIVATE_KEY).then(|| "0xsecret".to_string());
        let temp_dir = tempdir().unwrap();
        let config = Config::load_with(Some(temp_dir.path().join("none.yaml")), env).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("0xsecret"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load_with(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_invalid_network() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "network: moon").unwrap();

        let err = Config::load_with(Some(config_path), no_env).unwrap_err();
        assert!(err.to_string().contains("network"));
    }
}
