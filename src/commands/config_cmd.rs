use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::{Config, ConfigValue, ENV_PRIVATE_KEY};
use crate::services::CommandResult;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# todo-sync configuration

# Network whose endpoints are used: testnet, mainnet, devnet or local
network: testnet

# Account that owns your lists
wallet_address: ""

# Hex ed25519 seed used to sign ledger writes.
# Prefer exporting TODO_SYNC_PRIVATE_KEY over storing it here.
# private_key: "0x..."

# Mark new todos as encrypted
encrypted_storage: false

# Where list documents are stored (default: platform data directory)
# data_dir: ~/.local/share/todo-sync
"#;

impl ConfigCommand {
    pub fn run(&self, config: &Config, config_path: Option<PathBuf>) -> CommandResult {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        print_value("network", &config.network);
                        print_value("wallet_address", &config.wallet_address);
                        match &config.private_key {
                            Some(key) => {
                                println!("private_key: (set)");
                                println!("  source: {}", key.source);
                            }
                            None => {
                                println!("private_key: (not set, export {})", ENV_PRIVATE_KEY);
                            }
                        }
                        println!();
                        print_value("encrypted_storage", &config.encrypted_storage);
                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'todo-sync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nSet wallet_address, then export {} to publish.", ENV_PRIVATE_KEY);
                Ok(())
            }
        }
    }
}

fn print_value<T: std::fmt::Display>(key: &str, value: &ConfigValue<T>) {
    println!("{}: {}", key, value.value);
    println!("  source: {}", value.source);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, DEFAULT_CONFIG).unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.encrypted_storage.source, ConfigSource::File);
        assert!(!config.encrypted_storage.value);
    }

    #[test]
    fn test_init_writes_to_given_path() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");
        let config = Config::load(Some(path.clone())).unwrap();

        let cmd = ConfigCommand {
            command: ConfigSubcommand::Init,
        };
        cmd.run(&config, Some(path.clone())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
