mod config_cmd;
mod sync_cmd;
mod todo;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use sync_cmd::{PublishCommand, PullCommand, StatusCommand, SyncCommand};
pub use todo::{AddCommand, DeleteCommand, ListCommand, ToggleCommand, UpdateCommand};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
