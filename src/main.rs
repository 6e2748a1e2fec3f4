use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod services;

use commands::{
    AddCommand, ConfigCommand, DeleteCommand, ListCommand, PublishCommand, PullCommand,
    StatusCommand, SyncCommand, ToggleCommand, UpdateCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "todo-sync")]
#[command(version)]
#[command(about = "Local-first todo lists synced through a blob store and a ledger", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a todo to a list
    Add(AddCommand),

    /// Show lists, or the todos in one list
    List(ListCommand),

    /// Edit a todo
    Update(UpdateCommand),

    /// Flip a todo between done and not done
    Toggle(ToggleCommand),

    /// Delete a todo or a whole list
    Delete(DeleteCommand),

    /// Reconcile a list with the ledger
    Sync(SyncCommand),

    /// Upload local changes and raise the ledger version
    Publish(PublishCommand),

    /// Fetch the ledger state into the local list
    Pull(PullCommand),

    /// Show whether a list is in step with the ledger
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.clone())?;

    match cli.command {
        Some(Commands::Add(cmd)) => cmd.run(&config)?,
        Some(Commands::List(cmd)) => cmd.run(&config)?,
        Some(Commands::Update(cmd)) => cmd.run(&config)?,
        Some(Commands::Toggle(cmd)) => cmd.run(&config)?,
        Some(Commands::Delete(cmd)) => cmd.run(&config)?,
        Some(Commands::Sync(cmd)) => cmd.run(&config)?,
        Some(Commands::Publish(cmd)) => cmd.run(&config)?,
        Some(Commands::Pull(cmd)) => cmd.run(&config)?,
        Some(Commands::Status(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli.config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
