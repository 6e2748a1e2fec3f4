//! Commands that talk to the blob store and the ledger.

use std::time::Duration;

use clap::Args;
use todo_sync_core::sync::DEFAULT_CONCURRENCY;
use todo_sync_core::{SyncOptions, SyncReport};

use super::OutputFormat;
use crate::config::Config;
use crate::services::{self, CommandResult};

/// Reconcile a list with the ledger
#[derive(Args)]
pub struct SyncCommand {
    /// List name
    pub list: String,

    /// Push local changes even when the ledger is behind
    #[arg(long)]
    pub force: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Blob transfers to run at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl SyncCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let engine = services::engine(config)?.with_concurrency(self.concurrency);
        let rt = services::runtime()?;
        let report = rt.block_on(async {
            let options = options(self.force, self.timeout);
            engine.sync(&self.list, &options).await
        })?;
        print_report(&report, &self.format)
    }
}

/// Upload local changes and raise the ledger version
#[derive(Args)]
pub struct PublishCommand {
    /// List name
    pub list: String,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Blob transfers to run at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl PublishCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let engine = services::engine(config)?.with_concurrency(self.concurrency);
        let rt = services::runtime()?;
        let report = rt.block_on(async {
            let options = options(false, self.timeout);
            engine.publish(&self.list, &options).await
        })?;
        print_report(&report, &self.format)
    }
}

/// Fetch the ledger state into the local list
#[derive(Args)]
pub struct PullCommand {
    /// List name
    pub list: String,

    /// Drop unpublished local changes (private todos are kept)
    #[arg(long)]
    pub discard_local: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Blob transfers to run at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl PullCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let engine = services::engine(config)?.with_concurrency(self.concurrency);
        let rt = services::runtime()?;
        let report = rt.block_on(async {
            let options = options(false, self.timeout);
            engine.pull(&self.list, self.discard_local, &options).await
        })?;
        print_report(&report, &self.format)
    }
}

/// Show whether a list is in step with the ledger
#[derive(Args)]
pub struct StatusCommand {
    /// List name
    pub list: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl StatusCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let engine = services::engine(config)?;
        let rt = services::runtime()?;
        let status = rt.block_on(engine.status(&self.list))?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            OutputFormat::Text => println!("{}", status),
        }
        Ok(())
    }
}

/// Builds options that cancel on Ctrl-C. Must be called inside the runtime.
fn options(force: bool, timeout: Option<u64>) -> SyncOptions {
    let mut options = SyncOptions {
        force,
        ..SyncOptions::default()
    }
    .with_cancel(services::interrupt_token());
    if let Some(secs) = timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    options
}

fn print_report(report: &SyncReport, format: &OutputFormat) -> CommandResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => println!("{}", report),
    }
    if report.pull.as_ref().is_some_and(|p| p.is_partial()) {
        eprintln!("Warning: some todos could not be fetched.");
    }
    Ok(())
}
