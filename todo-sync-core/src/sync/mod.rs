//! The sync engine and the types it reports with.
//!
//! ## States
//!
//! A list is classified by comparing its local copy with the ledger record
//! of the same name:
//! - no record: `Unsynced`
//! - record only, or ledger version higher: `RemoteAhead`
//! - local version higher: `LocalAhead`
//! - record belongs to a different list id: `Conflict`
//! - equal versions: `Synced`
//!
//! `LocalAhead` is never resolved automatically. The caller either forces a
//! push or pulls with local changes discarded.

mod engine;
mod state;

pub use engine::SyncEngine;
pub use state::{
    DeleteOutcome, ListSyncState, PullSummary, RemoteCleanup, SyncAction, SyncOptions,
    SyncReport, SyncStatus, DEFAULT_CONCURRENCY,
};
