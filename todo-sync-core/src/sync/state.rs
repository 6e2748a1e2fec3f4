//! Sync states, options and the reports returned by engine operations.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::models::{LedgerRecord, PublishReceipt, TodoList};

/// Default number of blob calls in flight during one sync.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Where a list stands relative to its ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListSyncState {
    /// Local copy exists but was never published.
    Unsynced,
    /// Local version is above the ledger version.
    LocalAhead,
    /// Ledger version is above the local version, or only the ledger knows the list.
    RemoteAhead,
    /// The ledger holds a different list under the same name.
    Conflict,
    Synced,
}

impl ListSyncState {
    /// Classifies a list from its local copy and ledger record.
    pub fn classify(local: Option<&TodoList>, record: Option<&LedgerRecord>) -> Self {
        match (local, record) {
            (None, None) | (Some(_), None) => ListSyncState::Unsynced,
            (None, Some(_)) => ListSyncState::RemoteAhead,
            (Some(list), Some(record)) if list.id != record.id => ListSyncState::Conflict,
            (Some(list), Some(record)) => match list.version.cmp(&record.version) {
                std::cmp::Ordering::Equal => ListSyncState::Synced,
                std::cmp::Ordering::Less => ListSyncState::RemoteAhead,
                std::cmp::Ordering::Greater => ListSyncState::LocalAhead,
            },
        }
    }
}

impl fmt::Display for ListSyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListSyncState::Unsynced => "unsynced",
            ListSyncState::LocalAhead => "local-ahead",
            ListSyncState::RemoteAhead => "remote-ahead",
            ListSyncState::Conflict => "conflict",
            ListSyncState::Synced => "synced",
        };
        write!(f, "{}", s)
    }
}

/// Bounds on a single engine operation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Push local changes even when the ledger is behind.
    pub force: bool,
    /// Fails the operation with a timeout error once elapsed.
    pub timeout: Option<Duration>,
    /// Fails the operation with a cancelled error once triggered.
    pub cancel: Option<CancellationToken>,
}

impl SyncOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a sync did to reconcile the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    /// Local and ledger already agreed; nothing was written.
    UpToDate,
    /// Remote content was merged into the local list.
    Pulled,
    /// Local content was uploaded and the ledger raised.
    Pushed,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncAction::UpToDate => "up to date",
            SyncAction::Pulled => "pulled",
            SyncAction::Pushed => "pushed",
        };
        write!(f, "{}", s)
    }
}

/// Per-blob outcome counts of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    /// Todos fetched and merged into the local list
    pub merged: usize,
    /// References not fetched: local-only, already current, or private content
    pub skipped: usize,
    /// References whose fetch failed
    pub failed: usize,
    /// One message per failed reference
    pub failures: Vec<String>,
}

impl PullSummary {
    /// Returns true if some references could not be fetched.
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// Result of a sync, pull or publish.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub list: String,
    pub action: SyncAction,
    /// State before the operation ran
    pub previous: ListSyncState,
    pub local_version: u64,
    pub remote_version: u64,
    /// Local version after the operation
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullSummary>,
    /// Number of todo blobs written
    pub uploaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishReceipt>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (was {}, local v{} / ledger v{}, now v{})",
            self.list,
            self.action,
            self.previous,
            self.local_version,
            self.remote_version,
            self.version
        )?;
        if let Some(pull) = &self.pull {
            write!(
                f,
                "\n  merged {}, skipped {}, failed {}",
                pull.merged, pull.skipped, pull.failed
            )?;
            for failure in &pull.failures {
                write!(f, "\n  ! {}", failure)?;
            }
        }
        if self.uploaded > 0 {
            write!(f, "\n  uploaded {} todo(s)", self.uploaded)?;
        }
        if let Some(receipt) = &self.receipt {
            write!(f, "\n  tx {} (gas {})", receipt.digest, receipt.gas_used)?;
        }
        Ok(())
    }
}

/// Read-only view of a list's sync position.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub list: String,
    pub state: ListSyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<u64>,
    /// Non-private todos whose current content is not in the blob store
    pub pending_uploads: usize,
    /// Todos that never leave the local store
    pub private_todos: usize,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| format!("v{}", v));
        write!(
            f,
            "{}: {} (local {}, ledger {}, {} pending upload, {} private)",
            self.list,
            self.state,
            version(self.local_version),
            version(self.remote_version),
            self.pending_uploads,
            self.private_todos
        )
    }
}

/// Outcome of best-effort remote cleanup after a local delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "error")]
pub enum RemoteCleanup {
    /// Nothing was ever uploaded.
    NotPublished,
    Cleared,
    /// The local delete stands; the remote index still references the content.
    Failed(String),
}

/// Result of deleting a list or a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub local_deleted: bool,
    pub remote: RemoteCleanup,
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = if self.local_deleted {
            "deleted locally"
        } else {
            "not found locally"
        };
        match &self.remote {
            RemoteCleanup::NotPublished => write!(f, "{}", local),
            RemoteCleanup::Cleared => write!(f, "{}, remote index cleared", local),
            RemoteCleanup::Failed(e) => write!(f, "{}, remote cleanup failed: {}", local, e),
        }
    }
}
