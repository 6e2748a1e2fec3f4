//! Todo Sync Core Library
//!
//! Todo lists kept in three places: a local file store, a content-addressed
//! blob store for todo content, and a ledger holding list versions and blob
//! references.

pub mod blob;
pub mod error;
pub mod ledger;
pub mod models;
pub mod network;
pub mod retry;
pub mod storage;
pub mod sync;

pub use blob::{BlobStore, HttpBlobStore, MemoryBlobStore};
pub use error::{ErrorKind, Result, TodoError};
pub use ledger::{LedgerClient, MemoryLedger, RpcLedgerClient, Signer};
pub use models::{
    LedgerRecord, ListMetadata, Priority, PublishPayload, PublishReceipt, Todo, TodoFilter,
    TodoList, TodoPatch,
};
pub use network::{Network, NetworkConfig};
pub use retry::{RetryConfig, RetryOperator};
pub use storage::LocalStore;
pub use sync::{
    DeleteOutcome, ListSyncState, PullSummary, RemoteCleanup, SyncAction, SyncEngine,
    SyncOptions, SyncReport, SyncStatus,
};
pub use tokio_util::sync::CancellationToken;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
