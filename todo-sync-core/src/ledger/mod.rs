//! The ledger: the authoritative record of each list's identity and version.
//!
//! A ledger record holds references only. Todo content never leaves the
//! local store except through the blob store, and private todos never leave
//! it at all; publish payloads are built with
//! [`PublishPayload::from_list`](crate::models::PublishPayload::from_list),
//! which drops them.

mod memory;
mod rpc;
mod signer;

pub use memory::MemoryLedger;
pub use rpc::RpcLedgerClient;
pub use signer::{RequestSignature, Signer};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LedgerRecord, PublishReceipt, TodoList};

/// Client for the ledger that tracks list versions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits the list's identity, version and non-private blob references.
    ///
    /// Creates the record if the caller has none for this list. Fails with an
    /// auth error when no signing credential is configured.
    async fn publish(&self, name: &str, list: &TodoList) -> Result<PublishReceipt>;

    /// Finds the caller's record for a list name.
    async fn get_state(&self, name: &str) -> Result<Option<LedgerRecord>>;

    /// Raises a record's version after a successful reconciliation.
    ///
    /// Lowering a version is rejected; the same version is a no-op.
    async fn update_version(&self, id: &str, new_version: u64) -> Result<()>;
}
