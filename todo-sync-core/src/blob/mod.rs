//! Content-addressed blob storage for non-private todos and the per-list
//! metadata index.
//!
//! ## Update protocol
//!
//! Storing a todo is four steps:
//! 1. write the todo's content as a new blob
//! 2. read the list's metadata document
//! 3. replace the todo's previous blob id with the new one (or append it)
//! 4. write the metadata document back
//!
//! Steps 2-4 are not transactional. Two writers updating the same list at once
//! each write their own view of the index and the last one wins.
//!
//! Writes carry no idempotency key. A retried write whose first attempt
//! actually landed stores the same content twice; content addressing makes
//! the duplicate harmless for memory-backed stores but a network store may
//! bill both.

mod http;
mod memory;

pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ErrorKind, Result, TodoError};
use crate::models::{ListMetadata, Todo};
use crate::retry::RetryOperator;

/// A content-addressed byte store with keyed metadata documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores bytes and returns an id that retrieves them.
    async fn write_blob(&self, bytes: &[u8]) -> Result<String>;

    /// Reads the bytes stored under an id.
    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>>;

    /// Reads the metadata document of a list.
    async fn read_metadata(&self, list_id: &str) -> Result<ListMetadata>;

    /// Replaces the metadata document of a list.
    async fn write_metadata(&self, list_id: &str, metadata: &ListMetadata) -> Result<()>;
}

/// Reads a list's metadata, treating an absent document as an empty index.
pub async fn load_metadata(
    store: &dyn BlobStore,
    retry: &RetryOperator,
    list_id: &str,
    name: &str,
) -> Result<ListMetadata> {
    match retry
        .execute("read_metadata", || store.read_metadata(list_id))
        .await
    {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ListMetadata::new(name, 0)),
        Err(e) => Err(e),
    }
}

/// Uploads a todo and points the list's metadata at the new blob.
///
/// Returns the new blob id. The caller records it on the local todo. This is
/// the single-todo form of the update protocol for library callers; the sync
/// engine batches uploads and rewrites the index once per push.
pub async fn store_todo(
    store: &dyn BlobStore,
    retry: &RetryOperator,
    list_id: &str,
    list_name: &str,
    version: u64,
    todo: &Todo,
) -> Result<String> {
    if todo.private {
        return Err(TodoError::validation(format!(
            "private todo {} cannot be stored remotely",
            todo.id
        )));
    }

    let content = todo.content_bytes()?;
    let blob_id = retry
        .execute("write_blob", || store.write_blob(&content))
        .await?;

    let mut metadata = load_metadata(store, retry, list_id, list_name).await?;
    metadata.replace_or_append(todo.remote_blob_id(), &blob_id);
    metadata.name = list_name.to_string();
    metadata.version = metadata.version.max(version);

    retry
        .execute("write_metadata", || store.write_metadata(list_id, &metadata))
        .await?;

    debug!(list_id, todo = %todo.id, blob_id = %blob_id, "stored todo");
    Ok(blob_id)
}

/// Drops a blob id from a list's metadata. Returns whether it was present.
pub async fn unlink_todo(
    store: &dyn BlobStore,
    retry: &RetryOperator,
    list_id: &str,
    list_name: &str,
    blob_id: &str,
) -> Result<bool> {
    let mut metadata = load_metadata(store, retry, list_id, list_name).await?;
    if !metadata.remove(blob_id) {
        return Ok(false);
    }
    retry
        .execute("write_metadata", || store.write_metadata(list_id, &metadata))
        .await?;
    debug!(list_id, blob_id, "unlinked todo");
    Ok(true)
}
