//! In-memory blob store used by tests and offline runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use super::BlobStore;
use crate::error::{Result, TodoError};
use crate::models::ListMetadata;

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<String, Vec<u8>>,
    metadata: HashMap<String, ListMetadata>,
    blob_writes: Vec<Vec<u8>>,
    metadata_writes: Vec<(String, ListMetadata)>,
    fail_next: u32,
    broken: HashSet<String>,
    offline: bool,
}

impl State {
    /// Consumes one injected failure, if any is pending.
    fn injected_failure(&mut self) -> Option<TodoError> {
        if self.offline {
            return Some(TodoError::transient("blob store unreachable"));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some(TodoError::transient("blob store timed out"));
        }
        None
    }
}

/// A [`BlobStore`] held in process memory.
///
/// Blob ids are the URL-safe base64 SHA-256 of the content. Every write is
/// recorded so tests can assert exactly what left the local store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Content address of a byte string.
    pub fn blob_id_for(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
    }

    /// Seeds a blob without recording it as a write.
    pub fn insert_blob(&self, bytes: &[u8]) -> String {
        let blob_id = Self::blob_id_for(bytes);
        self.state().blobs.insert(blob_id.clone(), bytes.to_vec());
        blob_id
    }

    /// Seeds a metadata document without recording it as a write.
    pub fn insert_metadata(&self, list_id: &str, metadata: ListMetadata) {
        self.state()
            .metadata
            .insert(ListMetadata::key_for(list_id), metadata);
    }

    /// Current metadata document of a list.
    pub fn metadata(&self, list_id: &str) -> Option<ListMetadata> {
        self.state()
            .metadata
            .get(&ListMetadata::key_for(list_id))
            .cloned()
    }

    /// Every blob payload written through [`BlobStore::write_blob`].
    pub fn blob_writes(&self) -> Vec<Vec<u8>> {
        self.state().blob_writes.clone()
    }

    /// Every metadata document written, with its list id.
    pub fn metadata_writes(&self) -> Vec<(String, ListMetadata)> {
        self.state().metadata_writes.clone()
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    /// Makes the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }

    /// Makes reads of one blob fail permanently.
    pub fn break_blob(&self, blob_id: &str) {
        self.state().broken.insert(blob_id.to_string());
    }

    /// Makes every call fail with a transient error while set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        let blob_id = Self::blob_id_for(bytes);
        state.blobs.insert(blob_id.clone(), bytes.to_vec());
        state.blob_writes.push(bytes.to_vec());
        Ok(blob_id)
    }

    async fn read_blob(&self, blob_id: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        if state.broken.contains(blob_id) {
            return Err(TodoError::Remote(format!("blob {} is unreadable", blob_id)));
        }
        state
            .blobs
            .get(blob_id)
            .cloned()
            .ok_or_else(|| TodoError::not_found("blob", blob_id))
    }

    async fn read_metadata(&self, list_id: &str) -> Result<ListMetadata> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        let key = ListMetadata::key_for(list_id);
        state
            .metadata
            .get(&key)
            .cloned()
            .ok_or_else(|| TodoError::not_found("metadata", key))
    }

    async fn write_metadata(&self, list_id: &str, metadata: &ListMetadata) -> Result<()> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        state
            .metadata
            .insert(ListMetadata::key_for(list_id), metadata.clone());
        state
            .metadata_writes
            .push((list_id.to_string(), metadata.clone()));
        Ok(())
    }
}
