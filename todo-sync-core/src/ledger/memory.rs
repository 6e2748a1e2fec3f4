//! In-memory ledger used by tests and offline runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::LedgerClient;
use crate::error::{Result, TodoError};
use crate::models::{LedgerRecord, PublishPayload, PublishReceipt, TodoList};

const BASE_GAS: u64 = 1_000;
const GAS_PER_REFERENCE: u64 = 100;

#[derive(Debug, Default)]
struct State {
    records: Vec<LedgerRecord>,
    references: HashMap<String, Vec<String>>,
    payloads: Vec<PublishPayload>,
    fail_next: u32,
    offline: bool,
}

impl State {
    fn injected_failure(&mut self) -> Option<TodoError> {
        if self.offline {
            return Some(TodoError::transient("ledger unreachable"));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Some(TodoError::transient("ledger rate limited"));
        }
        None
    }
}

/// A [`LedgerClient`] held in process memory, scoped to one owner account.
#[derive(Debug)]
pub struct MemoryLedger {
    owner: String,
    can_sign: bool,
    state: Mutex<State>,
}

impl MemoryLedger {
    /// A ledger whose caller holds a signing credential.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            can_sign: true,
            state: Mutex::new(State::default()),
        }
    }

    /// A ledger whose caller can read but not sign.
    pub fn read_only(owner: impl Into<String>) -> Self {
        Self {
            can_sign: false,
            ..Self::new(owner)
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds a record.
    pub fn insert_record(&self, record: LedgerRecord) {
        let mut state = self.state();
        state.records.retain(|r| r.id != record.id);
        state.records.push(record);
    }

    pub fn record(&self, id: &str) -> Option<LedgerRecord> {
        self.state().records.iter().find(|r| r.id == id).cloned()
    }

    /// Blob references submitted by the latest publish of a list.
    pub fn references(&self, id: &str) -> Option<Vec<String>> {
        self.state().references.get(id).cloned()
    }

    /// Every payload submitted through [`LedgerClient::publish`].
    pub fn payloads(&self) -> Vec<PublishPayload> {
        self.state().payloads.clone()
    }

    /// Makes the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }

    /// Makes every call fail with a transient error while set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    fn require_signer(&self) -> Result<()> {
        if self.can_sign {
            Ok(())
        } else {
            Err(TodoError::missing_credential())
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn publish(&self, name: &str, list: &TodoList) -> Result<PublishReceipt> {
        self.require_signer()?;
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }

        let mut payload = PublishPayload::from_list(list);
        payload.name = name.to_string();
        payload.owner = self.owner.clone();

        match state.records.iter_mut().find(|r| r.id == payload.list_id) {
            Some(record) => {
                record.name = payload.name.clone();
                record.collaborators = payload.collaborators.clone();
            }
            None => state.records.push(LedgerRecord {
                id: payload.list_id.clone(),
                name: payload.name.clone(),
                owner: payload.owner.clone(),
                version: payload.version,
                collaborators: payload.collaborators.clone(),
            }),
        }

        let encoded = serde_json::to_vec(&payload)?;
        let digest = hex::encode(Sha256::digest(&encoded));
        let gas_used = BASE_GAS + GAS_PER_REFERENCE * payload.blob_ids.len() as u64;

        state
            .references
            .insert(payload.list_id.clone(), payload.blob_ids.clone());
        state.payloads.push(payload);

        Ok(PublishReceipt { digest, gas_used })
    }

    async fn get_state(&self, name: &str) -> Result<Option<LedgerRecord>> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        Ok(state
            .records
            .iter()
            .find(|r| r.owner == self.owner && r.name == name)
            .cloned())
    }

    async fn update_version(&self, id: &str, new_version: u64) -> Result<()> {
        self.require_signer()?;
        let mut state = self.state();
        if let Some(err) = state.injected_failure() {
            return Err(err);
        }
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| TodoError::not_found("ledger record", id))?;
        if new_version < record.version {
            return Err(TodoError::validation(format!(
                "cannot lower version of {} from {} to {}",
                id, record.version, new_version
            )));
        }
        record.version = new_version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Todo;

    #[tokio::test]
    async fn test_publish_creates_then_updates() {
        let ledger = MemoryLedger::new("0xabc");
        let mut list = TodoList::new("work", "0xabc");
        let mut todo = Todo::new("a");
        todo.blob_id = Some("b1".into());
        list.todos.push(todo);

        let receipt = ledger.publish("work", &list).await.unwrap();
        assert_eq!(receipt.gas_used, 1_100);
        assert_eq!(receipt.digest.len(), 64);

        let record = ledger.get_state("work").await.unwrap().unwrap();
        assert_eq!(record.id, list.id);
        assert_eq!(record.version, 1);

        list.version = 5;
        ledger.publish("work", &list).await.unwrap();
        let record = ledger.get_state("work").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(ledger.references(&list.id).unwrap(), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_update_version_is_monotonic() {
        let ledger = MemoryLedger::new("0xabc");
        let list = TodoList::new("work", "0xabc");
        ledger.publish("work", &list).await.unwrap();

        ledger.update_version(&list.id, 4).await.unwrap();
        ledger.update_version(&list.id, 4).await.unwrap();
        let err = ledger.update_version(&list.id, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.record(&list.id).unwrap().version, 4);

        let err = ledger.update_version("unknown", 9).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_read_only_cannot_publish() {
        let ledger = MemoryLedger::read_only("0xabc");
        let list = TodoList::new("work", "0xabc");
        let err = ledger.publish("work", &list).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(ledger.payloads().is_empty());
        assert!(ledger.get_state("work").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_state_scopes_to_owner() {
        let ledger = MemoryLedger::new("0xabc");
        ledger.insert_record(LedgerRecord {
            id: "other".into(),
            name: "work".into(),
            owner: "0xdef".into(),
            version: 2,
            collaborators: vec![],
        });
        assert!(ledger.get_state("work").await.unwrap().is_none());
    }
}
