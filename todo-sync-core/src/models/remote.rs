//! Documents that live outside the local store: the per-list metadata index
//! in the blob store and the list record on the ledger.

use serde::{Deserialize, Serialize};

use super::TodoList;

/// Blob-store index of a list's current non-private todos.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    pub todo_ids: Vec<String>,
    pub name: String,
    pub version: u64,
}

impl ListMetadata {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            todo_ids: Vec::new(),
            name: name.into(),
            version,
        }
    }

    /// Deterministic key of the metadata document for a list id.
    pub fn key_for(list_id: &str) -> String {
        format!("{}_metadata", list_id)
    }

    /// Replaces `previous` in place with `current`, or appends `current`.
    pub fn replace_or_append(&mut self, previous: Option<&str>, current: &str) {
        if let Some(prev) = previous {
            if let Some(slot) = self.todo_ids.iter_mut().find(|id| id.as_str() == prev) {
                *slot = current.to_string();
                self.dedup();
                return;
            }
        }
        if !self.todo_ids.iter().any(|id| id == current) {
            self.todo_ids.push(current.to_string());
        }
    }

    /// Removes a blob id. Returns true if it was present.
    pub fn remove(&mut self, blob_id: &str) -> bool {
        let before = self.todo_ids.len();
        self.todo_ids.retain(|id| id != blob_id);
        before != self.todo_ids.len()
    }

    fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.todo_ids.retain(|id| seen.insert(id.clone()));
    }
}

/// The ledger's record of a list. Holds identity and version, never content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub version: u64,
    #[serde(default)]
    pub collaborators: Vec<String>,
}

/// What a publish submits to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub list_id: String,
    pub name: String,
    pub owner: String,
    pub version: u64,
    pub collaborators: Vec<String>,
    pub blob_ids: Vec<String>,
}

impl PublishPayload {
    /// Builds the payload from the list's uploaded, non-private todos.
    pub fn from_list(list: &TodoList) -> Self {
        Self {
            list_id: list.id.clone(),
            name: list.name.clone(),
            owner: list.owner.clone(),
            version: list.version,
            collaborators: list.collaborators().to_vec(),
            blob_ids: list
                .public_todos()
                .filter_map(|t| t.remote_blob_id().map(str::to_string))
                .collect(),
        }
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub digest: String,
    pub gas_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Todo;

    #[test]
    fn test_metadata_key() {
        assert_eq!(ListMetadata::key_for("abc"), "abc_metadata");
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut meta = ListMetadata::new("work", 1);
        meta.todo_ids = vec!["a".into(), "b".into(), "c".into()];
        meta.replace_or_append(Some("b"), "b2");
        assert_eq!(meta.todo_ids, vec!["a", "b2", "c"]);
    }

    #[test]
    fn test_replace_appends_when_previous_missing() {
        let mut meta = ListMetadata::new("work", 1);
        meta.todo_ids = vec!["a".into()];
        meta.replace_or_append(Some("gone"), "n");
        meta.replace_or_append(None, "m");
        meta.replace_or_append(None, "m");
        assert_eq!(meta.todo_ids, vec!["a", "n", "m"]);
    }

    #[test]
    fn test_remove() {
        let mut meta = ListMetadata::new("work", 1);
        meta.todo_ids = vec!["a".into(), "b".into()];
        assert!(meta.remove("a"));
        assert!(!meta.remove("a"));
        assert_eq!(meta.todo_ids, vec!["b"]);
    }

    #[test]
    fn test_metadata_wire_format() {
        let meta = ListMetadata {
            todo_ids: vec!["x".into()],
            name: "work".into(),
            version: 4,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"todoIds": ["x"], "name": "work", "version": 4})
        );
    }

    #[test]
    fn test_payload_excludes_private_and_unuploaded() {
        let mut list = TodoList::new("mixed", "0xabc");
        let mut public = Todo::new("public");
        public.blob_id = Some("blob-1".into());
        list.todos.push(public);
        list.todos.push(Todo::new("not uploaded"));
        list.todos.push(Todo::new("secret").with_private(true));

        let payload = PublishPayload::from_list(&list);
        assert_eq!(payload.blob_ids, vec!["blob-1"]);
    }
}
