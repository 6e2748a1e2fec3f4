use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{short_id, LedgerRecord, Todo};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: String,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub todos: Vec<Todo>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoList {
    /// Creates a list at version 1, as on first insertion under a new name.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner: owner.into(),
            todos: Vec::new(),
            version: 1,
            collaborators: None,
            last_synced: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an empty local shell for a list known only to the ledger.
    ///
    /// The version starts at 0 so the following pull raises it to the
    /// ledger's value.
    pub fn from_record(record: &LedgerRecord) -> Self {
        let now = Utc::now();
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            owner: record.owner.clone(),
            todos: Vec::new(),
            version: 0,
            collaborators: if record.collaborators.is_empty() {
                None
            } else {
                Some(record.collaborators.clone())
            },
            last_synced: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_collaborators(mut self, collaborators: Vec<String>) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn find(&self, todo_id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == todo_id)
    }

    pub fn find_mut(&mut self, todo_id: &str) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| t.id == todo_id)
    }

    pub fn public_todos(&self) -> impl Iterator<Item = &Todo> {
        self.todos.iter().filter(|t| !t.private)
    }

    pub fn private_todos(&self) -> impl Iterator<Item = &Todo> {
        self.todos.iter().filter(|t| t.private)
    }

    /// Records a content-affecting change.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn collaborators(&self) -> &[String] {
        self.collaborators.as_deref().unwrap_or(&[])
    }
}

impl fmt::Display for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!("{} (v{})", self.name, self.version);
        writeln!(f, "{}", header)?;
        writeln!(f, "{}", "=".repeat(header.len()))?;
        if self.todos.is_empty() {
            writeln!(f, "No todos")?;
        }
        for todo in &self.todos {
            writeln!(f, "  {}  {}", short_id(&todo.id), todo)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_list_starts_at_version_one() {
        let list = TodoList::new("work", "0xabc");
        assert_eq!(list.version, 1);
        assert_eq!(list.owner, "0xabc");
        assert!(list.todos.is_empty());
    }

    #[test]
    fn test_from_record() {
        let record = LedgerRecord {
            id: "list-1".into(),
            name: "groceries".into(),
            owner: "0xabc".into(),
            version: 3,
            collaborators: vec!["0xdef".into()],
        };
        let list = TodoList::from_record(&record);
        assert_eq!(list.id, "list-1");
        assert_eq!(list.version, 0);
        assert_eq!(list.collaborators(), &["0xdef".to_string()]);
    }

    #[test]
    fn test_public_and_private_partition() {
        let mut list = TodoList::new("mixed", "0xabc");
        list.todos.push(Todo::new("public"));
        list.todos.push(Todo::new("secret").with_private(true));
        assert_eq!(list.public_todos().count(), 1);
        assert_eq!(list.private_todos().count(), 1);
    }

    #[test]
    fn test_bump_version() {
        let mut list = TodoList::new("work", "0xabc");
        list.bump_version();
        assert_eq!(list.version, 2);
    }

    #[test]
    fn test_list_json_roundtrip() {
        let mut list = TodoList::new("work", "0xabc").with_collaborators(vec!["0x1".into()]);
        list.todos.push(Todo::new("write spec"));
        let json = serde_json::to_string(&list).unwrap();
        assert!(!json.contains("lastSynced"));
        let parsed: TodoList = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_display_with_multibyte_id() {
        let mut list = TodoList::new("work", "0xabc");
        let mut todo = Todo::new("pulled");
        todo.id = "aaaaaaaézz".into();
        list.todos.push(todo);

        let shown = list.to_string();
        assert!(shown.contains("aaaaaaaé  [ ] pulled"));
    }
}
