use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Priority;
use crate::error::{Result, TodoError};

/// Reserved prefix for references that resolve through the local store.
///
/// Private todos carry `local:<todo id>` instead of a blob id so that a
/// reference never points at content on the network.
pub const LOCAL_REF_PREFIX: &str = "local:";

/// Builds the synthetic local reference for a todo id.
pub fn local_ref(todo_id: &str) -> String {
    format!("{}{}", LOCAL_REF_PREFIX, todo_id)
}

/// Returns true if the reference resolves through the local store.
pub fn is_local_ref(reference: &str) -> bool {
    reference.starts_with(LOCAL_REF_PREFIX)
}

/// The first eight characters of an id, for display.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

/// Parses a `YYYY-MM-DD` due date.
pub fn parse_due_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| TodoError::validation(format!("Invalid date format '{}'. Use YYYY-MM-DD.", s)))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    #[serde(alias = "title")]
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_test: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

impl Todo {
    pub fn new(task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            description: None,
            completed: false,
            priority: Priority::default(),
            due_date: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            private: false,
            blob_id: None,
            is_test: None,
            encrypted: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags.clear();
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    /// Marks the todo local-only and gives it a synthetic local reference.
    pub fn with_private(mut self, private: bool) -> Self {
        self.set_private(private);
        self
    }

    /// Adds a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn set_private(&mut self, private: bool) {
        self.private = private;
        if private {
            self.blob_id = Some(local_ref(&self.id));
        } else if self.blob_id.as_deref().is_some_and(is_local_ref) {
            self.blob_id = None;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns the blob id if the todo has been uploaded to the blob store.
    pub fn remote_blob_id(&self) -> Option<&str> {
        self.blob_id.as_deref().filter(|id| !is_local_ref(id))
    }

    /// Returns true if the blob store does not hold this todo's current content.
    pub fn needs_upload(&self, last_synced: Option<DateTime<Utc>>) -> bool {
        if self.private {
            return false;
        }
        match (self.remote_blob_id(), last_synced) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(_), Some(synced)) => self.updated_at > synced,
        }
    }

    /// Serializes the content that is written to the blob store.
    ///
    /// The blob id is excluded since it is derived from these bytes.
    pub fn content_bytes(&self) -> Result<Vec<u8>> {
        if self.private {
            return Err(TodoError::validation(format!(
                "private todo {} cannot be serialized for the blob store",
                self.id
            )));
        }
        let mut content = self.clone();
        content.blob_id = None;
        Ok(serde_json::to_vec(&content)?)
    }

    /// Decodes blob content and attaches the blob id it was read from.
    pub fn from_content(bytes: &[u8], blob_id: &str) -> Result<Self> {
        let mut todo: Todo = serde_json::from_slice(bytes)?;
        todo.blob_id = Some(blob_id.to_string());
        Ok(todo)
    }
}

impl fmt::Display for Todo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.completed { "x" } else { " " };
        write!(f, "[{}] {} ({})", mark, self.task, self.priority)?;
        if let Some(due) = self.due_date {
            write!(f, " due {}", due)?;
        }
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|t| format!("#{}", t)).collect();
            write!(f, " {}", tags.join(" "))?;
        }
        if self.private {
            write!(f, " [private]")?;
        }
        Ok(())
    }
}

/// A partial update applied by [`crate::LocalStore::update_todo`].
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub task: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub private: Option<bool>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.task.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
            && self.private.is_none()
    }

    pub fn apply(&self, todo: &mut Todo) -> Result<()> {
        if let Some(task) = &self.task {
            if task.trim().is_empty() {
                return Err(TodoError::validation("task cannot be empty"));
            }
            todo.task = task.trim().to_string();
        }
        if let Some(description) = &self.description {
            todo.description = Some(description.clone());
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(priority) = self.priority {
            todo.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            todo.due_date = Some(due_date);
        }
        if let Some(tags) = &self.tags {
            todo.tags.clear();
            for tag in tags {
                todo.add_tag(tag.as_str());
            }
        }
        if let Some(private) = self.private {
            todo.set_private(private);
        }
        todo.touch();
        Ok(())
    }
}
