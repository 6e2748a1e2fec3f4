//! Filesystem storage of whole todo list documents.
//!
//! Each list lives in `<data_dir>/lists/<name>.json`. Saves go through a
//! temporary sibling file that is renamed over the target, so a reader sees
//! either the previous document or the new one.
//!
//! There is no locking: two processes mutating the same list race on
//! read-modify-write and the last save wins.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TodoError};
use crate::models::{Todo, TodoList, TodoPatch};

const LISTS_DIR: &str = "lists";
const EXTENSION: &str = "json";

/// Durable store of [`TodoList`] documents keyed by list name.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    /// Creates a new store rooted at a data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn lists_dir(&self) -> PathBuf {
        self.data_dir.join(LISTS_DIR)
    }

    /// Returns the document path for a list name.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.lists_dir().join(format!("{}.{}", name, EXTENSION)))
    }

    /// Checks if a list document exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Enumerates stored list names in sorted order.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let dir = self.lists_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TodoError::io(dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TodoError::io(dir.clone(), e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads a list.
    ///
    /// Returns `Ok(None)` if the file doesn't exist and `CorruptData` if it
    /// cannot be parsed.
    pub fn load(&self, name: &str) -> Result<Option<TodoList>> {
        let path = self.path(name)?;

        match fs::read(&path) {
            Ok(bytes) => {
                let list = serde_json::from_slice(&bytes).map_err(|e| TodoError::CorruptData {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Some(list))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TodoError::io(path, e)),
        }
    }

    /// Loads a list, failing with `NotFound` if it doesn't exist.
    pub fn get(&self, name: &str) -> Result<TodoList> {
        self.load(name)?
            .ok_or_else(|| TodoError::not_found("list", name))
    }

    /// Saves a list, replacing any previous document atomically.
    ///
    /// Creates the data directory if it doesn't exist.
    pub fn save(&self, name: &str, list: &TodoList) -> Result<()> {
        let path = self.path(name)?;
        let dir = self.lists_dir();
        fs::create_dir_all(&dir).map_err(|e| TodoError::io(dir.clone(), e))?;

        let bytes = serde_json::to_vec_pretty(list)?;
        let tmp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));

        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(TodoError::io(path, e));
        }

        debug!(list = name, version = list.version, "saved list");
        Ok(())
    }

    /// Removes a list document.
    ///
    /// Absent lists are a no-op unless `strict` is set. Returns whether a file
    /// was removed.
    pub fn delete(&self, name: &str, strict: bool) -> Result<bool> {
        let path = self.path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(list = name, "deleted list");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if strict {
                    Err(TodoError::not_found("list", name))
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(TodoError::io(path, e)),
        }
    }

    /// Returns the todos of a list in stored order.
    pub fn get_todos(&self, name: &str) -> Result<Vec<Todo>> {
        Ok(self.get(name)?.todos)
    }

    /// Returns one todo of a list.
    pub fn get_todo(&self, name: &str, todo_id: &str) -> Result<Todo> {
        let list = self.get(name)?;
        list.find(todo_id)
            .cloned()
            .ok_or_else(|| TodoError::not_found("todo", todo_id))
    }

    /// Appends a todo, creating the list under `owner` if the name is unused.
    pub fn add_todo(&self, name: &str, owner: &str, todo: Todo) -> Result<Todo> {
        if todo.task.trim().is_empty() {
            return Err(TodoError::validation("task cannot be empty"));
        }

        let list = match self.load(name)? {
            Some(mut list) => {
                if list.find(&todo.id).is_some() {
                    return Err(TodoError::validation(format!(
                        "todo {} already exists in '{}'",
                        todo.id, name
                    )));
                }
                list.todos.push(todo.clone());
                list.bump_version();
                list
            }
            None => {
                let mut list = TodoList::new(name, owner);
                list.todos.push(todo.clone());
                list
            }
        };

        self.save(name, &list)?;
        Ok(todo)
    }

    /// Applies a patch to a todo and returns the updated todo.
    pub fn update_todo(&self, name: &str, todo_id: &str, patch: &TodoPatch) -> Result<Todo> {
        if patch.is_empty() {
            return Err(TodoError::validation("nothing to update"));
        }
        self.modify_todo(name, todo_id, |todo| patch.apply(todo))
    }

    /// Flips the completed flag of a todo.
    pub fn toggle_status(&self, name: &str, todo_id: &str) -> Result<Todo> {
        self.modify_todo(name, todo_id, |todo| {
            todo.completed = !todo.completed;
            todo.touch();
            Ok(())
        })
    }

    /// Removes a todo and returns it.
    pub fn delete_todo(&self, name: &str, todo_id: &str) -> Result<Todo> {
        let mut list = self.get(name)?;
        let index = list
            .todos
            .iter()
            .position(|t| t.id == todo_id)
            .ok_or_else(|| TodoError::not_found("todo", todo_id))?;
        let removed = list.todos.remove(index);
        list.bump_version();
        self.save(name, &list)?;
        Ok(removed)
    }

    fn modify_todo<F>(&self, name: &str, todo_id: &str, change: F) -> Result<Todo>
    where
        F: FnOnce(&mut Todo) -> Result<()>,
    {
        let mut list = self.get(name)?;
        let todo = list
            .find_mut(todo_id)
            .ok_or_else(|| TodoError::not_found("todo", todo_id))?;
        change(todo)?;
        let updated = todo.clone();
        list.bump_version();
        self.save(name, &list)?;
        Ok(updated)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(TodoError::validation(format!("invalid list name '{}'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Priority;
    use tempfile::TempDir;

    fn test_store() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_store_path() {
        let (store, _temp) = test_store();
        let path = store.path("groceries").unwrap();
        assert!(path.ends_with("lists/groceries.json"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (store, _temp) = test_store();
        for name in ["", "  ", "../escape", "a/b", ".hidden", "a\\b"] {
            let err = store.path(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "name {:?}", name);
        }
    }

    #[test]
    fn test_load_nonexistent_returns_none() {
        let (store, _temp) = test_store();
        assert!(store.load("missing").unwrap().is_none());
        assert_eq!(store.get("missing").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_list_names_empty_without_directory() {
        let (store, _temp) = test_store();
        assert!(store.list_names().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (store, _temp) = test_store();
        let mut list = TodoList::new("work", "0xabc");
        list.todos.push(Todo::new("write spec"));

        store.save("work", &list).unwrap();
        let loaded = store.get("work").unwrap();
        assert_eq!(loaded, list);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let (store, temp) = test_store();
        store.save("a", &TodoList::new("a", "me")).unwrap();
        store.save("b", &TodoList::new("b", "me")).unwrap();
        store.save("a", &TodoList::new("a", "me")).unwrap();

        let files: Vec<_> = fs::read_dir(temp.path().join("lists"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 2);
        assert_eq!(store.list_names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_document_is_typed_error() {
        let (store, _temp) = test_store();
        let path = store.path("broken").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        let err = store.get("broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_delete_strict_and_lenient() {
        let (store, _temp) = test_store();
        assert!(!store.delete("x", false).unwrap());
        assert_eq!(store.delete("x", true).unwrap_err().kind(), ErrorKind::NotFound);

        store.save("x", &TodoList::new("x", "me")).unwrap();
        assert!(store.delete("x", true).unwrap());
        assert_eq!(store.get("x").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_todo_creates_list() {
        let (store, _temp) = test_store();
        store
            .add_todo("work", "0xabc", Todo::new("write spec"))
            .unwrap();

        let todos = store.get_todos("work").unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].task, "write spec");
        assert!(!todos[0].completed);
        assert_eq!(todos[0].priority, Priority::Medium);

        let list = store.get("work").unwrap();
        assert_eq!(list.version, 1);
        assert_eq!(list.owner, "0xabc");
    }

    #[test]
    fn test_mutations_bump_version() {
        let (store, _temp) = test_store();
        let todo = store.add_todo("work", "me", Todo::new("a")).unwrap();
        store.add_todo("work", "me", Todo::new("b")).unwrap();
        assert_eq!(store.get("work").unwrap().version, 2);

        let toggled = store.toggle_status("work", &todo.id).unwrap();
        assert!(toggled.completed);
        assert_eq!(store.get("work").unwrap().version, 3);

        let patch = TodoPatch {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let updated = store.update_todo("work", &todo.id, &patch).unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(store.get("work").unwrap().version, 4);

        store.delete_todo("work", &todo.id).unwrap();
        let list = store.get("work").unwrap();
        assert_eq!(list.version, 5);
        assert_eq!(list.todos.len(), 1);
    }

    #[test]
    fn test_add_rejects_empty_task() {
        let (store, _temp) = test_store();
        let err = store.add_todo("work", "me", Todo::new("   ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!store.exists("work"));
    }

    #[test]
    fn test_missing_todo_is_not_found() {
        let (store, _temp) = test_store();
        store.add_todo("work", "me", Todo::new("a")).unwrap();
        assert_eq!(
            store.toggle_status("work", "nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.delete_todo("work", "nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(store.get("work").unwrap().version, 1);
    }

    #[test]
    fn test_empty_patch_rejected() {
        let (store, _temp) = test_store();
        let todo = store.add_todo("work", "me", Todo::new("a")).unwrap();
        let err = store
            .update_todo("work", &todo.id, &TodoPatch::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
