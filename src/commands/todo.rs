use clap::Args;
use serde::Serialize;

use todo_sync_core::models::{parse_due_date, short_id};
use todo_sync_core::{
    DeleteOutcome, LocalStore, Priority, RemoteCleanup, Todo, TodoError, TodoFilter, TodoPatch,
};

use super::OutputFormat;
use crate::config::Config;
use crate::services::{self, CommandResult};

#[derive(Args)]
pub struct AddCommand {
    /// List name (created on first use)
    pub list: String,

    /// What needs doing
    pub task: String,

    /// Longer description
    #[arg(long)]
    pub description: Option<String>,

    /// Priority: high, medium or low
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,

    /// Tags (can be repeated)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Keep this todo on this device only
    #[arg(long)]
    pub private: bool,
}

impl AddCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let owner = config.owner()?;

        let mut todo = Todo::new(self.task.trim()).with_tags(self.tags.clone());
        if let Some(description) = &self.description {
            todo = todo.with_description(description);
        }
        if let Some(priority) = self.priority {
            todo = todo.with_priority(priority);
        }
        if let Some(due) = &self.due {
            todo = todo.with_due_date(parse_due_date(due)?);
        }
        if config.encrypted_storage.value {
            todo.encrypted = Some(true);
        }
        let todo = todo.with_private(self.private);

        let created = services::local_store(config).add_todo(&self.list, owner, todo)?;
        println!("Added to {}:", self.list);
        println!("  {}  {}", short_id(&created.id), created);
        Ok(())
    }
}

#[derive(Args)]
pub struct ListCommand {
    /// List name (omit to show every list)
    pub list: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Only show todos that are not completed
    #[arg(long)]
    pub pending: bool,

    /// Filter by priority
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Filter by tag
    #[arg(long = "tag", value_name = "TAG")]
    pub tag: Option<String>,
}

#[derive(Serialize)]
struct ListSummary {
    name: String,
    version: u64,
    todos: usize,
    completed: usize,
}

impl ListCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let store = services::local_store(config);
        match &self.list {
            None => self.show_lists(&store),
            Some(name) => self.show_todos(&store, name),
        }
    }

    fn show_lists(&self, store: &LocalStore) -> CommandResult {
        let mut summaries = Vec::new();
        for name in store.list_names()? {
            let list = store.get(&name)?;
            summaries.push(ListSummary {
                name,
                version: list.version,
                todos: list.todos.len(),
                completed: list.todos.iter().filter(|t| t.completed).count(),
            });
        }

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
            OutputFormat::Text => {
                if summaries.is_empty() {
                    println!("No lists found.");
                }
                for s in &summaries {
                    println!(
                        "{} (v{}): {}/{} done",
                        s.name, s.version, s.completed, s.todos
                    );
                }
            }
        }
        Ok(())
    }

    fn show_todos(&self, store: &LocalStore, name: &str) -> CommandResult {
        let list = store.get(name)?;

        let mut filter = if self.pending {
            TodoFilter::pending()
        } else {
            TodoFilter::default()
        };
        if let Some(priority) = self.priority {
            filter = filter.with_priority(priority);
        }
        if let Some(tag) = &self.tag {
            filter = filter.with_tag(tag);
        }
        let todos = filter.apply(&list.todos);

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&todos)?);
            }
            OutputFormat::Text => {
                let header = format!("{} (v{})", list.name, list.version);
                println!("{}", header);
                println!("{}", "=".repeat(header.len()));
                if todos.is_empty() {
                    println!("No todos found.");
                }
                for todo in &todos {
                    println!("  {}  {}", short_id(&todo.id), todo);
                }
                if let Some(synced) = list.last_synced {
                    println!("\nLast synced: {}", synced.format("%Y-%m-%d %H:%M UTC"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct UpdateCommand {
    /// List name
    pub list: String,

    /// Todo ID or unique ID prefix
    pub id: String,

    /// New task text
    #[arg(long)]
    pub task: Option<String>,

    /// New description
    #[arg(long)]
    pub description: Option<String>,

    /// New priority
    #[arg(long)]
    pub priority: Option<Priority>,

    /// New due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,

    /// Replace tags (can be repeated)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Keep this todo on this device only
    #[arg(long, conflicts_with = "public")]
    pub private: bool,

    /// Allow this todo to be published
    #[arg(long)]
    pub public: bool,
}

impl UpdateCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let store = services::local_store(config);
        let id = resolve_id(&store, &self.list, &self.id)?;

        let patch = TodoPatch {
            task: self.task.clone(),
            description: self.description.clone(),
            completed: None,
            priority: self.priority,
            due_date: self.due.as_deref().map(parse_due_date).transpose()?,
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            private: match (self.private, self.public) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        };

        let updated = store.update_todo(&self.list, &id, &patch)?;
        println!("Updated:");
        println!("  {}  {}", short_id(&updated.id), updated);
        Ok(())
    }
}

#[derive(Args)]
pub struct ToggleCommand {
    /// List name
    pub list: String,

    /// Todo ID or unique ID prefix
    pub id: String,
}

impl ToggleCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let store = services::local_store(config);
        let id = resolve_id(&store, &self.list, &self.id)?;
        let todo = store.toggle_status(&self.list, &id)?;
        println!("  {}  {}", short_id(&todo.id), todo);
        Ok(())
    }
}

#[derive(Args)]
pub struct DeleteCommand {
    /// List name
    pub list: String,

    /// Todo ID or unique ID prefix (omit to delete the whole list)
    pub id: Option<String>,
}

impl DeleteCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        let store = services::local_store(config);
        let id = match &self.id {
            Some(id) => Some(resolve_id(&store, &self.list, id)?),
            None => None,
        };

        let outcome = match services::engine(config) {
            Ok(engine) => {
                let rt = services::runtime()?;
                match &id {
                    Some(id) => rt.block_on(engine.delete_todo(&self.list, id))?,
                    None => rt.block_on(engine.delete_list(&self.list))?,
                }
            }
            // Without network settings the local delete still goes ahead.
            Err(e) => delete_locally(&store, &self.list, id.as_deref(), e.to_string())?,
        };

        match &id {
            Some(id) => println!("Todo {}: {}", short_id(id), outcome),
            None => println!("List {}: {}", self.list, outcome),
        }
        Ok(())
    }
}

fn delete_locally(
    store: &LocalStore,
    list: &str,
    id: Option<&str>,
    reason: String,
) -> Result<DeleteOutcome, TodoError> {
    let uploaded = match id {
        Some(id) => store
            .delete_todo(list, id)?
            .remote_blob_id()
            .is_some(),
        None => {
            let existing = store.get(list)?;
            store.delete(list, true)?;
            existing.last_synced.is_some()
        }
    };
    let remote = if uploaded {
        RemoteCleanup::Failed(reason)
    } else {
        RemoteCleanup::NotPublished
    };
    Ok(DeleteOutcome {
        local_deleted: true,
        remote,
    })
}

/// Finds a todo by full id or unique prefix.
fn resolve_id(store: &LocalStore, list: &str, id: &str) -> Result<String, Box<dyn std::error::Error>> {
    let todos = store.get_todos(list)?;
    if todos.iter().any(|t| t.id == id) {
        return Ok(id.to_string());
    }
    let matches: Vec<&Todo> = todos.iter().filter(|t| t.id.starts_with(id)).collect();
    match matches.as_slice() {
        [todo] => Ok(todo.id.clone()),
        [] => Err(TodoError::not_found("todo", id).into()),
        _ => Err(format!("Todo ID '{}' matches {} todos in '{}'", id, matches.len(), list).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_resolve_id_by_prefix() {
        let (store, _dir) = test_store();
        let todo = store.add_todo("work", "0xabc", Todo::new("a")).unwrap();

        assert_eq!(resolve_id(&store, "work", &todo.id).unwrap(), todo.id);
        assert_eq!(resolve_id(&store, "work", &todo.id[..6]).unwrap(), todo.id);
        assert!(resolve_id(&store, "work", "zzzz").is_err());
    }

    #[test]
    fn test_resolve_id_ambiguous() {
        let (store, _dir) = test_store();
        store.add_todo("work", "0xabc", Todo::new("a")).unwrap();
        store.add_todo("work", "0xabc", Todo::new("b")).unwrap();

        let err = resolve_id(&store, "work", "").unwrap_err();
        assert!(err.to_string().contains("matches 2 todos"));
    }

    #[test]
    fn test_delete_locally_without_network() {
        let (store, _dir) = test_store();
        let todo = store.add_todo("work", "0xabc", Todo::new("a")).unwrap();

        let outcome = delete_locally(&store, "work", Some(&todo.id), "offline".into()).unwrap();
        assert_eq!(outcome.remote, RemoteCleanup::NotPublished);
        assert!(store.get_todos("work").unwrap().is_empty());

        let outcome = delete_locally(&store, "work", None, "offline".into()).unwrap();
        assert!(outcome.local_deleted);
        assert!(!store.exists("work"));
    }

    #[test]
    fn test_resolve_id_with_multibyte_prefix() {
        let (store, _dir) = test_store();
        let mut todo = Todo::new("pulled");
        todo.id = "aaaaaaaézz".into();
        store.add_todo("work", "0xabc", todo).unwrap();

        assert_eq!(resolve_id(&store, "work", "aaaaaaaé").unwrap(), "aaaaaaaézz");
        assert_eq!(short_id("aaaaaaaézz"), "aaaaaaaé");
    }
}
