use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::state::{
    DeleteOutcome, ListSyncState, PullSummary, RemoteCleanup, SyncAction, SyncOptions,
    SyncReport, SyncStatus, DEFAULT_CONCURRENCY,
};
use crate::blob::{self, BlobStore};
use crate::error::{Result, TodoError};
use crate::ledger::LedgerClient;
use crate::models::{
    is_local_ref, LedgerRecord, ListMetadata, Todo, TodoList, TodoPatch, LOCAL_REF_PREFIX,
};
use crate::retry::RetryOperator;
use crate::storage::LocalStore;

/// Reconciles lists across the local store, the blob store and the ledger.
///
/// Every remote call goes through the engine's [`RetryOperator`]. Local
/// documents are saved only after every remote step of an operation has
/// succeeded, so a failed, timed out or cancelled operation leaves the local
/// list as it was.
pub struct SyncEngine {
    local: LocalStore,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn LedgerClient>,
    retry: RetryOperator,
    concurrency: usize,
}

impl SyncEngine {
    pub fn new(
        local: LocalStore,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn LedgerClient>,
        retry: RetryOperator,
    ) -> Self {
        Self {
            local,
            blobs,
            ledger,
            retry,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how many blob reads or writes may be in flight at once. Values
    /// below 1 are raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    // Item operations. These touch only the local store and leave the list
    // ahead of the ledger until the next publish.

    pub fn add_todo(&self, name: &str, owner: &str, todo: Todo) -> Result<Todo> {
        self.local.add_todo(name, owner, todo)
    }

    pub fn update_todo(&self, name: &str, todo_id: &str, patch: &TodoPatch) -> Result<Todo> {
        self.local.update_todo(name, todo_id, patch)
    }

    pub fn toggle_status(&self, name: &str, todo_id: &str) -> Result<Todo> {
        self.local.toggle_status(name, todo_id)
    }

    pub fn get_todos(&self, name: &str) -> Result<Vec<Todo>> {
        self.local.get_todos(name)
    }

    /// Reconciles one list with its ledger record.
    ///
    /// 1. Equal versions: nothing is read from the blob store or written.
    /// 2. Ledger ahead, or no local copy: pull and merge remote todos.
    /// 3. Local ahead: refuse with a conflict unless `force` is set, in which
    ///    case local changes are pushed.
    pub async fn sync(&self, name: &str, options: &SyncOptions) -> Result<SyncReport> {
        bounded(options, self.sync_list(name, options.force)).await
    }

    /// Pushes local changes and raises the ledger to the local version.
    pub async fn publish(&self, name: &str, options: &SyncOptions) -> Result<SyncReport> {
        bounded(options, self.publish_list(name)).await
    }

    /// Pulls the ledger state into the local list.
    ///
    /// With `discard_local`, unpublished local changes are dropped: public
    /// todos are replaced by the remote set and private todos are kept. The
    /// local version is reset to the ledger's, which may lower it.
    pub async fn pull(
        &self,
        name: &str,
        discard_local: bool,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        bounded(options, self.pull_list(name, discard_local)).await
    }

    /// Classifies a list without changing anything.
    pub async fn status(&self, name: &str) -> Result<SyncStatus> {
        let local = self.local.load(name)?;
        let record = self.remote_state(name).await?;
        if local.is_none() && record.is_none() {
            return Err(TodoError::not_found("list", name));
        }

        let state = ListSyncState::classify(local.as_ref(), record.as_ref());
        let (pending_uploads, private_todos) = local
            .as_ref()
            .map(|list| {
                let pending = list
                    .todos
                    .iter()
                    .filter(|t| t.needs_upload(list.last_synced))
                    .count();
                (pending, list.private_todos().count())
            })
            .unwrap_or((0, 0));

        Ok(SyncStatus {
            list: name.to_string(),
            state,
            local_version: local.as_ref().map(|l| l.version),
            remote_version: record.as_ref().map(|r| r.version),
            pending_uploads,
            private_todos,
        })
    }

    /// Resolves a todo reference.
    ///
    /// `local:` references are read from the local store and never touch the
    /// network. Anything else is a blob id.
    pub async fn fetch_todo(&self, list_name: &str, reference: &str) -> Result<Todo> {
        if let Some(todo_id) = reference.strip_prefix(LOCAL_REF_PREFIX) {
            return self.local.get_todo(list_name, todo_id);
        }
        let todo = fetch_remote_todo(self.blobs.as_ref(), &self.retry, reference).await?;
        if todo.private {
            return Err(TodoError::Remote(format!(
                "blob {} holds a private todo",
                reference
            )));
        }
        Ok(todo)
    }

    /// Deletes a list locally, then clears its remote index.
    ///
    /// The ledger record is kept. A failed remote cleanup does not undo the
    /// local delete; it is reported in the outcome.
    pub async fn delete_list(&self, name: &str) -> Result<DeleteOutcome> {
        let list = self.local.get(name)?;
        self.local.delete(name, true)?;
        info!(list = name, "deleted list locally");

        let published = list.last_synced.is_some()
            || list.todos.iter().any(|t| t.remote_blob_id().is_some());
        if !published {
            return Ok(DeleteOutcome {
                local_deleted: true,
                remote: RemoteCleanup::NotPublished,
            });
        }

        let blobs = self.blobs.as_ref();
        let empty = ListMetadata::new(name, list.version);
        let remote = match self
            .retry
            .execute("write_metadata", || blobs.write_metadata(&list.id, &empty))
            .await
        {
            Ok(()) => RemoteCleanup::Cleared,
            Err(e) => {
                warn!(list = name, error = %e, "remote cleanup failed");
                RemoteCleanup::Failed(e.to_string())
            }
        };

        Ok(DeleteOutcome {
            local_deleted: true,
            remote,
        })
    }

    /// Deletes a todo locally, then drops it from the remote index.
    pub async fn delete_todo(&self, name: &str, todo_id: &str) -> Result<DeleteOutcome> {
        let list_id = self.local.get(name)?.id;
        let removed = self.local.delete_todo(name, todo_id)?;
        info!(list = name, todo = todo_id, "deleted todo locally");

        let remote = match removed.remote_blob_id() {
            None => RemoteCleanup::NotPublished,
            Some(blob_id) => {
                match blob::unlink_todo(self.blobs.as_ref(), &self.retry, &list_id, name, blob_id)
                    .await
                {
                    Ok(_) => RemoteCleanup::Cleared,
                    Err(e) => {
                        warn!(list = name, todo = todo_id, error = %e, "remote cleanup failed");
                        RemoteCleanup::Failed(e.to_string())
                    }
                }
            }
        };

        Ok(DeleteOutcome {
            local_deleted: true,
            remote,
        })
    }

    async fn remote_state(&self, name: &str) -> Result<Option<LedgerRecord>> {
        let ledger = self.ledger.as_ref();
        self.retry
            .execute("get_state", || ledger.get_state(name))
            .await
    }

    async fn sync_list(&self, name: &str, force: bool) -> Result<SyncReport> {
        let local = self.local.load(name)?;
        let record = self.remote_state(name).await?;
        let previous = ListSyncState::classify(local.as_ref(), record.as_ref());
        debug!(list = name, state = %previous, "classified list");

        match (local, record) {
            (None, None) => Err(TodoError::not_found("list", name)),
            (None, Some(record)) => {
                info!(list = name, version = record.version, "materializing list from ledger");
                let list = TodoList::from_record(&record);
                self.merge_remote(name, list, &record, false, previous).await
            }
            (Some(list), Some(record)) if list.id != record.id => {
                Err(conflict(name, list.version, record.version))
            }
            (Some(list), Some(record)) if record.version > list.version => {
                self.merge_remote(name, list, &record, false, previous).await
            }
            (Some(list), record) => {
                let remote_version = record.as_ref().map_or(0, |r| r.version);
                if list.version == remote_version {
                    info!(list = name, version = list.version, "already in sync");
                    return Ok(up_to_date(name, previous, list.version, remote_version));
                }
                if !force {
                    return Err(conflict(name, list.version, remote_version));
                }
                self.push(name, list, record.as_ref(), previous).await
            }
        }
    }

    async fn publish_list(&self, name: &str) -> Result<SyncReport> {
        let list = self.local.get(name)?;
        let record = self.remote_state(name).await?;
        let previous = ListSyncState::classify(Some(&list), record.as_ref());
        let remote_version = record.as_ref().map_or(0, |r| r.version);

        match previous {
            ListSyncState::Conflict | ListSyncState::RemoteAhead => {
                Err(conflict(name, list.version, remote_version))
            }
            ListSyncState::Synced
                if !list.todos.iter().any(|t| t.needs_upload(list.last_synced)) =>
            {
                info!(list = name, version = list.version, "nothing to publish");
                Ok(up_to_date(name, previous, list.version, remote_version))
            }
            _ => self.push(name, list, record.as_ref(), previous).await,
        }
    }

    async fn pull_list(&self, name: &str, discard_local: bool) -> Result<SyncReport> {
        let local = self.local.load(name)?;
        let record = self
            .remote_state(name)
            .await?
            .ok_or_else(|| TodoError::not_found("ledger record", name))?;
        let previous = ListSyncState::classify(local.as_ref(), Some(&record));

        let Some(mut list) = local else {
            let list = TodoList::from_record(&record);
            return self.merge_remote(name, list, &record, false, previous).await;
        };

        match previous {
            ListSyncState::Synced => {
                info!(list = name, version = list.version, "already in sync");
                Ok(up_to_date(name, previous, list.version, record.version))
            }
            ListSyncState::RemoteAhead => {
                self.merge_remote(name, list, &record, discard_local, previous)
                    .await
            }
            ListSyncState::LocalAhead if discard_local => {
                self.merge_remote(name, list, &record, true, previous).await
            }
            ListSyncState::Conflict if discard_local => {
                info!(list = name, id = %record.id, "adopting ledger identity");
                list.id = record.id.clone();
                list.owner = record.owner.clone();
                self.merge_remote(name, list, &record, true, previous).await
            }
            _ => Err(conflict(name, list.version, record.version)),
        }
    }

    /// Fetches the list's remote todos and merges them into `list`.
    ///
    /// Private local todos are never replaced or removed. Local public todos
    /// whose blob is no longer indexed are dropped only when every fetch
    /// succeeded, and only if they carry no unpublished edits.
    async fn merge_remote(
        &self,
        name: &str,
        mut list: TodoList,
        record: &LedgerRecord,
        discard_local: bool,
        previous: ListSyncState,
    ) -> Result<SyncReport> {
        let local_version = list.version;
        let last_synced = list.last_synced;
        let blobs = self.blobs.as_ref();

        let metadata = blob::load_metadata(blobs, &self.retry, &record.id, &record.name).await?;

        let pending: HashSet<String> = list
            .todos
            .iter()
            .filter(|t| t.needs_upload(last_synced))
            .map(|t| t.id.clone())
            .collect();
        let current: HashSet<String> = list
            .public_todos()
            .filter(|t| !(discard_local && pending.contains(&t.id)))
            .filter_map(|t| t.remote_blob_id().map(str::to_string))
            .collect();

        let mut summary = PullSummary::default();
        let mut to_fetch = Vec::new();
        for reference in &metadata.todo_ids {
            if is_local_ref(reference) || current.contains(reference) {
                summary.skipped += 1;
            } else {
                to_fetch.push(reference.clone());
            }
        }
        debug!(list = name, fetch = to_fetch.len(), skipped = summary.skipped, "pulling todos");

        let fetched: Vec<(String, Result<Todo>)> = stream::iter(to_fetch)
            .map(|blob_id| {
                let retry = &self.retry;
                async move {
                    let result = fetch_remote_todo(blobs, retry, &blob_id).await;
                    (blob_id, result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut replaced = HashSet::new();
        for (blob_id, result) in fetched {
            let incoming = match result {
                Ok(todo) if todo.private => {
                    warn!(list = name, blob_id = %blob_id, "ignoring private todo in blob store");
                    summary.skipped += 1;
                    continue;
                }
                Ok(todo) => todo,
                Err(e) => {
                    warn!(list = name, blob_id = %blob_id, error = %e, "failed to fetch todo");
                    summary.failed += 1;
                    summary.failures.push(format!("{}: {}", blob_id, e));
                    continue;
                }
            };

            match list.find_mut(&incoming.id) {
                Some(existing) if existing.private => summary.skipped += 1,
                Some(existing) if discard_local || incoming.updated_at >= existing.updated_at => {
                    replaced.insert(incoming.id.clone());
                    *existing = incoming;
                    summary.merged += 1;
                }
                Some(_) => summary.skipped += 1,
                None => {
                    replaced.insert(incoming.id.clone());
                    list.todos.push(incoming);
                    summary.merged += 1;
                }
            }
        }

        let referenced: HashSet<&str> = metadata.todo_ids.iter().map(String::as_str).collect();
        if discard_local {
            list.todos.retain(|t| {
                t.private || t.remote_blob_id().is_some_and(|id| referenced.contains(id))
            });
        } else if !summary.is_partial() {
            list.todos.retain(|t| {
                let stale = !t.private
                    && !pending.contains(&t.id)
                    && t.remote_blob_id().is_some_and(|id| !referenced.contains(id));
                !stale
            });
        }

        // Unpublished edits that survived the merge lose their old blob id so
        // they still count as pending once last_synced moves forward.
        if !discard_local {
            for todo in list.todos.iter_mut() {
                if pending.contains(&todo.id) && !replaced.contains(&todo.id) && !todo.private {
                    todo.blob_id = None;
                }
            }
        }

        list.version = record.version;
        list.last_synced = Some(Utc::now());
        list.collaborators = if record.collaborators.is_empty() {
            None
        } else {
            Some(record.collaborators.clone())
        };
        self.local.save(name, &list)?;

        info!(
            list = name,
            version = list.version,
            merged = summary.merged,
            skipped = summary.skipped,
            failed = summary.failed,
            "pulled list"
        );

        Ok(SyncReport {
            list: name.to_string(),
            action: SyncAction::Pulled,
            previous,
            local_version,
            remote_version: record.version,
            version: list.version,
            pull: Some(summary),
            uploaded: 0,
            receipt: None,
        })
    }

    /// Uploads pending todos, rewrites the remote index, and raises the
    /// ledger to the local version.
    async fn push(
        &self,
        name: &str,
        mut list: TodoList,
        record: Option<&LedgerRecord>,
        previous: ListSyncState,
    ) -> Result<SyncReport> {
        let remote_version = record.map_or(0, |r| r.version);
        let local_version = list.version;
        let blobs = self.blobs.as_ref();
        let ledger = self.ledger.as_ref();

        let pending: Vec<Todo> = list
            .todos
            .iter()
            .filter(|t| t.needs_upload(list.last_synced))
            .cloned()
            .collect();
        info!(list = name, version = list.version, pending = pending.len(), "pushing list");

        let uploads: Vec<(String, Result<String>)> = stream::iter(pending.iter())
            .map(|todo| {
                let retry = &self.retry;
                async move {
                    let result = match todo.content_bytes() {
                        Ok(bytes) => {
                            retry
                                .execute("write_blob", || blobs.write_blob(&bytes))
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    (todo.id.clone(), result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut new_ids: HashMap<String, String> = HashMap::new();
        let mut first_error = None;
        for (todo_id, result) in uploads {
            match result {
                Ok(blob_id) => {
                    new_ids.insert(todo_id, blob_id);
                }
                Err(e) => {
                    warn!(list = name, todo = %todo_id, error = %e, "failed to upload todo");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        let uploaded = new_ids.len();

        // Pushed content must land under a version other devices have not seen.
        if list.version <= remote_version {
            list.version = remote_version + 1;
        }

        let mut metadata = blob::load_metadata(blobs, &self.retry, &list.id, name).await?;
        for todo in list.todos.iter_mut() {
            if let Some(blob_id) = new_ids.remove(&todo.id) {
                metadata.replace_or_append(todo.remote_blob_id(), &blob_id);
                todo.blob_id = Some(blob_id);
            }
        }
        let current: HashSet<&str> = list.public_todos().filter_map(Todo::remote_blob_id).collect();
        metadata.todo_ids.retain(|id| current.contains(id.as_str()));
        for blob_id in list.public_todos().filter_map(Todo::remote_blob_id) {
            metadata.replace_or_append(None, blob_id);
        }
        metadata.name = name.to_string();
        metadata.version = list.version;

        self.retry
            .execute("write_metadata", || blobs.write_metadata(&list.id, &metadata))
            .await?;

        let receipt = self
            .retry
            .execute("publish", || ledger.publish(name, &list))
            .await?;
        self.retry
            .execute("update_version", || {
                ledger.update_version(&list.id, list.version)
            })
            .await?;

        list.last_synced = Some(Utc::now());
        self.local.save(name, &list)?;

        info!(
            list = name,
            version = list.version,
            uploaded,
            digest = %receipt.digest,
            "published list"
        );

        Ok(SyncReport {
            list: name.to_string(),
            action: SyncAction::Pushed,
            previous,
            local_version,
            remote_version,
            version: list.version,
            pull: None,
            uploaded,
            receipt: Some(receipt),
        })
    }
}

async fn fetch_remote_todo(
    store: &dyn BlobStore,
    retry: &RetryOperator,
    blob_id: &str,
) -> Result<Todo> {
    let bytes = retry
        .execute("read_blob", || store.read_blob(blob_id))
        .await?;
    Todo::from_content(&bytes, blob_id)
}

fn conflict(name: &str, local: u64, remote: u64) -> TodoError {
    TodoError::Conflict {
        list: name.to_string(),
        local,
        remote,
    }
}

fn up_to_date(name: &str, previous: ListSyncState, local: u64, remote: u64) -> SyncReport {
    SyncReport {
        list: name.to_string(),
        action: SyncAction::UpToDate,
        previous,
        local_version: local,
        remote_version: remote,
        version: local,
        pull: None,
        uploaded: 0,
        receipt: None,
    }
}

/// Applies the caller's timeout and cancellation to an operation.
async fn bounded<T, Fut>(options: &SyncOptions, operation: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let limited = async {
        match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(result) => result,
                Err(_) => Err(TodoError::Timeout(limit)),
            },
            None => operation.await,
        }
    };

    match &options.cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TodoError::Cancelled),
                result = limited => result,
            }
        }
        None => limited.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let options = SyncOptions::default().with_timeout(Duration::from_secs(1));
        let err = bounded(&options, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_bounded_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let options = SyncOptions::default().with_cancel(token);
        let err = bounded(&options, async { Ok(1) }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let options = SyncOptions::default()
            .with_timeout(Duration::from_secs(1))
            .with_cancel(CancellationToken::new());
        assert_eq!(bounded(&options, async { Ok(7) }).await.unwrap(), 7);
    }
}
