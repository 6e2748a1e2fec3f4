//! Error taxonomy shared by every store and the sync engine.
//!
//! Each error carries its [`ErrorKind`] from the moment it is created. Retry
//! decisions and CLI reporting read the kind; nothing inspects messages.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TodoError>;

/// Coarse classification of a [`TodoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    TransientNetwork,
    Auth,
    Conflict,
    CorruptData,
    Timeout,
    Cancelled,
    Io,
    Remote,
    Serialization,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::TransientNetwork => "transient-network",
            ErrorKind::Auth => "auth",
            ErrorKind::Conflict => "conflict",
            ErrorKind::CorruptData => "corrupt-data",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
            ErrorKind::Remote => "remote",
            ErrorKind::Serialization => "serialization",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur in todo-sync operations.
#[derive(Error, Debug)]
pub enum TodoError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("{last} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TodoError>,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(
        "List '{list}' is out of step with the ledger (local version {local}, \
         ledger version {remote}). Run `pull --discard-local` to drop local changes, \
         or `publish` to push them."
    )]
    Conflict { list: String, local: u64, remote: u64 },

    #[error("Corrupt list document {}: {reason}", path.display())]
    CorruptData { path: PathBuf, reason: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote rejected request: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TodoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TodoError::Validation(msg.into())
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        TodoError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        TodoError::TransientNetwork(msg.into())
    }

    /// The ledger was asked to sign without a configured key.
    pub fn missing_credential() -> Self {
        TodoError::Auth(
            "no signing credential configured. Set private_key in the config file \
             or export TODO_SYNC_PRIVATE_KEY"
                .into(),
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TodoError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the kind tag assigned when the error was created.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TodoError::Validation(_) => ErrorKind::Validation,
            TodoError::NotFound { .. } => ErrorKind::NotFound,
            TodoError::TransientNetwork(_) | TodoError::RetriesExhausted { .. } => {
                ErrorKind::TransientNetwork
            }
            TodoError::Auth(_) => ErrorKind::Auth,
            TodoError::Conflict { .. } => ErrorKind::Conflict,
            TodoError::CorruptData { .. } => ErrorKind::CorruptData,
            TodoError::Timeout(_) => ErrorKind::Timeout,
            TodoError::Cancelled => ErrorKind::Cancelled,
            TodoError::Io { .. } => ErrorKind::Io,
            TodoError::Remote(_) => ErrorKind::Remote,
            TodoError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Returns true if another attempt may succeed.
    ///
    /// An exhausted retry is terminal even though its kind stays transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TodoError::TransientNetwork(_))
    }

    /// Classifies a transport-level failure from the HTTP client.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            TodoError::TransientNetwork(err.to_string())
        } else if err.is_decode() {
            TodoError::Remote(format!("malformed response: {}", err))
        } else {
            TodoError::TransientNetwork(err.to_string())
        }
    }

    /// Classifies a non-success HTTP status.
    pub(crate) fn from_status(
        status: reqwest::StatusCode,
        what: &'static str,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        match status.as_u16() {
            404 => TodoError::not_found(what, id),
            401 | 403 => TodoError::Auth(format!("server refused access to {} {}", what, id)),
            408 | 429 => TodoError::transient(format!("{} {}: status {}", what, id, status)),
            s if s >= 500 => TodoError::transient(format!("{} {}: status {}", what, id, status)),
            _ => TodoError::Remote(format!("{} {}: status {}", what, id, status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_preserved_through_retry_wrapper() {
        let err = TodoError::RetriesExhausted {
            attempts: 3,
            last: Box::new(TodoError::transient("connection reset")),
        };
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(TodoError::transient("timeout").is_retryable());
        assert!(!TodoError::Auth("no key".into()).is_retryable());
        assert!(!TodoError::validation("bad priority").is_retryable());
        assert!(!TodoError::not_found("blob", "abc").is_retryable());
        assert!(!TodoError::Cancelled.is_retryable());
    }

    #[test]
    fn test_missing_credential_names_the_key() {
        let err = TodoError::missing_credential();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("TODO_SYNC_PRIVATE_KEY"));
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;

        let err = TodoError::from_status(StatusCode::NOT_FOUND, "blob", "abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = TodoError::from_status(StatusCode::TOO_MANY_REQUESTS, "blob", "abc");
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);

        let err = TodoError::from_status(StatusCode::BAD_GATEWAY, "blob", "abc");
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);

        let err = TodoError::from_status(StatusCode::FORBIDDEN, "blob", "abc");
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!err.to_string().contains("TODO_SYNC_PRIVATE_KEY"));

        let err = TodoError::from_status(StatusCode::BAD_REQUEST, "blob", "abc");
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_conflict_message_names_resolutions() {
        let err = TodoError::Conflict {
            list: "work".into(),
            local: 2,
            remote: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("pull --discard-local"));
        assert!(msg.contains("publish"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
