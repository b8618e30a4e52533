//! Error types for gitdo.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=repo, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gitdo operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Failure Kind ──────────────────────────────────────────────

/// Closed set of version-control failure categories.
///
/// The git transport maps raw command output onto one of these exactly
/// once; everything above the transport matches on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Remote unreachable, DNS failure, dropped connection.
    Network,
    /// Another git process holds the index lock.
    Locked,
    /// Credentials rejected or missing.
    Authentication,
    /// Merge stopped with conflicted paths.
    MergeConflict,
    /// Push refused because the remote has commits we lack.
    Rejected,
    /// The working directory is not inside a repository.
    NotARepository,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Whether a retry with backoff can reasonably succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Locked => "locked",
            Self::Authentication => "authentication",
            Self::MergeConflict => "merge_conflict",
            Self::Rejected => "rejected",
            Self::NotARepository => "not_a_repository",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Repository (exit 2)
    NotInitialized,
    NotARepository,

    // Not Found (exit 3)
    TodoNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Sync (exit 6)
    NetworkError,
    AuthenticationError,
    MergeConflict,
    PushRejected,
    RetriesExhausted,
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::NotARepository => "NOT_A_REPOSITORY",
            Self::TodoNotFound => "TODO_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::MergeConflict => "MERGE_CONFLICT",
            Self::PushRejected => "PUSH_REJECTED",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::NotARepository => 2,
            Self::TodoNotFound => 3,
            Self::InvalidArgument => 4,
            Self::NetworkError
            | Self::AuthenticationError
            | Self::MergeConflict
            | Self::PushRejected
            | Self::RetriesExhausted
            | Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running the same command later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError
                | Self::PushRejected
                | Self::RetriesExhausted
                | Self::MergeConflict
                | Self::SyncError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in gitdo operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no todo document at {path}")]
    NotInitialized { path: PathBuf },

    #[error("Todo not found: {id}")]
    TodoNotFound { id: String },

    #[error("Todo not found: {id} (did you mean: {}?)", similar.join(", "))]
    TodoNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("git {kind} failure: {message}")]
    Transport { kind: FailureKind, message: String },

    #[error("Push rejected: remote has changes that must be pulled first")]
    PushRejected,

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Deferred operation queue is closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for building a transport error.
    pub fn transport(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// The transport failure category, if this is a transport error.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            Self::PushRejected => Some(FailureKind::Rejected),
            _ => None,
        }
    }

    /// Whether the retry wrappers should try again after backing off.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self.failure_kind() {
            Some(kind) => kind.is_transient(),
            None => false,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::TodoNotFound { .. } | Self::TodoNotFoundSimilar { .. } => {
                ErrorCode::TodoNotFound
            }
            Self::Transport { kind, .. } => match kind {
                FailureKind::Network | FailureKind::Locked => ErrorCode::NetworkError,
                FailureKind::Authentication => ErrorCode::AuthenticationError,
                FailureKind::MergeConflict => ErrorCode::MergeConflict,
                FailureKind::Rejected => ErrorCode::PushRejected,
                FailureKind::NotARepository => ErrorCode::NotARepository,
                FailureKind::Other => ErrorCode::SyncError,
            },
            Self::PushRejected => ErrorCode::PushRejected,
            Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            Self::SyncFailed(_) => ErrorCode::SyncError,
            Self::QueueClosed | Self::Other(_) => ErrorCode::InternalError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { .. } => {
                Some("Run `gitdo init` inside the shared repository".to_string())
            }
            Self::TodoNotFound { id } => Some(format!(
                "No todo with ID '{id}'. Use `gitdo list --all` to see every todo."
            )),
            Self::TodoNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }
            Self::Transport { kind, .. } => match kind {
                FailureKind::Network => {
                    Some("Check your connection; the sync can be re-run safely.".to_string())
                }
                FailureKind::Authentication => Some(
                    "git rejected the credentials. Configure a credential helper or SSH key."
                        .to_string(),
                ),
                FailureKind::MergeConflict => {
                    Some("Run `gitdo sync resolve` to merge conflicted documents.".to_string())
                }
                FailureKind::NotARepository => Some(
                    "Pass --repo or run gitdo inside a git working tree.".to_string(),
                ),
                FailureKind::Locked => Some(
                    "Another git process is running. Wait for it, then retry.".to_string(),
                ),
                FailureKind::Rejected | FailureKind::Other => None,
            },
            Self::PushRejected => Some("Run `gitdo sync run` to pull and merge first.".to_string()),
            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: pending, in_progress, completed, cancelled. \
                         Synonyms: done→completed, wip→in_progress, todo→pending"
                            .to_string(),
                    )
                } else if msg.contains("priority") {
                    Some("Valid priorities: low, medium, high, urgent (or P0-P3)".to_string())
                } else {
                    None
                }
            }
            Self::SyncFailed(_) => {
                Some("Run `gitdo sync status` to inspect the repository.".to_string())
            }
            Self::RetriesExhausted { .. }
            | Self::QueueClosed
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
