//! Git-backed synchronization of the shared todo document.
//!
//! - **Transport**: `git` subprocess calls with classified failures
//! - **Retry**: bounded exponential backoff for transient failures
//! - **Resolver**: field-level last-write-wins merge of conflicting edits
//! - **Coordinator**: single-flight sync cycle, deferred queue, timers
//! - **File**: atomic temp-file-then-rename writes
//! - **Hashing**: SHA256 content hashing for change detection
//!
//! # Sync cycle
//!
//! 1. Commit pending local edits
//! 2. Pull; on conflicts, merge each conflicted document and commit
//! 3. Push; if the remote moved meanwhile, go back to 2 (bounded)
//! 4. Reload the record store from disk
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitdo::storage::JsonRecordStore;
//! use gitdo::sync::{GitTransport, SyncCoordinator, SyncOptions};
//!
//! let vcs = Arc::new(GitTransport::new(repo_root));
//! let store = Arc::new(JsonRecordStore::new(repo_root.join("todos.json"), "alice"));
//! let coordinator = SyncCoordinator::new(vcs, store, SyncOptions::default());
//!
//! let result = coordinator.sync().await;
//! if !result.success {
//!     eprintln!("sync failed: {:?}", result.error);
//! }
//! ```

mod coordinator;
mod file;
mod git;
mod hash;
mod resolver;
mod retry;
mod status;
mod types;

#[cfg(test)]
mod testing;

// Re-export main types and functions
pub use coordinator::{SyncCoordinator, SyncOptions};
pub use file::{atomic_write, atomic_write_async, ensure_gitignore, gitignore_content, TEMP_SUFFIX};
pub use git::{
    classify_failure, has_conflict_markers, is_missing_remote_ref, parse_porcelain_status,
    GitTransport, VersionControl,
};
pub use hash::{content_hash, has_changed};
pub use resolver::{
    merge_collection, merge_collection_values, merge_record, merge_record_value,
    resolve_file_content,
};
pub use retry::{backoff_delay, pull_with_retry, sync_with_retry};
pub use status::{get_sync_status, print_status, DocumentInfo, SyncStatusReport};
pub use types::{
    CommitOutcome, MergeOutcome, PullOutcome, PushOutcome, RepoStatus, SyncResult, SyncStats,
    CONFLICT_COMMIT_MESSAGE, LOCAL_CHANGES_COMMIT_MESSAGE, SYNC_IN_PROGRESS,
};
