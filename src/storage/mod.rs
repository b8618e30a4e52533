//! Record storage for gitdo.
//!
//! The sync engine only needs `ensure_initialized` and `reload`; the CRUD
//! methods back the CLI and the sync-on-write helpers.
//!
//! # Submodules
//!
//! - [`json`] - The shared JSON document in the working tree

pub mod json;

pub use json::JsonRecordStore;

use std::future::Future;

use crate::error::Result;
use crate::model::{NewTodo, Todo, TodoPatch};

/// Store of todos backed by the shared document.
///
/// IDs passed to `get`, `update` and `delete` may be a unique prefix.
pub trait RecordStore: Send + Sync {
    /// Create an empty document if none exists.
    fn ensure_initialized(&self) -> impl Future<Output = Result<()>> + Send;

    /// Re-read the document after something else changed it.
    ///
    /// Returns whether the content differs from what was cached.
    fn reload(&self) -> impl Future<Output = Result<bool>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<Todo>>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Todo>> + Send;

    fn create(&self, new: NewTodo) -> impl Future<Output = Result<Todo>> + Send;

    fn update(&self, id: &str, patch: TodoPatch) -> impl Future<Output = Result<Todo>> + Send;

    /// Remove a todo, returning it.
    fn delete(&self, id: &str) -> impl Future<Output = Result<Todo>> + Send;
}
