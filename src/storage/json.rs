//! Todo store over the shared JSON document.
//!
//! Reads are served from an in-memory copy. Every mutation re-reads the
//! file under the write lock, applies the change, and writes the whole
//! document back with [`atomic_write_async`], so a crash never leaves a
//! half-written file and edits made by a sync are never clobbered.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Document, NewTodo, Todo, TodoPatch};
use crate::sync::{atomic_write_async, content_hash, has_changed};

use super::RecordStore;

#[derive(Debug, Default)]
struct Cache {
    document: Option<Document>,
    hash: Option<String>,
}

/// [`RecordStore`] backed by one JSON file in the working tree.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    actor: String,
    cache: RwLock<Cache>,
}

impl JsonRecordStore {
    /// Store for the document at `path`. `actor` is recorded as the
    /// creator of new todos.
    pub fn new(path: impl Into<PathBuf>, actor: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            actor: actor.into(),
            cache: RwLock::new(Cache::default()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    async fn read_document(&self) -> Result<(Document, String)> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotInitialized {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let document: Document = serde_json::from_str(&content)?;
        Ok((document, content_hash(&content)))
    }

    /// Cached document, loading it on first use.
    async fn snapshot(&self) -> Result<Document> {
        if let Some(document) = &self.cache.read().await.document {
            return Ok(document.clone());
        }
        self.reload().await?;
        Ok(self.cache.read().await.document.clone().unwrap_or_default())
    }

    /// Read-modify-write the document under the write lock.
    async fn mutate<F, T>(&self, op: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T> + Send,
        T: Send,
    {
        let mut cache = self.cache.write().await;
        let (mut document, _) = self.read_document().await?;

        let out = f(&mut document)?;

        let content = document.to_pretty_json()?;
        let hash = content_hash(&content);
        atomic_write_async(self.path.clone(), content).await?;
        cache.document = Some(document);
        cache.hash = Some(hash);

        debug!(op, path = %self.path.display(), "Document written");
        Ok(out)
    }
}

/// Index of the todo matching `id` exactly, or as a unique prefix.
fn find_index(todos: &[Todo], id: &str) -> Result<usize> {
    if let Some(index) = todos.iter().position(|t| t.id == id) {
        return Ok(index);
    }

    let mut matches = todos
        .iter()
        .enumerate()
        .filter(|(_, t)| !id.is_empty() && t.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some((index, _)), None) => Ok(index),
        (Some(_), Some(_)) => Err(Error::InvalidArgument(format!(
            "ID prefix '{id}' matches more than one todo"
        ))),
        (None, _) => Err(Error::TodoNotFound { id: id.to_string() }),
    }
}

impl RecordStore for JsonRecordStore {
    async fn ensure_initialized(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        let content = Document::default().to_pretty_json()?;
        atomic_write_async(self.path.clone(), content).await?;
        info!(path = %self.path.display(), "Created empty document");
        Ok(())
    }

    async fn reload(&self) -> Result<bool> {
        let mut cache = self.cache.write().await;
        let (document, hash) = self.read_document().await?;
        let changed = has_changed(&hash, cache.hash.as_deref());

        if changed {
            debug!(path = %self.path.display(), todos = document.todos.len(), "Document reloaded");
        }
        cache.document = Some(document);
        cache.hash = Some(hash);
        Ok(changed)
    }

    async fn list(&self) -> Result<Vec<Todo>> {
        Ok(self.snapshot().await?.todos)
    }

    async fn get(&self, id: &str) -> Result<Todo> {
        let mut todos = self.snapshot().await?.todos;
        let index = find_index(&todos, id)?;
        Ok(todos.swap_remove(index))
    }

    async fn create(&self, new: NewTodo) -> Result<Todo> {
        let todo = new.into_todo(&self.actor, Utc::now());
        todo.validate()?;

        self.mutate("create", |document| {
            document.todos.push(todo.clone());
            Ok(todo)
        })
        .await
    }

    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Todo> {
        let now = Utc::now();
        self.mutate("update", |document| {
            let index = find_index(&document.todos, id)?;
            let todo = &mut document.todos[index];
            let changed = todo.apply_patch(&patch, now);
            todo.validate()?;
            debug!(id = %todo.id, changed = changed.len(), "Applied patch");
            Ok(todo.clone())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<Todo> {
        self.mutate("delete", |document| {
            let index = find_index(&document.todos, id)?;
            Ok(document.todos.remove(index))
        })
        .await
    }
}
