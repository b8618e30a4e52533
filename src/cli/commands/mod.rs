//! Command implementations.

pub mod completions;
pub mod init;
pub mod sync;
pub mod todo;
pub mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{default_actor, load_settings, resolve_repo_root, SyncSettings};
use crate::error::{Error, Result};
use crate::storage::JsonRecordStore;
use crate::sync::{GitTransport, SyncCoordinator, SyncOptions};

/// Coordinator type every command works with.
pub type Coordinator = SyncCoordinator<GitTransport, JsonRecordStore>;

/// Repository, settings and the collaborators built from them.
pub struct Workspace {
    pub repo_root: PathBuf,
    pub settings: SyncSettings,
    pub vcs: Arc<GitTransport>,
    pub store: Arc<JsonRecordStore>,
}

impl Workspace {
    /// Resolve the repository and load settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the working directory
    /// cannot be determined.
    pub fn open(repo: Option<&PathBuf>, actor: Option<&str>) -> Result<Self> {
        let mut settings = load_settings()?;
        if let Some(actor) = actor {
            settings.actor = Some(actor.to_string());
        }

        let repo_root = resolve_repo_root(repo.map(PathBuf::as_path))?;
        let actor = default_actor(&settings, &repo_root);
        let vcs = GitTransport::new(repo_root.clone())
            .with_remote(settings.remote.clone())
            .with_branch(settings.branch.clone());
        let store = JsonRecordStore::new(settings.document_path(&repo_root), actor);

        Ok(Self {
            repo_root,
            settings,
            vcs: Arc::new(vcs),
            store: Arc::new(store),
        })
    }

    pub fn document_path(&self) -> &Path {
        self.store.path()
    }

    /// Build a coordinator over this workspace.
    #[must_use]
    pub fn coordinator(&self) -> Arc<Coordinator> {
        SyncCoordinator::new(
            Arc::clone(&self.vcs),
            Arc::clone(&self.store),
            SyncOptions::from(&self.settings),
        )
    }
}

/// Create the tokio runtime a command runs on.
///
/// # Errors
///
/// Returns an error if the runtime cannot be started.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}
