//! Configuration management.
//!
//! Settings live in `~/.gitdo/config.json` (or the file named by
//! `GITDO_CONFIG`) under a `sync` key. Every field has a default, so a
//! missing file or a partial one is fine.
//!
//! Priority, highest first:
//! 1. CLI flags
//! 2. `GITDO_REMOTE`, `GITDO_BRANCH`, `GITDO_DOCUMENT`, `GITDO_ACTOR`
//! 3. The config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitdoConfig {
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Remote to pull from and push to.
    pub remote: String,
    /// Branch to sync; the current branch when unset.
    pub branch: Option<String>,
    /// Document path relative to the repository root.
    pub document: String,
    /// Attempts per pull before giving up on transient failures.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Extra pull/push cycles allowed when the remote moves mid-sync.
    pub max_race_retries: u32,
    /// Default `sync watch` interval.
    pub auto_sync_interval_secs: Option<u64>,
    /// Debounce window for write-triggered syncs.
    pub debounce_ms: Option<u64>,
    /// Commit and push after every CLI write.
    pub sync_on_write: bool,
    pub queue_capacity: usize,
    pub commit_before_pull: bool,
    /// Name recorded as the creator of new todos.
    pub actor: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: None,
            document: "todos.json".to_string(),
            max_retries: 3,
            retry_base_delay_ms: 1000,
            max_race_retries: 5,
            auto_sync_interval_secs: None,
            debounce_ms: None,
            sync_on_write: false,
            queue_capacity: 64,
            commit_before_pull: true,
            actor: None,
        }
    }
}

impl SyncSettings {
    /// Apply `GITDO_*` overrides from `lookup` (normally the environment).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(remote) = get("GITDO_REMOTE") {
            self.remote = remote;
        }
        if let Some(branch) = get("GITDO_BRANCH") {
            self.branch = Some(branch);
        }
        if let Some(document) = get("GITDO_DOCUMENT") {
            self.document = document;
        }
        if let Some(actor) = get("GITDO_ACTOR") {
            self.actor = Some(actor);
        }
    }

    /// Reject settings the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an empty remote or a document path that is
    /// empty or absolute.
    pub fn validate(&self) -> Result<()> {
        if self.remote.trim().is_empty() {
            return Err(Error::Config("remote must not be empty".into()));
        }
        if self.document.trim().is_empty() {
            return Err(Error::Config("document path must not be empty".into()));
        }
        if Path::new(&self.document).is_absolute() {
            return Err(Error::Config(format!(
                "document path must be relative to the repository: {}",
                self.document
            )));
        }
        Ok(())
    }

    /// Absolute path of the document inside `repo_root`.
    #[must_use]
    pub fn document_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.document)
    }
}

/// Get the config file path.
///
/// # Errors
///
/// Returns `Config` when no home directory can be determined.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("GITDO_CONFIG")
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".gitdo").join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load a config file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns `Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<GitdoConfig> {
    if !path.exists() {
        return Ok(GitdoConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Load sync settings from the config file and environment.
///
/// # Errors
///
/// Returns `Config` if the file is unreadable or the result is invalid.
pub fn load_settings() -> Result<SyncSettings> {
    let mut settings = load_config_from(&config_path()?)?.sync;
    settings.apply_env_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

/// Get the repository root containing `dir`.
#[must_use]
pub fn git_toplevel(dir: &Path) -> Option<PathBuf> {
    std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim()))
}

/// Resolve the repository root.
///
/// Priority:
/// 1. Explicit `--repo` flag (or `GITDO_REPO`, via clap)
/// 2. The git toplevel of the current directory
/// 3. The current directory
///
/// # Errors
///
/// Returns an error if the current directory cannot be read.
pub fn resolve_repo_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()?;
    Ok(git_toplevel(&cwd).unwrap_or(cwd))
}

/// Get the actor name recorded on new todos.
///
/// Priority:
/// 1. `actor` setting (or `GITDO_ACTOR`)
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor(settings: &SyncSettings, repo_root: &Path) -> String {
    if let Some(actor) = &settings.actor {
        return actor.clone();
    }

    if let Ok(output) = std::process::Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(["config", "user.name"])
        .output()
        && output.status.success()
    {
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }

    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}
