//! Sync types shared by the transport, retry helpers, and coordinator.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Commit message used after merging conflicted documents.
pub const CONFLICT_COMMIT_MESSAGE: &str = "Resolved merge conflicts";

/// Commit message used for pending local edits before a pull.
pub const LOCAL_CHANGES_COMMIT_MESSAGE: &str = "Sync local changes";

/// Error message returned when a sync is already running.
pub const SYNC_IN_PROGRESS: &str = "Sync already in progress";

/// Result of a `pull`.
///
/// Expected failure modes come back as variants; unexpected ones are
/// returned as `Err` from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote changes (if any) merged cleanly.
    Pulled,
    /// The merge stopped; these paths hold conflicts.
    Conflicts(Vec<String>),
    /// The remote could not be reached.
    Offline(String),
}

impl PullOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Pulled)
    }

    #[must_use]
    pub const fn has_conflicts(&self) -> bool {
        matches!(self, Self::Conflicts(_))
    }
}

/// A pull that reached the remote.
///
/// [`pull_with_retry`](super::pull_with_retry) turns
/// [`PullOutcome::Offline`] into retries, so only these two remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Remote changes (if any) merged cleanly.
    Clean,
    /// The merge stopped; these paths hold conflicts.
    Conflicts(Vec<String>),
}

/// Result of a `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The remote is ahead; pull and retry.
    NeedsPull,
}

/// Result of a `commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// False when there was nothing to commit.
    pub committed: bool,
    pub message: String,
}

/// Working-tree state reported by `git status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    /// Current branch; `None` on a detached HEAD.
    pub branch: Option<String>,
    /// Upstream tracking ref, e.g. `origin/main`.
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    /// Paths with unresolved merge conflicts.
    pub conflicted: Vec<String>,
    /// Tracked paths with staged or unstaged changes.
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
}

impl RepoStatus {
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicted.is_empty()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicted.is_empty() && self.modified.is_empty() && self.untracked.is_empty()
    }
}

/// Outcome of one synchronization attempt.
///
/// Callers always get one of these; `sync()` never returns an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    /// Whether the pull produced conflicts that had to be merged.
    pub had_conflicts: bool,
    /// Paths whose conflicts were resolved.
    pub resolved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    #[must_use]
    pub fn succeeded(resolved: Vec<String>) -> Self {
        Self {
            success: true,
            had_conflicts: !resolved.is_empty(),
            resolved,
            error: None,
            completed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            had_conflicts: false,
            resolved: Vec::new(),
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    /// Rejection returned to a caller while another sync is running.
    #[must_use]
    pub fn busy() -> Self {
        Self::failed(SYNC_IN_PROGRESS)
    }
}

/// Process-lifetime sync counters. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub conflicts_resolved: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncStats {
    /// Fraction of finished syncs that succeeded, if any finished.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.successful_syncs + self.failed_syncs;
        (finished > 0).then(|| self.successful_syncs as f64 / finished as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_result() {
        let result = SyncResult::busy();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Sync already in progress"));
    }

    #[test]
    fn test_succeeded_marks_conflicts() {
        assert!(!SyncResult::succeeded(Vec::new()).had_conflicts);
        assert!(SyncResult::succeeded(vec!["todos.json".into()]).had_conflicts);
    }

    #[test]
    fn test_success_rate() {
        let mut stats = SyncStats::default();
        assert_eq!(stats.success_rate(), None);

        stats.successful_syncs = 3;
        stats.failed_syncs = 1;
        assert_eq!(stats.success_rate(), Some(0.75));
    }

    #[test]
    fn test_repo_status_flags() {
        let mut status = RepoStatus::default();
        assert!(status.is_clean());
        assert!(!status.has_conflicts());

        status.conflicted.push("todos.json".into());
        assert!(status.has_conflicts());
        assert!(!status.is_clean());
    }
}
