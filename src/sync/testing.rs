//! Scripted in-memory [`VersionControl`] for retry and coordinator tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::git::VersionControl;
use super::types::{CommitOutcome, PullOutcome, PushOutcome, RepoStatus};

/// Replays queued outcomes; once a queue runs dry every call succeeds.
#[derive(Default)]
pub(crate) struct ScriptedVcs {
    pulls: Mutex<VecDeque<Result<PullOutcome>>>,
    pushes: Mutex<VecDeque<Result<PushOutcome>>>,
    conflicted: Mutex<Vec<String>>,
    pull_times: Mutex<Vec<Instant>>,
    commits: Mutex<Vec<String>>,
    resolved: Mutex<Vec<String>>,
    push_calls: AtomicUsize,
    /// When set, each pull waits for one `notify_one`.
    pull_gate: Option<Notify>,
}

impl ScriptedVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose pulls block until [`Self::release_pull`].
    pub fn gated() -> Self {
        Self {
            pull_gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub fn release_pull(&self) {
        if let Some(gate) = &self.pull_gate {
            gate.notify_one();
        }
    }

    pub fn queue_pull(&self, outcome: Result<PullOutcome>) {
        self.pulls.lock().unwrap().push_back(outcome);
    }

    pub fn queue_push(&self, outcome: Result<PushOutcome>) {
        self.pushes.lock().unwrap().push_back(outcome);
    }

    pub fn set_conflicted(&self, paths: &[&str]) {
        *self.conflicted.lock().unwrap() = paths.iter().map(ToString::to_string).collect();
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_times.lock().unwrap().len()
    }

    pub fn pull_times(&self) -> Vec<Instant> {
        self.pull_times.lock().unwrap().clone()
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

impl VersionControl for ScriptedVcs {
    async fn pull(&self) -> Result<PullOutcome> {
        self.pull_times.lock().unwrap().push(Instant::now());
        if let Some(gate) = &self.pull_gate {
            gate.notified().await;
        }
        self.pulls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PullOutcome::Pulled))
    }

    async fn push(&self) -> Result<PushOutcome> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.pushes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PushOutcome::Pushed))
    }

    async fn commit(&self, message: &str) -> Result<CommitOutcome> {
        self.commits.lock().unwrap().push(message.to_string());
        Ok(CommitOutcome {
            committed: true,
            message: message.to_string(),
        })
    }

    async fn status(&self) -> Result<RepoStatus> {
        Ok(RepoStatus {
            branch: Some("main".to_string()),
            conflicted: self.conflicted.lock().unwrap().clone(),
            ..RepoStatus::default()
        })
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    async fn checkout(&self, _branch: &str) -> Result<()> {
        Ok(())
    }

    async fn resolve_conflict(&self, path: &str) -> Result<()> {
        if path.starts_with("broken") {
            return Err(Error::Other(format!("cannot merge {path}")));
        }
        self.conflicted.lock().unwrap().retain(|p| p != path);
        self.resolved.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn write_atomic(&self, _path: &Path, _content: &str) -> Result<()> {
        Ok(())
    }
}
