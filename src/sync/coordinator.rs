//! Sync coordinator.
//!
//! Runs the full cycle (finish any stale merge, commit local edits, pull,
//! resolve conflicts, commit, push, reload) with at most one cycle in flight
//! per coordinator:
//!
//! ```text
//!            sync()                       push: NeedsPull (bounded)
//!   Idle ───────────────▶ Syncing ───┐ ◀──────────────────────────┐
//!    ▲                      │        └────────────────────────────┘
//!    │   result recorded,   │
//!    └── queue drained ◀────┘
//! ```
//!
//! A second `sync()` while one is running is rejected immediately with
//! [`SyncResult::busy`]. Work that must wait for the running cycle goes
//! through [`SyncCoordinator::queue_operation`] and runs FIFO once the
//! coordinator is idle again.
//!
//! Consistency holds within one process only. Two processes sharing a
//! working tree are not locked against each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::{Error, FailureKind, Result};
use crate::model::{NewTodo, Todo, TodoPatch};
use crate::storage::RecordStore;

use super::git::VersionControl;
use super::retry::{millis, pull_with_retry};
use super::types::{
    CONFLICT_COMMIT_MESSAGE, LOCAL_CHANGES_COMMIT_MESSAGE, MergeOutcome, PushOutcome, SyncResult,
    SyncStats,
};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Tuning knobs for a [`SyncCoordinator`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Attempts per pull before giving up on transient failures.
    pub max_retries: u32,
    /// Backoff unit for transient failures.
    pub retry_base_delay: Duration,
    /// Extra pull/push cycles allowed when the remote moves mid-sync.
    pub max_race_retries: u32,
    /// Deferred operations that may wait at once.
    pub queue_capacity: usize,
    /// Commit pending local edits before pulling.
    pub commit_before_pull: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            max_race_retries: 5,
            queue_capacity: 64,
            commit_before_pull: true,
        }
    }
}

impl From<&SyncSettings> for SyncOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_race_retries: settings.max_race_retries,
            queue_capacity: settings.queue_capacity,
            commit_before_pull: settings.commit_before_pull,
        }
    }
}

/// Holds the Idle→Syncing transition; dropping it returns to Idle.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates synchronization between the record store and the remote.
pub struct SyncCoordinator<V, S> {
    vcs: Arc<V>,
    store: Arc<S>,
    options: SyncOptions,
    this: Weak<Self>,

    syncing: AtomicBool,
    stats: Mutex<SyncStats>,

    queue_tx: mpsc::Sender<Job>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    queued: AtomicUsize,

    sync_on_write: AtomicBool,
    debounce: Mutex<Option<Duration>>,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
    auto_sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl<V, S> SyncCoordinator<V, S>
where
    V: VersionControl + 'static,
    S: RecordStore + 'static,
{
    pub fn new(vcs: Arc<V>, store: Arc<S>, options: SyncOptions) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(options.queue_capacity.max(1));
        Arc::new_cyclic(|this| Self {
            vcs,
            store,
            options,
            this: this.clone(),
            syncing: AtomicBool::new(false),
            stats: Mutex::new(SyncStats::default()),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            queued: AtomicUsize::new(0),
            sync_on_write: AtomicBool::new(false),
            debounce: Mutex::new(None),
            debounce_task: Mutex::new(None),
            auto_sync_task: Mutex::new(None),
        })
    }

    pub fn vcs(&self) -> &Arc<V> {
        &self.vcs
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ── Sync ──────────────────────────────────────────────────

    /// Run one synchronization cycle.
    ///
    /// Never fails: errors are reported in the returned [`SyncResult`] and
    /// recorded in the stats. Returns [`SyncResult::busy`] without touching
    /// the repository when a cycle is already running.
    pub async fn sync(&self) -> SyncResult {
        let Some(guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Sync already in progress, rejecting");
            return SyncResult::busy();
        };

        lock(&self.stats).total_syncs += 1;
        let started = Instant::now();

        let result = match self.run_cycle().await {
            Ok(resolved) => {
                let result = SyncResult::succeeded(resolved);
                let mut stats = lock(&self.stats);
                stats.successful_syncs += 1;
                stats.last_sync_time = Some(result.completed_at);
                stats.last_error = None;
                drop(stats);
                info!(
                    elapsed_ms = millis(started.elapsed()),
                    resolved = result.resolved.len(),
                    "Sync succeeded"
                );
                result
            }
            Err(e) => {
                let message = e.to_string();
                let mut stats = lock(&self.stats);
                stats.failed_syncs += 1;
                stats.last_error = Some(message.clone());
                drop(stats);
                warn!(elapsed_ms = millis(started.elapsed()), error = %message, "Sync failed");
                SyncResult::failed(message)
            }
        };

        drop(guard);
        self.drain_queue().await;
        result
    }

    /// Pull, merge, push. Returns the paths whose conflicts were resolved.
    async fn run_cycle(&self) -> Result<Vec<String>> {
        let max_cycles = self.options.max_race_retries.saturating_add(1);
        let mut resolved = Vec::new();

        for cycle in 0..max_cycles {
            resolved.extend(self.settle_working_tree().await?);

            let pulled = pull_with_retry(
                self.vcs.as_ref(),
                self.options.max_retries,
                self.options.retry_base_delay,
            )
            .await?;

            if let MergeOutcome::Conflicts(paths) = pulled {
                resolved.extend(self.finish_after_conflicts(&paths).await?);
                return Ok(resolved);
            }

            match self.vcs.push().await? {
                PushOutcome::Pushed => {
                    self.store.reload().await?;
                    return Ok(resolved);
                }
                PushOutcome::NeedsPull => {
                    info!(races = cycle + 1, "Remote moved during sync, pulling again");
                }
            }
        }

        Err(Error::Other(format!(
            "Remote changed {max_cycles} times during sync; giving up"
        )))
    }

    /// Get the working tree ready to pull.
    ///
    /// A merge left unfinished by an earlier run (or a manual pull) still
    /// has conflicted paths; those are merged and committed first so no
    /// conflict markers are ever committed. Then pending local edits are
    /// committed when `commit_before_pull` is on.
    async fn settle_working_tree(&self) -> Result<Vec<String>> {
        let stale = self.vcs.status().await?.conflicted;
        let resolved = if stale.is_empty() {
            Vec::new()
        } else {
            warn!(paths = ?stale, "Unfinished merge in working tree, resolving");
            self.commit_resolution(&stale).await?
        };

        if self.options.commit_before_pull {
            let commit = self.vcs.commit(LOCAL_CHANGES_COMMIT_MESSAGE).await?;
            if commit.committed {
                debug!("Committed local changes before pull");
            }
        }
        Ok(resolved)
    }

    /// Merge `paths`, commit the merge and count it.
    async fn commit_resolution(&self, paths: &[String]) -> Result<Vec<String>> {
        let resolved = self.resolve_conflicts(paths).await?;
        self.vcs.commit(CONFLICT_COMMIT_MESSAGE).await?;
        lock(&self.stats).conflicts_resolved += resolved.len() as u64;
        Ok(resolved)
    }

    async fn finish_after_conflicts(&self, paths: &[String]) -> Result<Vec<String>> {
        info!(paths = ?paths, "Pull reported conflicts");
        let resolved = self.commit_resolution(paths).await?;

        match self.vcs.push().await? {
            PushOutcome::Pushed => {
                self.store.reload().await?;
                Ok(resolved)
            }
            PushOutcome::NeedsPull => Err(Error::PushRejected),
        }
    }

    /// Make sure the document exists, then sync once.
    ///
    /// Failures are prefixed with "Initial sync failed".
    pub async fn initial_sync(&self) -> SyncResult {
        if let Err(e) = self.store.ensure_initialized().await {
            return SyncResult::failed(format!("Initial sync failed: {e}"));
        }
        let mut result = self.sync().await;
        if let Some(error) = result.error.take() {
            result.error = Some(format!("Initial sync failed: {error}"));
        }
        result
    }

    /// Merge each conflicted path in order. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the transport error for the first path that cannot be merged.
    pub async fn resolve_conflicts(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            self.vcs.resolve_conflict(path).await?;
            resolved.push(path.clone());
        }
        Ok(resolved)
    }

    /// Whether the working tree currently has conflicted paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be read.
    pub async fn has_conflicts(&self) -> Result<bool> {
        Ok(self.vcs.status().await?.has_conflicts())
    }

    // ── Deferred queue ────────────────────────────────────────

    /// Run `op` now if idle, otherwise once the running sync finishes.
    ///
    /// Deferred operations run one at a time in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the operation was dropped unrun.
    pub async fn queue_operation<F, T>(&self, op: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_syncing() {
            return Ok(op.await);
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // The submitter may have gone away; the job still ran.
            let _ = tx.send(op.await);
        });

        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.queue_tx.send(job).await.is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::QueueClosed);
        }
        debug!(queued = self.queued_operations(), "Deferred operation until sync finishes");

        // The sync may have finished between the check and the send.
        self.drain_queue().await;
        rx.await.map_err(|_| Error::QueueClosed)
    }

    /// Operations waiting for the running sync.
    pub fn queued_operations(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    async fn drain_queue(&self) {
        loop {
            if self.is_syncing() {
                return;
            }
            {
                // Whoever holds the receiver drains; others leave it to them.
                let Ok(mut rx) = self.queue_rx.try_lock() else {
                    return;
                };
                while !self.is_syncing() {
                    let Ok(job) = rx.try_recv() else { break };
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    job.await;
                }
            }
            if self.queued_operations() == 0 || self.is_syncing() {
                return;
            }
        }
    }

    // ── Triggers ──────────────────────────────────────────────

    /// Sync every `interval`, skipping ticks while a sync is running.
    ///
    /// The first sync happens one interval from now. Replaces any running
    /// auto-sync timer.
    pub fn start_auto_sync(&self, interval: Duration) {
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(coordinator) = this.upgrade() else {
                    break;
                };
                if coordinator.is_syncing() {
                    debug!("Auto-sync tick skipped, sync in progress");
                    continue;
                }
                // Detached so stopping the timer never cancels a running sync.
                let run = tokio::spawn(async move { coordinator.sync().await });
                if let Ok(result) = run.await
                    && !result.success
                {
                    debug!(error = ?result.error, "Auto-sync attempt failed");
                }
            }
        });

        if let Some(previous) = lock(&self.auto_sync_task).replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs_f64(), "Auto-sync started");
    }

    pub fn stop_auto_sync(&self) {
        if let Some(handle) = lock(&self.auto_sync_task).take() {
            handle.abort();
            info!("Auto-sync stopped");
        }
    }

    pub fn is_auto_syncing(&self) -> bool {
        lock(&self.auto_sync_task).is_some()
    }

    /// Coalesce [`Self::trigger_sync`] calls within `window` into one sync.
    pub fn enable_debounce(&self, window: Duration) {
        *lock(&self.debounce) = Some(window);
    }

    /// Turn debouncing off and cancel any pending debounced sync.
    pub fn disable_debounce(&self) {
        *lock(&self.debounce) = None;
        if let Some(pending) = lock(&self.debounce_task).take() {
            pending.abort();
        }
    }

    /// Request a sync.
    ///
    /// With debouncing on, restarts the debounce timer and returns `None`;
    /// only the last request in a window syncs. Otherwise syncs right away
    /// and returns the result.
    pub async fn trigger_sync(&self) -> Option<SyncResult> {
        let window = *lock(&self.debounce);
        let Some(window) = window else {
            return Some(self.sync().await);
        };

        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(coordinator) = this.upgrade() {
                // Detached so a later trigger never cancels a running sync.
                tokio::spawn(async move { coordinator.sync().await });
            }
        });

        if let Some(pending) = lock(&self.debounce_task).replace(handle) {
            pending.abort();
            debug!("Debounced sync rescheduled");
        }
        None
    }

    // ── Sync on write ─────────────────────────────────────────

    /// Commit and push after every write made through the `*_with_sync`
    /// helpers.
    ///
    /// These pushes skip the pull/merge cycle. A push the remote rejects, or
    /// a working tree still in the middle of a merge, is left for the next
    /// full sync.
    pub fn enable_sync_on_write(&self) {
        self.sync_on_write.store(true, Ordering::Release);
    }

    pub fn disable_sync_on_write(&self) {
        self.sync_on_write.store(false, Ordering::Release);
    }

    pub fn is_sync_on_write(&self) -> bool {
        self.sync_on_write.load(Ordering::Acquire)
    }

    /// Create a todo, then commit and push it if sync-on-write is on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local write fails.
    pub async fn create_with_sync(&self, new: NewTodo) -> Result<Todo> {
        let todo = self.store.create(new).await?;
        self.push_write(format!("Add todo: {}", todo.text)).await;
        Ok(todo)
    }

    /// Update a todo, then commit and push it if sync-on-write is on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local write fails.
    pub async fn update_with_sync(&self, id: &str, patch: TodoPatch) -> Result<Todo> {
        let todo = self.store.update(id, patch).await?;
        self.push_write(format!("Update todo {}", todo.id)).await;
        Ok(todo)
    }

    /// Delete a todo, then commit and push it if sync-on-write is on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local write fails.
    pub async fn delete_with_sync(&self, id: &str) -> Result<Todo> {
        let todo = self.store.delete(id).await?;
        self.push_write(format!("Delete todo {}", todo.id)).await;
        Ok(todo)
    }

    async fn push_write(&self, message: String) {
        if !self.is_sync_on_write() {
            return;
        }

        let vcs = Arc::clone(&self.vcs);
        let outcome = self
            .queue_operation(async move {
                let stale = vcs.status().await?.conflicted;
                if !stale.is_empty() {
                    return Err(Error::transport(
                        FailureKind::MergeConflict,
                        format!("unfinished merge in {}", stale.join(", ")),
                    ));
                }
                if !vcs.commit(&message).await?.committed {
                    return Ok(PushOutcome::Pushed);
                }
                vcs.push().await
            })
            .await
            .and_then(|pushed| pushed);

        let error = match outcome {
            Ok(PushOutcome::Pushed) => {
                debug!("Write pushed");
                return;
            }
            Ok(PushOutcome::NeedsPull) => Error::PushRejected,
            Err(e) => e,
        };
        warn!(error = %error, "Sync-on-write push failed; next sync will retry");
        lock(&self.stats).last_error = Some(error.to_string());
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn last_sync_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        lock(&self.stats).last_sync_time
    }

    pub fn last_sync_error(&self) -> Option<String> {
        lock(&self.stats).last_error.clone()
    }

    pub fn stats(&self) -> SyncStats {
        lock(&self.stats).clone()
    }

    pub fn reset_stats(&self) {
        *lock(&self.stats) = SyncStats::default();
    }
}

impl<V, S> Drop for SyncCoordinator<V, S> {
    fn drop(&mut self) {
        for slot in [&self.auto_sync_task, &self.debounce_task] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonRecordStore;
    use crate::sync::PullOutcome;
    use crate::sync::testing::ScriptedVcs;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        vcs: Arc<ScriptedVcs>,
        coordinator: Arc<SyncCoordinator<ScriptedVcs, JsonRecordStore>>,
    }

    async fn harness_with(vcs: ScriptedVcs, options: SyncOptions) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonRecordStore::new(dir.path().join("todos.json"), "alice"));
        store.ensure_initialized().await.unwrap();
        let vcs = Arc::new(vcs);
        let coordinator = SyncCoordinator::new(Arc::clone(&vcs), store, options);
        Harness {
            _dir: dir,
            vcs,
            coordinator,
        }
    }

    async fn harness(vcs: ScriptedVcs) -> Harness {
        let options = SyncOptions {
            retry_base_delay: Duration::from_millis(10),
            ..SyncOptions::default()
        };
        harness_with(vcs, options).await
    }

    #[tokio::test]
    async fn test_sync_success_updates_stats() {
        let h = harness(ScriptedVcs::new()).await;

        let result = h.coordinator.sync().await;

        assert!(result.success);
        assert!(!result.had_conflicts);
        let stats = h.coordinator.stats();
        assert_eq!(stats.total_syncs, 1);
        assert_eq!(stats.successful_syncs, 1);
        assert_eq!(stats.last_sync_time, Some(result.completed_at));
        assert_eq!(h.vcs.commits(), vec![LOCAL_CHANGES_COMMIT_MESSAGE]);
        assert!(!h.coordinator.is_syncing());
    }

    #[tokio::test]
    async fn test_second_sync_is_rejected_while_busy() {
        let h = harness(ScriptedVcs::gated()).await;

        let first = tokio::spawn({
            let coordinator = Arc::clone(&h.coordinator);
            async move { coordinator.sync().await }
        });
        while h.vcs.pull_calls() == 0 {
            tokio::task::yield_now().await;
        }

        let second = h.coordinator.sync().await;
        assert!(!second.success);
        assert_eq!(second.error.as_deref(), Some("Sync already in progress"));
        assert_eq!(h.vcs.pull_calls(), 1);

        h.vcs.release_pull();
        assert!(first.await.unwrap().success);
        assert_eq!(h.vcs.pull_calls(), 1);
        assert_eq!(h.coordinator.stats().total_syncs, 1);
    }

    #[tokio::test]
    async fn test_push_race_costs_one_extra_cycle() {
        let vcs = ScriptedVcs::new();
        vcs.queue_push(Ok(PushOutcome::NeedsPull));
        let h = harness(vcs).await;

        let result = h.coordinator.sync().await;

        assert!(result.success);
        assert_eq!(h.vcs.pull_calls(), 2);
        assert_eq!(h.vcs.push_calls(), 2);
        assert_eq!(h.coordinator.stats().total_syncs, 1);
    }

    #[tokio::test]
    async fn test_push_races_are_bounded() {
        let vcs = ScriptedVcs::new();
        for _ in 0..10 {
            vcs.queue_push(Ok(PushOutcome::NeedsPull));
        }
        let options = SyncOptions {
            max_race_retries: 2,
            ..SyncOptions::default()
        };
        let h = harness_with(vcs, options).await;

        let result = h.coordinator.sync().await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Remote changed 3 times"));
        assert_eq!(h.vcs.pull_calls(), 3);
        assert_eq!(h.coordinator.stats().failed_syncs, 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_resolved_committed_and_pushed() {
        let vcs = ScriptedVcs::new();
        vcs.queue_pull(Ok(PullOutcome::Conflicts(vec!["todos.json".into()])));
        let h = harness(vcs).await;

        let result = h.coordinator.sync().await;

        assert!(result.success);
        assert!(result.had_conflicts);
        assert_eq!(result.resolved, vec!["todos.json"]);
        assert_eq!(h.vcs.resolved(), vec!["todos.json"]);
        assert_eq!(
            h.vcs.commits(),
            vec![LOCAL_CHANGES_COMMIT_MESSAGE, CONFLICT_COMMIT_MESSAGE]
        );
        assert_eq!(h.coordinator.stats().conflicts_resolved, 1);
    }

    #[tokio::test]
    async fn test_rejected_push_after_conflicts_fails() {
        let vcs = ScriptedVcs::new();
        vcs.queue_pull(Ok(PullOutcome::Conflicts(vec!["todos.json".into()])));
        vcs.queue_push(Ok(PushOutcome::NeedsPull));
        let h = harness(vcs).await;

        let result = h.coordinator.sync().await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Push rejected"));
        assert!(h.coordinator.last_sync_error().unwrap().contains("Push rejected"));
    }

    #[tokio::test]
    async fn test_failures_become_results() {
        let vcs = ScriptedVcs::new();
        vcs.queue_pull(Err(Error::transport(
            FailureKind::Authentication,
            "denied",
        )));
        let h = harness(vcs).await;

        let result = h.coordinator.sync().await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("denied"));
        assert!(!h.coordinator.is_syncing());
        assert_eq!(h.coordinator.stats().failed_syncs, 1);

        h.coordinator.reset_stats();
        assert_eq!(h.coordinator.stats(), SyncStats::default());
    }

    #[tokio::test]
    async fn test_initial_sync_prefixes_errors() {
        let vcs = ScriptedVcs::new();
        vcs.queue_pull(Err(Error::transport(FailureKind::Other, "boom")));
        let h = harness(vcs).await;

        let result = h.coordinator.initial_sync().await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Initial sync failed: "));
    }

    #[tokio::test]
    async fn test_queue_runs_in_order_after_sync() {
        let h = harness(ScriptedVcs::gated()).await;
        let sync = tokio::spawn({
            let coordinator = Arc::clone(&h.coordinator);
            async move { coordinator.sync().await }
        });
        while !h.coordinator.is_syncing() {
            tokio::task::yield_now().await;
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for n in 0..3 {
            let coordinator = Arc::clone(&h.coordinator);
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                coordinator
                    .queue_operation(async move {
                        order.lock().unwrap().push(n);
                        n * 10
                    })
                    .await
            }));
            while h.coordinator.queued_operations() <= n {
                tokio::task::yield_now().await;
            }
        }
        assert!(order.lock().unwrap().is_empty());

        h.vcs.release_pull();
        assert!(sync.await.unwrap().success);

        let mut results = Vec::new();
        for waiter in waiters {
            results.push(waiter.await.unwrap().unwrap());
        }
        assert_eq!(results, vec![0, 10, 20]);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(h.coordinator.queued_operations(), 0);
    }

    #[tokio::test]
    async fn test_queue_runs_immediately_when_idle() {
        let h = harness(ScriptedVcs::new()).await;
        let value = h.coordinator.queue_operation(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_triggers() {
        let h = harness(ScriptedVcs::new()).await;
        h.coordinator.enable_debounce(Duration::from_millis(500));

        for _ in 0..3 {
            assert!(h.coordinator.trigger_sync().await.is_none());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(h.vcs.pull_calls(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.vcs.pull_calls(), 1);
        assert_eq!(h.coordinator.stats().total_syncs, 1);
    }

    #[tokio::test]
    async fn test_trigger_without_debounce_syncs_now() {
        let h = harness(ScriptedVcs::new()).await;
        let result = h.coordinator.trigger_sync().await.unwrap();
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_sync_waits_one_interval() {
        let h = harness(ScriptedVcs::new()).await;
        h.coordinator.start_auto_sync(Duration::from_secs(60));
        assert!(h.coordinator.is_auto_syncing());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.vcs.pull_calls(), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(h.vcs.pull_calls(), 2);

        h.coordinator.stop_auto_sync();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.vcs.pull_calls(), 2);
    }

    #[tokio::test]
    async fn test_sync_on_write_commits_and_pushes() {
        let h = harness(ScriptedVcs::new()).await;

        h.coordinator
            .create_with_sync(NewTodo::new("Not pushed"))
            .await
            .unwrap();
        assert_eq!(h.vcs.push_calls(), 0);

        h.coordinator.enable_sync_on_write();
        let todo = h
            .coordinator
            .create_with_sync(NewTodo::new("Pushed"))
            .await
            .unwrap();

        assert_eq!(h.vcs.commits(), vec!["Add todo: Pushed"]);
        assert_eq!(h.vcs.push_calls(), 1);
        // The shortcut never pulls.
        assert_eq!(h.vcs.pull_calls(), 0);

        h.coordinator.delete_with_sync(&todo.id).await.unwrap();
        assert_eq!(h.vcs.push_calls(), 2);
    }

    #[tokio::test]
    async fn test_sync_on_write_failure_is_recorded() {
        let vcs = ScriptedVcs::new();
        vcs.queue_push(Ok(PushOutcome::NeedsPull));
        let h = harness(vcs).await;
        h.coordinator.enable_sync_on_write();

        let todo = h
            .coordinator
            .create_with_sync(NewTodo::new("Local only"))
            .await
            .unwrap();

        assert_eq!(h.coordinator.store().get(&todo.id).await.unwrap().text, "Local only");
        assert!(h.coordinator.last_sync_error().unwrap().contains("Push rejected"));
    }

    #[tokio::test]
    async fn test_sync_finishes_stale_merge_before_committing() {
        let h = harness(ScriptedVcs::new()).await;
        h.vcs.set_conflicted(&["todos.json"]);

        let result = h.coordinator.sync().await;

        assert!(result.success);
        assert_eq!(result.resolved, vec!["todos.json"]);
        assert_eq!(h.vcs.resolved(), vec!["todos.json"]);
        // The merge is committed before anything else gets staged.
        assert_eq!(
            h.vcs.commits(),
            vec![CONFLICT_COMMIT_MESSAGE, LOCAL_CHANGES_COMMIT_MESSAGE]
        );
        assert_eq!(h.coordinator.stats().conflicts_resolved, 1);
    }

    #[tokio::test]
    async fn test_stale_merge_that_cannot_be_resolved_is_not_committed() {
        let h = harness(ScriptedVcs::new()).await;
        h.vcs.set_conflicted(&["broken.json"]);

        let result = h.coordinator.sync().await;

        assert!(!result.success);
        assert!(h.vcs.commits().is_empty());
        assert_eq!(h.vcs.pull_calls(), 0);
        assert_eq!(h.vcs.push_calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_on_write_skips_unfinished_merge() {
        let h = harness(ScriptedVcs::new()).await;
        h.coordinator.enable_sync_on_write();
        h.vcs.set_conflicted(&["todos.json"]);

        let todo = h
            .coordinator
            .create_with_sync(NewTodo::new("Kept locally"))
            .await
            .unwrap();

        assert_eq!(todo.text, "Kept locally");
        assert!(h.vcs.commits().is_empty());
        assert_eq!(h.vcs.push_calls(), 0);
        assert!(h.coordinator.last_sync_error().unwrap().contains("unfinished merge"));
    }

    #[tokio::test]
    async fn test_has_conflicts() {
        let h = harness(ScriptedVcs::new()).await;
        assert!(!h.coordinator.has_conflicts().await.unwrap());

        h.vcs.set_conflicted(&["todos.json"]);
        assert!(h.coordinator.has_conflicts().await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_conflicts_stops_at_failure() {
        let h = harness(ScriptedVcs::new()).await;
        let paths = vec!["a.json".to_string(), "broken.json".to_string(), "c.json".to_string()];

        let err = h.coordinator.resolve_conflicts(&paths).await.unwrap_err();

        assert!(err.to_string().contains("broken.json"));
        assert_eq!(h.vcs.resolved(), vec!["a.json"]);
    }
}
