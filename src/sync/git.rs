//! Version-control transport.
//!
//! [`VersionControl`] is the seam between the coordinator and the repository.
//! [`GitTransport`] implements it by driving the `git` CLI as a subprocess.
//!
//! Expected failures come back as structured outcomes
//! ([`PullOutcome::Conflicts`], [`PullOutcome::Offline`],
//! [`PushOutcome::NeedsPull`]). Everything else is an
//! [`Error::Transport`] tagged with a [`FailureKind`]. The only place raw git
//! output is turned into a kind is [`classify_failure`].
//!
//! A pull against a remote that does not have the branch yet (an empty
//! shared repository, say) has nothing to merge and counts as
//! [`PullOutcome::Pulled`], so the following push can publish it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, FailureKind, Result};

use super::file::atomic_write_async;
use super::resolver::resolve_file_content;
use super::types::{CommitOutcome, PullOutcome, PushOutcome, RepoStatus};

/// Operations the sync engine needs from a version-controlled repository.
///
/// Paths are relative to the repository root.
pub trait VersionControl: Send + Sync {
    /// Fetch and merge the remote branch into the working tree.
    fn pull(&self) -> impl Future<Output = Result<PullOutcome>> + Send;

    /// Push the current branch to the remote.
    fn push(&self) -> impl Future<Output = Result<PushOutcome>> + Send;

    /// Stage everything and commit it.
    ///
    /// Fails with [`FailureKind::MergeConflict`] while a conflicted path
    /// still holds merge markers.
    fn commit(&self, message: &str) -> impl Future<Output = Result<CommitOutcome>> + Send;

    /// Working-tree status.
    fn status(&self) -> impl Future<Output = Result<RepoStatus>> + Send;

    /// Current branch, or `None` on a detached HEAD.
    fn current_branch(&self) -> impl Future<Output = Result<Option<String>>> + Send;

    fn checkout(&self, branch: &str) -> impl Future<Output = Result<()>> + Send;

    /// Merge both sides of a conflicted document and write the result.
    ///
    /// Mutates the working tree only. The caller commits.
    fn resolve_conflict(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    /// Replace `path` atomically.
    fn write_atomic(&self, path: &Path, content: &str) -> impl Future<Output = Result<()>> + Send {
        let path = path.to_path_buf();
        let content = content.to_owned();
        async move { atomic_write_async(path, content).await }
    }
}

/// Map git's stderr onto a [`FailureKind`].
///
/// Checks run from most to least specific: an authentication failure over
/// SSH also prints "could not read from remote repository", so it must be
/// caught before the network patterns.
#[must_use]
pub fn classify_failure(output: &str) -> FailureKind {
    let text = output.to_lowercase();

    if contains_any(&text, &["not a git repository"]) {
        FailureKind::NotARepository
    } else if contains_any(&text, &["index.lock", "another git process", ".lock': file exists"]) {
        FailureKind::Locked
    } else if contains_any(&text, &[
        "authentication failed",
        "permission denied",
        "could not read username",
        "invalid username or password",
        "the requested url returned error: 403",
        "the requested url returned error: 401",
    ]) {
        FailureKind::Authentication
    } else if contains_any(&text, &[
        "[rejected]",
        "non-fast-forward",
        "fetch first",
        "updates were rejected",
    ]) {
        FailureKind::Rejected
    } else if contains_any(&text, &["conflict", "automatic merge failed", "unmerged files"]) {
        FailureKind::MergeConflict
    } else if contains_any(&text, &[
        "could not resolve host",
        "could not read from remote repository",
        "unable to access",
        "connection refused",
        "connection timed out",
        "connection reset",
        "operation timed out",
        "network is unreachable",
        "early eof",
        "the remote end hung up",
    ]) {
        FailureKind::Network
    } else {
        FailureKind::Other
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Whether a failed pull only means the remote has no such branch yet.
#[must_use]
pub fn is_missing_remote_ref(output: &str) -> bool {
    let text = output.to_lowercase();
    contains_any(&text, &["couldn't find remote ref", "no such ref was fetched"])
}

/// Whether `content` still carries unresolved merge markers.
#[must_use]
pub fn has_conflict_markers(content: &str) -> bool {
    let mut opened = false;
    for line in content.lines() {
        if line.starts_with("<<<<<<<") {
            opened = true;
        } else if opened && line.starts_with(">>>>>>>") {
            return true;
        }
    }
    false
}

/// Parse `git status --porcelain=v1 --branch` output.
#[must_use]
pub fn parse_porcelain_status(output: &str) -> RepoStatus {
    let mut status = RepoStatus::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        if line.len() < 4 {
            continue;
        }
        let (code, rest) = line.split_at(2);
        let path = rest.trim_start();
        // Renames report "old -> new"; the new path is the one on disk.
        let path = path.rsplit_once(" -> ").map_or(path, |(_, new)| new);
        let path = unquote(path);

        match code {
            "DD" | "AU" | "UD" | "UA" | "DU" | "AA" | "UU" => status.conflicted.push(path),
            "??" => status.untracked.push(path),
            "!!" => {}
            _ => status.modified.push(path),
        }
    }

    status
}

fn parse_branch_header(header: &str, status: &mut RepoStatus) {
    if let Some(name) = header
        .strip_prefix("No commits yet on ")
        .or_else(|| header.strip_prefix("Initial commit on "))
    {
        status.branch = Some(name.trim().to_string());
        return;
    }
    if header.starts_with("HEAD (no branch)") {
        return;
    }

    let (refs, tracking) = match header.split_once(" [") {
        Some((refs, rest)) => (refs, rest.trim_end_matches(']')),
        None => (header, ""),
    };

    match refs.split_once("...") {
        Some((branch, upstream)) => {
            status.branch = Some(branch.to_string());
            status.upstream = Some(upstream.to_string());
        }
        None => status.branch = Some(refs.trim().to_string()),
    }

    for part in tracking.split(", ") {
        if let Some(n) = part.strip_prefix("ahead ") {
            status.ahead = n.trim().parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            status.behind = n.trim().parse().unwrap_or(0);
        }
    }
}

fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .map_or_else(|| path.to_string(), |p| p.replace("\\\"", "\"").replace("\\\\", "\\"))
}

/// Captured output of one git invocation.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    /// stderr, or stdout when git reported the problem there.
    fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    fn into_error(self, action: &str) -> Error {
        let message = self.message();
        let kind = classify_failure(&message);
        Error::transport(kind, format!("git {action}: {message}"))
    }
}

/// [`VersionControl`] over the `git` command-line client.
#[derive(Debug, Clone)]
pub struct GitTransport {
    repo: PathBuf,
    remote: String,
    branch: Option<String>,
}

impl GitTransport {
    /// Transport for the repository at `repo`, pushing to `origin`.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: "origin".to_string(),
            branch: None,
        }
    }

    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Pin the branch to pull and push. Defaults to the current branch.
    #[must_use]
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(repo = %self.repo.display(), ?args, "git");

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::transport(FailureKind::Other, format!("failed to run git: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run git and turn a non-zero exit into a classified error.
    async fn git_ok(&self, action: &str, args: &[&str]) -> Result<GitOutput> {
        let output = self.git(args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(output.into_error(action))
        }
    }

    async fn target_branch(&self) -> Result<String> {
        if let Some(branch) = &self.branch {
            return Ok(branch.clone());
        }
        self.current_branch().await?.ok_or_else(|| {
            Error::transport(
                FailureKind::Other,
                "detached HEAD: configure a branch to sync",
            )
        })
    }

    /// Conflicted paths whose working-tree file still has merge markers.
    async fn unresolved_paths(&self) -> Result<Vec<String>> {
        let mut unresolved = Vec::new();
        for path in self.status().await?.conflicted {
            // A deleted side leaves no file, and so no markers.
            if let Ok(content) = tokio::fs::read_to_string(self.repo.join(&path)).await
                && has_conflict_markers(&content)
            {
                unresolved.push(path);
            }
        }
        Ok(unresolved)
    }

    /// Content of `path` at index stage 2 (ours) or 3 (theirs).
    async fn show_stage(&self, stage: u8, path: &str) -> Result<Option<String>> {
        let object = format!(":{stage}:{path}");
        let output = self.git(&["show", object.as_str()]).await?;
        if output.success {
            Ok(Some(output.stdout))
        } else {
            debug!(path, stage, "No conflict stage");
            Ok(None)
        }
    }
}

impl VersionControl for GitTransport {
    async fn pull(&self) -> Result<PullOutcome> {
        let branch = self.target_branch().await?;
        let output = self
            .git(&["pull", "--no-rebase", "--no-edit", self.remote.as_str(), branch.as_str()])
            .await?;

        if output.success {
            debug!(remote = %self.remote, branch, "Pulled");
            return Ok(PullOutcome::Pulled);
        }

        let status = self.status().await?;
        if status.has_conflicts() {
            info!(paths = ?status.conflicted, "Pull stopped on conflicts");
            return Ok(PullOutcome::Conflicts(status.conflicted));
        }

        let message = output.message();
        if is_missing_remote_ref(&message) {
            info!(remote = %self.remote, branch, "Remote has no such branch yet, nothing to merge");
            return Ok(PullOutcome::Pulled);
        }
        match classify_failure(&message) {
            FailureKind::Network => {
                warn!(remote = %self.remote, error = %message, "Remote unreachable");
                Ok(PullOutcome::Offline(message))
            }
            kind => Err(Error::transport(kind, format!("git pull: {message}"))),
        }
    }

    async fn push(&self) -> Result<PushOutcome> {
        let branch = self.target_branch().await?;
        let output = self.git(&["push", self.remote.as_str(), branch.as_str()]).await?;

        if output.success {
            debug!(remote = %self.remote, branch, "Pushed");
            return Ok(PushOutcome::Pushed);
        }

        let message = output.message();
        match classify_failure(&message) {
            FailureKind::Rejected => {
                info!(remote = %self.remote, branch, "Push rejected, remote is ahead");
                Ok(PushOutcome::NeedsPull)
            }
            kind => Err(Error::transport(kind, format!("git push: {message}"))),
        }
    }

    async fn commit(&self, message: &str) -> Result<CommitOutcome> {
        // `add -A` marks conflicted paths resolved, markers and all.
        let unmerged = self.unresolved_paths().await?;
        if !unmerged.is_empty() {
            return Err(Error::transport(
                FailureKind::MergeConflict,
                format!("refusing to commit conflict markers in {}", unmerged.join(", ")),
            ));
        }

        self.git_ok("add", &["add", "-A"]).await?;

        let output = self.git(&["commit", "-m", message]).await?;
        if output.success {
            debug!(message, "Committed");
            return Ok(CommitOutcome {
                committed: true,
                message: message.to_string(),
            });
        }

        let text = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();
        if text.contains("nothing to commit") || text.contains("nothing added to commit") {
            debug!("Nothing to commit");
            return Ok(CommitOutcome {
                committed: false,
                message: message.to_string(),
            });
        }

        Err(output.into_error("commit"))
    }

    async fn status(&self) -> Result<RepoStatus> {
        let output = self
            .git_ok("status", &["status", "--porcelain=v1", "--branch"])
            .await?;
        Ok(parse_porcelain_status(&output.stdout))
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        // symbolic-ref also names an unborn branch; it fails only when detached.
        let output = self.git(&["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if output.success {
            Ok(Some(output.stdout.trim().to_string()))
        } else if output.stderr.trim().is_empty() {
            Ok(None)
        } else {
            Err(output.into_error("symbolic-ref"))
        }
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.git_ok("checkout", &["checkout", branch]).await?;
        info!(branch, "Checked out");
        Ok(())
    }

    async fn resolve_conflict(&self, path: &str) -> Result<()> {
        let local = self.show_stage(2, path).await?;
        let remote = self.show_stage(3, path).await?;

        let merged = match (local, remote) {
            (Some(local), Some(remote)) => resolve_file_content(&local, &remote),
            (Some(only), None) | (None, Some(only)) => {
                info!(path, "Only one side of the conflict exists; keeping it");
                only
            }
            (None, None) => {
                return Err(Error::transport(
                    FailureKind::MergeConflict,
                    format!("{path} has no conflict stages to merge"),
                ));
            }
        };

        self.write_atomic(&self.repo.join(path), &merged).await?;
        info!(path, "Resolved conflict");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTodo, Priority, Status, TodoPatch};
    use crate::storage::{JsonRecordStore, RecordStore};
    use crate::sync::{SyncCoordinator, SyncOptions};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_classify_network() {
        assert_eq!(
            classify_failure("fatal: unable to access 'https://example.com/r.git/': Could not resolve host: example.com"),
            FailureKind::Network
        );
        assert_eq!(
            classify_failure("ssh: connect to host example.com port 22: Connection refused\nfatal: Could not read from remote repository."),
            FailureKind::Network
        );
    }

    #[test]
    fn test_classify_auth_before_network() {
        let stderr = "git@example.com: Permission denied (publickey).\n\
                      fatal: Could not read from remote repository.";
        assert_eq!(classify_failure(stderr), FailureKind::Authentication);
    }

    #[test]
    fn test_classify_rejected() {
        let stderr = " ! [rejected]        main -> main (fetch first)\n\
                      error: failed to push some refs to 'origin'\n\
                      hint: Updates were rejected because the remote contains work";
        assert_eq!(classify_failure(stderr), FailureKind::Rejected);
    }

    #[test]
    fn test_classify_other_kinds() {
        assert_eq!(
            classify_failure("fatal: Unable to create '/r/.git/index.lock': File exists."),
            FailureKind::Locked
        );
        assert_eq!(
            classify_failure("CONFLICT (content): Merge conflict in todos.json"),
            FailureKind::MergeConflict
        );
        assert_eq!(
            classify_failure("fatal: not a git repository (or any of the parent directories): .git"),
            FailureKind::NotARepository
        );
        assert_eq!(classify_failure("fatal: something odd"), FailureKind::Other);
    }

    #[test]
    fn test_missing_remote_ref() {
        assert!(is_missing_remote_ref("fatal: couldn't find remote ref main"));
        assert!(!is_missing_remote_ref("fatal: Could not read from remote repository."));
    }

    #[test]
    fn test_conflict_markers() {
        let conflicted = "{\n<<<<<<< HEAD\n  \"a\": 1\n=======\n  \"a\": 2\n>>>>>>> abc123\n}\n";
        assert!(has_conflict_markers(conflicted));
        assert!(!has_conflict_markers("{\"text\": \"<<<<<<< not at line start\"}\n"));
        assert!(!has_conflict_markers("<<<<<<< only an opening line\n"));
    }

    #[test]
    fn test_parse_status_with_tracking() {
        let output = "## main...origin/main [ahead 2, behind 1]\n\
                      UU todos.json\n\
                      M  README.md\n\
                      \x20M notes.txt\n\
                      ?? scratch.txt\n\
                      R  old.txt -> new.txt\n";
        let status = parse_porcelain_status(output);

        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.upstream.as_deref(), Some("origin/main"));
        assert_eq!(status.ahead, 2);
        assert_eq!(status.behind, 1);
        assert_eq!(status.conflicted, vec!["todos.json"]);
        assert_eq!(status.modified, vec!["README.md", "notes.txt", "new.txt"]);
        assert_eq!(status.untracked, vec!["scratch.txt"]);
    }

    #[test]
    fn test_parse_status_unborn_and_detached() {
        let unborn = parse_porcelain_status("## No commits yet on main\n");
        assert_eq!(unborn.branch.as_deref(), Some("main"));
        assert!(unborn.upstream.is_none());

        let detached = parse_porcelain_status("## HEAD (no branch)\n");
        assert!(detached.branch.is_none());
    }

    #[test]
    fn test_parse_status_quoted_path() {
        let status = parse_porcelain_status("## main\n?? \"with space.json\"\n");
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.untracked, vec!["with space.json"]);
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) -> std::process::Output {
        std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .unwrap()
    }

    fn git_ok(dir: &Path, args: &[&str]) -> String {
        let output = git(dir, args);
        assert!(
            output.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn configure(dir: &Path) {
        git_ok(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git_ok(dir, &["config", "user.name", "Test"]);
        git_ok(dir, &["config", "user.email", "test@example.com"]);
        git_ok(dir, &["config", "commit.gpgsign", "false"]);
    }

    fn init_repo(dir: &Path) {
        git_ok(dir, &["init", "-q"]);
        configure(dir);
    }

    /// An empty bare repository under `root`, with `main` as its HEAD.
    fn bare_remote(root: &Path) -> PathBuf {
        let remote = root.join("remote.git");
        git_ok(root, &["init", "-q", "--bare", "remote.git"]);
        git_ok(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        remote
    }

    fn clone(root: &Path, remote: &Path, name: &str) -> PathBuf {
        let remote = remote.to_string_lossy();
        git_ok(root, &["clone", "-q", remote.as_ref(), name]);
        let dir = root.join(name);
        configure(&dir);
        dir
    }

    type Peer = Arc<SyncCoordinator<GitTransport, JsonRecordStore>>;

    fn peer(dir: &Path, actor: &str) -> Peer {
        let vcs = Arc::new(GitTransport::new(dir));
        let store = Arc::new(JsonRecordStore::new(dir.join("todos.json"), actor));
        let options = SyncOptions {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(10),
            ..SyncOptions::default()
        };
        SyncCoordinator::new(vcs, store, options)
    }

    /// Two clones of one remote that both hold the same todo.
    async fn shared_todo(root: &Path) -> (Peer, Peer, String) {
        let remote = bare_remote(root);
        let alice = peer(&clone(root, &remote, "alice"), "alice");
        let first = alice.initial_sync().await;
        assert!(first.success, "{:?}", first.error);

        let todo = alice.store().create(NewTodo::new("Original")).await.unwrap();
        assert!(alice.sync().await.success);

        let bob = peer(&clone(root, &remote, "bob"), "bob");
        let joined = bob.sync().await;
        assert!(joined.success, "{:?}", joined.error);
        (alice, bob, todo.id)
    }

    #[tokio::test]
    async fn test_commit_and_status_against_real_repo() {
        if !git_available() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        init_repo(temp_dir.path());
        let transport = GitTransport::new(temp_dir.path());

        assert_eq!(
            transport.current_branch().await.unwrap().as_deref(),
            Some("main")
        );

        transport
            .write_atomic(&temp_dir.path().join("todos.json"), "{\"todos\":[]}\n")
            .await
            .unwrap();
        let status = transport.status().await.unwrap();
        assert_eq!(status.untracked, vec!["todos.json"]);

        let first = transport.commit("Add document").await.unwrap();
        assert!(first.committed);
        assert!(transport.status().await.unwrap().is_clean());

        let second = transport.commit("Nothing new").await.unwrap();
        assert!(!second.committed);
    }

    #[tokio::test]
    async fn test_push_without_remote_is_an_error() {
        if !git_available() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        init_repo(temp_dir.path());
        let transport = GitTransport::new(temp_dir.path());

        let err = transport.push().await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn test_resolve_conflict_without_stages_fails() {
        if !git_available() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        init_repo(temp_dir.path());
        let transport = GitTransport::new(temp_dir.path());

        let err = transport.resolve_conflict("todos.json").await.unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::MergeConflict));
    }

    #[tokio::test]
    async fn test_initial_sync_seeds_empty_remote() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let remote = bare_remote(root.path());
        let alice = peer(&clone(root.path(), &remote, "alice"), "alice");

        let result = alice.initial_sync().await;

        assert!(result.success, "{:?}", result.error);
        let published = git_ok(&remote, &["show", "main:todos.json"]);
        assert!(published.contains("\"todos\""));
    }

    #[tokio::test]
    async fn test_concurrent_field_edits_both_survive() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let (alice, bob, id) = shared_todo(root.path()).await;

        let text = TodoPatch {
            text: Some("Alice's text".into()),
            ..TodoPatch::default()
        };
        alice.store().update(&id, text).await.unwrap();
        assert!(alice.sync().await.success);

        let status = TodoPatch {
            status: Some(Status::Completed),
            ..TodoPatch::default()
        };
        bob.store().update(&id, status).await.unwrap();
        let result = bob.sync().await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.had_conflicts);
        assert_eq!(result.resolved, vec!["todos.json"]);
        let on_disk = std::fs::read_to_string(bob.store().path()).unwrap();
        assert!(!has_conflict_markers(&on_disk));

        let merged = bob.store().get(&id).await.unwrap();
        assert_eq!(merged.text, "Alice's text");
        assert_eq!(merged.status, Status::Completed);

        assert!(alice.sync().await.success);
        let seen = alice.store().get(&id).await.unwrap();
        assert_eq!(seen.text, "Alice's text");
        assert_eq!(seen.status, Status::Completed);
    }

    #[tokio::test]
    async fn test_sync_finishes_merge_left_by_manual_pull() {
        if !git_available() {
            return;
        }
        let root = TempDir::new().unwrap();
        let (alice, bob, id) = shared_todo(root.path()).await;
        let bob_dir = bob.vcs().repo().to_path_buf();

        let text = TodoPatch {
            text: Some("Renamed".into()),
            ..TodoPatch::default()
        };
        alice.store().update(&id, text).await.unwrap();
        assert!(alice.sync().await.success);

        let priority = TodoPatch {
            priority: Some(Priority::High),
            ..TodoPatch::default()
        };
        bob.store().update(&id, priority).await.unwrap();
        git_ok(&bob_dir, &["commit", "-q", "-a", "-m", "Local edit"]);
        let pulled = git(&bob_dir, &["pull", "--no-rebase", "--no-edit", "origin", "main"]);
        assert!(!pulled.status.success());
        assert_eq!(bob.vcs().status().await.unwrap().conflicted, vec!["todos.json"]);

        let refused = bob.vcs().commit("Commit everything").await.unwrap_err();
        assert_eq!(refused.failure_kind(), Some(FailureKind::MergeConflict));

        let result = bob.sync().await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.resolved, vec!["todos.json"]);
        let published = git_ok(&root.path().join("remote.git"), &["show", "main:todos.json"]);
        assert!(!has_conflict_markers(&published));

        assert!(alice.sync().await.success);
        let seen = alice.store().get(&id).await.unwrap();
        assert_eq!(seen.text, "Renamed");
        assert_eq!(seen.priority, Priority::High);
    }
}
