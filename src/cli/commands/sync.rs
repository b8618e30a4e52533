//! Sync command implementations.
//!
//! Every command works on the repository resolved from `--repo` (or the
//! git toplevel of the working directory) and the document named in the
//! settings.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use super::{runtime, Coordinator, Workspace};
use crate::cli::SyncCommands;
use crate::error::{Error, FailureKind, Result};
use crate::sync::{
    content_hash, get_sync_status, has_changed, print_status, sync_with_retry, SyncResult,
    VersionControl, CONFLICT_COMMIT_MESSAGE,
};

/// `sync watch` interval when neither the flag nor the settings give one.
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

/// How often `sync watch` looks for local edits to the document.
const LOCAL_EDIT_POLL: Duration = Duration::from_secs(1);

/// Execute sync commands.
///
/// # Errors
///
/// Returns an error if the sync fails or the repository cannot be read.
pub fn execute(command: &SyncCommands, repo: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::open(repo, None)?;
    let rt = runtime()?;

    match command {
        SyncCommands::Run { initial } => rt.block_on(run(&workspace, *initial, json)),
        SyncCommands::Watch { interval } => rt.block_on(watch(&workspace, *interval, json)),
        SyncCommands::Status => rt.block_on(status(&workspace, json)),
        SyncCommands::Resolve { paths, no_commit } => {
            rt.block_on(resolve(&workspace, paths, *no_commit, json))
        }
        SyncCommands::Conflicts => rt.block_on(conflicts(&workspace, json)),
        SyncCommands::Push => rt.block_on(push(&workspace, json)),
    }
}

async fn run(workspace: &Workspace, initial: bool, json: bool) -> Result<()> {
    let coordinator = workspace.coordinator();
    let result = if initial {
        coordinator.initial_sync().await
    } else {
        coordinator.sync().await
    };
    report(&result, json)
}

async fn watch(workspace: &Workspace, interval: Option<u64>, json: bool) -> Result<()> {
    let secs = interval
        .or(workspace.settings.auto_sync_interval_secs)
        .unwrap_or(DEFAULT_WATCH_INTERVAL_SECS);
    if secs == 0 {
        return Err(Error::InvalidArgument(
            "watch interval must be at least 1 second".to_string(),
        ));
    }

    let coordinator = workspace.coordinator();
    if let Some(ms) = workspace.settings.debounce_ms {
        coordinator.enable_debounce(Duration::from_millis(ms));
    }

    let first = coordinator.initial_sync().await;
    print_result(&first, json)?;

    coordinator.start_auto_sync(Duration::from_secs(secs));
    if !json {
        println!(
            "Watching {} (every {secs}s). Press Ctrl-C to stop.",
            workspace.repo_root.display()
        );
    }

    watch_local_edits(workspace, &coordinator).await?;

    coordinator.stop_auto_sync();
    coordinator.disable_debounce();
    let stats = coordinator.stats();
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!();
        println!(
            "Stopped after {} syncs ({} ok, {} failed, {} conflicts resolved).",
            stats.total_syncs, stats.successful_syncs, stats.failed_syncs, stats.conflicts_resolved
        );
    }
    Ok(())
}

/// Request a sync whenever the document changes on disk, until Ctrl-C.
async fn watch_local_edits(workspace: &Workspace, coordinator: &Coordinator) -> Result<()> {
    let path = workspace.document_path().to_path_buf();
    let mut edits = EditTracker::default();
    edits.observe(read_hash(&path).await, coordinator.stats().total_syncs);
    let mut ticker = tokio::time::interval(LOCAL_EDIT_POLL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                info!("Interrupted, stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {
                if coordinator.is_syncing() {
                    continue;
                }
                let hash = read_hash(&path).await;
                if edits.observe(hash, coordinator.stats().total_syncs) {
                    debug!(path = %path.display(), "Document changed, requesting sync");
                    if coordinator.trigger_sync().await.is_some() {
                        // Take in whatever the sync pulled.
                        edits.observe(read_hash(&path).await, coordinator.stats().total_syncs);
                    }
                }
            }
        }
    }
}

/// Tells local edits to the document apart from rewrites done by a sync.
#[derive(Debug, Default)]
struct EditTracker {
    hash: Option<String>,
    syncs_seen: u64,
}

impl EditTracker {
    /// Record the document's current hash.
    ///
    /// Returns true when the content changed and no sync ran since the last
    /// observation. A missing document is never an edit.
    fn observe(&mut self, hash: Option<String>, total_syncs: u64) -> bool {
        let synced = total_syncs != self.syncs_seen;
        self.syncs_seen = total_syncs;
        let Some(current) = hash else {
            return false;
        };
        let changed = has_changed(&current, self.hash.as_deref());
        self.hash = Some(current);
        changed && !synced
    }
}

async fn read_hash(path: &std::path::Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|content| content_hash(&content))
}

async fn status(workspace: &Workspace, json: bool) -> Result<()> {
    let coordinator = workspace.coordinator();
    let report = get_sync_status(
        workspace.vcs.as_ref(),
        workspace.document_path(),
        coordinator.stats(),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_status(&report);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveOutput {
    resolved: Vec<String>,
    committed: bool,
}

async fn resolve(workspace: &Workspace, paths: &[String], no_commit: bool, json: bool) -> Result<()> {
    let paths = if paths.is_empty() {
        workspace.vcs.status().await?.conflicted
    } else {
        paths.to_vec()
    };

    if paths.is_empty() {
        if json {
            let output = ResolveOutput {
                resolved: Vec::new(),
                committed: false,
            };
            println!("{}", serde_json::to_string(&output)?);
        } else {
            println!("No conflicts to resolve.");
        }
        return Ok(());
    }

    let coordinator = workspace.coordinator();
    let resolved = coordinator.resolve_conflicts(&paths).await?;
    let committed = if no_commit {
        false
    } else {
        workspace.vcs.commit(CONFLICT_COMMIT_MESSAGE).await?.committed
    };

    if json {
        let output = ResolveOutput { resolved, committed };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for path in &resolved {
            println!("{} {path}", "Resolved".green());
        }
        if committed {
            println!();
            println!("Committed: {CONFLICT_COMMIT_MESSAGE}");
            println!("{}", "Run 'gitdo sync push' to publish the merge.".dimmed());
        }
    }
    Ok(())
}

async fn conflicts(workspace: &Workspace, json: bool) -> Result<()> {
    let conflicted = workspace.vcs.status().await?.conflicted;

    if json {
        let output = serde_json::json!({
            "count": conflicted.len(),
            "paths": &conflicted,
        });
        println!("{output}");
    } else if conflicted.is_empty() {
        println!("No conflicts.");
    } else {
        println!("Conflicts ({} found):", conflicted.len());
        for path in &conflicted {
            println!("  {path}");
        }
    }

    if conflicted.is_empty() {
        Ok(())
    } else {
        Err(Error::transport(
            FailureKind::MergeConflict,
            format!("{} conflicted path(s)", conflicted.len()),
        ))
    }
}

async fn push(workspace: &Workspace, json: bool) -> Result<()> {
    let settings = &workspace.settings;
    let result = sync_with_retry(
        workspace.vcs.as_ref(),
        settings.max_retries,
        Duration::from_millis(settings.retry_base_delay_ms),
    )
    .await;
    report(&result, json)
}

/// Print a sync result and turn a failed one into an error.
fn report(result: &SyncResult, json: bool) -> Result<()> {
    // Human-readable failures are printed by the error handler in main.
    if json || result.success {
        print_result(result, json)?;
    }
    match &result.error {
        Some(error) if !result.success => Err(Error::SyncFailed(error.clone())),
        _ => Ok(()),
    }
}

fn print_result(result: &SyncResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    if result.success {
        println!("{}", "Sync complete".green());
        if result.had_conflicts {
            println!("  Merged conflicts in:");
            for path in &result.resolved {
                println!("    {path}");
            }
        }
    } else if let Some(error) = &result.error {
        println!("{} {error}", "Sync failed:".red());
    }
    Ok(())
}
