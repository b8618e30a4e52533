//! Sync status display.
//!
//! Combines the working-tree state, the shared document, and the
//! coordinator's counters into one report.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::Document;

use super::git::VersionControl;
use super::types::{RepoStatus, SyncStats};

/// The shared document as found on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub size: u64,
    /// `None` when the file does not parse (e.g. it holds conflict markers).
    pub todo_count: Option<usize>,
}

/// Everything `gitdo sync status` shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    pub repo: RepoStatus,
    pub document: Option<DocumentInfo>,
    pub stats: SyncStats,
}

/// Gather the status report.
///
/// # Errors
///
/// Returns an error if the repository status cannot be read.
pub async fn get_sync_status<V: VersionControl>(
    vcs: &V,
    document_path: &Path,
    stats: SyncStats,
) -> Result<SyncStatusReport> {
    let repo = vcs.status().await?;
    let document = match tokio::fs::read_to_string(document_path).await {
        Ok(content) => Some(DocumentInfo {
            path: document_path.to_path_buf(),
            size: content.len() as u64,
            todo_count: serde_json::from_str::<Document>(&content)
                .ok()
                .map(|d| d.todos.len()),
        }),
        Err(_) => None,
    };

    Ok(SyncStatusReport {
        repo,
        document,
        stats,
    })
}

/// Print the status report to stdout in a human-readable format.
pub fn print_status(report: &SyncStatusReport) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    let repo = &report.repo;
    println!("{}", "Repository:".blue().bold());
    match (&repo.branch, &repo.upstream) {
        (Some(branch), Some(upstream)) => println!("  Branch:   {branch} → {upstream}"),
        (Some(branch), None) => println!("  Branch:   {branch} {}", "(no upstream)".dimmed()),
        (None, _) => println!("  Branch:   {}", "detached HEAD".yellow()),
    }
    if repo.ahead > 0 || repo.behind > 0 {
        println!("  Ahead:    {}", repo.ahead);
        println!("  Behind:   {}", repo.behind);
    }
    if !repo.modified.is_empty() || !repo.untracked.is_empty() {
        println!(
            "  Changes:  {} modified, {} untracked",
            repo.modified.len(),
            repo.untracked.len()
        );
    }
    println!();

    if repo.has_conflicts() {
        println!("{}", "Conflicts:".red().bold());
        for path in &repo.conflicted {
            println!("  {path}");
        }
        println!();
        println!(
            "{}",
            "Run 'gitdo sync resolve' to merge conflicted documents.".dimmed()
        );
        println!();
    }

    match &report.document {
        Some(doc) => {
            println!("{}", "Document:".blue().bold());
            println!("  Path:     {}", doc.path.display());
            println!("  Size:     {}", format_size(doc.size));
            match doc.todo_count {
                Some(count) => println!("  Todos:    {count}"),
                None => println!("  Todos:    {}", "unreadable".red()),
            }
        }
        None => {
            println!("{}", "No document found.".dimmed());
            println!("{}", "Run 'gitdo init' to create one.".dimmed());
        }
    }

    let stats = &report.stats;
    if stats.total_syncs > 0 {
        println!();
        println!("{}", "This Session:".blue().bold());
        println!(
            "  Syncs:    {} ({} ok, {} failed)",
            stats.total_syncs, stats.successful_syncs, stats.failed_syncs
        );
        if stats.conflicts_resolved > 0 {
            println!("  Resolved: {}", stats.conflicts_resolved);
        }
        if let Some(at) = stats.last_sync_time {
            println!("  Last:     {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(error) = &stats.last_error {
            println!("  Error:    {}", error.red());
        }
    }
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
