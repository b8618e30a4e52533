//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// gitdo - a shared todo list synchronized through git
#[derive(Parser, Debug)]
#[command(name = "gitdo", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Repository holding the shared document (default: git toplevel of cwd)
    #[arg(long, global = true, env = "GITDO_REPO")]
    pub repo: Option<PathBuf>,

    /// Actor name recorded on new todos
    #[arg(long, global = true, env = "GITDO_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the shared document and .gitignore in the repository
    Init,

    /// Print version information
    Version,

    /// Add a todo
    Add(AddArgs),

    /// List todos
    List(ListArgs),

    /// Show one todo
    Show {
        /// Todo ID (or unique prefix)
        id: String,
    },

    /// Update a todo
    Update(UpdateArgs),

    /// Delete a todo
    Delete {
        /// Todo ID (or unique prefix)
        id: String,

        /// Commit and push right away
        #[arg(long)]
        sync: bool,
    },

    /// Synchronize with the remote
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Todo Commands
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct AddArgs {
    /// Todo text
    pub text: String,

    /// Priority (low, medium, high, urgent or P0-P3)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Project the todo belongs to
    #[arg(long)]
    pub project: Option<String>,

    /// Tags (-t ui -t bug or -t ui,bug)
    #[arg(short, long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Person responsible
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Due date (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<String>,

    /// IDs of todos this one depends on
    #[arg(long = "depends-on", value_delimiter = ',')]
    pub dependencies: Vec<String>,

    /// Commit and push right away
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Filter by status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by project
    #[arg(long)]
    pub project: Option<String>,

    /// Filter by assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Include completed, cancelled and archived todos
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Todo ID (or unique prefix)
    pub id: String,

    /// New text
    #[arg(long)]
    pub text: Option<String>,

    /// New status (pending, in_progress, completed, cancelled)
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// New project
    #[arg(long)]
    pub project: Option<String>,

    /// Replace tags
    #[arg(short, long = "tag", value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// New assignee
    #[arg(short, long, conflicts_with = "unassign")]
    pub assignee: Option<String>,

    /// Clear the assignee
    #[arg(long)]
    pub unassign: bool,

    /// New due date (RFC 3339 or YYYY-MM-DD)
    #[arg(long, conflicts_with = "no_due")]
    pub due: Option<String>,

    /// Clear the due date
    #[arg(long)]
    pub no_due: bool,

    /// Archive the todo
    #[arg(long, conflicts_with = "unarchive")]
    pub archive: bool,

    /// Restore an archived todo
    #[arg(long)]
    pub unarchive: bool,

    /// Commit and push right away
    #[arg(long)]
    pub sync: bool,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Run one full sync cycle (commit, pull, merge, push)
    Run {
        /// Create the document first if it does not exist
        #[arg(long)]
        initial: bool,
    },

    /// Keep syncing on an interval until interrupted
    Watch {
        /// Seconds between syncs (default: autoSyncIntervalSecs or 60)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show repository, document and sync state
    Status,

    /// Merge conflicted documents left by an interrupted pull
    Resolve {
        /// Paths to resolve (default: every conflicted path)
        paths: Vec<String>,

        /// Write the merged files without committing them
        #[arg(long)]
        no_commit: bool,
    },

    /// List conflicted paths; exits non-zero when there are any
    Conflicts,

    /// Push local commits, merging remote changes as needed
    Push,
}
