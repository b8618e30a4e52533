//! Initialize the shared document in a repository.
//!
//! Creates an empty document if none exists and makes sure `.gitignore`
//! hides atomic-write temporaries. Running it twice is harmless.

use std::path::PathBuf;

use serde::Serialize;

use super::{runtime, Workspace};
use crate::error::Result;
use crate::storage::RecordStore;
use crate::sync::ensure_gitignore;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitOutput {
    repo: PathBuf,
    document: PathBuf,
    created: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the document or `.gitignore` cannot be written.
pub fn execute(repo: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::open(repo, None)?;
    let document = workspace.document_path().to_path_buf();
    let created = !document.exists();

    if let Some(parent) = document.parent() {
        std::fs::create_dir_all(parent)?;
    }
    runtime()?.block_on(workspace.store.ensure_initialized())?;
    ensure_gitignore(&workspace.repo_root)?;

    if json {
        let output = InitOutput {
            repo: workspace.repo_root,
            document,
            created,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if created {
        println!("Created {}", document.display());
        println!();
        println!("Next steps:");
        println!("  gitdo add \"First todo\"");
        println!("  gitdo sync run");
    } else {
        println!("Already initialized: {}", document.display());
    }

    Ok(())
}
