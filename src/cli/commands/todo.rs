//! Todo command implementations.
//!
//! Writes go through the sync coordinator so `--sync` (or the
//! `syncOnWrite` setting) can commit and push each change right after it
//! lands on disk. A failed push never undoes the local write.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use colored::Colorize;
use serde::Serialize;

use super::{runtime, Coordinator, Workspace};
use crate::cli::{AddArgs, ListArgs, UpdateArgs};
use crate::error::{Error, Result};
use crate::model::{NewTodo, Priority, Status, Todo, TodoPatch};
use crate::storage::RecordStore;
use crate::validate::find_similar_ids;

/// Characters of the ID shown in listings.
const SHORT_ID_LEN: usize = 8;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteOutput<'a> {
    todo: &'a Todo,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_error: Option<String>,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    count: usize,
    todos: &'a [Todo],
}

/// Execute the add command.
///
/// # Errors
///
/// Returns an error if the arguments are invalid or the document cannot be
/// written.
pub fn add(
    args: &AddArgs,
    repo: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(repo, actor)?;
    let new = NewTodo {
        text: args.text.clone(),
        priority: args.priority.as_deref().map(str::parse::<Priority>).transpose()?,
        project: args.project.clone(),
        tags: args.tags.clone(),
        assignee: args.assignee.clone(),
        due_date: args.due.as_deref().map(parse_due_date).transpose()?,
        dependencies: args.dependencies.clone(),
    };

    let coordinator = writer(&workspace, args.sync);
    let todo = runtime()?.block_on(coordinator.create_with_sync(new))?;
    report_write("Added", &todo, &coordinator, json)
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the status filter is invalid or the document cannot
/// be read.
pub fn list(args: &ListArgs, repo: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::open(repo, None)?;
    let status = args.status.as_deref().map(str::parse::<Status>).transpose()?;

    let mut todos = runtime()?.block_on(workspace.store.list())?;
    todos.retain(|t| {
        let visible = args.all || status.is_some() || (is_open(t) && !t.archived);
        visible
            && status.is_none_or(|s| t.status == s)
            && args.project.as_deref().is_none_or(|p| t.project == p)
            && args
                .assignee
                .as_deref()
                .is_none_or(|a| t.assignee.as_deref() == Some(a))
    });
    todos.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    if json {
        let output = ListOutput {
            count: todos.len(),
            todos: &todos,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if todos.is_empty() {
        println!("No todos found.");
    } else {
        print_todo_list(&todos);
    }

    Ok(())
}

/// Execute the show command.
///
/// # Errors
///
/// Returns `TodoNotFound` (or `TodoNotFoundSimilar`) if no todo matches.
pub fn show(id: &str, repo: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::open(repo, None)?;
    let rt = runtime()?;

    let todo = match rt.block_on(workspace.store.get(id)) {
        Ok(todo) => todo,
        Err(Error::TodoNotFound { id }) => {
            let short_ids: Vec<String> = rt
                .block_on(workspace.store.list())?
                .iter()
                .map(|t| short_id(&t.id).to_string())
                .collect();
            let similar = find_similar_ids(&id, &short_ids, 3);
            return Err(if similar.is_empty() {
                Error::TodoNotFound { id }
            } else {
                Error::TodoNotFoundSimilar { id, similar }
            });
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string(&todo)?);
    } else {
        print_todo(&todo);
    }

    Ok(())
}

/// Execute the update command.
///
/// # Errors
///
/// Returns an error if nothing would change, an argument is invalid, or the
/// todo does not exist.
pub fn update(
    args: &UpdateArgs,
    repo: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let patch = build_patch(args)?;
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to update; pass at least one field to change".to_string(),
        ));
    }

    let workspace = Workspace::open(repo, actor)?;
    let coordinator = writer(&workspace, args.sync);
    let todo = runtime()?.block_on(coordinator.update_with_sync(&args.id, patch))?;
    report_write("Updated", &todo, &coordinator, json)
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns an error if the todo does not exist or the document cannot be
/// written.
pub fn delete(id: &str, sync: bool, repo: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::open(repo, None)?;
    let coordinator = writer(&workspace, sync);
    let todo = runtime()?.block_on(coordinator.delete_with_sync(id))?;
    report_write("Deleted", &todo, &coordinator, json)
}

fn writer(workspace: &Workspace, sync: bool) -> std::sync::Arc<Coordinator> {
    let coordinator = workspace.coordinator();
    if sync || workspace.settings.sync_on_write {
        coordinator.enable_sync_on_write();
    }
    coordinator
}

fn report_write(verb: &str, todo: &Todo, coordinator: &Coordinator, json: bool) -> Result<()> {
    let sync_error = coordinator.last_sync_error();

    if json {
        let output = WriteOutput { todo, sync_error };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{verb} [{}] {}", short_id(&todo.id), todo.text);
    if let Some(error) = sync_error {
        eprintln!(
            "{} {error}\n  Saved locally; run `gitdo sync run` to retry.",
            "Not pushed:".yellow()
        );
    } else if coordinator.is_sync_on_write() {
        println!("  {}", "Pushed".green());
    }
    Ok(())
}

fn build_patch(args: &UpdateArgs) -> Result<TodoPatch> {
    let assignee = if args.unassign {
        Some(None)
    } else {
        args.assignee.clone().map(Some)
    };
    let due_date = if args.no_due {
        Some(None)
    } else {
        args.due.as_deref().map(parse_due_date).transpose()?.map(Some)
    };
    let archived = match (args.archive, args.unarchive) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };

    Ok(TodoPatch {
        text: args.text.clone(),
        status: args.status.as_deref().map(str::parse::<Status>).transpose()?,
        priority: args
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        project: args.project.clone(),
        tags: args.tags.clone(),
        assignee,
        due_date,
        dependencies: None,
        archived,
    })
}

/// Parse a due date given as RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_due_date(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid due date '{input}'; use YYYY-MM-DD or RFC 3339"
            ))
        })
}

const fn is_open(todo: &Todo) -> bool {
    matches!(todo.status, Status::Pending | Status::InProgress)
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

fn print_todo_list(todos: &[Todo]) {
    println!("Todos ({} found):", todos.len());
    println!();
    for todo in todos {
        let status_icon = match todo.status {
            Status::Pending => "○",
            Status::InProgress => "●",
            Status::Completed => "✓",
            Status::Cancelled => "✗",
        };
        let priority_str = match todo.priority {
            Priority::Urgent => "!!".red().to_string(),
            Priority::High => "! ".yellow().to_string(),
            Priority::Medium => "  ".to_string(),
            Priority::Low => "- ".dimmed().to_string(),
        };
        print!("{status_icon} [{}] {priority_str} {}", short_id(&todo.id), todo.text);
        if !todo.project.is_empty() {
            print!(" {}", format!("({})", todo.project).dimmed());
        }
        if let Some(assignee) = &todo.assignee {
            print!(" {}", format!("@{assignee}").cyan());
        }
        println!();
    }
}

fn print_todo(todo: &Todo) {
    println!("[{}] {}", short_id(&todo.id), todo.text.bold());
    println!();
    println!("ID:       {}", todo.id);
    println!("Status:   {}", todo.status);
    println!("Priority: {}", todo.priority);
    if !todo.project.is_empty() {
        println!("Project:  {}", todo.project);
    }
    if !todo.tags.is_empty() {
        println!("Tags:     {}", todo.tags.join(", "));
    }
    if let Some(assignee) = &todo.assignee {
        println!("Assignee: {assignee}");
    }
    if let Some(due) = todo.due_date {
        println!("Due:      {}", due.format("%Y-%m-%d"));
    }
    if !todo.dependencies.is_empty() {
        println!("Depends:  {}", todo.dependencies.join(", "));
    }
    if todo.archived {
        println!("Archived: yes");
    }
    println!();
    println!("Created:  {} by {}", todo.created_at.format("%Y-%m-%d %H:%M"), todo.created_by);
    println!("Modified: {}", todo.modified_at.format("%Y-%m-%d %H:%M"));

    if !todo.subtasks.is_empty() {
        println!();
        println!("Subtasks:");
        for subtask in &todo.subtasks {
            let mark = if subtask.completed { "✓" } else { "○" };
            println!("  {mark} {}", subtask.text);
        }
    }
    if !todo.comments.is_empty() {
        println!();
        println!("Comments:");
        for comment in &todo.comments {
            println!(
                "  {} ({}): {}",
                comment.author,
                comment.created_at.format("%Y-%m-%d"),
                comment.text
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_due_date() {
        let day = parse_due_date("2026-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2026-03-01T00:00:00+00:00");

        let exact = parse_due_date("2026-03-01T09:30:00+02:00").unwrap();
        assert_eq!(exact.to_rfc3339(), "2026-03-01T07:30:00+00:00");

        assert!(matches!(
            parse_due_date("next tuesday"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_patch_clears_and_archives() {
        let args = UpdateArgs {
            id: "abc".into(),
            unassign: true,
            no_due: true,
            archive: true,
            status: Some("done".into()),
            ..UpdateArgs::default()
        };

        let patch = build_patch(&args).unwrap();

        assert_eq!(patch.assignee, Some(None));
        assert_eq!(patch.due_date, Some(None));
        assert_eq!(patch.archived, Some(true));
        assert_eq!(patch.status, Some(Status::Completed));
    }

    #[test]
    fn test_build_patch_empty() {
        let args = UpdateArgs {
            id: "abc".into(),
            ..UpdateArgs::default()
        };
        assert!(build_patch(&args).unwrap().is_empty());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
