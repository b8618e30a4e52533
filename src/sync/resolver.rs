//! Field-level conflict resolution.
//!
//! Merges two versions of a todo (or two whole todo lists) using the
//! per-field timestamps in [`FieldTimestamps`](crate::model::FieldTimestamps).
//! Everything here is pure: no I/O, no clock, no state.
//!
//! # Rules for one todo
//!
//! 1. Remote absent → absent. A remote deletion always wins.
//! 2. Local absent → remote, unchanged.
//! 3. If one side fails validation, the side that validates wins; if neither
//!    does, local wins.
//! 4. Otherwise start from local. For each LWW field take remote's value and
//!    timestamp when local has no timestamp for it, or when both have one and
//!    remote's is strictly later. Ties keep local.
//! 5. `modifiedAt` is the later of the two.
//! 6. Unknown remote fields missing from the result are copied over.
//!
//! Rule 4 checks "local missing" before comparing, so the merge is ordered:
//! `merge(a, b)` and `merge(b, a)` can differ when timestamps are missing.
//! Callers always pass the local working copy first.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{LwwField, Todo, DOCUMENT_KEY};

/// Merge two versions of the same todo.
#[must_use]
pub fn merge_record(local: Option<&Todo>, remote: Option<&Todo>) -> Option<Todo> {
    let remote = remote?;
    let Some(local) = local else {
        return Some(remote.clone());
    };

    match (local.validate().is_ok(), remote.validate().is_ok()) {
        (true, true) => Some(merge_fields(local, remote)),
        (false, true) => Some(remote.clone()),
        (_, false) => Some(local.clone()),
    }
}

/// Merge two raw JSON versions of the same todo.
///
/// Unlike [`merge_record`] this accepts entries that do not even parse as a
/// todo (missing required fields, out-of-range enum values) and applies the
/// validation rule to them.
#[must_use]
pub fn merge_record_value(local: Option<&Value>, remote: Option<&Value>) -> Option<Value> {
    let remote = remote?;
    let Some(local) = local else {
        return Some(remote.clone());
    };

    match (parse_valid(local), parse_valid(remote)) {
        (Some(l), Some(r)) => {
            let merged = merge_fields(&l, &r);
            match serde_json::to_value(&merged) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(id = %merged.id, error = %e, "Failed to serialize merged todo, keeping local");
                    Some(local.clone())
                }
            }
        }
        (None, Some(_)) => {
            debug!(id = ?todo_id(remote), "Local todo invalid, taking remote");
            Some(remote.clone())
        }
        (Some(_) | None, None) => {
            debug!(id = ?todo_id(local), "Remote todo invalid, keeping local");
            Some(local.clone())
        }
    }
}

/// Merge two todo lists keyed by ID.
///
/// - in both: merged with [`merge_record`]
/// - only local, remote non-empty: treated as a remote deletion and dropped
/// - only local, remote completely empty: kept
/// - only remote: added unchanged
///
/// The empty-remote escape hatch cannot tell "remote deleted everything"
/// from "remote never had anything"; it always assumes the latter.
#[must_use]
pub fn merge_collection(local: &[Todo], remote: &[Todo]) -> Vec<Todo> {
    merge_keyed(local, remote, |t| Some(t.id.as_str()), |l, r| {
        merge_record(Some(l), Some(r))
    })
}

/// [`merge_collection`] over raw JSON entries.
///
/// Entries without a string `id` cannot be matched and are dropped.
#[must_use]
pub fn merge_collection_values(local: &[Value], remote: &[Value]) -> Vec<Value> {
    merge_keyed(local, remote, todo_id, |l, r| {
        merge_record_value(Some(l), Some(r))
    })
}

/// Merge two serialized documents.
///
/// Both sides are parsed, their todo arrays merged with
/// [`merge_collection_values`], and the local document re-serialized with
/// the merged array (other top-level keys come from local). If either side
/// fails to parse, `local_content` is returned unchanged.
#[must_use]
pub fn resolve_file_content(local_content: &str, remote_content: &str) -> String {
    let (mut local_doc, remote_doc) = match (
        parse_document(local_content),
        parse_document(remote_content),
    ) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) => {
            warn!(error = %e, "Local document unparseable, keeping local content");
            return local_content.to_string();
        }
        (_, Err(e)) => {
            warn!(error = %e, "Remote document unparseable, keeping local content");
            return local_content.to_string();
        }
    };

    let local_todos = todo_array(&local_doc);
    let remote_todos = todo_array(&remote_doc);
    let merged = merge_collection_values(&local_todos, &remote_todos);
    debug!(
        local = local_todos.len(),
        remote = remote_todos.len(),
        merged = merged.len(),
        "Merged document"
    );

    local_doc.insert(DOCUMENT_KEY.to_string(), Value::Array(merged));
    match serde_json::to_string_pretty(&Value::Object(local_doc)) {
        Ok(mut out) => {
            out.push('\n');
            out
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize merged document, keeping local content");
            local_content.to_string()
        }
    }
}

/// Rule 4-6 merge of two valid todos, local first.
fn merge_fields(local: &Todo, remote: &Todo) -> Todo {
    let mut merged = local.clone();

    for field in LwwField::ALL {
        let local_at = local.field_timestamps.get(field);
        let remote_at = remote.field_timestamps.get(field);
        let take_remote = match (local_at, remote_at) {
            (None, _) => true,
            (Some(l), Some(r)) => r > l,
            (Some(_), None) => false,
        };
        if take_remote {
            merged.copy_field(remote, field);
            merged.field_timestamps.set(field, remote_at);
        }
    }

    merged.modified_at = local.modified_at.max(remote.modified_at);

    for (key, value) in &remote.extra {
        merged
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    merged
}

fn merge_keyed<T, K, M>(local: &[T], remote: &[T], key: K, merge: M) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> Option<&str>,
    M: Fn(&T, &T) -> Option<T>,
{
    let remote_by_id: HashMap<&str, &T> = remote
        .iter()
        .filter_map(|entry| key(entry).map(|id| (id, entry)))
        .collect();
    let remote_is_empty = remote.is_empty();

    let mut out = Vec::with_capacity(local.len().max(remote.len()));
    let mut seen: HashSet<&str> = HashSet::new();
    let mut dropped = 0usize;

    for entry in local {
        let Some(id) = key(entry) else {
            warn!("Dropping local entry without an id");
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        match remote_by_id.get(id).copied() {
            Some(remote_entry) => out.extend(merge(entry, remote_entry)),
            None if remote_is_empty => out.push(entry.clone()),
            None => dropped += 1,
        }
    }

    for entry in remote {
        match key(entry) {
            Some(id) if seen.insert(id) => out.push(entry.clone()),
            Some(_) => {}
            None => warn!("Dropping remote entry without an id"),
        }
    }

    if dropped > 0 {
        debug!(dropped, "Applied remote deletions");
    }
    out
}

fn todo_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

fn parse_valid(value: &Value) -> Option<Todo> {
    let todo: Todo = serde_json::from_value(value.clone()).ok()?;
    todo.validate().ok()?;
    Some(todo)
}

fn parse_document(content: &str) -> Result<serde_json::Map<String, Value>, String> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("document is not a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn todo_array(doc: &serde_json::Map<String, Value>) -> Vec<Value> {
    doc.get(DOCUMENT_KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
