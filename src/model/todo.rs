//! Todo model for gitdo.
//!
//! A todo is one entry of the shared document. Every mutable field that
//! participates in last-write-wins merging carries its own timestamp in
//! [`FieldTimestamps`], so two clients editing different fields of the same
//! todo never overwrite each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Top-level key holding the todo array in the document file.
pub const DOCUMENT_KEY: &str = "todos";

/// Workflow status of a todo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        crate::validate::normalize_status(s).map_err(|(input, suggestion)| {
            Error::InvalidArgument(match suggestion {
                Some(s) => format!("unknown status '{input}' (did you mean '{s}'?)"),
                None => format!("unknown status '{input}'"),
            })
        })
    }
}

/// Urgency of a todo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        crate::validate::normalize_priority(s).map_err(|(input, suggestion)| {
            Error::InvalidArgument(match suggestion {
                Some(s) => format!("unknown priority '{input}' ({s})"),
                None => format!("unknown priority '{input}'"),
            })
        })
    }
}

/// A checklist entry inside a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// A discussion comment attached to a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Fields whose value is merged independently by last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LwwField {
    Text,
    Status,
    Priority,
    Project,
    Tags,
    Assignee,
    DueDate,
    CompletedAt,
    Dependencies,
    Subtasks,
    Comments,
    /// The archived flag together with `archivedAt`.
    Archived,
}

impl LwwField {
    pub const ALL: [Self; 12] = [
        Self::Text,
        Self::Status,
        Self::Priority,
        Self::Project,
        Self::Tags,
        Self::Assignee,
        Self::DueDate,
        Self::CompletedAt,
        Self::Dependencies,
        Self::Subtasks,
        Self::Comments,
        Self::Archived,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Project => "project",
            Self::Tags => "tags",
            Self::Assignee => "assignee",
            Self::DueDate => "dueDate",
            Self::CompletedAt => "completedAt",
            Self::Dependencies => "dependencies",
            Self::Subtasks => "subtasks",
            Self::Comments => "comments",
            Self::Archived => "archived",
        }
    }
}

/// Per-field "last modified" markers.
///
/// A field without an entry has never been explicitly set and loses every
/// comparison against a timestamped value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<DateTime<Utc>>,
}

impl FieldTimestamps {
    /// Timestamp recorded for `field`, if any.
    #[must_use]
    pub fn get(&self, field: LwwField) -> Option<DateTime<Utc>> {
        match field {
            LwwField::Text => self.text,
            LwwField::Status => self.status,
            LwwField::Priority => self.priority,
            LwwField::Project => self.project,
            LwwField::Tags => self.tags,
            LwwField::Assignee => self.assignee,
            LwwField::DueDate => self.due_date,
            LwwField::CompletedAt => self.completed_at,
            LwwField::Dependencies => self.dependencies,
            LwwField::Subtasks => self.subtasks,
            LwwField::Comments => self.comments,
            LwwField::Archived => self.archived,
        }
    }

    pub fn set(&mut self, field: LwwField, at: Option<DateTime<Utc>>) {
        let slot = match field {
            LwwField::Text => &mut self.text,
            LwwField::Status => &mut self.status,
            LwwField::Priority => &mut self.priority,
            LwwField::Project => &mut self.project,
            LwwField::Tags => &mut self.tags,
            LwwField::Assignee => &mut self.assignee,
            LwwField::DueDate => &mut self.due_date,
            LwwField::CompletedAt => &mut self.completed_at,
            LwwField::Dependencies => &mut self.dependencies,
            LwwField::Subtasks => &mut self.subtasks,
            LwwField::Comments => &mut self.comments,
            LwwField::Archived => &mut self.archived,
        };
        *slot = at;
    }
}

/// One entry of the shared todo list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier (UUID format). Never changes.
    pub id: String,

    pub text: String,

    pub status: Status,

    pub priority: Priority,

    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Set while the todo is completed; serialized as `null` otherwise.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// IDs of todos this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(default)]
    pub comments: Vec<Comment>,

    #[serde(default)]
    pub created_by: String,

    /// Creation time. Never changes.
    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,

    #[serde(default)]
    pub archived: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub field_timestamps: FieldTimestamps,

    /// Fields written by newer clients that this version does not know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Todo {
    /// Create a todo with defaults, stamping every field that holds a value.
    pub fn new(text: impl Into<String>, created_by: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut todo = Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            status: Status::Pending,
            priority: Priority::Medium,
            project: String::new(),
            tags: Vec::new(),
            assignee: None,
            due_date: None,
            completed_at: None,
            dependencies: Vec::new(),
            subtasks: Vec::new(),
            comments: Vec::new(),
            created_by: created_by.into(),
            created_at: now,
            modified_at: now,
            archived: false,
            archived_at: None,
            field_timestamps: FieldTimestamps::default(),
            extra: Map::new(),
        };
        todo.field_timestamps.text = Some(now);
        todo.field_timestamps.status = Some(now);
        todo.field_timestamps.priority = Some(now);
        todo
    }

    /// Structural checks beyond what deserialization already enforces.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the ID or text is blank.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidArgument("todo id must not be empty".into()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "todo {} has empty text",
                self.id
            )));
        }
        Ok(())
    }

    /// Copy the value of one LWW field from `other`.
    pub fn copy_field(&mut self, other: &Self, field: LwwField) {
        match field {
            LwwField::Text => self.text.clone_from(&other.text),
            LwwField::Status => self.status = other.status,
            LwwField::Priority => self.priority = other.priority,
            LwwField::Project => self.project.clone_from(&other.project),
            LwwField::Tags => self.tags.clone_from(&other.tags),
            LwwField::Assignee => self.assignee.clone_from(&other.assignee),
            LwwField::DueDate => self.due_date = other.due_date,
            LwwField::CompletedAt => self.completed_at = other.completed_at,
            LwwField::Dependencies => self.dependencies.clone_from(&other.dependencies),
            LwwField::Subtasks => self.subtasks.clone_from(&other.subtasks),
            LwwField::Comments => self.comments.clone_from(&other.comments),
            LwwField::Archived => {
                self.archived = other.archived;
                self.archived_at = other.archived_at;
            }
        }
    }

    /// Apply a patch, stamping only the fields whose value actually changes.
    ///
    /// Returns the fields that changed. `modifiedAt` moves only when
    /// something changed.
    pub fn apply_patch(&mut self, patch: &TodoPatch, now: DateTime<Utc>) -> Vec<LwwField> {
        let mut changed = Vec::new();

        if let Some(text) = &patch.text
            && *text != self.text
        {
            self.text.clone_from(text);
            changed.push(LwwField::Text);
        }
        if let Some(status) = patch.status
            && status != self.status
        {
            self.status = status;
            changed.push(LwwField::Status);

            let completed_at = (status == Status::Completed).then_some(now);
            if completed_at != self.completed_at {
                self.completed_at = completed_at;
                changed.push(LwwField::CompletedAt);
            }
        }
        if let Some(priority) = patch.priority
            && priority != self.priority
        {
            self.priority = priority;
            changed.push(LwwField::Priority);
        }
        if let Some(project) = &patch.project
            && *project != self.project
        {
            self.project.clone_from(project);
            changed.push(LwwField::Project);
        }
        if let Some(tags) = &patch.tags
            && *tags != self.tags
        {
            self.tags.clone_from(tags);
            changed.push(LwwField::Tags);
        }
        if let Some(assignee) = &patch.assignee
            && *assignee != self.assignee
        {
            self.assignee.clone_from(assignee);
            changed.push(LwwField::Assignee);
        }
        if let Some(due_date) = patch.due_date
            && due_date != self.due_date
        {
            self.due_date = due_date;
            changed.push(LwwField::DueDate);
        }
        if let Some(dependencies) = &patch.dependencies
            && *dependencies != self.dependencies
        {
            self.dependencies.clone_from(dependencies);
            changed.push(LwwField::Dependencies);
        }
        if let Some(archived) = patch.archived
            && archived != self.archived
        {
            self.archived = archived;
            self.archived_at = archived.then_some(now);
            changed.push(LwwField::Archived);
        }

        for field in &changed {
            self.field_timestamps.set(*field, Some(now));
        }
        if !changed.is_empty() {
            self.modified_at = now;
        }
        changed
    }
}

/// Input for creating a todo.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub text: String,
    pub priority: Option<Priority>,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub dependencies: Vec<String>,
}

impl NewTodo {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Build the todo, stamping every field that was supplied.
    #[must_use]
    pub fn into_todo(self, created_by: &str, now: DateTime<Utc>) -> Todo {
        let mut todo = Todo::new(self.text, created_by, now);
        if let Some(priority) = self.priority {
            todo.priority = priority;
        }
        let stamps = &mut todo.field_timestamps;
        if let Some(project) = self.project {
            todo.project = project;
            stamps.project = Some(now);
        }
        if !self.tags.is_empty() {
            todo.tags = self.tags;
            stamps.tags = Some(now);
        }
        if self.assignee.is_some() {
            todo.assignee = self.assignee;
            stamps.assignee = Some(now);
        }
        if self.due_date.is_some() {
            todo.due_date = self.due_date;
            stamps.due_date = Some(now);
        }
        if !self.dependencies.is_empty() {
            todo.dependencies = self.dependencies;
            stamps.dependencies = Some(now);
        }
        todo
    }
}

/// Partial update of a todo. `None` leaves a field alone.
///
/// Optional fields use a nested `Option` so they can be cleared:
/// `Some(None)` removes the value.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub assignee: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub dependencies: Option<Vec<String>>,
    pub archived: Option<bool>,
}

impl TodoPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.project.is_none()
            && self.tags.is_none()
            && self.assignee.is_none()
            && self.due_date.is_none()
            && self.dependencies.is_none()
            && self.archived.is_none()
    }
}

/// The whole shared document as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub todos: Vec<Todo>,

    /// Other top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Pretty-printed JSON with a trailing newline (git-friendly diffs).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_todo_stamps_initial_fields() {
        let todo = Todo::new("Write docs", "alice", at(0));
        assert_eq!(todo.field_timestamps.text, Some(at(0)));
        assert_eq!(todo.field_timestamps.status, Some(at(0)));
        assert_eq!(todo.field_timestamps.project, None);
        assert!(todo.validate().is_ok());
    }

    #[test]
    fn test_apply_patch_stamps_only_changed_fields() {
        let mut todo = Todo::new("Write docs", "alice", at(0));
        let patch = TodoPatch {
            text: Some("Write docs".into()),
            status: Some(Status::Completed),
            ..TodoPatch::default()
        };

        let changed = todo.apply_patch(&patch, at(5));

        assert_eq!(changed, vec![LwwField::Status, LwwField::CompletedAt]);
        assert_eq!(todo.field_timestamps.text, Some(at(0)));
        assert_eq!(todo.field_timestamps.status, Some(at(5)));
        assert_eq!(todo.completed_at, Some(at(5)));
        assert_eq!(todo.modified_at, at(5));
    }

    #[test]
    fn test_apply_empty_patch_keeps_modified_at() {
        let mut todo = Todo::new("Write docs", "alice", at(0));
        let changed = todo.apply_patch(&TodoPatch::default(), at(9));
        assert!(changed.is_empty());
        assert_eq!(todo.modified_at, at(0));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let json = serde_json::json!({
            "id": "t1",
            "text": "hello",
            "status": "pending",
            "priority": "high",
            "createdAt": "2024-01-01T00:00:00Z",
            "modifiedAt": "2024-01-01T00:00:00Z",
            "color": "blue"
        });
        let todo: Todo = serde_json::from_value(json).unwrap();
        assert_eq!(todo.extra.get("color"), Some(&Value::from("blue")));

        let back = serde_json::to_value(&todo).unwrap();
        assert_eq!(back["color"], "blue");
        assert_eq!(back["fieldTimestamps"], serde_json::json!({}));
    }

    #[test]
    fn test_out_of_enum_status_fails_to_parse() {
        let json = serde_json::json!({
            "id": "t1",
            "text": "hello",
            "status": "exploded",
            "priority": "high",
            "createdAt": "2024-01-01T00:00:00Z",
            "modifiedAt": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Todo>(json).is_err());
    }

    #[test]
    fn test_field_timestamps_get_set() {
        let mut stamps = FieldTimestamps::default();
        for field in LwwField::ALL {
            assert_eq!(stamps.get(field), None);
            stamps.set(field, Some(at(1)));
            assert_eq!(stamps.get(field), Some(at(1)));
        }
    }
}
