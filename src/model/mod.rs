//! Data models for gitdo.
//!
//! - [`Todo`] with per-field LWW timestamps
//! - [`Document`], the on-disk container

pub mod todo;

pub use todo::{
    Comment, Document, FieldTimestamps, LwwField, NewTodo, Priority, Status, Subtask, Todo,
    TodoPatch, DOCUMENT_KEY,
};
