//! gitdo - a shared todo list kept in a git repository
//!
//! This crate provides the core functionality for the `gitdo` CLI tool.
//! Several people edit one JSON document; git carries it between them and
//! a field-level last-write-wins merge settles concurrent edits.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Todo, Document)
//! - [`storage`] - Record store over the JSON document
//! - [`sync`] - Git transport, conflict resolution, sync coordinator
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
