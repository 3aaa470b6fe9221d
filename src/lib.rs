//! Editing core of an OpenStreetMap editor.
//!
//! A [`Document`] owns the feature graph (nodes, roads, relations spread over
//! layers) and an undo [`History`]. Editing operations are
//! [`Manipulation`]s: they look at the current selection and plan a
//! [`CommandList`], which the document applies as a single undoable step.
//!
//! [`History`]: history::History

pub mod command;
pub mod config;
pub mod data;
pub mod document;
pub mod errors;
pub mod etl;
pub mod history;
pub mod manipulations;
pub mod script;

pub use crate::command::{Command, CommandList};
pub use crate::config::{EditorConfig, TagConflict};
pub use crate::document::{Document, DocumentObserver};
pub use crate::errors::{Error, Result};
pub use crate::history::HistoryState;
pub use crate::manipulations::Manipulation;
