//! Table persistence for sheetflow loader blocks.
//!
//! Provides the [`TableStore`] trait and a [`SqliteTableStore`]
//! implementation that writes typed tables into embedded SQLite database
//! files, one transaction per load, with a single writer per file.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{TableStore, WriteMode};
pub use error::StoreError;
pub use sqlite::SqliteTableStore;
