//! Table store trait definition.

use std::path::Path;

use sheetflow_types::table::Table;

use crate::error;

/// What happens to an existing table with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriteMode {
    /// Drop and recreate the table.
    #[default]
    Replace,
    /// Keep existing rows; the existing schema must match.
    Append,
}

/// Storage contract for loaded tables.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn TableStore>`
/// from concurrently running pipelines.
pub trait TableStore: Send + Sync {
    /// Persist `table` as `table_name` inside the database at `file`,
    /// creating the file and its parent directories as needed.
    ///
    /// The write is all-or-nothing. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) when the path is not
    /// writable, an identifier is invalid, or an append target's schema
    /// differs.
    fn write_table(
        &self,
        file: &Path,
        table_name: &str,
        table: &Table,
        mode: WriteMode,
    ) -> error::Result<u64>;

    /// Read a previously written table back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) when the file or
    /// table is missing or a stored cell does not match its column type.
    fn read_table(&self, file: &Path, table_name: &str) -> error::Result<Table>;
}
