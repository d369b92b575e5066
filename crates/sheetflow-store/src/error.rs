//! Table store error types.

/// Errors produced by [`TableStore`](crate::TableStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure with the operation that triggered it.
    #[error("sqlite error during {context}: {source}")]
    SqliteContext {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Per-file write lock was poisoned by a panicked thread.
    #[error("table store lock poisoned")]
    LockPoisoned,

    /// Table or column name unusable as an SQL identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Append into a table whose existing columns differ from the load.
    #[error("table '{table}' exists with columns ({found}) but the load expects ({expected})")]
    SchemaMismatch {
        table: String,
        expected: String,
        found: String,
    },

    /// Read of a table that does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Stored cell that cannot be mapped back to its column's primitive.
    #[error("column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl StoreError {
    pub(crate) fn context(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::SqliteContext {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_displays_context() {
        let inner = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("table not found".into()),
        );
        let err = StoreError::context("create table", inner);
        let msg = err.to_string();
        assert!(msg.contains("create table"), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        let err = StoreError::LockPoisoned;
        assert_eq!(err.to_string(), "table store lock poisoned");
    }

    #[test]
    fn schema_mismatch_names_both_sides() {
        let err = StoreError::SchemaMismatch {
            table: "stops".into(),
            expected: "id INTEGER".into(),
            found: "id TEXT".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("id INTEGER") && msg.contains("id TEXT"), "got: {msg}");
    }
}
