//! `SQLite`-backed implementation of [`TableStore`].
//!
//! Each load opens its own connection and runs in one transaction. Writers
//! targeting the same database file are serialised through a per-file lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, Transaction};
use sheetflow_types::table::{Column, Table};
use sheetflow_types::value::{Primitive, Value};

use crate::backend::{TableStore, WriteMode};
use crate::error::{self, StoreError};
use crate::schema;

/// `SQLite` table storage.
#[derive(Default)]
pub struct SqliteTableStore {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SqliteTableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock shared by every writer of `file`.
    ///
    /// Entries no writer holds any more are pruned on each call, so the map
    /// stays bounded by the number of files being written concurrently.
    fn file_lock(&self, file: &Path) -> error::Result<Arc<Mutex<()>>> {
        let key = lock_key(file);
        let mut locks = self.locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(key).or_default()))
    }
}

/// Canonical key for a database path. The parent directory must exist for
/// two spellings of the same file to share a key.
fn lock_key(file: &Path) -> PathBuf {
    let parent = file.parent().filter(|p| !p.as_os_str().is_empty());
    let canonical_parent = match parent {
        Some(p) => std::fs::canonicalize(p).ok(),
        None => std::env::current_dir().ok(),
    };
    match (canonical_parent, file.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => file.to_path_buf(),
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Decimal(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode(column: &Column, raw: ValueRef<'_>) -> error::Result<Value> {
    let mismatch = |found: &str| StoreError::Decode {
        column: column.name.clone(),
        message: format!("stored {found} cannot be read as {}", column.primitive),
    };
    match (column.primitive, raw) {
        (Primitive::Integer, ValueRef::Integer(v)) => Ok(Value::Integer(v)),
        (Primitive::Decimal, ValueRef::Real(v)) => Ok(Value::Decimal(v)),
        (Primitive::Decimal, ValueRef::Integer(v)) => Ok(Value::Decimal(v as f64)),
        (Primitive::Boolean, ValueRef::Integer(v)) => Ok(Value::Boolean(v != 0)),
        (Primitive::Text, ValueRef::Text(bytes)) => {
            Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        (_, ValueRef::Null) => Err(mismatch("NULL")),
        (_, ValueRef::Integer(_)) => Err(mismatch("integer")),
        (_, ValueRef::Real(_)) => Err(mismatch("real")),
        (_, ValueRef::Text(_)) => Err(mismatch("text")),
        (_, ValueRef::Blob(_)) => Err(mismatch("blob")),
    }
}

/// `(name, declared type)` of every column of `table_name`; empty when the
/// table does not exist.
fn existing_columns(conn: &Connection, table_name: &str) -> error::Result<Vec<(String, String)>> {
    let sql = format!("PRAGMA table_info({})", schema::quote_identifier(table_name)?);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StoreError::context("table_info: prepare", e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })
        .map_err(|e| StoreError::context("table_info: query", e))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| StoreError::context("table_info: row", e))?);
    }
    Ok(columns)
}

fn prepare_target(
    tx: &Transaction<'_>,
    table_name: &str,
    table: &Table,
    mode: WriteMode,
) -> error::Result<()> {
    match mode {
        WriteMode::Replace => {
            let drop = format!("DROP TABLE IF EXISTS {}", schema::quote_identifier(table_name)?);
            tx.execute_batch(&drop)
                .map_err(|e| StoreError::context("write_table: drop", e))?;
        }
        WriteMode::Append => {
            let found = existing_columns(tx, table_name)?;
            let expected = schema::expected_columns(table.columns());
            let same = found.len() == expected.len()
                && found
                    .iter()
                    .zip(&expected)
                    .all(|(f, e)| f.0 == e.0 && f.1.eq_ignore_ascii_case(&e.1));
            if !found.is_empty() && !same {
                return Err(StoreError::SchemaMismatch {
                    table: table_name.to_string(),
                    expected: schema::describe(&expected),
                    found: schema::describe(&found),
                });
            }
        }
    }
    tx.execute_batch(&schema::create_table_sql(table_name, table.columns())?)
        .map_err(|e| StoreError::context("write_table: create", e))?;
    Ok(())
}

impl TableStore for SqliteTableStore {
    fn write_table(
        &self,
        file: &Path,
        table_name: &str,
        table: &Table,
        mode: WriteMode,
    ) -> error::Result<u64> {
        if table.columns().is_empty() {
            return Err(StoreError::InvalidIdentifier(format!(
                "{table_name} (no columns)"
            )));
        }
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock = self.file_lock(file)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut conn =
            Connection::open(file).map_err(|e| StoreError::context("write_table: open", e))?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::context("write_table: begin tx", e))?;

        prepare_target(&tx, table_name, table, mode)?;

        let mut stmt = tx
            .prepare(&schema::insert_sql(table_name, table.columns())?)
            .map_err(|e| StoreError::context("write_table: prepare", e))?;
        let mut count = 0u64;
        for row in table.rows() {
            stmt.execute(rusqlite::params_from_iter(row.iter().map(sql_value)))
                .map_err(|e| StoreError::context("write_table: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StoreError::context("write_table: commit", e))?;

        tracing::debug!(
            file = %file.display(),
            table = table_name,
            rows = count,
            ?mode,
            "Table written"
        );
        Ok(count)
    }

    fn read_table(&self, file: &Path, table_name: &str) -> error::Result<Table> {
        let lock = self.file_lock(file)?;
        let _guard = lock.lock().map_err(|_| StoreError::LockPoisoned)?;

        let conn = Connection::open_with_flags(file, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| StoreError::context("read_table: open", e))?;

        let declared = existing_columns(&conn, table_name)?;
        if declared.is_empty() {
            return Err(StoreError::TableNotFound(table_name.to_string()));
        }
        let mut columns = Vec::with_capacity(declared.len());
        for (name, ty) in declared {
            let primitive = schema::primitive_for_declared(&ty).ok_or_else(|| StoreError::Decode {
                column: name.clone(),
                message: format!("unsupported declared type '{ty}'"),
            })?;
            columns.push(Column::new(name, primitive.as_str(), primitive));
        }

        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid",
            schema::quote_identifier(table_name)?
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::context("read_table: prepare", e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| StoreError::context("read_table: query", e))?;

        let mut table = Table::new(columns.clone());
        while let Some(row) = rows
            .next()
            .map_err(|e| StoreError::context("read_table: step", e))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let raw = row
                    .get_ref(i)
                    .map_err(|e| StoreError::context("read_table: cell", e))?;
                values.push(decode(column, raw)?);
            }
            table.push_row(values).map_err(|message| StoreError::Decode {
                column: table_name.to_string(),
                message,
            })?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(rows: &[(i64, &str, f64, bool)]) -> Table {
        let mut table = Table::new(vec![
            Column::new("stop_id", "integer", Primitive::Integer),
            Column::new("stop_name", "text", Primitive::Text),
            Column::new("stop_lat", "decimal", Primitive::Decimal),
            Column::new("wheelchair", "boolean", Primitive::Boolean),
        ]);
        for (id, name, lat, wheelchair) in rows {
            table
                .push_row(vec![
                    Value::Integer(*id),
                    Value::Text((*name).to_string()),
                    Value::Decimal(*lat),
                    Value::Boolean(*wheelchair),
                ])
                .unwrap();
        }
        table
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("out/gtfs.sqlite");
        let store = SqliteTableStore::new();
        let table = stops(&[(1, "Hauptbahnhof", 49.45, true), (2, "Plärrer", 49.44, false)]);

        let written = store
            .write_table(&db, "stops", &table, WriteMode::Replace)
            .unwrap();
        assert_eq!(written, 2);

        let read = store.read_table(&db, "stops").unwrap();
        assert_eq!(read.rows(), table.rows());
        let names: Vec<&str> = read.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["stop_id", "stop_name", "stop_lat", "wheelchair"]);
        assert_eq!(read.columns()[3].primitive, Primitive::Boolean);
    }

    #[test]
    fn released_file_locks_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTableStore::new();
        let table = stops(&[(1, "A", 1.0, true)]);
        for i in 0..5 {
            let db = dir.path().join(format!("db{i}.sqlite"));
            store.write_table(&db, "stops", &table, WriteMode::Replace).unwrap();
        }
        assert_eq!(store.locks.lock().unwrap().len(), 1);

        let held = store.file_lock(&dir.path().join("db0.sqlite")).unwrap();
        let _other = store.file_lock(&dir.path().join("db1.sqlite")).unwrap();
        assert_eq!(store.locks.lock().unwrap().len(), 2);
        drop(held);
        let _again = store.file_lock(&dir.path().join("db1.sqlite")).unwrap();
        assert_eq!(store.locks.lock().unwrap().len(), 1);
    }

    #[test]
    fn replace_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        let store = SqliteTableStore::new();
        let table = stops(&[(1, "A", 1.0, true)]);

        store.write_table(&db, "stops", &table, WriteMode::Replace).unwrap();
        store.write_table(&db, "stops", &table, WriteMode::Replace).unwrap();

        assert_eq!(store.read_table(&db, "stops").unwrap().row_count(), 1);
    }

    #[test]
    fn append_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        let store = SqliteTableStore::new();

        store
            .write_table(&db, "stops", &stops(&[(1, "A", 1.0, true)]), WriteMode::Append)
            .unwrap();
        store
            .write_table(&db, "stops", &stops(&[(2, "B", 2.0, false)]), WriteMode::Append)
            .unwrap();

        let read = store.read_table(&db, "stops").unwrap();
        assert_eq!(read.row_count(), 2);
        assert_eq!(read.rows()[1][0], Value::Integer(2));
    }

    #[test]
    fn append_rejects_schema_mismatch_and_leaves_table_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        let store = SqliteTableStore::new();
        store
            .write_table(&db, "stops", &stops(&[(1, "A", 1.0, true)]), WriteMode::Replace)
            .unwrap();

        let mut other = Table::new(vec![Column::new("stop_id", "text", Primitive::Text)]);
        other.push_row(vec![Value::Text("x".into())]).unwrap();
        let err = store
            .write_table(&db, "stops", &other, WriteMode::Append)
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }), "got: {err}");
        assert_eq!(store.read_table(&db, "stops").unwrap().row_count(), 1);
    }

    #[test]
    fn empty_table_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        let store = SqliteTableStore::new();
        let written = store
            .write_table(&db, "stops", &stops(&[]), WriteMode::Replace)
            .unwrap();
        assert_eq!(written, 0);
        let read = store.read_table(&db, "stops").unwrap();
        assert_eq!(read.columns().len(), 4);
        assert_eq!(read.row_count(), 0);
    }

    #[test]
    fn read_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        let store = SqliteTableStore::new();
        store
            .write_table(&db, "stops", &stops(&[]), WriteMode::Replace)
            .unwrap();
        let err = store.read_table(&db, "routes").unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(ref t) if t == "routes"));
    }

    #[test]
    fn unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // The target is a directory, not a database file.
        let err = SqliteTableStore::new()
            .write_table(dir.path(), "stops", &stops(&[]), WriteMode::Replace)
            .unwrap_err();
        assert!(matches!(err, StoreError::SqliteContext { .. }), "got: {err}");
    }

    #[test]
    fn concurrent_writers_to_one_file_serialise() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("shared.sqlite");
        let store = Arc::new(SqliteTableStore::new());

        let handles: Vec<_> = ["stops", "routes", "trips", "agency"]
            .into_iter()
            .map(|name| {
                let store = Arc::clone(&store);
                let db = db.clone();
                std::thread::spawn(move || {
                    store
                        .write_table(&db, name, &stops(&[(1, name, 0.5, true)]), WriteMode::Replace)
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        for name in ["stops", "routes", "trips", "agency"] {
            assert_eq!(store.read_table(&db, name).unwrap().row_count(), 1);
        }
    }
}
