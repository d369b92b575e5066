//! Column type mapping and SQL text generation.

use sheetflow_types::table::Column;
use sheetflow_types::value::Primitive;

use crate::error::{Result, StoreError};

/// Declared `SQLite` column type for a primitive.
#[must_use]
pub fn sql_type(primitive: Primitive) -> &'static str {
    match primitive {
        Primitive::Integer => "INTEGER",
        Primitive::Decimal => "REAL",
        Primitive::Text => "TEXT",
        Primitive::Boolean => "BOOLEAN",
    }
}

/// Map a declared column type read back from `PRAGMA table_info` to the
/// primitive it was written from.
#[must_use]
pub fn primitive_for_declared(declared: &str) -> Option<Primitive> {
    match declared.trim().to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => Some(Primitive::Integer),
        "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" => Some(Primitive::Decimal),
        "TEXT" | "VARCHAR" | "" => Some(Primitive::Text),
        "BOOLEAN" | "BOOL" => Some(Primitive::Boolean),
        _ => None,
    }
}

/// Double-quote an identifier, escaping embedded quotes.
///
/// # Errors
///
/// Rejects empty names and names containing NUL.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `CREATE TABLE IF NOT EXISTS` statement for the given columns.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] for unusable names.
pub fn create_table_sql(table_name: &str, columns: &[Column]) -> Result<String> {
    let mut defs = Vec::with_capacity(columns.len());
    for column in columns {
        defs.push(format!(
            "{} {}",
            quote_identifier(&column.name)?,
            sql_type(column.primitive)
        ));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table_name)?,
        defs.join(", ")
    ))
}

/// Parameterised `INSERT` statement with one placeholder per column.
///
/// # Errors
///
/// Returns [`StoreError::InvalidIdentifier`] for unusable names.
pub fn insert_sql(table_name: &str, columns: &[Column]) -> Result<String> {
    let mut names = Vec::with_capacity(columns.len());
    for column in columns {
        names.push(quote_identifier(&column.name)?);
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table_name)?,
        names.join(", "),
        placeholders.join(", ")
    ))
}

/// Human-readable `name TYPE, ...` rendering used in mismatch errors.
pub(crate) fn describe(columns: &[(String, String)]) -> String {
    columns
        .iter()
        .map(|(name, ty)| format!("{name} {ty}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The `(name, declared type)` pairs a load of `columns` would create.
pub(crate) fn expected_columns(columns: &[Column]) -> Vec<(String, String)> {
    columns
        .iter()
        .map(|c| (c.name.clone(), sql_type(c.primitive).to_string()))
        .collect()
}
