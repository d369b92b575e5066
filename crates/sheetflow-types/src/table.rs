//! Typed, column-named tables ready for persistence.

use serde::{Deserialize, Serialize};

use crate::value::{Primitive, Value};

/// A named table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Name of the value type the column was declared with.
    pub value_type: String,
    /// Primitive the value type resolves to.
    pub primitive: Primitive,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: impl Into<String>, primitive: Primitive) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            primitive,
        }
    }
}

/// Ordered typed columns plus rows of matching arity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns a description when the row's arity or cell primitives do not
    /// match the column list.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} cell(s) but table has {} column(s)",
                row.len(),
                self.columns.len()
            ));
        }
        for (value, column) in row.iter().zip(&self.columns) {
            if value.primitive() != column.primitive {
                return Err(format!(
                    "column '{}' expects {} but got {}",
                    column.name,
                    column.primitive,
                    value.primitive()
                ));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Keep the rows `keep` accepts, in order.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Rename one column in place.
    ///
    /// # Errors
    ///
    /// Returns a description when `from` does not exist or `to` is taken.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), String> {
        let index = self
            .column_index(from)
            .ok_or_else(|| format!("no column named '{from}'"))?;
        if from != to && self.column_index(to).is_some() {
            return Err(format!("column '{to}' already exists"));
        }
        self.columns[index].name = to.to_string();
        Ok(())
    }

    /// Append a column, one value per existing row.
    ///
    /// # Errors
    ///
    /// Returns a description when the name is taken, the value count differs
    /// from the row count, or a value does not match the column primitive.
    pub fn push_column(&mut self, column: Column, values: Vec<Value>) -> Result<(), String> {
        if self.column_index(&column.name).is_some() {
            return Err(format!("column '{}' already exists", column.name));
        }
        if values.len() != self.rows.len() {
            return Err(format!(
                "column '{}' has {} value(s) but table has {} row(s)",
                column.name,
                values.len(),
                self.rows.len()
            ));
        }
        if let Some(bad) = values.iter().find(|v| v.primitive() != column.primitive) {
            return Err(format!(
                "column '{}' expects {} but got {}",
                column.name,
                column.primitive,
                bad.primitive()
            ));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_enforces_arity_and_primitives() {
        let mut table = Table::new(vec![
            Column::new("id", "integer", Primitive::Integer),
            Column::new("name", "text", Primitive::Text),
        ]);
        table
            .push_row(vec![Value::Integer(1), Value::Text("a".into())])
            .unwrap();
        assert!(table.push_row(vec![Value::Integer(2)]).is_err());
        assert!(table
            .push_row(vec![Value::Text("x".into()), Value::Text("b".into())])
            .is_err());
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column_index("name"), Some(1));
    }

    fn wages() -> Table {
        let mut table = Table::new(vec![
            Column::new("job_code", "text", Primitive::Text),
            Column::new("wage", "decimal", Primitive::Decimal),
        ]);
        for (code, wage) in [("15-1252", 120_000.0), ("15-1211", 95_000.0)] {
            table
                .push_row(vec![Value::Text(code.into()), Value::Decimal(wage)])
                .unwrap();
        }
        table
    }

    #[test]
    fn rename_column_refuses_collisions() {
        let mut table = wages();
        table.rename_column("wage", "annual_wage").unwrap();
        assert_eq!(table.column_index("annual_wage"), Some(1));
        assert!(table.rename_column("missing", "x").is_err());
        assert!(table.rename_column("job_code", "annual_wage").is_err());
    }

    #[test]
    fn push_column_checks_length_and_primitive() {
        let mut table = wages();
        assert!(table
            .push_column(Column::new("flag", "boolean", Primitive::Boolean), vec![])
            .is_err());
        assert!(table
            .push_column(
                Column::new("flag", "boolean", Primitive::Boolean),
                vec![Value::Boolean(true), Value::Integer(1)]
            )
            .is_err());
        table
            .push_column(
                Column::new("flag", "boolean", Primitive::Boolean),
                vec![Value::Boolean(true), Value::Boolean(false)],
            )
            .unwrap();
        assert_eq!(table.rows()[1], vec![
            Value::Text("15-1211".into()),
            Value::Decimal(95_000.0),
            Value::Boolean(false),
        ]);
    }

    #[test]
    fn retain_rows_keeps_order() {
        let mut table = wages();
        table.retain_rows(|row| row[1].as_f64().is_some_and(|w| w < 100_000.0));
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.rows()[0][0], Value::Text("15-1211".into()));
    }
}
