//! Untyped 2-D cell grids and workbooks.

use serde::{Deserialize, Serialize};

use crate::cell::{CellRange, CellReference};
use crate::error::BlockError;
use crate::value::Value;

/// A rectangular row-major grid of untyped text cells.
///
/// Rows shorter than the widest row are padded with empty cells on
/// construction, so every coordinate inside `width × height` is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
    width: usize,
}

impl Sheet {
    #[must_use]
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows, width }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Resolve a reference against this sheet's dimensions.
    ///
    /// # Errors
    ///
    /// Returns a selection error when the reference falls outside the sheet.
    pub fn resolve(&self, reference: &CellReference) -> Result<CellRange, BlockError> {
        reference
            .resolve(self.width, self.height())
            .map_err(|e| BlockError::selection("RANGE_OUT_OF_BOUNDS", e))
    }

    /// Restrict the sheet to a rectangular sub-grid.
    ///
    /// # Errors
    ///
    /// Returns a selection error when the reference falls outside the sheet.
    pub fn select(&self, reference: &CellReference) -> Result<Sheet, BlockError> {
        let range = self.resolve(reference)?;
        let rows = self.rows[range.first_row..=range.last_row]
            .iter()
            .map(|row| row[range.first_column..=range.last_column].to_vec())
            .collect();
        Ok(Sheet::from_rows(rows))
    }

    /// Overwrite the cells of `reference` with `values`, filled row-major.
    ///
    /// # Errors
    ///
    /// Returns a selection error when the reference falls outside the sheet
    /// or the value count differs from the range's cell count.
    pub fn write(&self, reference: &CellReference, values: &[Value]) -> Result<Sheet, BlockError> {
        let range = self.resolve(reference)?;
        if values.len() != range.cell_count() {
            return Err(BlockError::selection(
                "WRITE_SIZE_MISMATCH",
                format!(
                    "{} value(s) supplied for {} cell(s) in {reference}",
                    values.len(),
                    range.cell_count()
                ),
            ));
        }
        let mut out = self.clone();
        let mut values = values.iter();
        for row in range.first_row..=range.last_row {
            for column in range.first_column..=range.last_column {
                if let Some(value) = values.next() {
                    out.rows[row][column] = value.to_string();
                }
            }
        }
        Ok(out)
    }

    /// Remove whole columns, shifting the remaining ones left.
    ///
    /// # Errors
    ///
    /// Returns a selection error for a reference outside the sheet or one
    /// that is not a whole-column reference.
    pub fn delete_columns(&self, references: &[CellReference]) -> Result<Sheet, BlockError> {
        let mut doomed = Vec::with_capacity(references.len());
        for reference in references {
            if !matches!(reference, CellReference::Column(_)) {
                return Err(BlockError::selection(
                    "NOT_A_COLUMN",
                    format!("'{reference}' is not a column reference"),
                ));
            }
            doomed.push(self.resolve(reference)?.first_column);
        }
        doomed.sort_unstable();
        doomed.dedup();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(i, _)| doomed.binary_search(i).is_err())
                    .map(|(_, cell)| cell.clone())
                    .collect()
            })
            .collect();
        Ok(Sheet {
            rows,
            width: self.width - doomed.len(),
        })
    }

    /// Remove whole rows, shifting the remaining ones up.
    ///
    /// # Errors
    ///
    /// Returns a selection error for a reference outside the sheet or one
    /// that is not a whole-row reference.
    pub fn delete_rows(&self, references: &[CellReference]) -> Result<Sheet, BlockError> {
        let mut doomed = Vec::with_capacity(references.len());
        for reference in references {
            if !matches!(reference, CellReference::Row(_)) {
                return Err(BlockError::selection(
                    "NOT_A_ROW",
                    format!("'{reference}' is not a row reference"),
                ));
            }
            doomed.push(self.resolve(reference)?.first_row);
        }
        doomed.sort_unstable();
        doomed.dedup();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| doomed.binary_search(i).is_err())
            .map(|(_, row)| row.clone())
            .collect();
        Ok(Sheet {
            rows,
            width: self.width,
        })
    }
}

/// An ordered set of named sheets parsed from one spreadsheet file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<(String, Sheet)>,
}

impl Workbook {
    #[must_use]
    pub fn new(sheets: Vec<(String, Sheet)>) -> Self {
        Self { sheets }
    }

    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|(sheet_name, _)| sheet_name == name)
            .map(|(_, sheet)| sheet)
    }

    /// The first sheet in file order with its name.
    #[must_use]
    pub fn first(&self) -> Option<(&str, &Sheet)> {
        self.sheets
            .first()
            .map(|(name, sheet)| (name.as_str(), sheet))
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}
