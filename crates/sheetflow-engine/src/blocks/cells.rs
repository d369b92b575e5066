//! Sheet reshaping: range selection, cell writes, column and row deletion.

use std::sync::Arc;

use async_trait::async_trait;
use sheetflow_types::cell::CellReference;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};
use sheetflow_types::sheet::Sheet;
use sheetflow_types::value::Value;

use super::{unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::{CellRangeSelectorOptions, CellWriterOptions, DeleteOptions};

fn sheet_input(input: &IoValue) -> Result<&Sheet, BlockError> {
    match input {
        IoValue::Sheet(sheet) => Ok(sheet),
        other => Err(unexpected_input(IoType::Sheet, other)),
    }
}

fn sheet_output(sheet: Sheet) -> BlockOutput {
    BlockOutput::new(IoValue::Sheet(sheet))
}

/// Restricts a sheet to a rectangular sub-grid.
#[derive(Debug)]
pub struct CellRangeSelector {
    select: CellReference,
}

impl CellRangeSelector {
    #[must_use]
    pub fn new(options: &CellRangeSelectorOptions) -> Self {
        Self {
            select: options.select,
        }
    }
}

#[async_trait]
impl Block for CellRangeSelector {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let sheet = sheet_input(&input)?;
        Ok(sheet_output(sheet.select(&self.select)?))
    }
}

/// Overwrites a range with literal values, row-major.
#[derive(Debug)]
pub struct CellWriter {
    at: CellReference,
    values: Vec<Value>,
}

impl CellWriter {
    /// # Errors
    ///
    /// Rejects an empty value list and, for fixed-size ranges, a value
    /// count that differs from the range's cell count.
    pub fn new(options: &CellWriterOptions) -> Result<Self, String> {
        if options.write.is_empty() {
            return Err("write must list at least one value".to_string());
        }
        if let Some(cells) = options.at.static_cell_count() {
            if cells != options.write.len() {
                return Err(format!(
                    "write lists {} value(s) but {} covers {cells} cell(s)",
                    options.write.len(),
                    options.at
                ));
            }
        }
        Ok(Self {
            at: options.at,
            values: options.write.clone(),
        })
    }
}

#[async_trait]
impl Block for CellWriter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let sheet = sheet_input(&input)?;
        Ok(sheet_output(sheet.write(&self.at, &self.values)?))
    }
}

fn check_references(
    references: &[CellReference],
    wanted: fn(&CellReference) -> bool,
    what: &str,
) -> Result<Vec<CellReference>, String> {
    if references.is_empty() {
        return Err("delete must list at least one reference".to_string());
    }
    if let Some(bad) = references.iter().find(|r| !wanted(r)) {
        return Err(format!("'{bad}' is not a {what} reference"));
    }
    Ok(references.to_vec())
}

/// Removes whole columns; the rest shift left.
#[derive(Debug)]
pub struct ColumnDeleter {
    delete: Vec<CellReference>,
}

impl ColumnDeleter {
    /// # Errors
    ///
    /// Rejects an empty list and references that are not whole columns.
    pub fn new(options: &DeleteOptions) -> Result<Self, String> {
        let delete = check_references(
            &options.delete,
            |r| matches!(r, CellReference::Column(_)),
            "column",
        )?;
        Ok(Self { delete })
    }
}

#[async_trait]
impl Block for ColumnDeleter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let sheet = sheet_input(&input)?;
        Ok(sheet_output(sheet.delete_columns(&self.delete)?))
    }
}

/// Removes whole rows; the rest shift up.
#[derive(Debug)]
pub struct RowDeleter {
    delete: Vec<CellReference>,
}

impl RowDeleter {
    /// # Errors
    ///
    /// Rejects an empty list and references that are not whole rows.
    pub fn new(options: &DeleteOptions) -> Result<Self, String> {
        let delete = check_references(
            &options.delete,
            |r| matches!(r, CellReference::Row(_)),
            "row",
        )?;
        Ok(Self { delete })
    }
}

#[async_trait]
impl Block for RowDeleter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let sheet = sheet_input(&input)?;
        Ok(sheet_output(sheet.delete_rows(&self.delete)?))
    }
}
