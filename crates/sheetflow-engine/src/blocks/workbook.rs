//! Spreadsheet workbooks: XLSX interpretation and sheet picking.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use calamine::{Data, Range, Reader, Xlsx};
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};
use sheetflow_types::sheet::{Sheet, Workbook};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::SheetPickerOptions;

/// Parses an XLSX container into a [`Workbook`], one sheet per worksheet.
#[derive(Debug, Clone, Copy)]
pub struct XlsxInterpreter;

/// Convert a calamine range into a sheet anchored at `A1`, so leading empty
/// rows and columns keep their spreadsheet coordinates.
fn to_sheet(range: &Range<Data>) -> Sheet {
    let Some((first_row, first_col)) = range.start() else {
        return Sheet::default();
    };
    let first_row = first_row as usize;
    let first_col = first_col as usize;
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row];
    for cells in range.rows() {
        let mut row = vec![String::new(); first_col];
        row.extend(cells.iter().map(|cell| match cell {
            Data::Empty => String::new(),
            other => other.to_string(),
        }));
        rows.push(row);
    }
    Sheet::from_rows(rows)
}

/// Parse every worksheet of an XLSX file.
///
/// # Errors
///
/// Returns a parse error when the bytes are not a readable workbook.
pub fn read_workbook(bytes: &[u8]) -> Result<Workbook, BlockError> {
    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| BlockError::parse("INVALID_WORKBOOK", e.to_string()))?;
    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|e| BlockError::parse("INVALID_WORKSHEET", format!("{name}: {e}")))?;
        sheets.push((name, to_sheet(&range)));
    }
    Ok(Workbook::new(sheets))
}

#[async_trait]
impl Block for XlsxInterpreter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::File(_)) {
            return Err(unexpected_input(IoType::File, &input));
        }
        let workbook = run_blocking(move || match input.as_ref() {
            IoValue::File(file) => read_workbook(&file.content),
            other => Err(unexpected_input(IoType::File, other)),
        })
        .await?;
        tracing::debug!(
            pipeline = %ctx.pipeline,
            block = %ctx.block,
            sheets = workbook.len(),
            "Workbook interpreted"
        );
        Ok(BlockOutput::new(IoValue::Workbook(workbook)))
    }
}

/// Selects one sheet of a workbook by name, or the first sheet when no
/// name is configured.
#[derive(Debug)]
pub struct SheetPicker {
    sheet_name: Option<String>,
}

impl SheetPicker {
    #[must_use]
    pub fn new(options: &SheetPickerOptions) -> Self {
        Self {
            sheet_name: options.sheet_name.clone(),
        }
    }

    fn pick<'a>(&self, workbook: &'a Workbook) -> Result<&'a Sheet, BlockError> {
        let Some(name) = &self.sheet_name else {
            return workbook.first().map(|(_, sheet)| sheet).ok_or_else(|| {
                BlockError::selection("EMPTY_WORKBOOK", "workbook contains no sheets")
            });
        };
        workbook.sheet(name).ok_or_else(|| {
            BlockError::selection(
                "SHEET_NOT_FOUND",
                format!(
                    "no sheet named '{name}' (available: {})",
                    workbook.sheet_names().collect::<Vec<_>>().join(", ")
                ),
            )
        })
    }
}

#[async_trait]
impl Block for SheetPicker {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let IoValue::Workbook(workbook) = input.as_ref() else {
            return Err(unexpected_input(IoType::Workbook, &input));
        };
        let sheet = self.pick(workbook)?;
        if self.sheet_name.is_none() {
            tracing::debug!(
                pipeline = %ctx.pipeline,
                block = %ctx.block,
                sheet = workbook.sheet_names().next().unwrap_or_default(),
                "Defaulting to the first sheet"
            );
        }
        Ok(BlockOutput::new(IoValue::Sheet(sheet.clone())))
    }
}
