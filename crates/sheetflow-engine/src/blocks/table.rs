//! Schema binding: sheet to typed table.
//!
//! Rows with any invalid cell are dropped rather than failing the block.
//! Every drop is counted, per column and per reason, in the block's stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};
use sheetflow_types::sheet::Sheet;
use sheetflow_types::table::{Column, Table};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::TableInterpreterOptions;
use crate::result::BlockStats;
use crate::valuetype::{ResolvedType, ValueTypeRegistry};

#[derive(Debug, Clone)]
struct DeclaredColumn {
    name: String,
    value_type: Arc<ResolvedType>,
}

#[derive(Debug, Clone)]
pub struct TableInterpreter {
    header: bool,
    columns: Vec<DeclaredColumn>,
}

/// Output of [`TableInterpreter::bind`].
#[derive(Debug)]
pub struct Binding {
    pub table: Table,
    pub stats: BlockStats,
}

impl TableInterpreter {
    /// # Errors
    ///
    /// Rejects an empty or duplicated column list and unknown value types.
    pub fn new(
        options: &TableInterpreterOptions,
        registry: &ValueTypeRegistry,
    ) -> Result<Self, String> {
        if options.columns.is_empty() {
            return Err("columns must declare at least one column".to_string());
        }
        let mut columns: Vec<DeclaredColumn> = Vec::with_capacity(options.columns.len());
        let mut errors = Vec::new();
        for decl in &options.columns {
            if columns.iter().any(|c| c.name == decl.name) {
                errors.push(format!("column '{}' declared twice", decl.name));
                continue;
            }
            match registry.resolve(&decl.value_type) {
                Some(value_type) => columns.push(DeclaredColumn {
                    name: decl.name.clone(),
                    value_type,
                }),
                None => errors.push(format!(
                    "column '{}' uses unknown value type '{}'",
                    decl.name, decl.value_type
                )),
            }
        }
        if !errors.is_empty() {
            return Err(errors.join("; "));
        }
        Ok(Self {
            header: options.header,
            columns,
        })
    }

    /// Sheet column index for each declared column.
    fn locate(&self, sheet: &Sheet) -> Result<Vec<usize>, BlockError> {
        if !self.header {
            return self
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    if i < sheet.width() {
                        Ok(i)
                    } else {
                        Err(BlockError::schema_binding(
                            "COLUMN_OUT_OF_RANGE",
                            format!(
                                "column '{}' is at position {} but the sheet has {} column(s)",
                                column.name,
                                i + 1,
                                sheet.width()
                            ),
                        ))
                    }
                })
                .collect();
        }

        let header = sheet.rows().first().map_or(&[][..], Vec::as_slice);
        let mut missing = Vec::new();
        let mut indices = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match header.iter().position(|h| *h == column.name) {
                Some(i) => indices.push(i),
                None => missing.push(column.name.as_str()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(BlockError::schema_binding(
                "COLUMN_NOT_FOUND",
                format!(
                    "header has no column(s) {} (found: {})",
                    missing.join(", "),
                    header.join(", ")
                ),
            )
            .with_details(serde_json::json!({ "missing": missing })))
        }
    }

    /// Bind `sheet` to the declared schema.
    ///
    /// # Errors
    ///
    /// Returns a schema-binding error when a declared column cannot be
    /// located. Invalid cells never fail the bind; their rows are dropped.
    pub fn bind(&self, sheet: &Sheet) -> Result<Binding, BlockError> {
        let indices = self.locate(sheet)?;
        let data = if self.header {
            sheet.rows().get(1..).unwrap_or_default()
        } else {
            sheet.rows()
        };

        let mut table = Table::new(
            self.columns
                .iter()
                .map(|c| Column::new(&c.name, c.value_type.name(), c.value_type.primitive()))
                .collect(),
        );
        let mut rejections: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        let mut dropped = 0u64;

        for row in data {
            let mut values = Vec::with_capacity(self.columns.len());
            let mut valid = true;
            for (column, &index) in self.columns.iter().zip(&indices) {
                let raw = row.get(index).map_or("", String::as_str);
                match column.value_type.validate(raw) {
                    Ok(value) => values.push(value),
                    Err(rejection) => {
                        valid = false;
                        *rejections
                            .entry(column.name.clone())
                            .or_default()
                            .entry(rejection.to_string())
                            .or_default() += 1;
                    }
                }
            }
            if !valid {
                dropped += 1;
                continue;
            }
            table.push_row(values).map_err(|e| {
                BlockError::internal("ROW_SHAPE", e)
            })?;
        }

        let stats = BlockStats {
            rows_in: Some(data.len() as u64),
            rows_out: Some(table.row_count() as u64),
            rows_dropped: dropped,
            rejections,
            loaded: None,
        };
        Ok(Binding { table, stats })
    }
}

#[async_trait]
impl Block for TableInterpreter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::Sheet(_)) {
            return Err(unexpected_input(IoType::Sheet, &input));
        }
        let this = self.clone();
        let binding = run_blocking(move || match input.as_ref() {
            IoValue::Sheet(sheet) => this.bind(sheet),
            other => Err(unexpected_input(IoType::Sheet, other)),
        })
        .await?;

        if binding.stats.rows_dropped > 0 {
            tracing::warn!(
                pipeline = %ctx.pipeline,
                block = %ctx.block,
                rows_in = binding.stats.rows_in,
                rows_dropped = binding.stats.rows_dropped,
                "Dropped rows that failed validation"
            );
            for (column, reasons) in &binding.stats.rejections {
                for (reason, count) in reasons {
                    tracing::debug!(
                        pipeline = %ctx.pipeline,
                        block = %ctx.block,
                        column = column.as_str(),
                        reason = reason.as_str(),
                        count,
                        "Rejected cells"
                    );
                }
            }
        } else {
            tracing::info!(
                pipeline = %ctx.pipeline,
                block = %ctx.block,
                rows = binding.table.row_count(),
                "Table interpreted"
            );
        }

        Ok(BlockOutput::new(IoValue::Table(binding.table)).with_stats(binding.stats))
    }
}
