//! Table persistence into `SQLite`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sheetflow_store::{StoreError, WriteMode};
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput, BuildContext};
use crate::config::types::SqliteLoaderOptions;
use crate::result::{BlockStats, LoadedTable};

/// Writes its input table to a named table in a database file.
#[derive(Debug)]
pub struct SqliteLoader {
    table: String,
    file: PathBuf,
    mode: WriteMode,
}

impl SqliteLoader {
    /// # Errors
    ///
    /// Rejects a blank table name or file path.
    pub fn new(options: &SqliteLoaderOptions, ctx: &BuildContext<'_>) -> Result<Self, String> {
        if options.table.trim().is_empty() {
            return Err("table must not be empty".to_string());
        }
        if options.file.as_os_str().is_empty() {
            return Err("file must not be empty".to_string());
        }
        let file = if options.file.is_absolute() {
            options.file.clone()
        } else {
            ctx.base_dir.join(&options.file)
        };
        let mode = if options.drop_table {
            WriteMode::Replace
        } else {
            WriteMode::Append
        };
        Ok(Self {
            table: options.table.clone(),
            file,
            mode,
        })
    }
}

fn persistence_error(e: &StoreError) -> BlockError {
    let code = match e {
        StoreError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
        StoreError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
        _ => "LOAD_FAILED",
    };
    BlockError::persistence(code, e.to_string())
}

#[async_trait]
impl Block for SqliteLoader {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::Table(_)) {
            return Err(unexpected_input(IoType::Table, &input));
        }
        let store = Arc::clone(&ctx.store);
        let file = self.file.clone();
        let table_name = self.table.clone();
        let mode = self.mode;
        let rows = run_blocking(move || match input.as_ref() {
            IoValue::Table(table) => store
                .write_table(&file, &table_name, table, mode)
                .map_err(|e| persistence_error(&e)),
            other => Err(unexpected_input(IoType::Table, other)),
        })
        .await?;

        tracing::info!(
            pipeline = %ctx.pipeline,
            block = %ctx.block,
            table = %self.table,
            file = %self.file.display(),
            rows,
            "Table loaded"
        );
        let stats = BlockStats {
            rows_in: Some(rows),
            rows_out: Some(rows),
            loaded: Some(LoadedTable {
                table: self.table.clone(),
                file: self.file.clone(),
                rows,
            }),
            ..BlockStats::default()
        };
        Ok(BlockOutput::new(IoValue::None).with_stats(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::{build_context, context};
    use crate::valuetype::ValueTypeRegistry;
    use sheetflow_types::error::ErrorKind;
    use sheetflow_types::table::{Column, Table};
    use sheetflow_types::value::{Primitive, Value};

    fn loader(dir: &std::path::Path, drop_table: bool) -> SqliteLoader {
        let registry = ValueTypeRegistry::default();
        SqliteLoader::new(
            &SqliteLoaderOptions {
                table: "stops".into(),
                file: PathBuf::from("out/db.sqlite"),
                drop_table,
            },
            &build_context(&registry, dir),
        )
        .unwrap()
    }

    fn stops(columns: &[(&str, Primitive)], rows: Vec<Vec<Value>>) -> Arc<IoValue> {
        let mut table = Table::new(
            columns
                .iter()
                .map(|(name, p)| Column::new(*name, p.as_str(), *p))
                .collect(),
        );
        for row in rows {
            table.push_row(row).unwrap();
        }
        Arc::new(IoValue::Table(table))
    }

    #[tokio::test]
    async fn loads_relative_to_base_dir_and_reports_rows() {
        let dir = tempfile::tempdir().unwrap();
        let block = loader(dir.path(), true);
        let input = stops(
            &[("id", Primitive::Integer)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        let out = block.execute(input, &context()).await.unwrap();
        assert!(matches!(out.value, IoValue::None));
        let loaded = out.stats.loaded.unwrap();
        assert_eq!(loaded.rows, 2);
        assert_eq!(loaded.file, dir.path().join("out/db.sqlite"));
        assert!(loaded.file.exists());
    }

    #[tokio::test]
    async fn append_with_other_columns_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context();
        loader(dir.path(), true)
            .execute(
                stops(&[("id", Primitive::Integer)], vec![vec![Value::Integer(1)]]),
                &ctx,
            )
            .await
            .unwrap();

        let err = loader(dir.path(), false)
            .execute(
                stops(&[("name", Primitive::Text)], vec![vec![Value::Text("x".into())]]),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Persistence);
        assert_eq!(err.code, "SCHEMA_MISMATCH");
    }

    #[test]
    fn blank_table_name_is_rejected() {
        let registry = ValueTypeRegistry::default();
        let err = SqliteLoader::new(
            &SqliteLoaderOptions {
                table: "  ".into(),
                file: PathBuf::from("db.sqlite"),
                drop_table: true,
            },
            &build_context(&registry, std::path::Path::new(".")),
        )
        .unwrap_err();
        assert!(err.contains("table"));
    }
}
