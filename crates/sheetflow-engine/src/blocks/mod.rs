//! Block implementations.
//!
//! Each configured [`BlockKind`] is built once into an `Arc<dyn Block>` when
//! the pipeline graph is assembled and executed at most once per run. Blocks
//! receive their single input as a shared handle and never mutate it.

pub mod archive;
pub mod cells;
pub mod delimited;
pub mod extract;
pub mod load;
pub mod table;
pub mod text;
pub mod transform;
pub mod workbook;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sheetflow_store::TableStore;
use sheetflow_types::error::BlockError;
use sheetflow_types::ids::{BlockName, PipelineId};
use sheetflow_types::io::{IoType, IoValue};

use crate::config::types::BlockKind;
use crate::fetch::Fetcher;
use crate::result::BlockStats;
use crate::valuetype::ValueTypeRegistry;

/// Inputs needed to turn block options into a runnable block.
pub struct BuildContext<'a> {
    pub registry: &'a ValueTypeRegistry,
    /// Directory relative paths resolve against.
    pub base_dir: &'a Path,
    /// Default extraction timeout.
    pub extract_timeout: Duration,
}

/// Per-execution collaborators and identity.
#[derive(Clone)]
pub struct BlockContext {
    pub pipeline: PipelineId,
    pub block: BlockName,
    pub fetcher: Arc<dyn Fetcher>,
    pub store: Arc<dyn TableStore>,
}

/// A block's produced value plus its counters.
#[derive(Debug)]
pub struct BlockOutput {
    pub value: IoValue,
    pub stats: BlockStats,
}

impl BlockOutput {
    #[must_use]
    pub fn new(value: IoValue) -> Self {
        Self {
            value,
            stats: BlockStats::default(),
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: BlockStats) -> Self {
        self.stats = stats;
        self
    }
}

/// A runnable pipeline step.
#[async_trait]
pub trait Block: Send + Sync {
    /// Consume `input` and produce this block's output.
    ///
    /// Source blocks receive [`IoValue::None`].
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError>;
}

/// Build the runnable block for a declaration.
///
/// # Errors
///
/// Returns a description of option values that are well-formed YAML but
/// unusable: unknown encodings, non-HTTP URLs, unresolvable value types,
/// mismatched write lists.
pub fn build(kind: &BlockKind, ctx: &BuildContext<'_>) -> Result<Arc<dyn Block>, String> {
    Ok(match kind {
        BlockKind::HttpExtractor(o) => Arc::new(extract::HttpExtractor::new(o, ctx)?),
        BlockKind::LocalFileExtractor(o) => Arc::new(extract::LocalFileExtractor::new(o, ctx)),
        BlockKind::TextFileInterpreter(o) => Arc::new(text::TextFileInterpreter::new(o)?),
        BlockKind::CsvInterpreter(o) => Arc::new(delimited::CsvInterpreter::new(o)),
        BlockKind::XlsxInterpreter(_) => Arc::new(workbook::XlsxInterpreter),
        BlockKind::SheetPicker(o) => Arc::new(workbook::SheetPicker::new(o)),
        BlockKind::ArchiveInterpreter(o) => Arc::new(archive::ArchiveInterpreter::new(o)),
        BlockKind::FilePicker(o) => Arc::new(archive::FilePicker::new(o)?),
        BlockKind::CellRangeSelector(o) => Arc::new(cells::CellRangeSelector::new(o)),
        BlockKind::CellWriter(o) => Arc::new(cells::CellWriter::new(o)?),
        BlockKind::ColumnDeleter(o) => Arc::new(cells::ColumnDeleter::new(o)?),
        BlockKind::RowDeleter(o) => Arc::new(cells::RowDeleter::new(o)?),
        BlockKind::TableInterpreter(o) => Arc::new(table::TableInterpreter::new(o, ctx.registry)?),
        BlockKind::RowFilter(o) => Arc::new(transform::RowFilter::new(o)?),
        BlockKind::ColumnRenamer(o) => Arc::new(transform::ColumnRenamer::new(o)?),
        BlockKind::ColumnCalculator(o) => Arc::new(transform::ColumnCalculator::new(o)?),
        BlockKind::Deduplicator(o) => Arc::new(transform::Deduplicator::new(o)?),
        BlockKind::SqliteLoader(o) => Arc::new(load::SqliteLoader::new(o, ctx)?),
    })
}

pub(crate) fn unexpected_input(expected: IoType, got: &IoValue) -> BlockError {
    BlockError::internal(
        "UNEXPECTED_INPUT",
        format!("expected {expected} input, got {}", got.io_type()),
    )
}

/// Run CPU-bound interpretation on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, BlockError>
where
    F: FnOnce() -> Result<T, BlockError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BlockError::internal("BLOCKING_TASK_FAILED", e.to_string()))?
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for block unit tests.

    use super::*;
    use bytes::Bytes;
    use sheetflow_store::SqliteTableStore;

    use crate::fetch::FetchError;

    /// Fetcher that serves nothing.
    pub struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "network disabled in tests".into(),
            })
        }
    }

    pub fn context() -> BlockContext {
        context_with(Arc::new(NoFetch))
    }

    pub fn context_with(fetcher: Arc<dyn Fetcher>) -> BlockContext {
        BlockContext {
            pipeline: PipelineId::new("test"),
            block: BlockName::new("block"),
            fetcher,
            store: Arc::new(SqliteTableStore::new()),
        }
    }

    pub fn build_context<'a>(
        registry: &'a ValueTypeRegistry,
        base_dir: &'a Path,
    ) -> BuildContext<'a> {
        BuildContext {
            registry,
            base_dir,
            extract_timeout: Duration::from_secs(60),
        }
    }
}
