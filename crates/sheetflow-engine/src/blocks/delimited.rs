//! Delimited text (CSV and friends) to sheet.

use std::sync::Arc;

use async_trait::async_trait;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};
use sheetflow_types::sheet::Sheet;

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::CsvInterpreterOptions;

#[derive(Debug, Clone, Copy)]
pub struct CsvInterpreter {
    delimiter: u8,
    enclosing: Option<u8>,
    escape: Option<u8>,
}

impl CsvInterpreter {
    #[must_use]
    pub fn new(options: &CsvInterpreterOptions) -> Self {
        Self {
            delimiter: options.delimiter.0,
            enclosing: options.enclosing.map(|c| c.0),
            escape: options.enclosing_escape.map(|c| c.0),
        }
    }

    /// Split `text` into rows. Enclosed fields may contain the delimiter
    /// and line breaks.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed records.
    pub fn parse(&self, text: &str) -> Result<Sheet, BlockError> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter);
        match self.enclosing {
            Some(quote) => {
                builder.quoting(true).quote(quote);
                // An escape equal to the quote is plain doubled-quote escaping.
                if let Some(escape) = self.escape.filter(|e| *e != quote) {
                    builder.escape(Some(escape)).double_quote(false);
                }
            }
            None => {
                builder.quoting(false);
            }
        }

        let mut reader = builder.from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                BlockError::parse("MALFORMED_CSV", format!("record {}: {e}", index + 1))
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Sheet::from_rows(rows))
    }
}

#[async_trait]
impl Block for CsvInterpreter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::TextFile(_)) {
            return Err(unexpected_input(IoType::TextFile, &input));
        }
        let this = *self;
        let sheet = run_blocking(move || match input.as_ref() {
            IoValue::TextFile(text) => this.parse(&text.content),
            other => Err(unexpected_input(IoType::TextFile, other)),
        })
        .await?;
        Ok(BlockOutput::new(IoValue::Sheet(sheet)))
    }
}
