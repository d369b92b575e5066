//! Byte-to-text decoding.

use std::sync::Arc;

use async_trait::async_trait;
use encoding_rs::Encoding;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue, TextFile};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::TextFileInterpreterOptions;

/// Decodes a [`BinaryFile`](sheetflow_types::io::BinaryFile) with a fixed
/// encoding. Malformed input is an error, never replaced.
#[derive(Debug)]
pub struct TextFileInterpreter {
    encoding: &'static Encoding,
}

impl TextFileInterpreter {
    /// # Errors
    ///
    /// Rejects labels that are not WHATWG encoding labels.
    pub fn new(options: &TextFileInterpreterOptions) -> Result<Self, String> {
        let encoding = Encoding::for_label(options.encoding.trim().as_bytes())
            .ok_or_else(|| format!("unknown encoding '{}'", options.encoding))?;
        Ok(Self { encoding })
    }
}

/// Strictly decode `bytes`, dropping a byte order mark that matches
/// `encoding`.
pub(crate) fn decode(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let body = match Encoding::for_bom(bytes) {
        Some((bom_encoding, len)) if bom_encoding == encoding => &bytes[len..],
        _ => bytes,
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(std::borrow::Cow::into_owned)
}

#[async_trait]
impl Block for TextFileInterpreter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::File(_)) {
            return Err(unexpected_input(IoType::File, &input));
        }
        let encoding = self.encoding;
        let text = run_blocking(move || {
            let IoValue::File(file) = input.as_ref() else {
                return Err(unexpected_input(IoType::File, &input));
            };
            let content = decode(encoding, &file.content).ok_or_else(|| {
                BlockError::parse(
                    "UNDECODABLE_TEXT",
                    format!("'{}' is not valid {}", file.name, encoding.name()),
                )
            })?;
            Ok(TextFile {
                name: file.name.clone(),
                content,
            })
        })
        .await?;
        Ok(BlockOutput::new(IoValue::TextFile(text)))
    }
}
