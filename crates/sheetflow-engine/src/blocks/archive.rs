//! Archive extraction and file picking.

use std::io::{Cursor, Read};
use std::sync::Arc;

use async_trait::async_trait;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{BinaryFile, FileSystem, IoType, IoValue};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::{ArchiveInterpreterOptions, ArchiveType, FilePickerOptions};

/// Unpacks an archive into an in-memory [`FileSystem`].
#[derive(Debug, Clone, Copy)]
pub struct ArchiveInterpreter {
    archive_type: ArchiveType,
}

impl ArchiveInterpreter {
    #[must_use]
    pub fn new(options: &ArchiveInterpreterOptions) -> Self {
        Self {
            archive_type: options.archive_type,
        }
    }
}

/// Read every regular file of a zip archive.
///
/// # Errors
///
/// Returns a parse error for corrupt archives or unreadable entries.
pub fn unzip(bytes: &[u8]) -> Result<FileSystem, BlockError> {
    let corrupt = |e: zip::result::ZipError| BlockError::parse("CORRUPT_ARCHIVE", e.to_string());
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    let mut fs = FileSystem::default();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(corrupt)?;
        if entry.is_dir() {
            continue;
        }
        let path = entry.name().to_string();
        let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut content).map_err(|e| {
            BlockError::parse("CORRUPT_ARCHIVE", format!("{path}: {e}"))
        })?;
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        fs.insert(&path, BinaryFile::new(name, content));
    }
    Ok(fs)
}

#[async_trait]
impl Block for ArchiveInterpreter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        if !matches!(input.as_ref(), IoValue::File(_)) {
            return Err(unexpected_input(IoType::File, &input));
        }
        let fs = match self.archive_type {
            ArchiveType::Zip => {
                run_blocking(move || match input.as_ref() {
                    IoValue::File(file) => unzip(&file.content),
                    other => Err(unexpected_input(IoType::File, other)),
                })
                .await?
            }
        };
        tracing::debug!(
            pipeline = %ctx.pipeline,
            block = %ctx.block,
            files = fs.len(),
            "Archive extracted"
        );
        Ok(BlockOutput::new(IoValue::FileSystem(fs)))
    }
}

/// Selects one file of an extracted archive by path.
#[derive(Debug)]
pub struct FilePicker {
    path: String,
}

impl FilePicker {
    /// # Errors
    ///
    /// Rejects an empty path.
    pub fn new(options: &FilePickerOptions) -> Result<Self, String> {
        let path = FileSystem::normalize_path(&options.path);
        if path.is_empty() {
            return Err(format!("path '{}' names no file", options.path));
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl Block for FilePicker {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        _ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let IoValue::FileSystem(fs) = input.as_ref() else {
            return Err(unexpected_input(IoType::FileSystem, &input));
        };
        let file = fs.get(&self.path).ok_or_else(|| {
            BlockError::selection(
                "FILE_NOT_FOUND",
                format!("archive has no file '{}'", self.path),
            )
        })?;
        Ok(BlockOutput::new(IoValue::File(file.clone())))
    }
}
