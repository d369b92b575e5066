//! Values carried along pipeline edges.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sheet::{Sheet, Workbook};
use crate::table::Table;

/// The kind of value a block consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoType {
    None,
    File,
    TextFile,
    FileSystem,
    Workbook,
    Sheet,
    Table,
}

impl IoType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::TextFile => "text_file",
            Self::FileSystem => "file_system",
            Self::Workbook => "workbook",
            Self::Sheet => "sheet",
            Self::Table => "table",
        }
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw bytes plus the name they were fetched or extracted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    pub name: String,
    pub content: Bytes,
}

impl BinaryFile {
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A decoded text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    pub name: String,
    pub content: String,
}

/// Files extracted from an archive, keyed by normalised path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSystem {
    entries: BTreeMap<String, BinaryFile>,
}

impl FileSystem {
    /// Normalise an archive path: `./a/b.txt`, `/a/b.txt` and `a\b.txt`
    /// all become `a/b.txt`.
    #[must_use]
    pub fn normalize_path(path: &str) -> String {
        let mut normalized = path.trim().replace('\\', "/");
        loop {
            if let Some(rest) = normalized.strip_prefix("./") {
                normalized = rest.to_string();
            } else if let Some(rest) = normalized.strip_prefix('/') {
                normalized = rest.to_string();
            } else {
                break;
            }
        }
        normalized
    }

    pub fn insert(&mut self, path: &str, file: BinaryFile) {
        self.entries.insert(Self::normalize_path(path), file);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&BinaryFile> {
        self.entries.get(&Self::normalize_path(path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A value produced by one block and delivered to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum IoValue {
    None,
    File(BinaryFile),
    TextFile(TextFile),
    FileSystem(FileSystem),
    Workbook(Workbook),
    Sheet(Sheet),
    Table(Table),
}

impl IoValue {
    #[must_use]
    pub fn io_type(&self) -> IoType {
        match self {
            Self::None => IoType::None,
            Self::File(_) => IoType::File,
            Self::TextFile(_) => IoType::TextFile,
            Self::FileSystem(_) => IoType::FileSystem,
            Self::Workbook(_) => IoType::Workbook,
            Self::Sheet(_) => IoType::Sheet,
            Self::Table(_) => IoType::Table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_paths_normalise() {
        let mut fs = FileSystem::default();
        fs.insert("stops.txt", BinaryFile::new("stops.txt", "id\n1\n"));
        fs.insert("nested/agency.txt", BinaryFile::new("agency.txt", ""));
        assert!(fs.get("./stops.txt").is_some());
        assert!(fs.get("/stops.txt").is_some());
        assert!(fs.get("stops.txt").is_some());
        assert!(fs.get(".\\nested\\agency.txt").is_some());
        assert!(fs.get("routes.txt").is_none());
        assert_eq!(fs.len(), 2);
    }

    #[test]
    fn io_value_reports_its_type() {
        assert_eq!(IoValue::Sheet(Sheet::default()).io_type(), IoType::Sheet);
        assert_eq!(IoValue::None.io_type(), IoType::None);
    }
}
