//! Structured error model for block execution.
//!
//! [`BlockError`] carries an [`ErrorKind`] classification, a stable code and a
//! human-readable message. Construct via the kind-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a block failure.
///
/// Every kind except [`ErrorKind::RowValidation`] is fatal to the owning
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid block options discovered at run time.
    Config,
    /// Network or local path unreachable.
    Extraction,
    /// Malformed bytes, text, spreadsheet or archive structure.
    Parse,
    /// Named sheet, file or cell range not found.
    Selection,
    /// Declared column absent from the sheet.
    SchemaBinding,
    /// A single row failed validation (recovered by dropping the row).
    RowValidation,
    /// Database write failure.
    Persistence,
    /// Host-side failure (task panic, poisoned lock).
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Extraction => "extraction",
            Self::Parse => "parse",
            Self::Selection => "selection",
            Self::SchemaBinding => "schema_binding",
            Self::RowValidation => "row_validation",
            Self::Persistence => "persistence",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error from a block operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{kind}] {code}: {message}")]
pub struct BlockError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BlockError {
    fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Invalid block configuration.
    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, code, message)
    }

    /// Source unreachable: network failure, non-2xx status, timeout or missing path.
    #[must_use]
    pub fn extraction(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, code, message)
    }

    /// Malformed input structure.
    #[must_use]
    pub fn parse(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, code, message)
    }

    /// Named sheet/file/range not present.
    #[must_use]
    pub fn selection(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Selection, code, message)
    }

    /// Declared table column cannot be located in the sheet.
    #[must_use]
    pub fn schema_binding(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaBinding, code, message)
    }

    /// Row-level validation failure (non-fatal).
    #[must_use]
    pub fn row_validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RowValidation, code, message)
    }

    /// Database write failure.
    #[must_use]
    pub fn persistence(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, code, message)
    }

    /// Host-side failure.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, code, message)
    }

    /// Attach structured diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this error stops the owning pipeline.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind != ErrorKind::RowValidation
    }
}
