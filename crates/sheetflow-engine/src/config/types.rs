//! Project configuration types deserialized from YAML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use sheetflow_types::cell::CellReference;
use sheetflow_types::io::IoType;
use sheetflow_types::value::Value;

/// Top-level project configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub version: String,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub constraints: Vec<ConstraintDecl>,
    #[serde(default)]
    pub valuetypes: Vec<ValueTypeDecl>,
    pub pipelines: Vec<PipelineDecl>,
    /// Directory relative block paths resolve against. Set by the parser
    /// to the configuration file's directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ProjectConfig {
    /// Resolve `path` against [`ProjectConfig::base_dir`] unless absolute.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Project-wide execution resources.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(default)]
    pub parallelism: Parallelism,
    #[serde(default = "default_extract_timeout_seconds")]
    pub extract_timeout_seconds: u64,
}

fn default_extract_timeout_seconds() -> u64 {
    60
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::default(),
            extract_timeout_seconds: default_extract_timeout_seconds(),
        }
    }
}

/// How many pipelines may run at once: `auto` or a fixed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Auto,
    Manual(u32),
}

impl<'de> Deserialize<'de> for Parallelism {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Keyword(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Self::Manual(n)),
            Raw::Keyword(s) if s.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            Raw::Keyword(s) => Err(serde::de::Error::custom(format!(
                "invalid parallelism '{s}', expected 'auto' or a positive integer"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints and value types
// ---------------------------------------------------------------------------

/// A named constraint declaration with exactly one rule key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawConstraint")]
pub struct ConstraintDecl {
    pub name: String,
    pub rule: ConstraintRule,
}

/// The predicate a constraint applies.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintRule {
    Range(RangeDecl),
    Regex(String),
    Equals(Value),
    Allowlist(Vec<Value>),
    Denylist(Vec<Value>),
    Length(LengthDecl),
}

impl ConstraintRule {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Range(_) => "range",
            Self::Regex(_) => "regex",
            Self::Equals(_) => "equals",
            Self::Allowlist(_) => "allowlist",
            Self::Denylist(_) => "denylist",
            Self::Length(_) => "length",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RangeDecl {
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default = "default_true")]
    pub lower_bound_inclusive: bool,
    #[serde(default = "default_true")]
    pub upper_bound_inclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LengthDecl {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConstraint {
    name: String,
    #[serde(default)]
    range: Option<RangeDecl>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    equals: Option<Value>,
    #[serde(default)]
    allowlist: Option<Vec<Value>>,
    #[serde(default)]
    denylist: Option<Vec<Value>>,
    #[serde(default)]
    length: Option<LengthDecl>,
}

impl TryFrom<RawConstraint> for ConstraintDecl {
    type Error = String;

    fn try_from(raw: RawConstraint) -> Result<Self, Self::Error> {
        let mut rules = Vec::new();
        if let Some(r) = raw.range {
            rules.push(ConstraintRule::Range(r));
        }
        if let Some(r) = raw.regex {
            rules.push(ConstraintRule::Regex(r));
        }
        if let Some(v) = raw.equals {
            rules.push(ConstraintRule::Equals(v));
        }
        if let Some(v) = raw.allowlist {
            rules.push(ConstraintRule::Allowlist(v));
        }
        if let Some(v) = raw.denylist {
            rules.push(ConstraintRule::Denylist(v));
        }
        if let Some(l) = raw.length {
            rules.push(ConstraintRule::Length(l));
        }
        if rules.len() != 1 {
            return Err(format!(
                "constraint '{}' must declare exactly one of range, regex, equals, \
                 allowlist, denylist, length (found {})",
                raw.name,
                rules.len()
            ));
        }
        let rule = rules.remove(0);
        Ok(Self {
            name: raw.name,
            rule,
        })
    }
}

/// A user-defined refinement of a primitive or another value type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueTypeDecl {
    pub name: String,
    pub base: String,
    #[serde(default)]
    pub constraints: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDecl {
    pub name: String,
    pub blocks: Vec<BlockDecl>,
    #[serde(default)]
    pub pipes: Vec<PipeDecl>,
}

/// A chain of block names; `A -> B -> C` declares edges A→B and B→C.
///
/// Accepts either the arrow string or a YAML list of names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPipe")]
pub struct PipeDecl {
    pub chain: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPipe {
    Arrow(String),
    List(Vec<String>),
}

impl From<RawPipe> for PipeDecl {
    fn from(raw: RawPipe) -> Self {
        let chain = match raw {
            RawPipe::Arrow(s) => s.split("->").map(|p| p.trim().to_string()).collect(),
            RawPipe::List(v) => v.into_iter().map(|p| p.trim().to_string()).collect(),
        };
        Self { chain }
    }
}

impl PipeDecl {
    /// Consecutive `(from, to)` pairs of the chain.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.chain
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
    }
}

/// One block: its name plus its kind-specific options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawBlock")]
pub struct BlockDecl {
    pub name: String,
    pub kind: BlockKind,
}

#[derive(Deserialize)]
struct RawBlock {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    options: serde_yaml::Mapping,
}

impl TryFrom<RawBlock> for BlockDecl {
    type Error = String;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let kind = BlockKind::from_options(&raw.kind, serde_yaml::Value::Mapping(raw.options))
            .map_err(|e| format!("block '{}' ({}): {e}", raw.name, raw.kind))?;
        Ok(Self {
            name: raw.name,
            kind,
        })
    }
}

/// Every supported block kind with its typed options.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    HttpExtractor(HttpExtractorOptions),
    LocalFileExtractor(LocalFileExtractorOptions),
    TextFileInterpreter(TextFileInterpreterOptions),
    CsvInterpreter(CsvInterpreterOptions),
    XlsxInterpreter(NoOptions),
    SheetPicker(SheetPickerOptions),
    ArchiveInterpreter(ArchiveInterpreterOptions),
    FilePicker(FilePickerOptions),
    CellRangeSelector(CellRangeSelectorOptions),
    CellWriter(CellWriterOptions),
    ColumnDeleter(DeleteOptions),
    RowDeleter(DeleteOptions),
    TableInterpreter(TableInterpreterOptions),
    RowFilter(RowFilterOptions),
    ColumnRenamer(ColumnRenamerOptions),
    ColumnCalculator(ColumnCalculatorOptions),
    Deduplicator(DeduplicatorOptions),
    SqliteLoader(SqliteLoaderOptions),
}

/// Names accepted in the `type` key.
pub const BLOCK_TYPES: &[&str] = &[
    "HttpExtractor",
    "Extractor",
    "LocalFileExtractor",
    "TextFileInterpreter",
    "CSVInterpreter",
    "XLSXInterpreter",
    "SheetPicker",
    "ArchiveInterpreter",
    "FilePicker",
    "CellRangeSelector",
    "CellWriter",
    "ColumnDeleter",
    "RowDeleter",
    "TableInterpreter",
    "RowFilter",
    "ColumnRenamer",
    "ColumnCalculator",
    "Deduplicator",
    "SQLiteLoader",
];

impl BlockKind {
    fn from_options(kind: &str, options: serde_yaml::Value) -> Result<Self, String> {
        fn typed<T: serde::de::DeserializeOwned>(options: serde_yaml::Value) -> Result<T, String> {
            serde_yaml::from_value(options).map_err(|e| e.to_string())
        }

        Ok(match kind {
            "HttpExtractor" | "Extractor" => Self::HttpExtractor(typed(options)?),
            "LocalFileExtractor" => Self::LocalFileExtractor(typed(options)?),
            "TextFileInterpreter" => Self::TextFileInterpreter(typed(options)?),
            "CSVInterpreter" => Self::CsvInterpreter(typed(options)?),
            "XLSXInterpreter" => Self::XlsxInterpreter(typed(options)?),
            "SheetPicker" => Self::SheetPicker(typed(options)?),
            "ArchiveInterpreter" => Self::ArchiveInterpreter(typed(options)?),
            "FilePicker" => Self::FilePicker(typed(options)?),
            "CellRangeSelector" => Self::CellRangeSelector(typed(options)?),
            "CellWriter" => Self::CellWriter(typed(options)?),
            "ColumnDeleter" => Self::ColumnDeleter(typed(options)?),
            "RowDeleter" => Self::RowDeleter(typed(options)?),
            "TableInterpreter" => Self::TableInterpreter(typed(options)?),
            "RowFilter" => Self::RowFilter(typed(options)?),
            "ColumnRenamer" => Self::ColumnRenamer(typed(options)?),
            "ColumnCalculator" => Self::ColumnCalculator(typed(options)?),
            "Deduplicator" => Self::Deduplicator(typed(options)?),
            "SQLiteLoader" => Self::SqliteLoader(typed(options)?),
            other => {
                return Err(format!(
                    "unknown block type '{other}', expected one of: {}",
                    BLOCK_TYPES.join(", ")
                ))
            }
        })
    }

    /// Canonical type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::HttpExtractor(_) => "HttpExtractor",
            Self::LocalFileExtractor(_) => "LocalFileExtractor",
            Self::TextFileInterpreter(_) => "TextFileInterpreter",
            Self::CsvInterpreter(_) => "CSVInterpreter",
            Self::XlsxInterpreter(_) => "XLSXInterpreter",
            Self::SheetPicker(_) => "SheetPicker",
            Self::ArchiveInterpreter(_) => "ArchiveInterpreter",
            Self::FilePicker(_) => "FilePicker",
            Self::CellRangeSelector(_) => "CellRangeSelector",
            Self::CellWriter(_) => "CellWriter",
            Self::ColumnDeleter(_) => "ColumnDeleter",
            Self::RowDeleter(_) => "RowDeleter",
            Self::TableInterpreter(_) => "TableInterpreter",
            Self::RowFilter(_) => "RowFilter",
            Self::ColumnRenamer(_) => "ColumnRenamer",
            Self::ColumnCalculator(_) => "ColumnCalculator",
            Self::Deduplicator(_) => "Deduplicator",
            Self::SqliteLoader(_) => "SQLiteLoader",
        }
    }

    /// The value type this block consumes.
    #[must_use]
    pub fn input_type(&self) -> IoType {
        match self {
            Self::HttpExtractor(_) | Self::LocalFileExtractor(_) => IoType::None,
            Self::TextFileInterpreter(_)
            | Self::XlsxInterpreter(_)
            | Self::ArchiveInterpreter(_) => IoType::File,
            Self::CsvInterpreter(_) => IoType::TextFile,
            Self::SheetPicker(_) => IoType::Workbook,
            Self::FilePicker(_) => IoType::FileSystem,
            Self::CellRangeSelector(_)
            | Self::CellWriter(_)
            | Self::ColumnDeleter(_)
            | Self::RowDeleter(_)
            | Self::TableInterpreter(_) => IoType::Sheet,
            Self::RowFilter(_)
            | Self::ColumnRenamer(_)
            | Self::ColumnCalculator(_)
            | Self::Deduplicator(_)
            | Self::SqliteLoader(_) => IoType::Table,
        }
    }

    /// The value type this block produces.
    #[must_use]
    pub fn output_type(&self) -> IoType {
        match self {
            Self::HttpExtractor(_) | Self::LocalFileExtractor(_) | Self::FilePicker(_) => {
                IoType::File
            }
            Self::TextFileInterpreter(_) => IoType::TextFile,
            Self::XlsxInterpreter(_) => IoType::Workbook,
            Self::ArchiveInterpreter(_) => IoType::FileSystem,
            Self::CsvInterpreter(_)
            | Self::SheetPicker(_)
            | Self::CellRangeSelector(_)
            | Self::CellWriter(_)
            | Self::ColumnDeleter(_)
            | Self::RowDeleter(_) => IoType::Sheet,
            Self::TableInterpreter(_)
            | Self::RowFilter(_)
            | Self::ColumnRenamer(_)
            | Self::ColumnCalculator(_)
            | Self::Deduplicator(_) => IoType::Table,
            Self::SqliteLoader(_) => IoType::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Block options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoOptions {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct HttpExtractorOptions {
    pub url: String,
    /// Overrides `resources.extract_timeout_seconds`.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalFileExtractorOptions {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextFileInterpreterOptions {
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf8".to_string()
}

/// A single ASCII character option such as a delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct AsciiChar(pub u8);

impl TryFrom<String> for AsciiChar {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_bytes() {
            [b] if b.is_ascii() => Ok(Self(*b)),
            _ => Err(format!("expected a single ASCII character, got '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CsvInterpreterOptions {
    pub delimiter: AsciiChar,
    #[serde(default)]
    pub enclosing: Option<AsciiChar>,
    #[serde(default)]
    pub enclosing_escape: Option<AsciiChar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SheetPickerOptions {
    /// Absent picks the first worksheet.
    #[serde(default)]
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ArchiveInterpreterOptions {
    #[serde(default = "default_archive_type")]
    pub archive_type: ArchiveType,
}

fn default_archive_type() -> ArchiveType {
    ArchiveType::Zip
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilePickerOptions {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellRangeSelectorOptions {
    pub select: CellReference,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellWriterOptions {
    pub at: CellReference,
    pub write: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteOptions {
    pub delete: Vec<CellReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableInterpreterOptions {
    #[serde(default = "default_true")]
    pub header: bool,
    pub columns: Vec<ColumnDecl>,
}

/// A declared table column: `- stop_id: integer` or
/// `- { name: stop_id, type: integer }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawColumn")]
pub struct ColumnDecl {
    pub name: String,
    pub value_type: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Explicit {
        name: String,
        #[serde(rename = "type")]
        value_type: String,
    },
    Short(BTreeMap<String, String>),
}

impl TryFrom<RawColumn> for ColumnDecl {
    type Error = String;

    fn try_from(raw: RawColumn) -> Result<Self, Self::Error> {
        match raw {
            RawColumn::Explicit { name, value_type } => Ok(Self { name, value_type }),
            RawColumn::Short(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((name, value_type)), None) => Ok(Self { name, value_type }),
                    _ => Err("column entry must be a single 'name: type' pair".to_string()),
                }
            }
        }
    }
}

/// Keep the rows whose `column` satisfies one predicate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRowFilter")]
pub struct RowFilterOptions {
    pub column: String,
    pub predicate: RowPredicate,
    /// Compare text case-insensitively, ignoring surrounding whitespace.
    pub ignore_case: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    Contains(String),
    Equals(Value),
    Range(RangeDecl),
    DateRange(DateRangeDecl),
}

impl RowPredicate {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contains(_) => "contains",
            Self::Equals(_) => "equals",
            Self::Range(_) => "range",
            Self::DateRange(_) => "dateRange",
        }
    }
}

/// Inclusive calendar date bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRangeDecl {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawRowFilter {
    column: String,
    #[serde(default)]
    contains: Option<String>,
    #[serde(default)]
    equals: Option<Value>,
    #[serde(default)]
    range: Option<RangeDecl>,
    #[serde(default)]
    date_range: Option<DateRangeDecl>,
    #[serde(default)]
    ignore_case: bool,
}

impl TryFrom<RawRowFilter> for RowFilterOptions {
    type Error = String;

    fn try_from(raw: RawRowFilter) -> Result<Self, Self::Error> {
        let mut predicates: Vec<RowPredicate> = [
            raw.contains.map(RowPredicate::Contains),
            raw.equals.map(RowPredicate::Equals),
            raw.range.map(RowPredicate::Range),
            raw.date_range.map(RowPredicate::DateRange),
        ]
        .into_iter()
        .flatten()
        .collect();
        if predicates.len() != 1 {
            return Err(format!(
                "row filter must declare exactly one of contains, equals, range, dateRange \
                 (found {})",
                predicates.len()
            ));
        }
        Ok(Self {
            column: raw.column,
            predicate: predicates.remove(0),
            ignore_case: raw.ignore_case,
        })
    }
}

/// `old_name: new_name` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnRenamerOptions {
    pub rename: BTreeMap<String, String>,
}

/// Appends `column = left <operator> right` as a decimal column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnCalculatorOptions {
    pub column: String,
    pub left: String,
    pub operator: Operator,
    pub right: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Right-hand side of a calculation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOperand")]
pub enum Operand {
    /// Another numeric column of the same row.
    Column(String),
    /// A constant.
    Value(f64),
    /// A factor chosen by the text of another column, e.g. a pay unit.
    Lookup(LookupDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupDecl {
    pub column: String,
    pub factors: BTreeMap<String, f64>,
    /// Used for keys missing from `factors`; without it such rows are dropped.
    pub default: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOperand {
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    lookup: Option<String>,
    #[serde(default)]
    factors: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    default: Option<f64>,
}

impl TryFrom<RawOperand> for Operand {
    type Error = String;

    fn try_from(raw: RawOperand) -> Result<Self, Self::Error> {
        match (raw.column, raw.value, raw.lookup) {
            (Some(column), None, None) if raw.factors.is_none() && raw.default.is_none() => {
                Ok(Self::Column(column))
            }
            (None, Some(value), None) if raw.factors.is_none() && raw.default.is_none() => {
                Ok(Self::Value(value))
            }
            (None, None, Some(column)) => Ok(Self::Lookup(LookupDecl {
                column,
                factors: raw.factors.unwrap_or_default(),
                default: raw.default,
            })),
            _ => Err(
                "operand must declare exactly one of column, value, lookup; \
                 factors and default belong to lookup"
                    .to_string(),
            ),
        }
    }
}

/// Keep one row per `key`; with `keepMax` the row with the largest value
/// in that column wins, otherwise the first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DeduplicatorOptions {
    pub key: Vec<String>,
    #[serde(default)]
    pub keep_max: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SqliteLoaderOptions {
    pub table: String,
    pub file: PathBuf,
    /// `true` replaces an existing table, `false` appends to it.
    #[serde(default = "default_true")]
    pub drop_table: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(yaml: &str) -> Result<BlockDecl, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn parallelism_accepts_auto_and_counts() {
        let r: ResourceConfig = serde_yaml::from_str("parallelism: auto").unwrap();
        assert_eq!(r.parallelism, Parallelism::Auto);
        assert_eq!(r.extract_timeout_seconds, 60);
        let r: ResourceConfig = serde_yaml::from_str("parallelism: 4").unwrap();
        assert_eq!(r.parallelism, Parallelism::Manual(4));
        assert!(serde_yaml::from_str::<ResourceConfig>("parallelism: lots").is_err());
    }

    #[test]
    fn csv_block_parses_options() {
        let decl = block("name: StopsCsv\ntype: CSVInterpreter\ndelimiter: ';'\nenclosing: '\"'\n")
            .unwrap();
        assert_eq!(decl.name, "StopsCsv");
        let BlockKind::CsvInterpreter(opts) = decl.kind else {
            panic!("expected CSVInterpreter");
        };
        assert_eq!(opts.delimiter, AsciiChar(b';'));
        assert_eq!(opts.enclosing, Some(AsciiChar(b'"')));
        assert_eq!(opts.enclosing_escape, None);
    }

    #[test]
    fn extractor_alias_maps_to_http_extractor() {
        let decl = block("name: E\ntype: Extractor\nurl: https://example.com/a.csv\n").unwrap();
        assert_eq!(decl.kind.type_name(), "HttpExtractor");
        assert_eq!(decl.kind.input_type(), IoType::None);
        assert_eq!(decl.kind.output_type(), IoType::File);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = block("name: P\ntype: SheetPicker\nsheetName: Data\ncolour: red\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("colour"), "got: {err}");
        assert!(err.contains("block 'P'"), "got: {err}");
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let err = block("name: X\ntype: PdfInterpreter\n").unwrap_err().to_string();
        assert!(err.contains("unknown block type 'PdfInterpreter'"), "got: {err}");
    }

    #[test]
    fn multi_char_delimiter_is_rejected() {
        assert!(block("name: C\ntype: CSVInterpreter\ndelimiter: ';;'\n").is_err());
    }

    #[test]
    fn table_columns_accept_both_forms() {
        let decl = block(
            "name: T\ntype: TableInterpreter\ncolumns:\n  - stop_id: integer\n  - { name: zone, type: Zone }\n",
        )
        .unwrap();
        let BlockKind::TableInterpreter(opts) = decl.kind else {
            panic!("expected TableInterpreter");
        };
        assert!(opts.header);
        assert_eq!(
            opts.columns,
            vec![
                ColumnDecl {
                    name: "stop_id".into(),
                    value_type: "integer".into()
                },
                ColumnDecl {
                    name: "zone".into(),
                    value_type: "Zone".into()
                },
            ]
        );
    }

    #[test]
    fn loader_defaults_to_drop_table() {
        let decl = block("name: L\ntype: SQLiteLoader\ntable: stops\nfile: ./gtfs.sqlite\n").unwrap();
        let BlockKind::SqliteLoader(opts) = decl.kind else {
            panic!("expected SQLiteLoader");
        };
        assert!(opts.drop_table);
        assert_eq!(opts.file, PathBuf::from("./gtfs.sqlite"));
    }

    #[test]
    fn sheet_picker_name_is_optional() {
        let decl = block("name: P\ntype: SheetPicker\n").unwrap();
        assert_eq!(
            decl.kind,
            BlockKind::SheetPicker(SheetPickerOptions { sheet_name: None })
        );
    }

    #[test]
    fn row_filter_takes_exactly_one_predicate() {
        let decl = block(
            "name: F\ntype: RowFilter\ncolumn: received_date\n\
             dateRange: { from: 2023-04-01, to: '2023-06-30' }\n",
        )
        .unwrap();
        let BlockKind::RowFilter(ref opts) = decl.kind else {
            panic!("expected RowFilter");
        };
        assert_eq!(
            opts.predicate,
            RowPredicate::DateRange(DateRangeDecl {
                from: NaiveDate::from_ymd_opt(2023, 4, 1),
                to: NaiveDate::from_ymd_opt(2023, 6, 30),
            })
        );
        assert!(!opts.ignore_case);
        assert_eq!(decl.kind.input_type(), IoType::Table);

        let err = block("name: F\ntype: RowFilter\ncolumn: a\ncontains: x\nequals: y\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("exactly one"), "got: {err}");
        assert!(block("name: F\ntype: RowFilter\ncolumn: a\n").is_err());
    }

    #[test]
    fn calculator_operands() {
        let decl = block(
            "name: C\ntype: ColumnCalculator\ncolumn: annual_wage\nleft: wage\n\
             operator: multiply\nright: { lookup: unit, factors: { hour: 2080, year: 1 }, default: 1 }\n",
        )
        .unwrap();
        let BlockKind::ColumnCalculator(opts) = decl.kind else {
            panic!("expected ColumnCalculator");
        };
        assert_eq!(opts.operator, Operator::Multiply);
        let Operand::Lookup(lookup) = opts.right else {
            panic!("expected lookup operand");
        };
        assert_eq!(lookup.factors.get("hour"), Some(&2080.0));
        assert_eq!(lookup.default, Some(1.0));

        let right: Operand = serde_yaml::from_str("{ column: avg_local_wage }").unwrap();
        assert_eq!(right, Operand::Column("avg_local_wage".into()));
        assert!(serde_yaml::from_str::<Operand>("{ column: a, value: 2 }").is_err());
        assert!(serde_yaml::from_str::<Operand>("{ value: 2, factors: { a: 1 } }").is_err());
    }

    #[test]
    fn constraint_requires_exactly_one_rule() {
        let c: ConstraintDecl =
            serde_yaml::from_str("name: Zone\nequals: 1925\n").unwrap();
        assert_eq!(c.rule, ConstraintRule::Equals(Value::Integer(1925)));

        let err = serde_yaml::from_str::<ConstraintDecl>("name: Both\nequals: 1\nregex: x\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("exactly one"), "got: {err}");
        assert!(serde_yaml::from_str::<ConstraintDecl>("name: None\n").is_err());
    }

    #[test]
    fn range_defaults_to_inclusive_bounds() {
        let c: ConstraintDecl =
            serde_yaml::from_str("name: R\nrange: { lowerBound: 0, upperBound: 10 }\n").unwrap();
        let ConstraintRule::Range(r) = c.rule else {
            panic!("expected range");
        };
        assert!(r.lower_bound_inclusive && r.upper_bound_inclusive);
        assert_eq!(r.lower_bound, Some(0.0));
    }

    #[test]
    fn pipes_accept_arrow_chains_and_lists() {
        let p: PipeDecl = serde_yaml::from_str("\"A -> B -> C\"").unwrap();
        assert_eq!(p.edges().collect::<Vec<_>>(), vec![("A", "B"), ("B", "C")]);
        let p: PipeDecl = serde_yaml::from_str("[A, B]").unwrap();
        assert_eq!(p.edges().collect::<Vec<_>>(), vec![("A", "B")]);
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let mut config: ProjectConfig =
            serde_yaml::from_str("version: \"1.0\"\npipelines: []\n").unwrap();
        config.base_dir = PathBuf::from("/srv/etl");
        assert_eq!(
            config.resolve_path(Path::new("./out/db.sqlite")),
            PathBuf::from("/srv/etl/./out/db.sqlite")
        );
        assert_eq!(
            config.resolve_path(Path::new("/tmp/db.sqlite")),
            PathBuf::from("/tmp/db.sqlite")
        );
    }
}
