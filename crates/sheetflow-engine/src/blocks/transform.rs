//! Table-to-table transforms: row filters, column renames, calculated
//! columns and de-duplication.
//!
//! Columns are looked up by name when the block runs, since the upstream
//! table's schema is only known then. A missing column is a schema-binding
//! error; a column of the wrong primitive is a configuration error.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveDateTime};
use sheetflow_types::error::BlockError;
use sheetflow_types::io::{IoType, IoValue};
use sheetflow_types::table::{Column, Table};
use sheetflow_types::value::{Primitive, Value};

use super::{run_blocking, unexpected_input, Block, BlockContext, BlockOutput};
use crate::config::types::{
    ColumnCalculatorOptions, ColumnRenamerOptions, DateRangeDecl, DeduplicatorOptions, Operand,
    Operator, RowFilterOptions, RowPredicate,
};
use crate::result::BlockStats;
use crate::valuetype::constraint::within;

/// A transformed table and its counters.
#[derive(Debug)]
pub struct Transformed {
    pub table: Table,
    pub stats: BlockStats,
}

impl Transformed {
    fn counted(input: &Table, table: Table) -> Self {
        let stats = BlockStats {
            rows_in: Some(input.row_count() as u64),
            rows_out: Some(table.row_count() as u64),
            ..BlockStats::default()
        };
        Self { table, stats }
    }
}

fn column_index(table: &Table, name: &str) -> Result<usize, BlockError> {
    table.column_index(name).ok_or_else(|| {
        let available: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        BlockError::schema_binding("COLUMN_NOT_FOUND", format!("table has no column '{name}'"))
            .with_details(serde_json::json!({ "column": name, "available": available }))
    })
}

fn numeric_column(table: &Table, name: &str) -> Result<usize, BlockError> {
    let index = column_index(table, name)?;
    let primitive = table.columns()[index].primitive;
    if primitive.is_numeric() {
        Ok(index)
    } else {
        Err(BlockError::config(
            "COLUMN_TYPE_MISMATCH",
            format!("column '{name}' is {primitive}, expected a number"),
        ))
    }
}

/// Run `apply` on the blocking pool against the table input and log the
/// row counts.
async fn run_transform<F>(
    input: Arc<IoValue>,
    ctx: &BlockContext,
    apply: F,
) -> Result<BlockOutput, BlockError>
where
    F: FnOnce(&Table) -> Result<Transformed, BlockError> + Send + 'static,
{
    if !matches!(input.as_ref(), IoValue::Table(_)) {
        return Err(unexpected_input(IoType::Table, &input));
    }
    let transformed = run_blocking(move || match input.as_ref() {
        IoValue::Table(table) => apply(table),
        other => Err(unexpected_input(IoType::Table, other)),
    })
    .await?;
    tracing::debug!(
        pipeline = %ctx.pipeline,
        block = %ctx.block,
        rows_in = transformed.stats.rows_in,
        rows_out = transformed.stats.rows_out,
        rows_dropped = transformed.stats.rows_dropped,
        "Table transformed"
    );
    Ok(BlockOutput::new(IoValue::Table(transformed.table)).with_stats(transformed.stats))
}

// ---------------------------------------------------------------------------
// RowFilter
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Spreadsheet serial day numbers count from 1899-12-30.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Calendar date of a cell; `None` when it is not a recognisable date.
fn cell_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Text(text) => {
            let text = text.trim();
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .or_else(|| {
                    DATETIME_FORMATS
                        .iter()
                        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                        .map(|dt| dt.date())
                })
        }
        Value::Integer(_) | Value::Decimal(_) => value.as_f64().and_then(serial_date),
        Value::Boolean(_) => None,
    }
}

fn fold(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Keeps the rows whose column satisfies a predicate.
#[derive(Debug, Clone)]
pub struct RowFilter {
    column: String,
    predicate: RowPredicate,
    ignore_case: bool,
}

impl RowFilter {
    /// # Errors
    ///
    /// Returns a description of an empty column name, empty search text or
    /// inverted bounds.
    pub fn new(options: &RowFilterOptions) -> Result<Self, String> {
        if options.column.trim().is_empty() {
            return Err("column must not be empty".to_string());
        }
        let predicate = match &options.predicate {
            RowPredicate::Contains(needle) if needle.is_empty() => {
                return Err("contains must not be empty".to_string());
            }
            RowPredicate::Contains(needle) if options.ignore_case => {
                RowPredicate::Contains(fold(needle))
            }
            RowPredicate::Range(r) => {
                if r.lower_bound.is_none() && r.upper_bound.is_none() {
                    return Err("range needs lowerBound or upperBound".to_string());
                }
                if let (Some(lo), Some(hi)) = (r.lower_bound, r.upper_bound) {
                    if lo > hi {
                        return Err(format!("range [{lo}, {hi}] admits no value"));
                    }
                }
                RowPredicate::Range(*r)
            }
            RowPredicate::DateRange(DateRangeDecl { from, to }) => match (from, to) {
                (None, None) => return Err("dateRange needs from or to".to_string()),
                (Some(from), Some(to)) if from > to => {
                    return Err(format!("dateRange {from}..{to} admits no date"));
                }
                _ => options.predicate.clone(),
            },
            other => other.clone(),
        };
        Ok(Self {
            column: options.column.clone(),
            predicate,
            ignore_case: options.ignore_case,
        })
    }

    fn check_column(&self, primitive: Primitive) -> Result<(), BlockError> {
        let fits = match &self.predicate {
            RowPredicate::Contains(_) => primitive == Primitive::Text,
            RowPredicate::Equals(v) => {
                v.primitive() == primitive || (v.primitive().is_numeric() && primitive.is_numeric())
            }
            RowPredicate::Range(_) => primitive.is_numeric(),
            RowPredicate::DateRange(_) => primitive != Primitive::Boolean,
        };
        if fits {
            Ok(())
        } else {
            Err(BlockError::config(
                "COLUMN_TYPE_MISMATCH",
                format!(
                    "{} filter cannot apply to {primitive} column '{}'",
                    self.predicate.kind(),
                    self.column
                ),
            ))
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (&self.predicate, value) {
            (RowPredicate::Contains(needle), Value::Text(text)) if self.ignore_case => {
                text.to_lowercase().contains(needle.as_str())
            }
            (RowPredicate::Contains(needle), Value::Text(text)) => text.contains(needle.as_str()),
            (RowPredicate::Equals(Value::Text(expected)), Value::Text(text)) if self.ignore_case => {
                fold(text) == fold(expected)
            }
            (RowPredicate::Equals(expected), _) => value.typed_eq(expected),
            (RowPredicate::Range(range), _) => value.as_f64().is_some_and(|v| within(range, v)),
            (RowPredicate::DateRange(DateRangeDecl { from, to }), _) => {
                cell_date(value).is_some_and(|date| {
                    from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
                })
            }
            (RowPredicate::Contains(_), _) => false,
        }
    }

    /// # Errors
    ///
    /// Returns an error when the column is missing or cannot be compared
    /// with this predicate.
    pub fn apply(&self, table: &Table) -> Result<Transformed, BlockError> {
        let index = column_index(table, &self.column)?;
        self.check_column(table.columns()[index].primitive)?;
        let mut filtered = table.clone();
        filtered.retain_rows(|row| self.matches(&row[index]));
        Ok(Transformed::counted(table, filtered))
    }
}

#[async_trait]
impl Block for RowFilter {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let this = self.clone();
        run_transform(input, ctx, move |table| this.apply(table)).await
    }
}

// ---------------------------------------------------------------------------
// ColumnRenamer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ColumnRenamer {
    rename: BTreeMap<String, String>,
}

impl ColumnRenamer {
    /// # Errors
    ///
    /// Returns a description of empty, duplicate or chained target names.
    pub fn new(options: &ColumnRenamerOptions) -> Result<Self, String> {
        if options.rename.is_empty() {
            return Err("rename must list at least one column".to_string());
        }
        let mut targets = HashSet::new();
        for (from, to) in &options.rename {
            if to.trim().is_empty() {
                return Err(format!("column '{from}' renamed to an empty name"));
            }
            if !targets.insert(to.as_str()) {
                return Err(format!("more than one column renamed to '{to}'"));
            }
            if from != to && options.rename.contains_key(to) {
                return Err(format!("rename target '{to}' is itself renamed"));
            }
        }
        Ok(Self {
            rename: options.rename.clone(),
        })
    }

    /// # Errors
    ///
    /// Returns a schema-binding error when a source column is missing or a
    /// target name is already taken.
    pub fn apply(&self, table: &Table) -> Result<Transformed, BlockError> {
        let mut renamed = table.clone();
        for (from, to) in &self.rename {
            column_index(table, from)?;
            renamed
                .rename_column(from, to)
                .map_err(|e| BlockError::schema_binding("DUPLICATE_COLUMN", e))?;
        }
        Ok(Transformed::counted(table, renamed))
    }
}

#[async_trait]
impl Block for ColumnRenamer {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let this = self.clone();
        run_transform(input, ctx, move |table| this.apply(table)).await
    }
}

// ---------------------------------------------------------------------------
// ColumnCalculator
// ---------------------------------------------------------------------------

/// Appends a decimal column computed from each row.
///
/// Rows whose result cannot be computed (no lookup factor, division by
/// zero) are dropped and counted like rejected cells.
#[derive(Debug, Clone)]
pub struct ColumnCalculator {
    column: String,
    left: String,
    operator: Operator,
    right: Operand,
}

enum Right {
    Column(usize),
    Value(f64),
    Lookup {
        index: usize,
        factors: HashMap<String, f64>,
        default: Option<f64>,
    },
}

impl ColumnCalculator {
    /// # Errors
    ///
    /// Returns a description of empty names, an empty lookup table or a
    /// constant zero divisor.
    pub fn new(options: &ColumnCalculatorOptions) -> Result<Self, String> {
        if options.column.trim().is_empty() || options.left.trim().is_empty() {
            return Err("column and left must not be empty".to_string());
        }
        let right = match &options.right {
            Operand::Value(v) if options.operator == Operator::Divide && *v == 0.0 => {
                return Err("division by constant zero".to_string());
            }
            Operand::Value(v) if !v.is_finite() => {
                return Err(format!("operand {v} is not a finite number"));
            }
            Operand::Lookup(lookup) if lookup.factors.is_empty() => {
                return Err(format!("lookup on '{}' lists no factors", lookup.column));
            }
            Operand::Lookup(lookup) => {
                let mut lookup = lookup.clone();
                lookup.factors = lookup
                    .factors
                    .into_iter()
                    .map(|(key, factor)| (fold(&key), factor))
                    .collect();
                Operand::Lookup(lookup)
            }
            other => other.clone(),
        };
        Ok(Self {
            column: options.column.clone(),
            left: options.left.clone(),
            operator: options.operator,
            right,
        })
    }

    fn resolve_right(&self, table: &Table) -> Result<Right, BlockError> {
        Ok(match &self.right {
            Operand::Column(name) => Right::Column(numeric_column(table, name)?),
            Operand::Value(v) => Right::Value(*v),
            Operand::Lookup(lookup) => Right::Lookup {
                index: column_index(table, &lookup.column)?,
                factors: lookup
                    .factors
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
                default: lookup.default,
            },
        })
    }

    fn compute(&self, left: f64, right: f64) -> Result<f64, &'static str> {
        let result = match self.operator {
            Operator::Add => left + right,
            Operator::Subtract => left - right,
            Operator::Multiply => left * right,
            Operator::Divide if right == 0.0 => return Err("division by zero"),
            Operator::Divide => left / right,
        };
        if result.is_finite() {
            Ok(result)
        } else {
            Err("result is not a finite number")
        }
    }

    /// # Errors
    ///
    /// Returns an error when an operand column is missing or not numeric.
    pub fn apply(&self, table: &Table) -> Result<Transformed, BlockError> {
        let left = numeric_column(table, &self.left)?;
        let right = self.resolve_right(table)?;

        let mut values = Vec::with_capacity(table.row_count());
        let mut keep = Vec::with_capacity(table.row_count());
        let mut reasons: BTreeMap<String, u64> = BTreeMap::new();
        for row in table.rows() {
            let lhs = row[left].as_f64().unwrap_or(f64::NAN);
            let rhs = match &right {
                Right::Column(index) => Ok(row[*index].as_f64().unwrap_or(f64::NAN)),
                Right::Value(v) => Ok(*v),
                Right::Lookup {
                    index,
                    factors,
                    default,
                } => {
                    let key = fold(&row[*index].to_string());
                    factors
                        .get(&key)
                        .copied()
                        .or(*default)
                        .ok_or_else(|| format!("no factor for '{key}'"))
                }
            };
            match rhs.and_then(|rhs| self.compute(lhs, rhs).map_err(str::to_string)) {
                Ok(value) => {
                    values.push(Value::Decimal(value));
                    keep.push(true);
                }
                Err(reason) => {
                    *reasons.entry(reason).or_default() += 1;
                    keep.push(false);
                }
            }
        }

        let dropped = keep.iter().filter(|k| !**k).count() as u64;
        let mut computed = table.clone();
        let mut flags = keep.into_iter();
        computed.retain_rows(|_| flags.next().unwrap_or(false));
        computed
            .push_column(
                Column::new(&self.column, Primitive::Decimal.as_str(), Primitive::Decimal),
                values,
            )
            .map_err(|e| BlockError::schema_binding("DUPLICATE_COLUMN", e))?;

        let mut transformed = Transformed::counted(table, computed);
        transformed.stats.rows_dropped = dropped;
        if !reasons.is_empty() {
            transformed.stats.rejections.insert(self.column.clone(), reasons);
        }
        Ok(transformed)
    }
}

#[async_trait]
impl Block for ColumnCalculator {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let this = self.clone();
        let output = run_transform(input, ctx, move |table| this.apply(table)).await?;
        if output.stats.rows_dropped > 0 {
            tracing::warn!(
                pipeline = %ctx.pipeline,
                block = %ctx.block,
                column = self.column.as_str(),
                rows_dropped = output.stats.rows_dropped,
                "Dropped rows whose value could not be calculated"
            );
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Deduplicator
// ---------------------------------------------------------------------------

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Keeps one row per key, in first-seen order.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    key: Vec<String>,
    keep_max: Option<String>,
}

impl Deduplicator {
    /// # Errors
    ///
    /// Returns a description of an empty or repeated key column list.
    pub fn new(options: &DeduplicatorOptions) -> Result<Self, String> {
        if options.key.is_empty() {
            return Err("key must list at least one column".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = options.key.iter().find(|k| !seen.insert(k.as_str())) {
            return Err(format!("key column '{repeated}' listed twice"));
        }
        Ok(Self {
            key: options.key.clone(),
            keep_max: options.keep_max.clone(),
        })
    }

    /// # Errors
    ///
    /// Returns a schema-binding error when a key or `keepMax` column is
    /// missing.
    pub fn apply(&self, table: &Table) -> Result<Transformed, BlockError> {
        let keys = self
            .key
            .iter()
            .map(|name| column_index(table, name))
            .collect::<Result<Vec<_>, _>>()?;
        let rank = self
            .keep_max
            .as_deref()
            .map(|name| column_index(table, name))
            .transpose()?;

        let rows = table.rows();
        let mut winners: HashMap<Vec<String>, usize> = HashMap::new();
        for (position, row) in rows.iter().enumerate() {
            let key = keys.iter().map(|&k| row[k].to_string()).collect();
            match winners.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(position);
                }
                Entry::Occupied(mut slot) => {
                    let Some(rank) = rank else { continue };
                    let current = &rows[*slot.get()][rank];
                    if compare(&row[rank], current) == Some(Ordering::Greater) {
                        slot.insert(position);
                    }
                }
            }
        }

        let kept: HashSet<usize> = winners.into_values().collect();
        let mut deduplicated = table.clone();
        let mut position = 0;
        deduplicated.retain_rows(|_| {
            let keep = kept.contains(&position);
            position += 1;
            keep
        });
        Ok(Transformed::counted(table, deduplicated))
    }
}

#[async_trait]
impl Block for Deduplicator {
    async fn execute(
        &self,
        input: Arc<IoValue>,
        ctx: &BlockContext,
    ) -> Result<BlockOutput, BlockError> {
        let this = self.clone();
        run_transform(input, ctx, move |table| this.apply(table)).await
    }
}
