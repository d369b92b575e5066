//! Spreadsheet-style cell references.
//!
//! Grammar accepted in configuration:
//!
//! - `A1` / `cell A1`: one cell
//! - `A1:C5` / `range A1:C5`: inclusive rectangle
//! - `column B` (or bare `B`): a whole column
//! - `row 3` (or bare `3`): a whole row
//!
//! `*` in place of column letters or a row number means "the last one".
//! Rows are 1-based in configuration and 0-based once resolved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One axis position of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    /// 0-based index.
    Index(usize),
    /// The last column or row of the sheet.
    Last,
}

impl Position {
    fn resolve(self, len: usize, axis: &str) -> Result<usize, String> {
        match self {
            Self::Last if len == 0 => Err(format!("sheet has no {axis}s")),
            Self::Last => Ok(len - 1),
            Self::Index(i) if i < len => Ok(i),
            Self::Index(i) => Err(format!(
                "{axis} {} is out of range (sheet has {len} {axis}s)",
                match axis {
                    "column" => column_letters(i),
                    _ => (i + 1).to_string(),
                }
            )),
        }
    }
}

/// A column/row coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub column: Position,
    pub row: Position,
}

/// A reference to a region of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CellReference {
    Cell(Coordinate),
    Range { start: Coordinate, end: Coordinate },
    Column(Position),
    Row(Position),
}

/// A reference resolved against concrete sheet dimensions.
///
/// All bounds are 0-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub first_row: usize,
    pub last_row: usize,
    pub first_column: usize,
    pub last_column: usize,
}

impl CellRange {
    #[must_use]
    pub fn height(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.last_column - self.first_column + 1
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.height() * self.width()
    }
}

impl CellReference {
    /// Resolve against a sheet of `width` columns and `height` rows.
    ///
    /// # Errors
    ///
    /// Returns a description when any coordinate falls outside the sheet or
    /// the range is inverted.
    pub fn resolve(&self, width: usize, height: usize) -> Result<CellRange, String> {
        let (first_column, last_column, first_row, last_row) = match *self {
            Self::Cell(c) => {
                let col = c.column.resolve(width, "column")?;
                let row = c.row.resolve(height, "row")?;
                (col, col, row, row)
            }
            Self::Range { start, end } => (
                start.column.resolve(width, "column")?,
                end.column.resolve(width, "column")?,
                start.row.resolve(height, "row")?,
                end.row.resolve(height, "row")?,
            ),
            Self::Column(p) => {
                let col = p.resolve(width, "column")?;
                let first_row = Position::Index(0).resolve(height, "row")?;
                (col, col, first_row, height - 1)
            }
            Self::Row(p) => {
                let row = p.resolve(height, "row")?;
                let first_column = Position::Index(0).resolve(width, "column")?;
                (first_column, width - 1, row, row)
            }
        };
        if first_column > last_column || first_row > last_row {
            return Err(format!("range {self} is inverted"));
        }
        Ok(CellRange {
            first_row,
            last_row,
            first_column,
            last_column,
        })
    }

    /// Number of cells when the reference does not depend on sheet size.
    #[must_use]
    pub fn static_cell_count(&self) -> Option<usize> {
        match *self {
            Self::Cell(c) => match (c.column, c.row) {
                (Position::Index(_), Position::Index(_)) => Some(1),
                _ => None,
            },
            Self::Range { start, end } => match (start.column, start.row, end.column, end.row) {
                (Position::Index(c0), Position::Index(r0), Position::Index(c1), Position::Index(r1))
                    if c0 <= c1 && r0 <= r1 =>
                {
                    Some((c1 - c0 + 1) * (r1 - r0 + 1))
                }
                _ => None,
            },
            Self::Column(_) | Self::Row(_) => None,
        }
    }
}

/// Convert column letters (`A`, `Z`, `AA`) to a 0-based index.
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut index: usize = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Convert a 0-based column index to letters.
#[must_use]
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        #[allow(clippy::cast_possible_truncation)]
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn parse_column(text: &str) -> Result<Position, String> {
    if text == "*" {
        return Ok(Position::Last);
    }
    column_index(text)
        .map(Position::Index)
        .ok_or_else(|| format!("invalid column '{text}'"))
}

fn parse_row(text: &str) -> Result<Position, String> {
    if text == "*" {
        return Ok(Position::Last);
    }
    match text.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("invalid row '{text}' (rows start at 1)")),
        Ok(n) => Ok(Position::Index(n - 1)),
    }
}

fn parse_coordinate(text: &str) -> Result<Coordinate, String> {
    let split = if text.starts_with('*') {
        1
    } else {
        text.find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(text.len())
    };
    let (column, row) = text.split_at(split);
    if column.is_empty() || row.is_empty() {
        return Err(format!("invalid cell coordinate '{text}'"));
    }
    Ok(Coordinate {
        column: parse_column(column)?,
        row: parse_row(row)?,
    })
}

fn parse_range(text: &str) -> Result<CellReference, String> {
    let (start, end) = text
        .split_once(':')
        .ok_or_else(|| format!("invalid range '{text}', expected START:END"))?;
    Ok(CellReference::Range {
        start: parse_coordinate(start.trim())?,
        end: parse_coordinate(end.trim())?,
    })
}

impl FromStr for CellReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty cell reference".to_string());
        }
        if let Some((keyword, rest)) = s.split_once(char::is_whitespace) {
            let rest = rest.trim();
            return match keyword.to_ascii_lowercase().as_str() {
                "column" => parse_column(rest).map(Self::Column),
                "row" => parse_row(rest).map(Self::Row),
                "cell" => parse_coordinate(rest).map(Self::Cell),
                "range" => parse_range(rest),
                other => Err(format!("unknown cell reference keyword '{other}'")),
            };
        }
        if s.contains(':') {
            parse_range(s)
        } else if s.chars().all(|c| c.is_ascii_alphabetic()) {
            parse_column(s).map(Self::Column)
        } else if s.chars().all(|c| c.is_ascii_digit()) {
            parse_row(s).map(Self::Row)
        } else {
            parse_coordinate(s).map(Self::Cell)
        }
    }
}

impl TryFrom<String> for CellReference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellReference> for String {
    fn from(value: CellReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Position::Last => f.write_str("*")?,
            Position::Index(i) => f.write_str(&column_letters(i))?,
        }
        match self.row {
            Position::Last => f.write_str("*"),
            Position::Index(i) => write!(f, "{}", i + 1),
        }
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(c) => write!(f, "{c}"),
            Self::Range { start, end } => write!(f, "{start}:{end}"),
            Self::Column(Position::Index(i)) => write!(f, "column {}", column_letters(*i)),
            Self::Column(Position::Last) => f.write_str("column *"),
            Self::Row(Position::Index(i)) => write!(f, "row {}", i + 1),
            Self::Row(Position::Last) => f.write_str("row *"),
        }
    }
}
