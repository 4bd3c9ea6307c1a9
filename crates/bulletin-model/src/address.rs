use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::{EXCEL_MAX_COLS, EXCEL_MAX_ROWS};

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **0-indexed**:
/// - `row = 0` is spreadsheet row `1`
/// - `col = 0` is spreadsheet column `A`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Convert to A1 notation (e.g. `A1`, `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// Parse an A1-style reference (e.g. `A1`, `$B$2`). `$` markers are accepted and dropped.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let parts = A1Parts::parse(a1.trim())?;
        Ok(Self::new(parts.row, parts.col))
    }

    /// Displace the reference by a signed delta.
    ///
    /// Returns `None` when the result would leave the grid on either side.
    pub fn offset(self, delta_row: i64, delta_col: i64) -> Option<Self> {
        let row = i64::from(self.row) + delta_row;
        let col = i64::from(self.col) + delta_col;
        if row < 0 || col < 0 || row >= i64::from(EXCEL_MAX_ROWS) || col >= i64::from(EXCEL_MAX_COLS)
        {
            return None;
        }
        Some(Self::new(row as u32, col as u32))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// A1 reference split into its column/row components with their absolute markers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct A1Parts {
    pub col: u32,
    pub col_abs: bool,
    pub row: u32,
    pub row_abs: bool,
}

impl A1Parts {
    pub fn parse(s: &str) -> Result<Self, A1ParseError> {
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }
        let bytes = s.as_bytes();
        let mut idx = 0usize;

        let col_abs = bytes.first() == Some(&b'$');
        if col_abs {
            idx += 1;
        }
        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(A1ParseError::MissingColumn);
        }
        let col = name_to_col(&s[col_start..idx])?;

        let row_abs = bytes.get(idx) == Some(&b'$');
        if row_abs {
            idx += 1;
        }
        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(A1ParseError::MissingRow);
        }
        if idx != bytes.len() {
            return Err(A1ParseError::TrailingCharacters);
        }
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| A1ParseError::InvalidRow)?;
        if row_1_based == 0 || row_1_based > EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            col,
            col_abs,
            row: row_1_based - 1,
            row_abs,
        })
    }
}

impl fmt::Display for A1Parts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col_marker = if self.col_abs { "$" } else { "" };
        let row_marker = if self.row_abs { "$" } else { "" };
        write!(
            f,
            "{col_marker}{}{row_marker}{}",
            col_to_name(self.col),
            self.row + 1
        )
    }
}

/// A rectangular region within a worksheet.
///
/// The range is inclusive and always normalized so that `start` is the top-left corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// Construct a new range, normalizing corners if needed.
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let (start_row, end_row) = if a.row <= b.row { (a.row, b.row) } else { (b.row, a.row) };
        let (start_col, end_col) = if a.col <= b.col { (a.col, b.col) } else { (b.col, a.col) };
        Self {
            start: CellRef::new(start_row, start_col),
            end: CellRef::new(end_row, end_col),
        }
    }

    /// Range covering exactly one cell.
    pub const fn cell(cell: CellRef) -> Self {
        Self { start: cell, end: cell }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    /// Returns true if `other` lies entirely within this range.
    pub const fn contains_range(&self, other: &Range) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    /// Returns true if the two ranges share at least one cell.
    pub const fn intersects(&self, other: &Range) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Same-shaped range anchored at `anchor`, or `None` if it would leave the grid.
    pub fn anchored_at(&self, anchor: CellRef) -> Option<Range> {
        let end = anchor.offset(
            i64::from(self.height()) - 1,
            i64::from(self.width()) - 1,
        )?;
        Some(Range::new(anchor, end))
    }

    /// Parse an A1-style range like `A1:B2` or a single-cell reference like `C3`.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }
        match s.split_once(':') {
            None => Ok(Range::cell(CellRef::from_a1(s)?)),
            Some((a, b)) => Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?)),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

#[derive(Debug, Error)]
pub enum RangeParseError {
    #[error("empty A1 range")]
    Empty,
    #[error("invalid cell reference in range: {0}")]
    Cell(#[from] A1ParseError),
}

/// Column letters for a 0-indexed column (`0 -> "A"`, `27 -> "AB"`).
pub fn col_to_name(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::<u8>::with_capacity(3);
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// 0-indexed column for column letters (case-insensitive), bounded by the grid width.
pub fn name_to_col(s: &str) -> Result<u32, A1ParseError> {
    if s.is_empty() || s.len() > 3 {
        return Err(A1ParseError::InvalidColumn);
    }
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A') + 1;
    }
    if col == 0 || col > EXCEL_MAX_COLS {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col - 1)
}
