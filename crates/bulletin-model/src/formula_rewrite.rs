//! Reference rewriting for formula text.
//!
//! Formulas are scanned token by token: string literals, quoted sheet names, bracketed
//! segments (external workbooks, structured references), error literals and function names are
//! copied through untouched; every A1 cell reference, cell range, whole-row range (`1:3`) and
//! whole-column range (`A:C`) is handed to a rewrite callback.
//!
//! Both entry points return `(new_formula, changed)`. A reference that cannot be represented
//! after rewriting collapses to `#REF!` (its sheet prefix is dropped with it).

use std::fmt;

use crate::address::{col_to_name, name_to_col, A1Parts, CellRef, Range};
use crate::cell::{EXCEL_MAX_COLS, EXCEL_MAX_ROWS};

const REF_ERROR: &str = "#REF!";

/// One row or column coordinate of a reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coord {
    /// 0-indexed row or column.
    pub index: u32,
    pub abs: bool,
}

impl Coord {
    fn translate(self, delta: i64, limit: u32) -> Option<Coord> {
        if self.abs {
            return Some(self);
        }
        let moved = i64::from(self.index) + delta;
        if moved < 0 || moved >= i64::from(limit) {
            return None;
        }
        Some(Coord {
            index: moved as u32,
            abs: false,
        })
    }

    fn insert(self, at: u32, count: u32, limit: u32) -> Option<Coord> {
        if self.index < at {
            return Some(self);
        }
        let moved = self.index.checked_add(count)?;
        (moved < limit).then_some(Coord {
            index: moved,
            abs: self.abs,
        })
    }
}

fn row_coord(parts: &A1Parts) -> Coord {
    Coord {
        index: parts.row,
        abs: parts.row_abs,
    }
}

fn col_coord(parts: &A1Parts) -> Coord {
    Coord {
        index: parts.col,
        abs: parts.col_abs,
    }
}

fn with_coords(row: Coord, col: Coord) -> A1Parts {
    A1Parts {
        col: col.index,
        col_abs: col.abs,
        row: row.index,
        row_abs: row.abs,
    }
}

/// A reference found in formula text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference {
    Cell(A1Parts),
    Area(A1Parts, A1Parts),
    Rows(Coord, Coord),
    Cols(Coord, Coord),
}

impl Reference {
    /// Shift relative parts by a copy displacement; absolute parts stay.
    pub fn translate(self, delta_row: i64, delta_col: i64) -> Option<Reference> {
        let cell = |p: A1Parts| -> Option<A1Parts> {
            Some(with_coords(
                row_coord(&p).translate(delta_row, EXCEL_MAX_ROWS)?,
                col_coord(&p).translate(delta_col, EXCEL_MAX_COLS)?,
            ))
        };
        Some(match self {
            Reference::Cell(p) => Reference::Cell(cell(p)?),
            Reference::Area(a, b) => Reference::Area(cell(a)?, cell(b)?),
            Reference::Rows(a, b) => Reference::Rows(
                a.translate(delta_row, EXCEL_MAX_ROWS)?,
                b.translate(delta_row, EXCEL_MAX_ROWS)?,
            ),
            Reference::Cols(a, b) => Reference::Cols(
                a.translate(delta_col, EXCEL_MAX_COLS)?,
                b.translate(delta_col, EXCEL_MAX_COLS)?,
            ),
        })
    }

    /// Adjust for `count` rows inserted before row `at`. Absolute rows move too.
    pub fn insert_rows(self, at: u32, count: u32) -> Option<Reference> {
        let cell = |p: A1Parts| -> Option<A1Parts> {
            Some(with_coords(
                row_coord(&p).insert(at, count, EXCEL_MAX_ROWS)?,
                col_coord(&p),
            ))
        };
        Some(match self {
            Reference::Cell(p) => Reference::Cell(cell(p)?),
            Reference::Area(a, b) => Reference::Area(cell(a)?, cell(b)?),
            Reference::Rows(a, b) => Reference::Rows(
                a.insert(at, count, EXCEL_MAX_ROWS)?,
                b.insert(at, count, EXCEL_MAX_ROWS)?,
            ),
            Reference::Cols(..) => self,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn marker(abs: bool) -> &'static str {
            if abs {
                "$"
            } else {
                ""
            }
        }
        match self {
            Reference::Cell(p) => write!(f, "{p}"),
            Reference::Area(a, b) => write!(f, "{a}:{b}"),
            Reference::Rows(a, b) => write!(
                f,
                "{}{}:{}{}",
                marker(a.abs),
                a.index + 1,
                marker(b.abs),
                b.index + 1
            ),
            Reference::Cols(a, b) => write!(
                f,
                "{}{}:{}{}",
                marker(a.abs),
                col_to_name(a.index),
                marker(b.abs),
                col_to_name(b.index)
            ),
        }
    }
}

/// Sheet qualifier preceding a reference (`Sheet1!`, `'My Sheet'!`, `[Book.xlsx]Sheet1!`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetPrefix {
    pub name: String,
    /// The reference points into another workbook.
    pub external: bool,
}

/// Rewrite references for a cell copied by `(delta_row, delta_col)`.
pub fn rewrite_formula_for_copy_delta(formula: &str, delta_row: i64, delta_col: i64) -> (String, bool) {
    rewrite_references(formula, |_, reference| {
        reference.translate(delta_row, delta_col)
    })
}

/// Rewrite references after `count` rows were inserted before row `at` of `edit_sheet`.
///
/// `ctx_sheet` is the sheet holding the formula; unqualified references only move when it is
/// the edited sheet. External workbook references never move.
pub fn rewrite_formula_for_row_insert(
    formula: &str,
    ctx_sheet: &str,
    edit_sheet: &str,
    at: u32,
    count: u32,
) -> (String, bool) {
    if count == 0 {
        return (formula.to_string(), false);
    }
    rewrite_references(formula, |sheet, reference| {
        let applies = match sheet {
            None => sheet_names_eq(ctx_sheet, edit_sheet),
            Some(prefix) if prefix.external => false,
            Some(prefix) => sheet_names_eq(&prefix.name, edit_sheet),
        };
        if applies {
            reference.insert_rows(at, count)
        } else {
            Some(reference)
        }
    })
}

/// Move `range` for `count` rows inserted before row `at`.
///
/// A range straddling `at` grows. `None` when the range is pushed off the sheet.
pub fn insert_rows_in_range(range: Range, at: u32, count: u32) -> Option<Range> {
    let parts = |cell: CellRef| A1Parts {
        col: cell.col,
        col_abs: false,
        row: cell.row,
        row_abs: false,
    };
    match Reference::Area(parts(range.start), parts(range.end)).insert_rows(at, count)? {
        Reference::Area(a, b) => Some(Range::new(
            CellRef::new(a.row, a.col),
            CellRef::new(b.row, b.col),
        )),
        _ => None,
    }
}

/// Rewrite a space-separated range list (`sqref="A1 B2:C4"`) after a row insertion.
///
/// Ranges pushed off the sheet are dropped; tokens that are not A1 ranges are kept as is.
pub fn rewrite_sqref_for_row_insert(sqref: &str, at: u32, count: u32) -> (String, bool) {
    let mut changed = false;
    let mut tokens = Vec::new();
    for token in sqref.split_whitespace() {
        let Ok(range) = Range::from_a1(token) else {
            tokens.push(token.to_string());
            continue;
        };
        match insert_rows_in_range(range, at, count) {
            Some(moved) if moved == range => tokens.push(token.to_string()),
            Some(moved) => {
                tokens.push(moved.to_string());
                changed = true;
            }
            None => changed = true,
        }
    }
    if !changed {
        return (sqref.to_string(), false);
    }
    (tokens.join(" "), true)
}

/// Sheet names compare case-insensitively.
pub fn sheet_names_eq(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Walk `formula`, handing every reference to `f`.
///
/// `f` returns the replacement reference, or `None` to turn it into `#REF!`.
pub fn rewrite_references<F>(formula: &str, mut f: F) -> (String, bool)
where
    F: FnMut(Option<&SheetPrefix>, Reference) -> Option<Reference>,
{
    let bytes = formula.as_bytes();
    let mut out = String::with_capacity(formula.len() + 8);
    let mut changed = false;
    // Sheet prefix waiting for its reference, with the output offset where it was written.
    let mut pending: Option<(SheetPrefix, usize)> = None;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'"' {
            let end = skip_quoted(bytes, i);
            out.push_str(&formula[i..end]);
            i = end;
            pending = None;
            continue;
        }

        if let Some((prefix, end)) = parse_sheet_prefix(formula, i) {
            let start = out.len();
            out.push_str(&formula[i..end]);
            pending = Some((prefix, start));
            i = end;
            continue;
        }

        match b {
            b'[' => {
                let end = skip_brackets(bytes, i);
                out.push_str(&formula[i..end]);
                i = end;
            }
            b'\'' => {
                let end = skip_quoted(bytes, i);
                out.push_str(&formula[i..end]);
                i = end;
            }
            b'#' => {
                let end = skip_error_literal(bytes, i);
                out.push_str(&formula[i..end]);
                i = end;
            }
            _ if is_word_byte(b) => {
                let word_end = scan_word(bytes, i);
                let parsed = match bytes.get(word_end) {
                    Some(b'(') => None,
                    _ => parse_reference(formula, i),
                };
                match parsed {
                    Some((reference, end)) => {
                        let prefix = pending.as_ref().map(|(p, _)| p);
                        match f(prefix, reference) {
                            Some(new_ref) if new_ref == reference => {
                                out.push_str(&formula[i..end]);
                            }
                            Some(new_ref) => {
                                out.push_str(&new_ref.to_string());
                                changed = true;
                            }
                            None => {
                                if let Some((_, start)) = pending {
                                    out.truncate(start);
                                }
                                out.push_str(REF_ERROR);
                                changed = true;
                            }
                        }
                        i = end;
                    }
                    None => {
                        out.push_str(&formula[i..word_end]);
                        i = word_end;
                    }
                }
            }
            _ => {
                out.push(char::from(b));
                i += 1;
            }
        }
        pending = None;
    }

    (out, changed)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'$' | b'\\') || b >= 0x80
}

fn scan_word(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_word_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// End (exclusive) of a quoted run starting at `start`; a doubled quote is an escaped quote.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_brackets(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn skip_error_literal(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'/' | b'_')) {
        i += 1;
    }
    if i > start + 1 && matches!(bytes.get(i), Some(b'!') | Some(b'?')) {
        i += 1;
    }
    i
}

fn parse_sheet_prefix(formula: &str, start: usize) -> Option<(SheetPrefix, usize)> {
    let bytes = formula.as_bytes();
    match bytes[start] {
        b'\'' => {
            let end = skip_quoted(bytes, start);
            if bytes.get(end) != Some(&b'!') || end < start + 2 {
                return None;
            }
            let name = formula[start + 1..end - 1].replace("''", "'");
            let external = name.starts_with('[');
            Some((SheetPrefix { name, external }, end + 1))
        }
        b'[' => {
            let book_end = skip_brackets(bytes, start);
            let word_end = scan_word(bytes, book_end);
            if word_end == book_end || bytes.get(word_end) != Some(&b'!') {
                return None;
            }
            Some((
                SheetPrefix {
                    name: formula[book_end..word_end].to_string(),
                    external: true,
                },
                word_end + 1,
            ))
        }
        b if is_word_byte(b) => {
            let word_end = scan_word(bytes, start);
            if bytes.get(word_end) != Some(&b'!') {
                return None;
            }
            Some((
                SheetPrefix {
                    name: formula[start..word_end].to_string(),
                    external: false,
                },
                word_end + 1,
            ))
        }
        _ => None,
    }
}

/// Parse a reference starting at a word boundary, returning it and its end offset.
fn parse_reference(formula: &str, start: usize) -> Option<(Reference, usize)> {
    let bytes = formula.as_bytes();
    let first_end = scan_word(bytes, start);
    let first = &formula[start..first_end];
    if matches!(bytes.get(first_end), Some(b'[') | Some(b'!')) {
        return None;
    }

    if bytes.get(first_end) == Some(&b':') {
        let second_start = first_end + 1;
        let second_end = scan_word(bytes, second_start);
        let after = bytes.get(second_end);
        if second_end > second_start && !matches!(after, Some(b'(') | Some(b'[') | Some(b'!')) {
            let second = &formula[second_start..second_end];
            if let (Ok(a), Ok(b)) = (A1Parts::parse(first), A1Parts::parse(second)) {
                return Some((Reference::Area(a, b), second_end));
            }
            if let (Some(a), Some(b)) = (parse_col_only(first), parse_col_only(second)) {
                return Some((Reference::Cols(a, b), second_end));
            }
            if let (Some(a), Some(b)) = (parse_row_only(first), parse_row_only(second)) {
                return Some((Reference::Rows(a, b), second_end));
            }
        }
    }

    A1Parts::parse(first)
        .ok()
        .map(|parts| (Reference::Cell(parts), first_end))
}

fn split_abs(s: &str) -> (bool, &str) {
    match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

fn parse_col_only(s: &str) -> Option<Coord> {
    let (abs, letters) = split_abs(s);
    if !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let index = name_to_col(letters).ok()?;
    Some(Coord { index, abs })
}

fn parse_row_only(s: &str) -> Option<Coord> {
    let (abs, digits) = split_abs(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row > EXCEL_MAX_ROWS {
        return None;
    }
    Some(Coord {
        index: row - 1,
        abs,
    })
}
