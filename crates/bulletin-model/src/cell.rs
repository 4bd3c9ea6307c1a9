use serde::{Deserialize, Serialize};

use crate::{CellValue, Range};

/// Maximum rows per worksheet (1,048,576).
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;

/// Maximum columns per worksheet (16,384).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A single cell record.
///
/// A cell with no value, no formula and the default style is "truly empty" and is not
/// kept in the worksheet arena.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Literal value, or the cached result of `formula`.
    #[serde(default)]
    pub value: CellValue,

    /// Formula text without the leading `=`, if the cell contains a formula.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// Cells spanned by an array formula (`<f t="array" ref="..">`). Set on the anchor cell only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_range: Option<Range>,

    /// Index into the workbook [`crate::StyleTable`].
    #[serde(default)]
    pub style_id: u32,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        let formula = formula.into();
        let formula = formula.strip_prefix('=').map(str::to_string).unwrap_or(formula);
        self.formula = Some(formula);
        self
    }

    /// Mark the formula as an array formula over `range`.
    pub fn with_array_range(mut self, range: Range) -> Self {
        self.array_range = Some(range);
        self
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn is_truly_empty(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && self.style_id == 0
    }

    /// Text content when the cell holds a plain string literal.
    pub fn text(&self) -> Option<&str> {
        match (&self.value, &self.formula) {
            (CellValue::String(s), None) => Some(s.as_str()),
            _ => None,
        }
    }
}
