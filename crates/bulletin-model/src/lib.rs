//! `bulletin-model` holds the in-memory grid a bulletin template is loaded into.
//!
//! It knows nothing about file formats: the `.xlsx` layer fills a [`Workbook`] and writes it
//! back, the report layer edits it.

mod address;
mod cell;
pub mod formula_rewrite;
mod merge;
mod style;
mod value;
mod workbook;
mod worksheet;

pub use address::{col_to_name, name_to_col, A1ParseError, A1Parts, CellRef, Range, RangeParseError};
pub use cell::{Cell, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use formula_rewrite::{
    insert_rows_in_range, rewrite_formula_for_copy_delta, rewrite_formula_for_row_insert,
    rewrite_sqref_for_row_insert,
};
pub use merge::{MergeError, MergedRegions};
pub use style::{Style, StyleTable};
pub use value::CellValue;
pub use workbook::Workbook;
pub use worksheet::{RowInsertion, RowProperties, Worksheet};
