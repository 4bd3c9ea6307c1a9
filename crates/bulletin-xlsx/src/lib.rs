//! `.xlsx` load/save for bulletin templates.
//!
//! A template is loaded into a [`bulletin_model::Workbook`] for editing; on save only sheet data,
//! merged ranges, shared strings and appended cell formats are regenerated. Row insertions are
//! replayed on the ranges of conditional formats, data validations, hyperlinks and defined names.
//! Every other part of the package (drawings, print settings, themes, ...) is written back
//! unchanged.

mod document;
pub mod openxml;
mod package;
mod read;
mod recalc;
mod row_shift;
mod shared_strings;
mod styles;
mod write;
mod zip_util;

pub use document::XlsxDocument;
pub use package::{
    XlsxError, XlsxPackage, XlsxPackageLimits, MAX_XLSX_PACKAGE_PART_BYTES,
    MAX_XLSX_PACKAGE_TOTAL_BYTES,
};
pub use shared_strings::SharedStrings;
pub use styles::StylesPart;
