//! Tag-driven hydrological bulletins.
//!
//! A template worksheet holds `{{TAG}}` markers: one `{{HEADER.*}}` cell whose value groups the
//! stations, a row of `{{DATA.*}}` cells directly below it that is repeated once per station, and
//! any number of general markers elsewhere. [`ReportGenerator`] validates the template, expands
//! the header and data rows for every group and station, and writes the filled workbook.
//!
//! ```no_run
//! use bulletin_report::{JsonMetricSource, Language, OutputSink, ReportGenerator, ReportKind};
//!
//! # fn main() -> Result<(), bulletin_report::ReportError> {
//! let source = JsonMetricSource::from_path("observations.json")?;
//! let mut generator = ReportGenerator::open("daily.xlsx", ReportKind::Daily)?;
//! generator.validate()?;
//! let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
//! generator.generate(
//!     source.stations(),
//!     date,
//!     Language::Ru,
//!     &source,
//!     OutputSink::Path("bulletin.xlsx".into()),
//! )?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
pub mod copy;
mod error;
mod generator;
mod language;
pub mod marker;
mod registry;
mod scanner;
mod station;
pub mod tag;

pub use catalog::{TagCatalog, TagInfo};
pub use config::{BulletinConfig, PackageLimits};
pub use error::{GridError, RegistryError, ReportError, ResolveError};
pub use generator::{
    fill_workbook, group_stations, GenerationSummary, OutputSink, ReportGenerator, StationGroup,
};
pub use language::{Language, ParseLanguageError};
pub use registry::TagRegistry;
pub use scanner::{scan_and_validate, GeneralTagCells, TagOccurrence, ValidatedTemplate};
pub use station::{JsonMetricSource, Metric, MetricError, MetricSource, RunContext, Station};
pub use tag::{NumericFormatter, ParseReportKindError, ReportKind, Tag, TagArgs, TagKind};
