use bulletin_model::{CellRef, MergeError, Range};
use bulletin_xlsx::XlsxError;
use chrono::NaiveDate;
use thiserror::Error;

use crate::marker::TagPosition;
use crate::station::MetricError;
use crate::tag::ReportKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tag {0} is already registered")]
    DuplicateTag(String),
    #[error("unknown tag {0}")]
    UnknownTag(String),
}

/// Failures of the range-copy engine.
///
/// These indicate a template layout the engine cannot expand safely, not bad data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("destination row {row}, column {col} is outside the worksheet")]
    OutOfBounds { row: i64, col: i64 },
    #[error("copied range {range} cuts through merged range {merge}")]
    PartialMergeOverlap { range: Range, merge: Range },
    #[error("copy of {range} to {destination} overlaps its own source")]
    OverlappingCopy { range: Range, destination: Range },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Failure of a single tag resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error("{date} shifted by {days} days is out of range")]
    DateOutOfRange { date: NaiveDate, days: i64 },
    #[error("tag needs a station")]
    MissingStation,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{cell}: unknown tag {tag}")]
    UnknownTag { tag: String, cell: CellRef },
    #[error("{cell}: tag {tag} is not available in {kind} bulletins")]
    TagNotApplicable {
        tag: String,
        kind: ReportKind,
        cell: CellRef,
    },
    #[error("{cell}: tag {tag} cannot be used as a {position} tag")]
    NamespaceMismatch {
        tag: String,
        position: TagPosition,
        cell: CellRef,
    },
    #[error("{second}: second HEADER tag (the first one is in {first})")]
    MultipleHeaderTags { first: CellRef, second: CellRef },
    #[error("template has no HEADER tag")]
    MissingHeaderTag,
    #[error("template has no DATA tag")]
    MissingDataTag,
    #[error("{cell}: DATA tags must all be on row {expected_row}")]
    DataTagsRowMismatch { expected_row: u32, cell: CellRef },
    #[error("{header}: HEADER tag must be on the row directly above the DATA row {data_row}")]
    HeaderDataAdjacency { header: CellRef, data_row: u32 },
    #[error("template must be validated before generating a bulletin")]
    TemplateNotValidated,
    #[error("no stations to report on")]
    NoEntities,
    #[error("worksheet {0:?} not found in template")]
    SheetNotFound(String),
    #[error("resolving {tag} for station {station} on {date}: {source}")]
    Resolve {
        tag: String,
        station: String,
        date: NaiveDate,
        #[source]
        source: ResolveError,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
