//! Template scanning and structural validation.

use bulletin_model::{CellRef, Worksheet};

use crate::error::{RegistryError, ReportError};
use crate::marker::{find_markers, Namespace, TagPosition};
use crate::registry::TagRegistry;
use crate::tag::{ReportKind, Tag};

/// One marker found in the template.
#[derive(Clone, Debug, PartialEq)]
pub struct TagOccurrence<'r> {
    /// Marker text as written, braces included.
    pub raw: String,
    pub tag: &'r Tag,
    pub cell: CellRef,
}

/// Every cell a general tag appears in.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneralTagCells<'r> {
    pub tag: &'r Tag,
    pub cells: Vec<CellRef>,
}

/// A template that passed [`scan_and_validate`]. The only input report generation accepts.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedTemplate<'r> {
    pub sheet_name: String,
    pub report_kind: ReportKind,
    pub header: TagOccurrence<'r>,
    /// DATA markers in scan order; a cell holding several markers appears once per marker.
    pub data: Vec<TagOccurrence<'r>>,
    /// General tags in first-seen order.
    pub general: Vec<GeneralTagCells<'r>>,
}

impl<'r> ValidatedTemplate<'r> {
    pub fn header_row(&self) -> u32 {
        self.header.cell.row
    }

    pub fn data_row(&self) -> u32 {
        self.header.cell.row + 1
    }

    /// Distinct cells holding DATA markers, left to right.
    pub fn data_cells(&self) -> Vec<CellRef> {
        let mut cells: Vec<CellRef> = self.data.iter().map(|occ| occ.cell).collect();
        cells.sort_by_key(|cell| cell.col);
        cells.dedup();
        cells
    }
}

/// Scan `worksheet` for tag markers and check the template's structure.
///
/// Cells are visited row by row, left to right. Marker-level problems are reported at the first
/// offending cell; structural checks run once the whole sheet has been scanned.
pub fn scan_and_validate<'r>(
    worksheet: &Worksheet,
    registry: &'r TagRegistry,
    kind: ReportKind,
) -> Result<ValidatedTemplate<'r>, ReportError> {
    let mut header: Option<TagOccurrence<'r>> = None;
    let mut data: Vec<TagOccurrence<'r>> = Vec::new();
    let mut general: Vec<GeneralTagCells<'r>> = Vec::new();

    for (cell_ref, cell) in worksheet.iter_cells() {
        let Some(text) = cell.text() else {
            continue;
        };
        for marker in find_markers(text) {
            let tag = registry.lookup(marker.name).map_err(|err| match err {
                RegistryError::UnknownTag(tag) | RegistryError::DuplicateTag(tag) => {
                    ReportError::UnknownTag { tag, cell: cell_ref }
                }
            })?;
            if !registry.classify_for_report_kind(tag, kind) {
                return Err(ReportError::TagNotApplicable {
                    tag: tag.name.to_string(),
                    kind,
                    cell: cell_ref,
                });
            }
            let allowed = match marker.namespace {
                Some(Namespace::Header) => tag.is_header,
                Some(Namespace::Data) => tag.is_data,
                None => tag.is_general(),
            };
            if !allowed {
                return Err(ReportError::NamespaceMismatch {
                    tag: tag.name.to_string(),
                    position: TagPosition(marker.namespace),
                    cell: cell_ref,
                });
            }

            let occurrence = TagOccurrence {
                raw: marker.raw.to_string(),
                tag,
                cell: cell_ref,
            };
            match marker.namespace {
                Some(Namespace::Header) => {
                    if let Some(first) = &header {
                        return Err(ReportError::MultipleHeaderTags {
                            first: first.cell,
                            second: cell_ref,
                        });
                    }
                    header = Some(occurrence);
                }
                Some(Namespace::Data) => data.push(occurrence),
                None => match general.iter_mut().find(|g| g.tag.name == tag.name) {
                    Some(entry) => {
                        if !entry.cells.contains(&cell_ref) {
                            entry.cells.push(cell_ref);
                        }
                    }
                    None => general.push(GeneralTagCells {
                        tag,
                        cells: vec![cell_ref],
                    }),
                },
            }
        }
    }

    let header = header.ok_or(ReportError::MissingHeaderTag)?;
    let first_data = data.first().ok_or(ReportError::MissingDataTag)?;
    let data_row = first_data.cell.row;
    if let Some(stray) = data.iter().find(|occ| occ.cell.row != data_row) {
        return Err(ReportError::DataTagsRowMismatch {
            expected_row: data_row + 1,
            cell: stray.cell,
        });
    }
    if header.cell.row + 1 != data_row {
        return Err(ReportError::HeaderDataAdjacency {
            header: header.cell,
            data_row: data_row + 1,
        });
    }

    log::debug!(
        "validated template {:?}: HEADER {} at {}, {} DATA markers on row {}, {} general tags",
        worksheet.name,
        header.tag.name,
        header.cell,
        data.len(),
        data_row + 1,
        general.len()
    );

    Ok(ValidatedTemplate {
        sheet_name: worksheet.name.clone(),
        report_kind: kind,
        header,
        data,
        general,
    })
}
