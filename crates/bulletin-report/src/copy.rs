//! Cell and range duplication with formula translation and merge relocation.

use bulletin_model::{rewrite_formula_for_copy_delta, Cell, CellRef, Range, Worksheet};

use crate::error::GridError;

/// Copy (or move) the cell at `source` to `(dest_row, dest_col)`.
///
/// Value, style and formula are duplicated; relative references in the formula and an array
/// formula's range shift by the cell's own displacement. An empty source clears the destination. When `source` anchors a
/// merged range, an equally sized merge is registered at the destination; with `move_merged`
/// the source's merge is dropped. With `preserve_original` false the source cell is removed.
///
/// Returns the record written at the destination.
pub fn move_cell(
    sheet: &mut Worksheet,
    source: CellRef,
    dest_row: i64,
    dest_col: i64,
    preserve_original: bool,
    move_merged: bool,
) -> Result<Option<Cell>, GridError> {
    let dest = CellRef::new(0, 0)
        .offset(dest_row, dest_col)
        .ok_or(GridError::OutOfBounds {
            row: dest_row,
            col: dest_col,
        })?;
    let delta_row = dest_row - i64::from(source.row);
    let delta_col = dest_col - i64::from(source.col);

    let written = match sheet.cell(source).cloned() {
        Some(mut cell) => {
            if let Some(formula) = &cell.formula {
                let (translated, _) = rewrite_formula_for_copy_delta(formula, delta_row, delta_col);
                cell.formula = Some(translated);
            }
            if let Some(range) = cell.array_range {
                cell.array_range = range
                    .start
                    .offset(delta_row, delta_col)
                    .and_then(|anchor| range.anchored_at(anchor));
            }
            sheet.set_cell(dest, cell.clone());
            Some(cell)
        }
        None => {
            sheet.take_cell(dest);
            None
        }
    };

    if let Some(merge) = sheet.merges().anchored_at(source) {
        relocate_merge(sheet, merge, dest, move_merged)?;
    }

    if !preserve_original && dest != source {
        sheet.take_cell(source);
    }
    Ok(written)
}

fn relocate_merge(
    sheet: &mut Worksheet,
    merge: Range,
    dest: CellRef,
    move_merged: bool,
) -> Result<(), GridError> {
    let target = merge.anchored_at(dest).ok_or(GridError::OutOfBounds {
        row: i64::from(dest.row) + i64::from(merge.height()) - 1,
        col: i64::from(dest.col) + i64::from(merge.width()) - 1,
    })?;
    if target == merge {
        return Ok(());
    }
    if move_merged {
        sheet.merges_mut().remove_anchored_at(merge.start);
    }
    if let Err(err) = sheet.merges_mut().add(target) {
        if move_merged {
            // Put the source merge back; it cannot conflict with what was there before.
            let _ = sheet.merges_mut().add(merge);
        }
        return Err(err.into());
    }
    Ok(())
}

/// Duplicate the block `top_left..=bottom_right` at every anchor in `anchors`.
///
/// Each destination is a rectangle of the source's shape whose top-left cell is the anchor.
/// The source is left untouched so it can serve every anchor. Merges that straddle the block
/// boundary are rejected up front rather than split.
pub fn copy_range(
    sheet: &mut Worksheet,
    top_left: CellRef,
    bottom_right: CellRef,
    anchors: &[CellRef],
) -> Result<(), GridError> {
    let source = Range::new(top_left, bottom_right);
    if let Some(merge) = sheet
        .merges()
        .intersecting(source)
        .find(|merge| !source.contains_range(merge))
    {
        return Err(GridError::PartialMergeOverlap {
            range: source,
            merge,
        });
    }

    for &anchor in anchors {
        let destination = source.anchored_at(anchor).ok_or(GridError::OutOfBounds {
            row: i64::from(anchor.row) + i64::from(source.height()) - 1,
            col: i64::from(anchor.col) + i64::from(source.width()) - 1,
        })?;
        if destination == source {
            continue;
        }
        if destination.intersects(&source) {
            return Err(GridError::OverlappingCopy {
                range: source,
                destination,
            });
        }

        let mut dest_row = i64::from(anchor.row);
        for src_row in source.start.row..=source.end.row {
            let mut dest_col = i64::from(anchor.col);
            for src_col in source.start.col..=source.end.col {
                move_cell(
                    sheet,
                    CellRef::new(src_row, src_col),
                    dest_row,
                    dest_col,
                    true,
                    false,
                )?;
                dest_col += 1;
            }
            dest_row += 1;
        }
    }
    Ok(())
}

/// Give row `to` the height, visibility and row format of row `from`.
pub fn copy_row_properties(sheet: &mut Worksheet, from: u32, to: u32) {
    let props = sheet.row_properties(from).cloned().unwrap_or_default();
    sheet.set_row_properties(to, props);
}
