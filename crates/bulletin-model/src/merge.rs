use std::collections::BTreeMap;

use thiserror::Error;

use crate::{CellRef, Range};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("merged range {0} must span more than one cell")]
    SingleCell(Range),
    #[error("merged range {new} overlaps existing merged range {existing}")]
    Overlap { new: Range, existing: Range },
}

/// Merged-cell regions of one worksheet, indexed by their anchor (top-left) cell.
///
/// Regions never overlap. Iteration is row-major by anchor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedRegions {
    by_anchor: BTreeMap<CellRef, Range>,
}

impl MergedRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_anchor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_anchor.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Range> + '_ {
        self.by_anchor.values().copied()
    }

    /// Register a merge. Fails if it is a single cell or overlaps an existing merge.
    pub fn add(&mut self, range: Range) -> Result<(), MergeError> {
        if range.is_single_cell() {
            return Err(MergeError::SingleCell(range));
        }
        if let Some(existing) = self.intersecting(range).next() {
            return Err(MergeError::Overlap {
                new: range,
                existing,
            });
        }
        self.by_anchor.insert(range.start, range);
        Ok(())
    }

    /// Drop the merge whose anchor is `anchor`, returning it.
    pub fn remove_anchored_at(&mut self, anchor: CellRef) -> Option<Range> {
        self.by_anchor.remove(&anchor)
    }

    /// The merge anchored exactly at `cell`, if any.
    pub fn anchored_at(&self, cell: CellRef) -> Option<Range> {
        self.by_anchor.get(&cell).copied()
    }

    /// The merge covering `cell`, if any.
    pub fn containing(&self, cell: CellRef) -> Option<Range> {
        // Anchors after `cell` in row-major order cannot cover it.
        self.by_anchor
            .range(..=cell)
            .map(|(_, r)| *r)
            .find(|r| r.contains(cell))
    }

    /// All merges sharing at least one cell with `range`.
    pub fn intersecting(&self, range: Range) -> impl Iterator<Item = Range> + '_ {
        self.by_anchor
            .range(..=range.end)
            .map(|(_, r)| *r)
            .filter(move |r| r.intersects(&range))
    }

    /// Re-key merges after `count` rows were inserted before row `at`.
    ///
    /// Merges starting at or below `at` move down; merges straddling `at` grow.
    pub fn shift_rows_for_insert(&mut self, at: u32, count: u32) {
        if count == 0 {
            return;
        }
        let old = std::mem::take(&mut self.by_anchor);
        for (_, range) in old {
            let shifted = if range.start.row >= at {
                Range::new(
                    CellRef::new(range.start.row + count, range.start.col),
                    CellRef::new(range.end.row + count, range.end.col),
                )
            } else if range.end.row >= at {
                Range::new(
                    range.start,
                    CellRef::new(range.end.row + count, range.end.col),
                )
            } else {
                range
            };
            self.by_anchor.insert(shifted.start, shifted);
        }
    }
}
