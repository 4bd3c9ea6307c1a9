use serde::{Deserialize, Serialize};

use crate::formula_rewrite::insert_rows_in_range;
use crate::{Cell, CellRef, CellValue, MergedRegions, Range};

static EMPTY_VALUE: CellValue = CellValue::Empty;

/// Per-row formatting carried through row insertion and replication.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowProperties {
    /// Row height in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub custom_height: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Row-level cell format record (`<row s=".." customFormat="1">`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xf: Option<u32>,
    #[serde(default)]
    pub outline_level: u8,
}

impl RowProperties {
    pub fn is_default(&self) -> bool {
        *self == RowProperties::default()
    }
}

/// One [`Worksheet::insert_rows`] call, in the row numbering the sheet had at the time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowInsertion {
    pub at: u32,
    pub count: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Row {
    cells: Vec<Option<Cell>>,
    props: RowProperties,
}

impl Row {
    fn is_blank(&self) -> bool {
        self.props.is_default() && self.cells.iter().all(Option::is_none)
    }
}

/// A worksheet's cell grid.
///
/// Cells live in a row arena (`rows[row].cells[col]`) so that inserting rows is a single
/// splice instead of re-keying every cell below the insertion point.
#[derive(Clone, Debug, PartialEq)]
pub struct Worksheet {
    pub name: String,
    rows: Vec<Row>,
    merges: MergedRegions,
    row_insertions: Vec<RowInsertion>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            merges: MergedRegions::new(),
            row_insertions: Vec::new(),
        }
    }

    /// Number of row slots in the arena (last used row + 1, or more).
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Highest column holding a cell in `row`.
    pub fn max_col_in_row(&self, row: u32) -> Option<u32> {
        let row = self.rows.get(row as usize)?;
        row.cells.iter().rposition(Option::is_some).map(|c| c as u32)
    }

    /// Bounding box of every stored cell and merge.
    pub fn used_range(&self) -> Option<Range> {
        let mut bounds: Option<Range> = None;
        let mut include = |r: Range| {
            bounds = Some(match bounds {
                None => r,
                Some(b) => Range::new(
                    CellRef::new(b.start.row.min(r.start.row), b.start.col.min(r.start.col)),
                    CellRef::new(b.end.row.max(r.end.row), b.end.col.max(r.end.col)),
                ),
            });
        };
        for (cell_ref, _) in self.iter_cells() {
            include(Range::cell(cell_ref));
        }
        for merge in self.merges.iter() {
            include(merge);
        }
        bounds
    }

    pub fn cell(&self, cell: CellRef) -> Option<&Cell> {
        self.rows
            .get(cell.row as usize)?
            .cells
            .get(cell.col as usize)?
            .as_ref()
    }

    /// Value at `cell`; missing cells read as [`CellValue::Empty`].
    pub fn value(&self, cell: CellRef) -> &CellValue {
        self.cell(cell).map(|c| &c.value).unwrap_or(&EMPTY_VALUE)
    }

    /// Store `value` at `cell`, preserving its style and dropping any formula.
    pub fn set_value(&mut self, cell: CellRef, value: impl Into<CellValue>) {
        let slot = self.slot_mut(cell);
        let style_id = slot.as_ref().map(|c| c.style_id).unwrap_or(0);
        *slot = Some(Cell::new(value.into()).with_style(style_id));
    }

    /// Replace the record at `cell`. Truly empty cells are not stored.
    pub fn set_cell(&mut self, cell: CellRef, record: Cell) {
        if record.is_truly_empty() {
            self.take_cell(cell);
            return;
        }
        *self.slot_mut(cell) = Some(record);
    }

    /// Remove the record at `cell`, returning it.
    pub fn take_cell(&mut self, cell: CellRef) -> Option<Cell> {
        self.rows
            .get_mut(cell.row as usize)?
            .cells
            .get_mut(cell.col as usize)?
            .take()
    }

    fn slot_mut(&mut self, cell: CellRef) -> &mut Option<Cell> {
        let row = cell.row as usize;
        let col = cell.col as usize;
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Row::default);
        }
        let cells = &mut self.rows[row].cells;
        if cells.len() <= col {
            cells.resize_with(col + 1, || None);
        }
        &mut cells[col]
    }

    /// Stored cells in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.cells.iter().enumerate().filter_map(move |(c, cell)| {
                cell.as_ref()
                    .map(|cell| (CellRef::new(r as u32, c as u32), cell))
            })
        })
    }

    /// Stored cells of one row, left to right.
    pub fn iter_row(&self, row: u32) -> impl Iterator<Item = (CellRef, &Cell)> + '_ {
        self.rows
            .get(row as usize)
            .into_iter()
            .flat_map(move |r| {
                r.cells.iter().enumerate().filter_map(move |(c, cell)| {
                    cell.as_ref().map(|cell| (CellRef::new(row, c as u32), cell))
                })
            })
    }

    /// Mutable access to every stored cell, row-major.
    pub fn iter_cells_mut(&mut self) -> impl Iterator<Item = (CellRef, &mut Cell)> + '_ {
        self.rows.iter_mut().enumerate().flat_map(|(r, row)| {
            row.cells.iter_mut().enumerate().filter_map(move |(c, cell)| {
                cell.as_mut()
                    .map(|cell| (CellRef::new(r as u32, c as u32), cell))
            })
        })
    }

    pub fn row_properties(&self, row: u32) -> Option<&RowProperties> {
        self.rows.get(row as usize).map(|r| &r.props)
    }

    pub fn set_row_properties(&mut self, row: u32, props: RowProperties) {
        let row = row as usize;
        if self.rows.len() <= row {
            if props.is_default() {
                return;
            }
            self.rows.resize_with(row + 1, Row::default);
        }
        self.rows[row].props = props;
    }

    /// Rows with stored cells or non-default properties, in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (u32, &RowProperties)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_blank())
            .map(|(r, row)| (r as u32, &row.props))
    }

    pub fn merges(&self) -> &MergedRegions {
        &self.merges
    }

    pub fn merges_mut(&mut self) -> &mut MergedRegions {
        &mut self.merges
    }

    /// Row insertions applied so far, oldest first.
    ///
    /// The `.xlsx` writer replays these on parts it does not load (conditional formats, data
    /// validations, hyperlinks, defined names).
    pub fn row_insertions(&self) -> &[RowInsertion] {
        &self.row_insertions
    }

    /// Insert `count` blank rows before row `at`.
    ///
    /// Cells, row properties, merges and array-formula ranges at or below `at` move down;
    /// ranges straddling `at` grow. Formula text is not touched here; see
    /// [`crate::Workbook::insert_rows`].
    pub fn insert_rows(&mut self, at: u32, count: u32) {
        if count == 0 {
            return;
        }
        let at_idx = at as usize;
        if at_idx < self.rows.len() {
            self.rows
                .splice(at_idx..at_idx, (0..count).map(|_| Row::default()));
        }
        self.merges.shift_rows_for_insert(at, count);
        for (_, cell) in self.iter_cells_mut() {
            if let Some(range) = cell.array_range {
                cell.array_range = insert_rows_in_range(range, at, count);
            }
        }
        self.row_insertions.push(RowInsertion { at, count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_value_keeps_style() {
        let mut sheet = Worksheet::new("S");
        let a1 = CellRef::new(0, 0);
        sheet.set_cell(a1, Cell::new("x".into()).with_style(4).with_formula("B1"));
        sheet.set_value(a1, 2.5);
        let cell = sheet.cell(a1).unwrap();
        assert_eq!(cell.style_id, 4);
        assert_eq!(cell.value, CellValue::Number(2.5));
        assert!(cell.formula.is_none());
    }

    #[test]
    fn truly_empty_cells_are_not_stored() {
        let mut sheet = Worksheet::new("S");
        sheet.set_cell(CellRef::new(3, 3), Cell::default());
        assert!(sheet.cell(CellRef::new(3, 3)).is_none());
        assert_eq!(sheet.used_range(), None);
    }

    #[test]
    fn insert_rows_shifts_cells_and_properties() {
        let mut sheet = Worksheet::new("S");
        sheet.set_value(CellRef::new(0, 0), "top");
        sheet.set_value(CellRef::new(2, 1), "below");
        sheet.set_row_properties(
            2,
            RowProperties {
                height: Some(30.0),
                custom_height: true,
                ..RowProperties::default()
            },
        );

        sheet.insert_rows(1, 3);

        assert_eq!(sheet.value(CellRef::new(0, 0)), &CellValue::from("top"));
        assert_eq!(sheet.value(CellRef::new(2, 1)), &CellValue::Empty);
        assert_eq!(sheet.value(CellRef::new(5, 1)), &CellValue::from("below"));
        assert_eq!(sheet.row_properties(5).and_then(|p| p.height), Some(30.0));
        assert_eq!(sheet.max_col_in_row(5), Some(1));
        assert_eq!(
            sheet.used_range(),
            Some(Range::from_a1("A1:B6").unwrap())
        );
        assert_eq!(sheet.row_insertions(), &[RowInsertion { at: 1, count: 3 }]);
    }

    #[test]
    fn insert_rows_moves_array_formula_ranges() {
        let mut sheet = Worksheet::new("S");
        let b3 = CellRef::new(2, 1);
        sheet.set_cell(
            b3,
            Cell::new(CellValue::Number(4.0))
                .with_formula("SUM(A3:A4*2)")
                .with_array_range(Range::from_a1("B3:B4").unwrap()),
        );

        sheet.insert_rows(1, 2);

        let moved = sheet.cell(CellRef::new(4, 1)).unwrap();
        assert_eq!(moved.array_range, Some(Range::from_a1("B5:B6").unwrap()));
    }
}
