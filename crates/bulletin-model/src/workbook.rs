use crate::formula_rewrite::{rewrite_formula_for_row_insert, sheet_names_eq};
use crate::{StyleTable, Worksheet};

/// Sheets plus the shared style table.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
    pub styles: StyleTable,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty sheet and return its index.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> usize {
        self.sheets.push(Worksheet::new(name));
        self.sheets.len() - 1
    }

    /// Case-insensitive lookup by sheet name.
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|sheet| sheet_names_eq(&sheet.name, name))
    }

    pub fn sheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheet_index(name).and_then(|idx| self.sheets.get(idx))
    }

    /// Insert `count` rows before row `at` of sheet `sheet`.
    ///
    /// Besides moving cells and merges on that sheet, formulas in *every* sheet that refer to
    /// the moved rows are rewritten. Returns the number of formulas changed, or `None` for an
    /// unknown sheet index.
    pub fn insert_rows(&mut self, sheet: usize, at: u32, count: u32) -> Option<usize> {
        let edit_sheet = self.sheets.get(sheet)?.name.clone();
        if count == 0 {
            return Some(0);
        }
        self.sheets[sheet].insert_rows(at, count);

        let mut rewritten = 0usize;
        for ws in &mut self.sheets {
            let ctx_sheet = ws.name.clone();
            for (_, cell) in ws.iter_cells_mut() {
                let Some(formula) = cell.formula.as_mut() else {
                    continue;
                };
                let (new_formula, changed) =
                    rewrite_formula_for_row_insert(formula, &ctx_sheet, &edit_sheet, at, count);
                if changed {
                    *formula = new_formula;
                    rewritten += 1;
                }
            }
        }
        Some(rewritten)
    }

    /// Whether any sheet contains a formula cell.
    pub fn has_formulas(&self) -> bool {
        self.sheets
            .iter()
            .any(|ws| ws.iter_cells().any(|(_, cell)| cell.is_formula()))
    }
}
