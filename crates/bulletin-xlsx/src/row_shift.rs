//! Replay row insertions on XML the grid model does not load.
//!
//! Conditional formats, data validations, hyperlinks, auto filters and selections are kept as
//! raw worksheet XML, and defined names as raw workbook XML. Their ranges and formulas are moved
//! here with the same rules the model applies to cell formulas.

use std::borrow::Cow;

use bulletin_model::formula_rewrite::sheet_names_eq;
use bulletin_model::{
    rewrite_formula_for_row_insert, rewrite_sqref_for_row_insert, RowInsertion, Workbook,
};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::shared_strings::escape_text;
use crate::XlsxError;

/// Row insertions of every sheet, oldest first per sheet.
#[derive(Debug, Clone, Default)]
pub(crate) struct RowEdits {
    edits: Vec<(String, RowInsertion)>,
}

impl RowEdits {
    pub(crate) fn from_workbook(workbook: &Workbook) -> Self {
        let edits = workbook
            .sheets
            .iter()
            .flat_map(|sheet| {
                sheet
                    .row_insertions()
                    .iter()
                    .map(|insertion| (sheet.name.clone(), *insertion))
            })
            .collect();
        Self { edits }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Moved range list of `sheet`, or `None` when nothing changed.
    pub(crate) fn sqref(&self, sheet: &str, sqref: &str) -> Option<String> {
        let mut text = Cow::Borrowed(sqref);
        let mut changed = false;
        for (edit_sheet, insertion) in &self.edits {
            if !sheet_names_eq(edit_sheet, sheet) {
                continue;
            }
            let (moved, hit) = rewrite_sqref_for_row_insert(&text, insertion.at, insertion.count);
            if hit {
                text = Cow::Owned(moved);
                changed = true;
            }
        }
        changed.then(|| text.into_owned())
    }

    /// Moved formula evaluated on `ctx_sheet` (empty for workbook scope), or `None`.
    pub(crate) fn formula(&self, ctx_sheet: &str, formula: &str) -> Option<String> {
        let mut text = Cow::Borrowed(formula);
        let mut changed = false;
        for (edit_sheet, insertion) in &self.edits {
            let (moved, hit) = rewrite_formula_for_row_insert(
                &text,
                ctx_sheet,
                edit_sheet,
                insertion.at,
                insertion.count,
            );
            if hit {
                text = Cow::Owned(moved);
                changed = true;
            }
        }
        changed.then(|| text.into_owned())
    }
}

/// Range attributes tied to rows, by element local name.
fn range_attributes(local: &[u8]) -> &'static [&'static [u8]] {
    match local {
        b"conditionalFormatting" | b"dataValidation" | b"protectedRange" | b"ignoredError" => {
            &[b"sqref"]
        }
        b"hyperlink" | b"autoFilter" | b"sortState" | b"sortCondition" => &[b"ref"],
        b"selection" => &[b"sqref", b"activeCell"],
        _ => &[],
    }
}

/// Elements whose text is a formula (`cfRule/formula`, `dataValidation/formula1`, ...).
pub(crate) fn is_formula_element(local: &[u8]) -> bool {
    matches!(local, b"formula" | b"formula1" | b"formula2")
}

/// Copy of `e` with its row-tied range attributes (and a hyperlink's `location`) moved, or
/// `None` when none changed.
pub(crate) fn shift_range_attributes(
    e: &BytesStart<'_>,
    sheet: &str,
    edits: &RowEdits,
) -> Result<Option<BytesStart<'static>>, XlsxError> {
    let local = e.local_name();
    let keys = range_attributes(local.as_ref());
    if keys.is_empty() {
        return Ok(None);
    }
    let is_hyperlink = local.as_ref() == b"hyperlink";
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut patched = BytesStart::new(name);
    let mut changed = false;
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        let moved = if keys.contains(&key) {
            edits.sqref(sheet, &attr.unescape_value()?)
        } else if is_hyperlink && key == b"location" {
            edits
                .formula(sheet, &attr.unescape_value()?)
                .map(|location| escape_text(&location))
        } else {
            None
        };
        match moved {
            Some(value) => {
                patched.push_attribute((key, value.as_bytes()));
                changed = true;
            }
            None => patched.push_attribute((key, attr.value.as_ref())),
        }
    }
    Ok(changed.then_some(patched))
}

/// Formula text event rewritten for `ctx_sheet`, or `None` when it does not move.
pub(crate) fn shift_formula_text(
    text: &BytesText<'_>,
    ctx_sheet: &str,
    edits: &RowEdits,
) -> Result<Option<BytesText<'static>>, XlsxError> {
    let formula = text.unescape()?;
    Ok(edits
        .formula(ctx_sheet, &formula)
        .map(|moved| BytesText::from_escaped(escape_text(&moved))))
}

/// Move the formulas of every `<definedName>` in workbook XML.
///
/// Defined names are always sheet-qualified, so they are evaluated without a context sheet.
pub(crate) fn shift_defined_names(workbook_xml: &[u8], edits: &RowEdits) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len()));
    let mut buf = Vec::new();
    let mut in_defined_name = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if e.local_name().as_ref() == b"definedName" => {
                in_defined_name = true;
                writer.write_event(event.borrow())?;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"definedName" => {
                in_defined_name = false;
                writer.write_event(event.borrow())?;
            }
            Event::Text(ref t) if in_defined_name => match shift_formula_text(t, "", edits)? {
                Some(moved) => writer.write_event(Event::Text(moved))?,
                None => writer.write_event(event.borrow())?,
            },
            _ => writer.write_event(event.borrow())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulletin_model::CellRef;
    use pretty_assertions::assert_eq;

    fn edits() -> RowEdits {
        let mut workbook = Workbook::new();
        let report = workbook.add_sheet("Report");
        workbook.add_sheet("Notes");
        workbook.sheets[report].set_value(CellRef::new(0, 0), "x");
        workbook.insert_rows(report, 4, 3);
        RowEdits::from_workbook(&workbook)
    }

    #[test]
    fn only_the_edited_sheet_moves_its_ranges() {
        let edits = edits();
        assert_eq!(edits.sqref("Report", "A5 B2:B6").as_deref(), Some("A8 B2:B9"));
        assert_eq!(edits.sqref("Report", "A1:C4"), None);
        assert_eq!(edits.sqref("Notes", "A5"), None);
    }

    #[test]
    fn defined_names_follow_inserted_rows() {
        let xml = br#"<workbook><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Report!$A$1:$E$7</definedName><definedName name="Other">Notes!$A$9</definedName></definedNames></workbook>"#;
        let out = String::from_utf8(shift_defined_names(xml, &edits()).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<workbook><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Report!$A$1:$E$10</definedName><definedName name="Other">Notes!$A$9</definedName></definedNames></workbook>"#
        );
    }

    #[test]
    fn hyperlink_refs_move_and_other_attributes_stay() {
        let mut reader = Reader::from_reader(&br#"<hyperlink ref="C6" r:id="rId1" display="Site"/>"#[..]);
        let mut buf = Vec::new();
        let Event::Empty(e) = reader.read_event_into(&mut buf).unwrap() else {
            panic!("expected an empty element");
        };
        let patched = shift_range_attributes(&e, "Report", &edits()).unwrap().unwrap();
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Empty(patched)).unwrap();
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            r#"<hyperlink ref="C9" r:id="rId1" display="Site"/>"#
        );
    }
}
