//! [`Worksheet`] -> worksheet XML.
//!
//! Only `<sheetData>`, `<mergeCells>` and `<dimension>` are regenerated. Everything else in the
//! template's worksheet part (column widths, views, print setup, drawings, ...) is streamed
//! through, with row-tied ranges moved by [`crate::row_shift`].

use std::fmt::Write as _;

use bulletin_model::{CellValue, Range, StyleTable, Worksheet};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::row_shift::{is_formula_element, shift_formula_text, shift_range_attributes, RowEdits};
use crate::shared_strings::{escape_text, needs_space_preserve, SharedStrings};
use crate::styles::StylesPart;
use crate::XlsxError;

fn insert_before_tag(name: &[u8]) -> bool {
    matches!(
        name,
        // Elements that come after <mergeCells> in the SpreadsheetML schema.
        b"phoneticPr"
            | b"conditionalFormatting"
            | b"dataValidations"
            | b"hyperlinks"
            | b"printOptions"
            | b"pageMargins"
            | b"pageSetup"
            | b"headerFooter"
            | b"rowBreaks"
            | b"colBreaks"
            | b"customProperties"
            | b"cellWatches"
            | b"ignoredErrors"
            | b"smartTags"
            | b"drawing"
            | b"legacyDrawing"
            | b"drawingHF"
            | b"picture"
            | b"oleObjects"
            | b"controls"
            | b"webPublishItems"
            | b"tableParts"
            | b"extLst"
    )
}

/// Namespace prefix of the root `<worksheet>` element (`Some("x")` for `<x:worksheet>`).
pub(crate) fn worksheet_prefix(xml: &[u8]) -> Result<Option<String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                let name = name.as_ref();
                return Ok(name
                    .iter()
                    .position(|b| *b == b':')
                    .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn prefixed_tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

/// Counters accumulated while rendering, used to fill `<sst count>`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RenderStats {
    pub(crate) shared_string_refs: usize,
}

/// Render the `<sheetData>` element for `sheet`.
///
/// String values become shared-string references (interned into `shared_strings`); styles are
/// resolved to cell format indices through `styles_part`.
pub(crate) fn render_sheet_data(
    sheet: &Worksheet,
    prefix: Option<&str>,
    style_table: &StyleTable,
    styles_part: &mut StylesPart,
    shared_strings: &mut SharedStrings,
    stats: &mut RenderStats,
) -> String {
    let sheet_data_tag = prefixed_tag(prefix, "sheetData");
    let row_tag = prefixed_tag(prefix, "row");
    let c_tag = prefixed_tag(prefix, "c");
    let f_tag = prefixed_tag(prefix, "f");
    let v_tag = prefixed_tag(prefix, "v");

    let mut out = String::new();
    let mut any_row = false;

    for (row, props) in sheet.iter_rows() {
        if !any_row {
            let _ = write!(out, "<{sheet_data_tag}>");
            any_row = true;
        }
        let _ = write!(out, r#"<{row_tag} r="{}""#, row + 1);
        if let Some(xf) = props.xf {
            let _ = write!(out, r#" s="{xf}" customFormat="1""#);
        }
        if let Some(height) = props.height {
            let _ = write!(out, r#" ht="{height}""#);
        }
        if props.custom_height {
            out.push_str(r#" customHeight="1""#);
        }
        if props.hidden {
            out.push_str(r#" hidden="1""#);
        }
        if props.outline_level > 0 {
            let _ = write!(out, r#" outlineLevel="{}""#, props.outline_level);
        }

        let mut cells = sheet.iter_row(row).peekable();
        if cells.peek().is_none() {
            out.push_str("/>");
            continue;
        }
        out.push('>');

        for (cell_ref, cell) in cells {
            let _ = write!(out, r#"<{c_tag} r="{cell_ref}""#);

            let style = style_table.get(cell.style_id).cloned().unwrap_or_default();
            let xf = styles_part.xf_index_for_style(&style);
            if xf != 0 {
                let _ = write!(out, r#" s="{xf}""#);
            }

            let value = match (&cell.value, cell.formula.is_some()) {
                (CellValue::Empty, _) => None,
                (CellValue::Number(n), _) => Some((None, n.to_string())),
                (CellValue::Boolean(b), _) => {
                    Some((Some("b"), if *b { "1" } else { "0" }.to_string()))
                }
                (CellValue::Error(e), _) => Some((Some("e"), escape_text(e))),
                (CellValue::Date(d), _) => Some((Some("d"), escape_text(d))),
                (CellValue::String(s), true) => Some((Some("str"), escape_text(s))),
                (CellValue::String(s), false) => {
                    stats.shared_string_refs += 1;
                    Some((Some("s"), shared_strings.intern(s).to_string()))
                }
            };
            if let Some((Some(t), _)) = &value {
                let _ = write!(out, r#" t="{t}""#);
            }

            if cell.formula.is_none() && value.is_none() {
                out.push_str("/>");
                continue;
            }
            out.push('>');
            if let Some(formula) = &cell.formula {
                match cell.array_range {
                    Some(range) => {
                        let _ = write!(out, r#"<{f_tag} t="array" ref="{range}">"#);
                    }
                    None => {
                        let _ = write!(out, "<{f_tag}>");
                    }
                }
                let _ = write!(out, "{}</{f_tag}>", escape_text(formula));
            }
            if let Some((_, text)) = value {
                if needs_space_preserve(&text) {
                    let _ = write!(out, r#"<{v_tag} xml:space="preserve">{text}</{v_tag}>"#);
                } else {
                    let _ = write!(out, "<{v_tag}>{text}</{v_tag}>");
                }
            }
            let _ = write!(out, "</{c_tag}>");
        }
        let _ = write!(out, "</{row_tag}>");
    }

    if any_row {
        let _ = write!(out, "</{sheet_data_tag}>");
    } else {
        let _ = write!(out, "<{sheet_data_tag}/>");
    }
    out
}

/// Rewrite a template worksheet part around freshly rendered sheet data.
///
/// `<sheetData>` is replaced with `sheet_data`, `<dimension>` is set to `dimension` and
/// `<mergeCells>` is replaced, inserted at its schema position, or removed when `merges` is
/// empty. Ranges and formulas of the streamed-through elements are moved by `edits`.
pub(crate) fn patch_worksheet_xml(
    original: &[u8],
    prefix: Option<&str>,
    sheet_name: &str,
    sheet_data: &str,
    merges: &[Range],
    dimension: Option<Range>,
    edits: &RowEdits,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + sheet_data.len()));
    let mut buf = Vec::new();

    let mut skip_depth = 0usize;
    let mut wrote_sheet_data = false;
    let mut wrote_merges = false;
    let mut in_formula = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            _ if skip_depth > 0 => match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            },
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"sheetData" =>
            {
                if matches!(event, Event::Start(_)) {
                    skip_depth = 1;
                }
                writer.get_mut().extend_from_slice(sheet_data.as_bytes());
                wrote_sheet_data = true;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"dimension" =>
            {
                if matches!(event, Event::Start(_)) {
                    skip_depth = 1;
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut dim = BytesStart::new(name);
                let reference = dimension.map(|r| r.to_string()).unwrap_or_else(|| "A1".into());
                dim.push_attribute(("ref", reference.as_str()));
                writer.write_event(Event::Empty(dim))?;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"mergeCells" =>
            {
                if matches!(event, Event::Start(_)) {
                    skip_depth = 1;
                }
                if !merges.is_empty() {
                    write_merge_cells_block(&mut writer, merges, prefix)?;
                }
                wrote_merges = true;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if wrote_sheet_data
                    && !wrote_merges
                    && !merges.is_empty()
                    && insert_before_tag(e.local_name().as_ref()) =>
            {
                write_merge_cells_block(&mut writer, merges, prefix)?;
                wrote_merges = true;
                write_shifted(&mut writer, &event, sheet_name, edits, &mut in_formula)?;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"worksheet" => {
                if !wrote_sheet_data {
                    writer.get_mut().extend_from_slice(sheet_data.as_bytes());
                    wrote_sheet_data = true;
                }
                if !wrote_merges && !merges.is_empty() {
                    write_merge_cells_block(&mut writer, merges, prefix)?;
                    wrote_merges = true;
                }
                writer.write_event(event.borrow())?;
            }
            _ => write_shifted(&mut writer, &event, sheet_name, edits, &mut in_formula)?,
        }
        buf.clear();
    }

    if !wrote_sheet_data {
        return Err(XlsxError::Invalid("worksheet part has no root element".to_string()));
    }
    Ok(writer.into_inner())
}

/// Write `event`, moving row-tied ranges and formula text first.
fn write_shifted<W: std::io::Write>(
    writer: &mut Writer<W>,
    event: &Event<'_>,
    sheet_name: &str,
    edits: &RowEdits,
    in_formula: &mut bool,
) -> Result<(), XlsxError> {
    if edits.is_empty() {
        writer.write_event(event.borrow())?;
        return Ok(());
    }
    match event {
        Event::Start(e) => {
            *in_formula = is_formula_element(e.local_name().as_ref());
            match shift_range_attributes(e, sheet_name, edits)? {
                Some(patched) => writer.write_event(Event::Start(patched))?,
                None => writer.write_event(event.borrow())?,
            }
        }
        Event::Empty(e) => match shift_range_attributes(e, sheet_name, edits)? {
            Some(patched) => writer.write_event(Event::Empty(patched))?,
            None => writer.write_event(event.borrow())?,
        },
        Event::End(_) => {
            *in_formula = false;
            writer.write_event(event.borrow())?;
        }
        Event::Text(t) if *in_formula => match shift_formula_text(t, sheet_name, edits)? {
            Some(moved) => writer.write_event(Event::Text(moved))?,
            None => writer.write_event(event.borrow())?,
        },
        _ => writer.write_event(event.borrow())?,
    }
    Ok(())
}

fn write_merge_cells_block<W: std::io::Write>(
    writer: &mut Writer<W>,
    merges: &[Range],
    prefix: Option<&str>,
) -> Result<(), XlsxError> {
    let merge_cells_tag = prefixed_tag(prefix, "mergeCells");
    let merge_cell_tag = prefixed_tag(prefix, "mergeCell");
    let count = merges.len().to_string();
    let mut start = BytesStart::new(merge_cells_tag.as_str());
    start.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(start))?;

    for merge in merges {
        let range = merge.to_string();
        let mut elem = BytesStart::new(merge_cell_tag.as_str());
        elem.push_attribute(("ref", range.as_str()));
        writer.write_event(Event::Empty(elem))?;
    }

    writer.write_event(Event::End(BytesEnd::new(merge_cells_tag.as_str())))?;
    Ok(())
}
