//! Worksheet XML -> [`Worksheet`].

use std::collections::HashMap;

use bulletin_model::{
    rewrite_formula_for_copy_delta, Cell, CellRef, CellValue, Range, RowProperties, Style,
    StyleTable, Worksheet,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::shared_strings::SharedStrings;
use crate::XlsxError;

fn parse_xml_bool(val: &str) -> bool {
    let trimmed = val.trim();
    trimmed == "1" || trimmed.eq_ignore_ascii_case("true")
}

#[derive(Debug, Default)]
struct FormulaMeta {
    t: Option<String>,
    shared_index: Option<u32>,
    /// `ref` attribute: the spanned range of an array or shared formula.
    reference: Option<String>,
    text: String,
}

#[derive(Debug, Default)]
struct PendingCell {
    cell_ref: Option<CellRef>,
    t: Option<String>,
    xf: u32,
    formula: Option<FormulaMeta>,
    value_text: Option<String>,
    inline_text: Option<String>,
}

/// Master cell and text of a shared formula group.
struct SharedFormulaGroup {
    anchor: CellRef,
    text: String,
}

/// Load one worksheet part into `worksheet`.
///
/// Cell `s` indices are interned into `styles` as [`Style::from_xf`]; shared-formula followers
/// are expanded relative to their master so every formula cell carries its own text.
pub(crate) fn parse_worksheet(
    worksheet: &mut Worksheet,
    part: &str,
    xml: &[u8],
    shared_strings: &SharedStrings,
    styles: &mut StyleTable,
) -> Result<(), XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut in_sheet_data = false;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut shared_groups: HashMap<u32, SharedFormulaGroup> = HashMap::new();

    let mut pending = PendingCell::default();
    let mut in_v = false;
    let mut in_f = false;
    let mut in_is_t = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = true,
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = false,

            Event::Start(e) | Event::Empty(e)
                if in_sheet_data && e.local_name().as_ref() == b"row" =>
            {
                let row = parse_row_start(worksheet, &e, next_row)?;
                next_row = row + 1;
                next_col = 0;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                pending = parse_cell_start(&e, next_row.saturating_sub(1), next_col)?;
                in_v = false;
                in_f = false;
                in_is_t = false;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = parse_cell_start(&e, next_row.saturating_sub(1), next_col)?;
                if let Some(cell_ref) = cell.cell_ref {
                    next_col = cell_ref.col + 1;
                    if cell.xf != 0 {
                        let style_id = styles.intern(Style::from_xf(cell.xf));
                        worksheet.set_cell(cell_ref, Cell::default().with_style(style_id));
                    }
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = std::mem::take(&mut pending);
                if let Some(cell_ref) = cell.cell_ref {
                    next_col = cell_ref.col + 1;
                    finish_cell(worksheet, cell_ref, cell, shared_strings, styles, &mut shared_groups);
                }
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"v" => in_v = true,
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"v" => in_v = false,
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"f" => {
                in_f = true;
                pending.formula = Some(parse_formula_start(&e)?);
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"f" => {
                pending.formula = Some(parse_formula_start(&e)?);
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"f" => in_f = false,
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"is" => {
                pending.inline_text = Some(String::new());
                drop(e);
            }
            // Inline rich text: `<is><r><t>..</t></r></is>`; phonetic `<rPh>` runs are skipped.
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"rPh" => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::Start(e)
                if in_sheet_data
                    && pending.inline_text.is_some()
                    && e.local_name().as_ref() == b"t" =>
            {
                in_is_t = true;
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"t" => in_is_t = false,

            Event::Text(t) if in_sheet_data && (in_v || in_f || in_is_t) => {
                let text = t.unescape()?;
                if in_v {
                    pending.value_text.get_or_insert_with(String::new).push_str(&text);
                } else if in_f {
                    if let Some(formula) = pending.formula.as_mut() {
                        formula.text.push_str(&text);
                    }
                } else if let Some(inline) = pending.inline_text.as_mut() {
                    inline.push_str(&text);
                }
            }

            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() != b"ref" {
                        continue;
                    }
                    let value = attr.unescape_value()?.into_owned();
                    let range = Range::from_a1(&value)
                        .map_err(|_| XlsxError::InvalidCellRef(value.clone()))?;
                    if range.is_single_cell() {
                        continue;
                    }
                    worksheet
                        .merges_mut()
                        .add(range)
                        .map_err(|source| XlsxError::Merge {
                            part: part.to_string(),
                            source,
                        })?;
                }
            }

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Apply `<row>` attributes and return the 0-based row index.
fn parse_row_start(
    worksheet: &mut Worksheet,
    e: &BytesStart<'_>,
    implied_row: u32,
) -> Result<u32, XlsxError> {
    let mut row = implied_row;
    let mut props = RowProperties::default();
    let mut row_xf: Option<u32> = None;
    let mut custom_format = false;

    for attr in e.attributes() {
        let attr = attr?;
        let val = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"r" => {
                let row_1_based: u32 = val.trim().parse().unwrap_or(0);
                if row_1_based > 0 {
                    row = row_1_based - 1;
                }
            }
            b"ht" => props.height = val.trim().parse::<f64>().ok(),
            b"customHeight" => props.custom_height = parse_xml_bool(&val),
            b"hidden" => props.hidden = parse_xml_bool(&val),
            b"s" => row_xf = val.trim().parse().ok(),
            b"customFormat" => custom_format = parse_xml_bool(&val),
            b"outlineLevel" => props.outline_level = val.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    if custom_format {
        props.xf = row_xf;
    }

    worksheet.set_row_properties(row, props);
    Ok(row)
}

fn parse_cell_start(
    e: &BytesStart<'_>,
    current_row: u32,
    next_col: u32,
) -> Result<PendingCell, XlsxError> {
    let mut cell = PendingCell {
        cell_ref: Some(CellRef::new(current_row, next_col)),
        ..PendingCell::default()
    };
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let a1 = attr.unescape_value()?.into_owned();
                cell.cell_ref =
                    Some(CellRef::from_a1(&a1).map_err(|_| XlsxError::InvalidCellRef(a1))?);
            }
            b"t" => cell.t = Some(attr.unescape_value()?.into_owned()),
            b"s" => cell.xf = attr.unescape_value()?.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(cell)
}

fn parse_formula_start(e: &BytesStart<'_>) -> Result<FormulaMeta, XlsxError> {
    let mut meta = FormulaMeta::default();
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"t" => meta.t = Some(attr.unescape_value()?.into_owned()),
            b"si" => meta.shared_index = attr.unescape_value()?.trim().parse().ok(),
            b"ref" => meta.reference = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(meta)
}

fn finish_cell(
    worksheet: &mut Worksheet,
    cell_ref: CellRef,
    pending: PendingCell,
    shared_strings: &SharedStrings,
    styles: &mut StyleTable,
    shared_groups: &mut HashMap<u32, SharedFormulaGroup>,
) {
    let value = interpret_cell_value(
        pending.t.as_deref(),
        pending.value_text.as_deref(),
        pending.inline_text.as_deref(),
        shared_strings,
        cell_ref,
    );

    let array_range = pending
        .formula
        .as_ref()
        .and_then(|f| array_formula_range(f, cell_ref));
    let formula = pending
        .formula
        .and_then(|f| resolve_formula(f, cell_ref, shared_groups));

    let style_id = if pending.xf == 0 {
        0
    } else {
        styles.intern(Style::from_xf(pending.xf))
    };

    let mut cell = Cell::new(value).with_style(style_id);
    if let Some(formula) = formula {
        cell = cell.with_formula(formula);
        if let Some(range) = array_range {
            cell = cell.with_array_range(range);
        }
    }
    if !cell.is_truly_empty() {
        worksheet.set_cell(cell_ref, cell);
    }
}

fn array_formula_range(formula: &FormulaMeta, cell_ref: CellRef) -> Option<Range> {
    if formula.t.as_deref() != Some("array") {
        return None;
    }
    match formula.reference.as_deref().map(Range::from_a1) {
        Some(Ok(range)) => Some(range),
        _ => {
            log::warn!("array formula at {cell_ref} has no usable ref, spanning the cell alone");
            Some(Range::cell(cell_ref))
        }
    }
}

/// Formula text for one cell, expanding shared-formula followers from their master.
fn resolve_formula(
    formula: FormulaMeta,
    cell_ref: CellRef,
    shared_groups: &mut HashMap<u32, SharedFormulaGroup>,
) -> Option<String> {
    let is_shared = formula.t.as_deref() == Some("shared");

    match (is_shared, formula.shared_index) {
        (true, Some(si)) if !formula.text.is_empty() => {
            shared_groups.insert(
                si,
                SharedFormulaGroup {
                    anchor: cell_ref,
                    text: formula.text.clone(),
                },
            );
            Some(formula.text)
        }
        (true, Some(si)) => {
            let Some(group) = shared_groups.get(&si) else {
                log::warn!("shared formula follower {cell_ref} has no master (si={si})");
                return None;
            };
            let delta_row = i64::from(cell_ref.row) - i64::from(group.anchor.row);
            let delta_col = i64::from(cell_ref.col) - i64::from(group.anchor.col);
            let (text, _) = rewrite_formula_for_copy_delta(&group.text, delta_row, delta_col);
            Some(text)
        }
        _ if formula.text.is_empty() => None,
        _ => Some(formula.text),
    }
}

fn interpret_cell_value(
    t: Option<&str>,
    value_text: Option<&str>,
    inline_text: Option<&str>,
    shared_strings: &SharedStrings,
    cell_ref: CellRef,
) -> CellValue {
    match t {
        Some("s") => {
            let idx = value_text.and_then(|v| v.trim().parse::<u32>().ok());
            match idx.and_then(|idx| shared_strings.get(idx)) {
                Some(text) => CellValue::String(text.to_string()),
                None => {
                    log::warn!("{cell_ref}: shared string index {value_text:?} out of range");
                    CellValue::Empty
                }
            }
        }
        Some("inlineStr") => inline_text
            .or(value_text)
            .map(|s| CellValue::String(s.to_string()))
            .unwrap_or(CellValue::Empty),
        Some("b") => value_text
            .map(|v| CellValue::Boolean(parse_xml_bool(v)))
            .unwrap_or(CellValue::Empty),
        Some("e") => value_text
            .map(|v| CellValue::Error(v.to_string()))
            .unwrap_or(CellValue::Empty),
        Some("str") => value_text
            .map(|v| CellValue::String(v.to_string()))
            .unwrap_or(CellValue::Empty),
        Some("d") => value_text
            .map(|v| CellValue::Date(v.trim().to_string()))
            .unwrap_or(CellValue::Empty),
        None | Some("n") => match value_text {
            None => CellValue::Empty,
            Some(v) => match v.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::String(v.to_string()),
            },
        },
        Some(other) => {
            log::warn!("{cell_ref}: unknown cell type {other:?}, reading as text");
            value_text
                .map(|v| CellValue::String(v.to_string()))
                .unwrap_or(CellValue::Empty)
        }
    }
}
