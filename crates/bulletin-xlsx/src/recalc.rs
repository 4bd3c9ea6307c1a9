//! Ask the consumer to recalculate after formulas moved.
//!
//! Row insertion rewrites formula text but leaves cached `<v>` results and `xl/calcChain.xml`
//! describing the old layout. Both are invalidated here: the calc chain is dropped (together with
//! its relationship and content-type override) and `<calcPr fullCalcOnLoad="1"/>` is set.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::{XlsxError, XlsxPackage};

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

pub(crate) fn force_full_recalc(package: &mut XlsxPackage, workbook_part: &str) -> Result<(), XlsxError> {
    if let Some(workbook_xml) = package.part(workbook_part).map(<[u8]>::to_vec) {
        let updated = workbook_xml_force_full_calc_on_load(&workbook_xml)?;
        package.set_part(workbook_part, updated);
    }

    if package.remove_part(CALC_CHAIN_PART).is_some() {
        log::debug!("dropped {CALC_CHAIN_PART}");
    }

    let rels_part = crate::openxml::rels_part_name(workbook_part);
    if let Some(rels_xml) = package.part(&rels_part).map(<[u8]>::to_vec) {
        let updated = filter_elements(&rels_xml, b"Relationship", |e| {
            relationship_is_calc_chain(e).map(|hit| !hit)
        })?;
        package.set_part(rels_part, updated);
    }

    if let Some(ct_xml) = package.part("[Content_Types].xml").map(<[u8]>::to_vec) {
        let updated = filter_elements(&ct_xml, b"Override", |e| {
            override_is_calc_chain(e).map(|hit| !hit)
        })?;
        package.set_part("[Content_Types].xml", updated);
    }

    Ok(())
}

fn workbook_xml_force_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut saw_calc_pr = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Empty(ref e) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(patched_calc_pr(e)?))?;
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(patched_calc_pr(e)?))?;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"workbook" => {
                if !saw_calc_pr {
                    let name = prefixed(e.name().as_ref(), "calcPr");
                    let mut calc_pr = BytesStart::new(name);
                    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
                    writer.write_event(Event::Empty(calc_pr))?;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// `prefix:local` using the prefix of `sibling_name`, if any.
fn prefixed(sibling_name: &[u8], local: &str) -> String {
    match sibling_name.iter().position(|b| *b == b':') {
        Some(idx) => format!("{}:{local}", String::from_utf8_lossy(&sibling_name[..idx])),
        None => local.to_string(),
    }
}

fn patched_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>, XlsxError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

/// Copy `xml`, dropping every `local` element for which `keep` returns false.
fn filter_elements<F>(xml: &[u8], local: &[u8], mut keep: F) -> Result<Vec<u8>, XlsxError>
where
    F: FnMut(&BytesStart<'_>) -> Result<bool, XlsxError>,
{
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(_) if skip_depth > 0 => skip_depth += 1,
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            _ if skip_depth > 0 => {}
            Event::Start(ref e) if e.local_name().as_ref() == local && !keep(e)? => {
                skip_depth = 1;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == local && !keep(e)? => {}
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn relationship_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match local_name(attr.key.as_ref()) {
            b"Type" if value == CALC_CHAIN_REL_TYPE => return Ok(true),
            b"Target" if value.ends_with("calcChain.xml") => return Ok(true),
            _ => {}
        }
    }
    Ok(false)
}

fn override_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"PartName" {
            return Ok(attr.unescape_value()?.ends_with("calcChain.xml"));
        }
    }
    Ok(false)
}
