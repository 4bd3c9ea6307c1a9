//! `xl/styles.xml` handling for cell formats.
//!
//! Cells keep their template `xf` index as [`Style::base_xf`]. A style with a number-format
//! override is written as a clone of its base `xf` carrying a (possibly new) `numFmtId`; the
//! clone is appended to `cellXfs` so every existing index stays valid.

use std::collections::{BTreeMap, HashMap};
use std::io::Write as _;

use bulletin_model::Style;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::XlsxError;

/// Used when a package has no styles part.
pub(crate) const DEFAULT_STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

const FIRST_CUSTOM_NUM_FMT_ID: u16 = 164;

/// Built-in number formats a code can map to without a `<numFmt>` entry.
fn builtin_num_fmt_id(code: &str) -> Option<u16> {
    Some(match code {
        "General" => 0,
        "0" => 1,
        "0.00" => 2,
        "#,##0" => 3,
        "#,##0.00" => 4,
        "0%" => 9,
        "0.00%" => 10,
        "0.00E+00" => 11,
        "@" => 49,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct XfRecord {
    attrs: Vec<(String, String)>,
    /// Child elements (`<alignment>`, `<protection>`) as raw XML.
    inner: Vec<u8>,
}

impl XfRecord {
    fn default_record() -> Self {
        Self {
            attrs: vec![
                ("numFmtId".into(), "0".into()),
                ("fontId".into(), "0".into()),
                ("fillId".into(), "0".into()),
                ("borderId".into(), "0".into()),
                ("xfId".into(), "0".into()),
            ],
            inner: Vec::new(),
        }
    }

    fn set_attr(&mut self, key: &str, value: String) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>, tag: &str) -> Result<(), XlsxError> {
        let mut start = BytesStart::new(tag);
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if self.inner.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.get_mut().write_all(&self.inner)?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StylesPart {
    raw: Vec<u8>,
    cell_xfs: Vec<XfRecord>,
    num_fmt_by_id: BTreeMap<u16, String>,
    num_fmt_id_by_code: HashMap<String, u16>,
    next_custom_num_fmt_id: u16,
    appended_num_fmts: Vec<(u16, String)>,
    appended_xfs: Vec<XfRecord>,
    derived: HashMap<(u32, String), u32>,
}

impl StylesPart {
    pub fn parse(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut num_fmt_by_id = BTreeMap::new();
        let mut cell_xfs = Vec::new();
        let mut in_cell_xfs = false;
        let mut saw_root = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"styleSheet" => saw_root = true,
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"numFmt" => {
                    let mut id = None;
                    let mut code = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u16>().ok(),
                            b"formatCode" => code = Some(attr.unescape_value()?.into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(code)) = (id, code) {
                        num_fmt_by_id.insert(id, code);
                    }
                }
                Event::Empty(e) if in_cell_xfs && e.local_name().as_ref() == b"xf" => {
                    cell_xfs.push(XfRecord {
                        attrs: read_attrs(&e)?,
                        inner: Vec::new(),
                    });
                }
                Event::Start(e) if in_cell_xfs && e.local_name().as_ref() == b"xf" => {
                    let attrs = read_attrs(&e)?;
                    let inner = read_inner(&mut reader, b"xf")?;
                    cell_xfs.push(XfRecord { attrs, inner });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(XlsxError::Invalid("styles.xml root is not <styleSheet>".into()));
        }
        if cell_xfs.is_empty() {
            cell_xfs.push(XfRecord::default_record());
        }

        let mut num_fmt_id_by_code = HashMap::new();
        let mut max_custom = FIRST_CUSTOM_NUM_FMT_ID - 1;
        for (id, code) in &num_fmt_by_id {
            num_fmt_id_by_code.entry(code.clone()).or_insert(*id);
            max_custom = max_custom.max(*id);
        }

        Ok(Self {
            raw: bytes.to_vec(),
            cell_xfs,
            num_fmt_by_id,
            num_fmt_id_by_code,
            next_custom_num_fmt_id: max_custom.saturating_add(1),
            appended_num_fmts: Vec::new(),
            appended_xfs: Vec::new(),
            derived: HashMap::new(),
        })
    }

    pub fn parse_or_default(bytes: Option<&[u8]>) -> Result<Self, XlsxError> {
        Self::parse(bytes.unwrap_or(DEFAULT_STYLES_XML.as_bytes()))
    }

    /// Number of `cellXfs` records present in the template.
    pub fn cell_xfs_count(&self) -> usize {
        self.cell_xfs.len()
    }

    /// Format code of a custom `numFmt` id.
    pub fn num_fmt_code(&self, id: u16) -> Option<&str> {
        self.num_fmt_by_id.get(&id).map(String::as_str)
    }

    /// `cellXfs` index to write for `style`, appending a derived record when needed.
    pub fn xf_index_for_style(&mut self, style: &Style) -> u32 {
        let base = if (style.base_xf as usize) < self.cell_xfs.len() {
            style.base_xf
        } else {
            0
        };
        let Some(code) = style.number_format.as_deref() else {
            return base;
        };
        if let Some(idx) = self.derived.get(&(base, code.to_string())) {
            return *idx;
        }

        let num_fmt_id = self.intern_number_format(code);
        let mut record = self.cell_xfs[base as usize].clone();
        record.set_attr("numFmtId", num_fmt_id.to_string());
        record.set_attr("applyNumberFormat", "1".to_string());

        let idx = (self.cell_xfs.len() + self.appended_xfs.len()) as u32;
        self.appended_xfs.push(record);
        self.derived.insert((base, code.to_string()), idx);
        idx
    }

    fn intern_number_format(&mut self, code: &str) -> u16 {
        if let Some(id) = builtin_num_fmt_id(code) {
            return id;
        }
        if let Some(id) = self.num_fmt_id_by_code.get(code) {
            return *id;
        }
        let id = self.next_custom_num_fmt_id;
        self.next_custom_num_fmt_id = self.next_custom_num_fmt_id.saturating_add(1);
        self.num_fmt_by_id.insert(id, code.to_string());
        self.num_fmt_id_by_code.insert(code.to_string(), id);
        self.appended_num_fmts.push((id, code.to_string()));
        id
    }

    pub fn is_modified(&self) -> bool {
        !self.appended_xfs.is_empty() || !self.appended_num_fmts.is_empty()
    }

    /// The original `styles.xml` with appended `numFmt` and `xf` records spliced in.
    pub fn to_xml_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        if !self.is_modified() {
            return Ok(self.raw.clone());
        }

        let mut reader = Reader::from_reader(self.raw.as_slice());
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(self.raw.len() + 256));
        let mut buf = Vec::new();
        let mut wrote_num_fmts = self.appended_num_fmts.is_empty();
        let mut skip_depth = 0usize;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Eof => break,
                Event::Start(_) if skip_depth > 0 => skip_depth += 1,
                Event::End(_) if skip_depth > 0 => skip_depth -= 1,
                _ if skip_depth > 0 => {}
                Event::Start(ref e) | Event::Empty(ref e)
                    if !wrote_num_fmts && e.local_name().as_ref() == b"numFmts" =>
                {
                    self.write_num_fmts(&mut writer, &qualified(e.name().as_ref(), "numFmts"))?;
                    wrote_num_fmts = true;
                    if matches!(event, Event::Start(_)) {
                        skip_depth = 1;
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if !wrote_num_fmts && e.local_name().as_ref() != b"styleSheet" =>
                {
                    // `numFmts` is the first child of `styleSheet`.
                    self.write_num_fmts(&mut writer, &qualified(e.name().as_ref(), "numFmts"))?;
                    wrote_num_fmts = true;
                    writer.write_event(event.borrow())?;
                }
                Event::Start(ref e) if e.local_name().as_ref() == b"cellXfs" => {
                    let count = (self.cell_xfs.len() + self.appended_xfs.len()).to_string();
                    writer.write_event(Event::Start(with_count(e, &count)?))?;
                }
                Event::End(ref e) if e.local_name().as_ref() == b"cellXfs" => {
                    let tag = qualified(e.name().as_ref(), "xf");
                    for record in &self.appended_xfs {
                        record.write(&mut writer, &tag)?;
                    }
                    writer.write_event(Event::End(e.to_owned()))?;
                }
                ev => writer.write_event(ev)?,
            }
            buf.clear();
        }

        Ok(writer.into_inner())
    }

    fn write_num_fmts<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        tag: &str,
    ) -> Result<(), XlsxError> {
        let num_fmt_tag = match tag.split_once(':') {
            Some((prefix, _)) => format!("{prefix}:numFmt"),
            None => "numFmt".to_string(),
        };
        let count = self.num_fmt_by_id.len().to_string();
        let mut start = BytesStart::new(tag);
        start.push_attribute(("count", count.as_str()));
        writer.write_event(Event::Start(start))?;
        for (id, code) in &self.num_fmt_by_id {
            let id = id.to_string();
            let mut el = BytesStart::new(num_fmt_tag.as_str());
            el.push_attribute(("numFmtId", id.as_str()));
            el.push_attribute(("formatCode", code.as_str()));
            writer.write_event(Event::Empty(el))?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }
}

fn qualified(sibling_name: &[u8], local: &str) -> String {
    match sibling_name.iter().position(|b| *b == b':') {
        Some(idx) => format!("{}:{local}", String::from_utf8_lossy(&sibling_name[..idx])),
        None => local.to_string(),
    }
}

fn with_count(e: &BytesStart<'_>, count: &str) -> Result<BytesStart<'static>, XlsxError> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"count" {
            continue;
        }
        out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    out.push_attribute(("count", count));
    Ok(out)
}

fn read_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, XlsxError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(attrs)
}

/// Raw XML between the current start tag and its matching end tag (`end_local`).
fn read_inner(reader: &mut Reader<&[u8]>, end_local: &[u8]) -> Result<Vec<u8>, XlsxError> {
    let mut buf = Vec::new();
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::End(e) if depth == 0 && local_name(e.name().as_ref()) == end_local => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => {
                return Err(XlsxError::Invalid("unexpected eof in styles.xml".to_string()))
            }
            _ => {}
        }
        writer.write_event(event)?;
        buf.clear();
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="170" formatCode="0.0&quot; m&quot;"/></numFmts><fonts count="1"><font/></fonts><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"><alignment horizontal="center"/></xf></cellXfs></styleSheet>"#;

    #[test]
    fn base_styles_map_to_their_own_index() {
        let mut part = StylesPart::parse(STYLES.as_bytes()).unwrap();
        assert_eq!(part.cell_xfs_count(), 2);
        assert_eq!(part.xf_index_for_style(&Style::from_xf(1)), 1);
        assert_eq!(part.xf_index_for_style(&Style::from_xf(99)), 0);
        assert!(!part.is_modified());
        assert_eq!(part.num_fmt_code(170), Some("0.0\" m\""));
    }

    #[test]
    fn number_format_override_appends_cloned_xf() {
        let mut part = StylesPart::parse(STYLES.as_bytes()).unwrap();
        let custom = part.xf_index_for_style(&Style::from_xf(1).with_number_format("0.000"));
        let builtin = part.xf_index_for_style(&Style::from_xf(1).with_number_format("0.00"));
        assert_eq!((custom, builtin), (2, 3));
        assert_eq!(
            part.xf_index_for_style(&Style::from_xf(1).with_number_format("0.000")),
            2
        );

        let xml = String::from_utf8(part.to_xml_bytes().unwrap()).unwrap();
        assert!(xml.contains(r#"<numFmt numFmtId="171" formatCode="0.000"/>"#), "{xml}");
        assert!(xml.contains(r#"<numFmts count="2">"#), "{xml}");
        assert!(xml.contains(r#"<cellXfs count="4">"#), "{xml}");
        assert!(
            xml.contains(r#"<xf numFmtId="171" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyNumberFormat="1"><alignment horizontal="center"/></xf>"#),
            "{xml}"
        );
        assert!(xml.contains(r#"<xf numFmtId="2" fontId="0""#), "{xml}");
    }

    #[test]
    fn num_fmts_block_is_created_when_missing() {
        let styles = r#"<styleSheet><fonts count="1"><font/></fonts><cellXfs count="1"><xf numFmtId="0"/></cellXfs></styleSheet>"#;
        let mut part = StylesPart::parse(styles.as_bytes()).unwrap();
        assert_eq!(part.xf_index_for_style(&Style::from_xf(0).with_number_format("0.000")), 1);
        let xml = String::from_utf8(part.to_xml_bytes().unwrap()).unwrap();
        assert!(
            xml.starts_with(r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts><fonts"#),
            "{xml}"
        );
    }
}
