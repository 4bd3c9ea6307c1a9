//! `xl/sharedStrings.xml`: append-only shared string table.
//!
//! Existing `<si>` items are kept verbatim (rich text runs included) and keep their index;
//! strings introduced while generating a report are appended as plain items.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::XlsxError;

#[derive(Debug, Clone)]
struct SharedStringItem {
    text: String,
    /// Inner XML of the original `<si>`; `None` for appended items.
    raw: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    items: Vec<SharedStringItem>,
    index: HashMap<String, u32>,
    /// Number of items read from the package.
    original_len: usize,
}

impl SharedStrings {
    pub fn parse(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut table = SharedStrings::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"si" => {
                    let (text, raw) = parse_si(&mut reader)?;
                    table.push(text, Some(raw));
                }
                Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                    table.push(String::new(), Some(Vec::new()));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        table.original_len = table.items.len();
        Ok(table)
    }

    fn push(&mut self, text: String, raw: Option<Vec<u8>>) -> u32 {
        let idx = self.items.len() as u32;
        self.index.entry(text.clone()).or_insert(idx);
        self.items.push(SharedStringItem { text, raw });
        idx
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.items.get(idx as usize).map(|item| item.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of `text`, appending it when unseen.
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(idx) = self.index.get(text) {
            return *idx;
        }
        self.push(text.to_string(), None)
    }

    pub fn appended(&self) -> usize {
        self.items.len() - self.original_len
    }

    /// Serialize the table. `ref_count` is the number of cells referencing it.
    pub fn to_xml_bytes(&self, ref_count: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.items.len() * 32);
        out.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.extend_from_slice(b"\n");
        out.extend_from_slice(
            format!(
                r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{ref_count}" uniqueCount="{}">"#,
                self.items.len()
            )
            .as_bytes(),
        );
        for item in &self.items {
            out.extend_from_slice(b"<si>");
            match &item.raw {
                Some(raw) => out.extend_from_slice(raw),
                None => {
                    if needs_space_preserve(&item.text) {
                        out.extend_from_slice(br#"<t xml:space="preserve">"#);
                    } else {
                        out.extend_from_slice(b"<t>");
                    }
                    out.extend_from_slice(escape_text(&item.text).as_bytes());
                    out.extend_from_slice(b"</t>");
                }
            }
            out.extend_from_slice(b"</si>");
        }
        out.extend_from_slice(b"</sst>");
        out
    }
}

/// Visible text of one `<si>` plus its verbatim inner XML.
///
/// Only `<t>` directly under `<si>` or inside `<r>` runs is visible; phonetic runs are not.
fn parse_si(reader: &mut Reader<&[u8]>) -> Result<(String, Vec<u8>), XlsxError> {
    let mut buf = Vec::new();
    let mut raw = Writer::new(Vec::new());
    let mut text = String::new();
    let mut depth = 0usize;
    let mut in_visible_t = false;
    let mut in_phonetic = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::End(e) if depth == 0 && e.local_name().as_ref() == b"si" => break,
            Event::Eof => return Err(XlsxError::Invalid("unexpected eof in <si>".to_string())),
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"rPh" => in_phonetic = true,
                    b"t" if !in_phonetic => in_visible_t = true,
                    _ => {}
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"rPh" => in_phonetic = false,
                    b"t" => in_visible_t = false,
                    _ => {}
                }
            }
            Event::Text(t) if in_visible_t => text.push_str(&t.unescape()?),
            Event::CData(t) if in_visible_t => text.push_str(&String::from_utf8_lossy(t)),
            _ => {}
        }
        raw.write_event(event)?;
        buf.clear();
    }

    Ok((text, raw.into_inner()))
}

pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
