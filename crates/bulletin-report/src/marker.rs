//! Tag markers embedded in cell text: `{{NAME}}`, `{{HEADER.NAME}}`, `{{DATA.NAME}}`.

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Position prefix of a marker. Markers without one are general.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Namespace {
    Header,
    Data,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Namespace::Header => "HEADER",
            Namespace::Data => "DATA",
        })
    }
}

/// Where a marker sits: its namespace, or general when it has none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagPosition(pub Option<Namespace>);

impl fmt::Display for TagPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ns) => ns.fmt(f),
            None => f.write_str("general"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker<'t> {
    /// The full marker text, braces included.
    pub raw: &'t str,
    pub namespace: Option<Namespace>,
    pub name: &'t str,
    /// Byte span of `raw` within the scanned text.
    pub span: Range<usize>,
}

fn marker_regex() -> &'static Regex {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    MARKER_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*(?:(HEADER|DATA)\.)?([A-Za-z][A-Za-z0-9_]*)\s*\}\}")
            .expect("valid regex")
    })
}

/// All markers in `text`, left to right.
pub fn find_markers(text: &str) -> Vec<Marker<'_>> {
    if !text.contains("{{") {
        return Vec::new();
    }
    marker_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?;
            let namespace = caps.get(1).map(|ns| match ns.as_str() {
                "HEADER" => Namespace::Header,
                _ => Namespace::Data,
            });
            Some(Marker {
                raw: whole.as_str(),
                namespace,
                name: name.as_str(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Whether `text` consists of `marker` alone (surrounding whitespace ignored).
pub fn is_whole_cell(text: &str, marker: &Marker<'_>) -> bool {
    text.trim() == marker.raw
}

/// Replace markers in `text` with the strings `replace` returns; `None` keeps the marker.
pub fn replace_markers<E, F>(text: &str, mut replace: F) -> Result<String, E>
where
    F: FnMut(&Marker<'_>) -> Result<Option<String>, E>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for marker in find_markers(text) {
        out.push_str(&text[last..marker.span.start]);
        match replace(&marker)? {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(marker.raw),
        }
        last = marker.span.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_namespaced_and_general_markers() {
        let markers = find_markers("{{HEADER.SITE_REGION}} on {{ DATE }}, {{DATA.SITE_NAME}}");
        let summary: Vec<_> = markers.iter().map(|m| (m.namespace, m.name)).collect();
        assert_eq!(
            summary,
            vec![
                (Some(Namespace::Header), "SITE_REGION"),
                (None, "DATE"),
                (Some(Namespace::Data), "SITE_NAME"),
            ]
        );
        assert_eq!(markers[1].raw, "{{ DATE }}");
    }

    #[test]
    fn ignores_text_that_is_not_a_marker() {
        assert!(find_markers("{{}} {single} {{1ABC}} plain").is_empty());
    }

    #[test]
    fn whole_cell_detection() {
        let text = " {{DATA.DISCHARGE_MORNING}} ";
        let markers = find_markers(text);
        assert!(is_whole_cell(text, &markers[0]));

        let text = "Discharge: {{DATA.DISCHARGE_MORNING}} m3/s";
        let markers = find_markers(text);
        assert!(!is_whole_cell(text, &markers[0]));
    }

    #[test]
    fn replace_keeps_surrounding_text_and_unmatched_markers() {
        let out: Result<String, ()> =
            replace_markers("Q = {{DATA.DISCHARGE_MORNING}} m3/s ({{DATE}})", |m| {
                Ok((m.namespace == Some(Namespace::Data)).then(|| "12.3".to_string()))
            });
        assert_eq!(out.unwrap(), "Q = 12.3 m3/s ({{DATE}})");
    }
}
