//! Bulletin generation: group stations, expand the template rows, substitute tag values.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use bulletin_model::{Cell, CellRef, CellValue, StyleTable, Workbook, Worksheet, EXCEL_MAX_ROWS};
use bulletin_xlsx::{XlsxDocument, XlsxPackageLimits};
use chrono::NaiveDate;

use crate::config::BulletinConfig;
use crate::copy::{copy_range, copy_row_properties};
use crate::error::{GridError, ReportError, ResolveError};
use crate::language::Language;
use crate::marker::{find_markers, is_whole_cell, replace_markers, Marker, Namespace};
use crate::registry::TagRegistry;
use crate::scanner::{scan_and_validate, ValidatedTemplate};
use crate::station::{MetricSource, RunContext, Station};
use crate::tag::{decimals_in_format, ReportKind, Tag};

/// Where a generated bulletin is written.
pub enum OutputSink<'a> {
    /// Written to a temporary file next to the path, then renamed over it.
    Path(PathBuf),
    Writer(&'a mut dyn Write),
}

impl std::fmt::Debug for OutputSink<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputSink::Path(path) => f.debug_tuple("Path").field(path).finish(),
            OutputSink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationSummary {
    /// Distinct HEADER values.
    pub groups: usize,
    pub stations: usize,
    pub inserted_rows: u32,
}

/// Stations sharing one resolved HEADER value.
#[derive(Clone, Debug, PartialEq)]
pub struct StationGroup<'s> {
    pub key: CellValue,
    pub stations: Vec<&'s Station>,
}

/// A template bound to a tag registry, validated once and rendered any number of times.
#[derive(Debug, Clone)]
pub struct ReportGenerator<'r> {
    document: XlsxDocument,
    registry: &'r TagRegistry,
    kind: ReportKind,
    sheet: Option<String>,
    missing_value_text: String,
    validated: Option<ValidatedTemplate<'r>>,
}

impl ReportGenerator<'static> {
    pub fn open(path: impl AsRef<Path>, kind: ReportKind) -> Result<Self, ReportError> {
        let document = XlsxDocument::load_from_path(path)?;
        Ok(Self::with_registry(document, TagRegistry::builtin(), kind))
    }

    pub fn from_bytes(bytes: &[u8], kind: ReportKind) -> Result<Self, ReportError> {
        Self::from_bytes_limited(bytes, kind, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(
        bytes: &[u8],
        kind: ReportKind,
        limits: XlsxPackageLimits,
    ) -> Result<Self, ReportError> {
        let document = XlsxDocument::load_from_bytes_limited(bytes, limits)?;
        Ok(Self::with_registry(document, TagRegistry::builtin(), kind))
    }

    /// Load the template at `path` with the sheet, kind and limits from `config`.
    pub fn open_with_config(path: impl AsRef<Path>, config: &BulletinConfig) -> Result<Self, ReportError> {
        let bytes = std::fs::read(path)?;
        let generator = Self::from_bytes_limited(&bytes, config.report_kind, config.limits.into())?;
        Ok(generator.with_config(config))
    }
}

impl<'r> ReportGenerator<'r> {
    pub fn with_registry(document: XlsxDocument, registry: &'r TagRegistry, kind: ReportKind) -> Self {
        Self {
            document,
            registry,
            kind,
            sheet: None,
            missing_value_text: String::new(),
            validated: None,
        }
    }

    /// Use the named worksheet instead of the first one. Drops any earlier validation.
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self.validated = None;
        self
    }

    /// Text written in place of a missing observation when the marker sits inside other text.
    pub fn with_missing_value_text(mut self, text: impl Into<String>) -> Self {
        self.missing_value_text = text.into();
        self
    }

    pub fn with_config(mut self, config: &BulletinConfig) -> Self {
        if let Some(sheet) = &config.sheet {
            self = self.with_sheet(sheet.clone());
        }
        if self.kind != config.report_kind {
            self.kind = config.report_kind;
            self.validated = None;
        }
        self.with_missing_value_text(config.missing_value_text.clone())
    }

    pub fn report_kind(&self) -> ReportKind {
        self.kind
    }

    pub fn document(&self) -> &XlsxDocument {
        &self.document
    }

    pub fn validated(&self) -> Option<&ValidatedTemplate<'r>> {
        self.validated.as_ref()
    }

    /// Scan the template sheet and keep the result for later runs.
    pub fn validate(&mut self) -> Result<&ValidatedTemplate<'r>, ReportError> {
        let index = self.sheet_index()?;
        let worksheet = &self.document.workbook.sheets[index];
        let template = scan_and_validate(worksheet, self.registry, self.kind)?;
        let template = &*self.validated.insert(template);
        Ok(template)
    }

    fn sheet_index(&self) -> Result<usize, ReportError> {
        let workbook = &self.document.workbook;
        match &self.sheet {
            Some(name) => workbook
                .sheet_index(name)
                .ok_or_else(|| ReportError::SheetNotFound(name.clone())),
            None if workbook.sheets.is_empty() => {
                Err(ReportError::SheetNotFound("(first sheet)".to_string()))
            }
            None => Ok(0),
        }
    }

    /// Produce the filled bulletin as a new document. The loaded template is not modified.
    pub fn render(
        &self,
        stations: &[Station],
        date: NaiveDate,
        language: Language,
        source: &dyn MetricSource,
    ) -> Result<(XlsxDocument, GenerationSummary), ReportError> {
        let template = self
            .validated
            .as_ref()
            .ok_or(ReportError::TemplateNotValidated)?;
        let ctx = RunContext {
            stations,
            source,
            language,
            report_kind: template.report_kind,
        };
        let mut document = self.document.clone();
        let summary = fill_workbook(
            &mut document.workbook,
            template,
            date,
            &ctx,
            &self.missing_value_text,
        )?;
        Ok((document, summary))
    }

    /// Render and persist the bulletin. Nothing reaches `sink` unless every tag resolved.
    pub fn generate(
        &self,
        stations: &[Station],
        date: NaiveDate,
        language: Language,
        source: &dyn MetricSource,
        sink: OutputSink<'_>,
    ) -> Result<GenerationSummary, ReportError> {
        let (document, summary) = self.render(stations, date, language, source)?;
        match sink {
            OutputSink::Path(path) => document.save_to_path(&path)?,
            OutputSink::Writer(writer) => {
                let bytes = document.save_to_bytes()?;
                writer.write_all(&bytes)?;
                writer.flush()?;
            }
        }
        log::info!(
            "generated {} bulletin for {date}: {} stations in {} groups",
            self.kind,
            summary.stations,
            summary.groups
        );
        Ok(summary)
    }
}

/// Hashable identity of a HEADER value. Numbers never share a group with text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum GroupKey {
    Empty,
    Number(u64),
    String(String),
    Boolean(bool),
    Error(String),
    Date(String),
}

impl From<&CellValue> for GroupKey {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => GroupKey::Empty,
            // 0.0 and -0.0 are one group.
            CellValue::Number(n) if *n == 0.0 => GroupKey::Number(0),
            CellValue::Number(n) => GroupKey::Number(n.to_bits()),
            CellValue::String(s) => GroupKey::String(s.clone()),
            CellValue::Boolean(b) => GroupKey::Boolean(*b),
            CellValue::Error(e) => GroupKey::Error(e.clone()),
            CellValue::Date(d) => GroupKey::Date(d.clone()),
        }
    }
}

/// Group `stations` by their resolved HEADER value, in first-seen order.
pub fn group_stations<'s>(
    template: &ValidatedTemplate<'_>,
    stations: &'s [Station],
    date: NaiveDate,
    ctx: &RunContext<'_>,
) -> Result<Vec<StationGroup<'s>>, ReportError> {
    let header_tag = template.header.tag;
    let mut groups: Vec<StationGroup<'s>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    for station in stations {
        let key = header_tag
            .resolve(Some(station), date, ctx)
            .map_err(|source| resolve_error(header_tag, Some(station), date, source))?;
        let slot = *index.entry(GroupKey::from(&key)).or_insert_with(|| {
            groups.push(StationGroup {
                key,
                stations: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].stations.push(station);
    }
    Ok(groups)
}

/// Expand and fill the template sheet of `workbook` in place.
///
/// The sheet named by `template` must be the one it was validated from and must not have been
/// edited since.
pub fn fill_workbook(
    workbook: &mut Workbook,
    template: &ValidatedTemplate<'_>,
    date: NaiveDate,
    ctx: &RunContext<'_>,
    missing_value_text: &str,
) -> Result<GenerationSummary, ReportError> {
    if ctx.stations.is_empty() {
        return Err(ReportError::NoEntities);
    }
    let sheet_index = workbook
        .sheet_index(&template.sheet_name)
        .ok_or_else(|| ReportError::SheetNotFound(template.sheet_name.clone()))?;

    let groups = group_stations(template, ctx.stations, date, ctx)?;
    let header_row = template.header_row();
    let data_row = template.data_row();

    let extra = ctx.stations.len() + groups.len() - 1;
    let last_row = workbook.sheets[sheet_index].row_count().saturating_sub(1);
    let extra = u32::try_from(extra)
        .ok()
        .filter(|extra| u64::from(last_row) + u64::from(*extra) < u64::from(EXCEL_MAX_ROWS))
        .ok_or(GridError::OutOfBounds {
            row: i64::from(last_row) + extra as i64,
            col: 0,
        })?;
    let rewritten = workbook
        .insert_rows(sheet_index, data_row + 1, extra)
        .ok_or_else(|| ReportError::SheetNotFound(template.sheet_name.clone()))?;
    log::debug!(
        "{} stations in {} groups; inserted {extra} rows below row {}, {rewritten} formulas adjusted",
        ctx.stations.len(),
        groups.len(),
        data_row + 1
    );

    let layout = Layout::new(header_row, &groups);
    let sheet = &mut workbook.sheets[sheet_index];
    let styles = &mut workbook.styles;

    let last_col = template_last_col(sheet, header_row, data_row);
    let header_anchors: Vec<CellRef> = layout
        .header_rows
        .iter()
        .filter(|&&row| row != header_row)
        .map(|&row| CellRef::new(row, 0))
        .collect();
    let data_anchors: Vec<CellRef> = layout
        .data_rows
        .iter()
        .filter(|&&row| row != data_row)
        .map(|&row| CellRef::new(row, 0))
        .collect();
    copy_range(
        sheet,
        CellRef::new(header_row, 0),
        CellRef::new(header_row, last_col),
        &header_anchors,
    )?;
    copy_range(
        sheet,
        CellRef::new(data_row, 0),
        CellRef::new(data_row, last_col),
        &data_anchors,
    )?;
    for anchor in &header_anchors {
        copy_row_properties(sheet, header_row, anchor.row);
    }
    for anchor in &data_anchors {
        copy_row_properties(sheet, data_row, anchor.row);
    }

    let mut filler = Filler {
        sheet,
        styles,
        missing_value_text,
    };

    let header_col = template.header.cell.col;
    for (group, &row) in groups.iter().zip(&layout.header_rows) {
        filler.substitute(CellRef::new(row, header_col), |marker| {
            Ok((marker.namespace == Some(Namespace::Header)).then(|| Resolved {
                value: group.key.clone(),
                format: None,
            }))
        })?;
    }

    let data_cells = template.data_cells();
    let stations = groups.iter().flat_map(|group| group.stations.iter().copied());
    for (station, &row) in stations.zip(&layout.data_rows) {
        for template_cell in &data_cells {
            let tags = &template.data;
            filler.substitute(CellRef::new(row, template_cell.col), |marker| {
                if marker.namespace != Some(Namespace::Data) {
                    return Ok(None);
                }
                let Some(occurrence) = tags.iter().find(|occ| occ.tag.name == marker.name) else {
                    return Ok(None);
                };
                let tag = occurrence.tag;
                let value = tag
                    .resolve(Some(station), date, ctx)
                    .map_err(|source| resolve_error(tag, Some(station), date, source))?;
                Ok(Some(Resolved::formatted(tag, value)))
            })?;
        }
    }

    for general in &template.general {
        let tag = general.tag;
        let value = tag
            .resolve(None, date, ctx)
            .map_err(|source| resolve_error(tag, None, date, source))?;
        let resolved = Resolved::formatted(tag, value);
        for &cell in &general.cells {
            for target in layout.remap(cell, header_row, data_row, extra) {
                filler.substitute(target, |marker| {
                    Ok((marker.namespace.is_none() && marker.name == tag.name)
                        .then(|| resolved.clone()))
                })?;
            }
        }
    }

    Ok(GenerationSummary {
        groups: groups.len(),
        stations: ctx.stations.len(),
        inserted_rows: extra,
    })
}

fn resolve_error(
    tag: &Tag,
    station: Option<&Station>,
    date: NaiveDate,
    source: ResolveError,
) -> ReportError {
    ReportError::Resolve {
        tag: tag.name.to_string(),
        station: station.map(|s| s.id.clone()).unwrap_or_else(|| "-".to_string()),
        date,
        source,
    }
}

/// Rightmost column the template header and data rows use, merges included.
fn template_last_col(sheet: &Worksheet, header_row: u32, data_row: u32) -> u32 {
    let cells = [header_row, data_row]
        .into_iter()
        .filter_map(|row| sheet.max_col_in_row(row));
    let merges = sheet
        .merges()
        .iter()
        .filter(|m| m.start.row <= data_row && m.end.row >= header_row)
        .map(|m| m.end.col);
    cells.chain(merges).max().unwrap_or(0)
}

/// Destination rows after expansion: per group, one header row then one row per station.
struct Layout {
    header_rows: Vec<u32>,
    data_rows: Vec<u32>,
}

impl Layout {
    fn new(header_row: u32, groups: &[StationGroup<'_>]) -> Self {
        let mut header_rows = Vec::with_capacity(groups.len());
        let mut data_rows = Vec::new();
        let mut row = header_row;
        for group in groups {
            header_rows.push(row);
            row += 1;
            for _ in &group.stations {
                data_rows.push(row);
                row += 1;
            }
        }
        Self {
            header_rows,
            data_rows,
        }
    }

    /// Where a template cell ends up after expansion.
    fn remap(&self, cell: CellRef, header_row: u32, data_row: u32, extra: u32) -> Vec<CellRef> {
        let rows: Vec<u32> = if cell.row < header_row {
            vec![cell.row]
        } else if cell.row == header_row {
            self.header_rows.clone()
        } else if cell.row == data_row {
            self.data_rows.clone()
        } else {
            vec![cell.row + extra]
        };
        rows.into_iter().map(|row| CellRef::new(row, cell.col)).collect()
    }
}

/// A tag value ready to be written, with the number format its formatter picked.
#[derive(Clone, Debug)]
struct Resolved {
    value: CellValue,
    format: Option<&'static str>,
}

impl Resolved {
    fn formatted(tag: &Tag, value: CellValue) -> Self {
        match (tag.formatter, &value) {
            (Some(formatter), CellValue::Number(n)) => {
                let (code, rounded) = formatter.format(*n);
                Self {
                    value: CellValue::Number(rounded),
                    format: Some(code),
                }
            }
            _ => Self {
                value,
                format: None,
            },
        }
    }

    /// Text spliced into a larger string.
    fn render(&self, missing_value_text: &str) -> String {
        match (&self.value, self.format) {
            (CellValue::Empty, _) => missing_value_text.to_string(),
            (CellValue::Number(n), Some(code)) => format!("{n:.*}", decimals_in_format(code)),
            (value, _) => value.to_string(),
        }
    }
}

struct Filler<'a> {
    sheet: &'a mut Worksheet,
    styles: &'a mut StyleTable,
    missing_value_text: &'a str,
}

impl Filler<'_> {
    /// Replace markers in the text of `cell_ref`.
    ///
    /// A cell holding nothing but one marker takes the resolved value as is (numbers stay
    /// numbers); otherwise each marker is replaced inside the text. `resolve` returns `None` for
    /// markers this pass does not handle.
    fn substitute<F>(&mut self, cell_ref: CellRef, mut resolve: F) -> Result<(), ReportError>
    where
        F: FnMut(&Marker<'_>) -> Result<Option<Resolved>, ReportError>,
    {
        let Some(cell) = self.sheet.cell(cell_ref) else {
            return Ok(());
        };
        let Some(text) = cell.text().map(str::to_string) else {
            return Ok(());
        };
        let style_id = cell.style_id;

        let markers = find_markers(&text);
        if let [marker] = markers.as_slice() {
            if is_whole_cell(&text, marker) {
                if let Some(resolved) = resolve(marker)? {
                    let style_id = match resolved.format {
                        Some(code) if !resolved.value.is_empty() => {
                            self.styles.with_number_format(style_id, code)
                        }
                        _ => style_id,
                    };
                    self.sheet
                        .set_cell(cell_ref, Cell::new(resolved.value).with_style(style_id));
                }
                return Ok(());
            }
        }

        let missing = self.missing_value_text;
        let replaced = replace_markers(&text, |marker| {
            Ok::<_, ReportError>(resolve(marker)?.map(|resolved| resolved.render(missing)))
        })?;
        if replaced != text {
            let value = if replaced.is_empty() {
                CellValue::Empty
            } else {
                CellValue::String(replaced)
            };
            self.sheet.set_cell(cell_ref, Cell::new(value).with_style(style_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{JsonMetricSource, Metric};
    use pretty_assertions::assert_eq;

    fn a1(s: &str) -> CellRef {
        CellRef::from_a1(s).unwrap()
    }

    fn station(id: &str, name: &str, region: &str) -> Station {
        Station {
            id: id.into(),
            code: String::new(),
            name: name.into(),
            region: region.into(),
            basin: String::new(),
        }
    }

    fn template_workbook(cells: &[(&str, &str)]) -> Workbook {
        let mut workbook = Workbook::new();
        let idx = workbook.add_sheet("Bulletin");
        for (cell, text) in cells {
            workbook.sheets[idx].set_value(a1(cell), *text);
        }
        workbook
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn run(
        workbook: &mut Workbook,
        stations: &[Station],
        source: &JsonMetricSource,
    ) -> Result<GenerationSummary, ReportError> {
        let template =
            scan_and_validate(&workbook.sheets[0], TagRegistry::builtin(), ReportKind::Daily)?;
        let ctx = RunContext {
            stations,
            source,
            language: Language::En,
            report_kind: ReportKind::Daily,
        };
        fill_workbook(workbook, &template, date(), &ctx, "n/a")
    }

    fn column(workbook: &Workbook, col: &str, rows: std::ops::RangeInclusive<u32>) -> Vec<String> {
        rows.map(|row| {
            workbook.sheets[0]
                .value(a1(&format!("{col}{row}")))
                .to_string()
        })
        .collect()
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let workbook = template_workbook(&[("A1", "{{HEADER.SITE_REGION}}"), ("A2", "{{DATA.SITE_NAME}}")]);
        let template =
            scan_and_validate(&workbook.sheets[0], TagRegistry::builtin(), ReportKind::Daily).unwrap();
        let stations = [
            station("1", "e1", "A"),
            station("2", "e2", "B"),
            station("3", "e3", "A"),
        ];
        let source = JsonMetricSource::default();
        let ctx = RunContext {
            stations: &stations,
            source: &source,
            language: Language::En,
            report_kind: ReportKind::Daily,
        };
        let groups = group_stations(&template, &stations, date(), &ctx).unwrap();
        let summary: Vec<(String, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.key.to_string(), g.stations.iter().map(|s| s.name.as_str()).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A".to_string(), vec!["e1", "e3"]),
                ("B".to_string(), vec!["e2"]),
            ]
        );
    }

    #[test]
    fn group_keys_respect_value_types() {
        assert_ne!(
            GroupKey::from(&CellValue::Number(1.0)),
            GroupKey::from(&CellValue::from("1"))
        );
        assert_ne!(
            GroupKey::from(&CellValue::Boolean(true)),
            GroupKey::from(&CellValue::from("TRUE"))
        );
        assert_eq!(
            GroupKey::from(&CellValue::Number(0.0)),
            GroupKey::from(&CellValue::Number(-0.0))
        );
    }

    #[test]
    fn template_from_another_sheet_is_rejected() {
        let source = template_workbook(&[("A1", "{{HEADER.SITE_REGION}}"), ("A2", "{{DATA.SITE_NAME}}")]);
        let template =
            scan_and_validate(&source.sheets[0], TagRegistry::builtin(), ReportKind::Daily).unwrap();
        let mut other = Workbook::new();
        other.add_sheet("Summary");
        let stations = [station("1", "e1", "A")];
        let metrics = JsonMetricSource::default();
        let ctx = RunContext {
            stations: &stations,
            source: &metrics,
            language: Language::En,
            report_kind: ReportKind::Daily,
        };
        assert!(matches!(
            fill_workbook(&mut other, &template, date(), &ctx, ""),
            Err(ReportError::SheetNotFound(name)) if name == "Bulletin"
        ));
        assert_eq!(other.sheets[0].row_count(), 0);
    }

    #[test]
    fn expands_rows_and_shifts_trailing_content() {
        let mut workbook = template_workbook(&[
            ("A1", "Report for {{DATE}}"),
            ("A3", "{{HEADER.SITE_REGION}}"),
            ("A4", "{{DATA.SITE_NAME}}"),
            ("B4", "{{DATA.DISCHARGE_MORNING}}"),
            ("A6", "{{SITE_COUNT}} stations"),
        ]);
        let original_rows = workbook.sheets[0].row_count();
        let stations = [
            station("1", "Naryn", "North"),
            station("2", "Osh", "South"),
            station("3", "Chu", "North"),
        ];
        let mut source = JsonMetricSource::default();
        source.insert("1", date(), Metric::DischargeMorning, 123.456);
        source.insert("3", date(), Metric::DischargeMorning, 0.5);

        let summary = run(&mut workbook, &stations, &source).unwrap();
        assert_eq!(
            summary,
            GenerationSummary {
                groups: 2,
                stations: 3,
                inserted_rows: 4,
            }
        );
        assert_eq!(workbook.sheets[0].row_count(), original_rows + 4);
        assert_eq!(
            column(&workbook, "A", 1..=10),
            vec![
                "Report for 16 October 2026",
                "",
                "North",
                "Naryn",
                "Chu",
                "South",
                "Osh",
                "",
                "",
                "3 stations",
            ]
        );
        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.value(a1("B4")), &CellValue::Number(123.0));
        assert_eq!(sheet.value(a1("B5")), &CellValue::Number(0.5));
        assert_eq!(sheet.value(a1("B7")), &CellValue::Empty);
        let style = workbook.styles.get(sheet.cell(a1("B5")).unwrap().style_id).unwrap();
        assert_eq!(style.number_format.as_deref(), Some("0.000"));
    }

    #[test]
    fn substring_markers_keep_surrounding_text() {
        let mut workbook = template_workbook(&[
            ("A1", "Region: {{HEADER.SITE_REGION}}"),
            ("A2", "Discharge: {{DATA.DISCHARGE_MORNING}} m3/s"),
            ("B2", "{{DATA.WATER_LEVEL_MORNING}} cm"),
        ]);
        let stations = [station("1", "Naryn", "North")];
        let mut source = JsonMetricSource::default();
        source.insert("1", date(), Metric::DischargeMorning, 4.5);

        run(&mut workbook, &stations, &source).unwrap();
        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.value(a1("A1")), &CellValue::String("Region: North".into()));
        assert_eq!(
            sheet.value(a1("A2")),
            &CellValue::String("Discharge: 4.50 m3/s".into())
        );
        assert_eq!(sheet.value(a1("B2")), &CellValue::String("n/a cm".into()));
    }

    #[test]
    fn general_tags_on_template_rows_are_replicated() {
        let mut workbook = template_workbook(&[
            ("A1", "{{HEADER.SITE_REGION}}"),
            ("B1", "{{DATE_YEAR}}"),
            ("A2", "{{DATA.SITE_NAME}}"),
            ("B2", "{{DATE_DAY}}"),
        ]);
        let stations = [station("1", "Naryn", "North"), station("2", "Osh", "South")];
        run(&mut workbook, &stations, &JsonMetricSource::default()).unwrap();
        assert_eq!(column(&workbook, "B", 1..=4), vec!["2026", "16", "2026", "16"]);
        assert_eq!(workbook.sheets[0].value(a1("B3")), &CellValue::Number(2026.0));
    }

    #[test]
    fn empty_station_list_is_rejected() {
        let mut workbook =
            template_workbook(&[("A1", "{{HEADER.SITE_REGION}}"), ("A2", "{{DATA.SITE_NAME}}")]);
        assert!(matches!(
            run(&mut workbook, &[], &JsonMetricSource::default()),
            Err(ReportError::NoEntities)
        ));
    }

    #[test]
    fn layout_remaps_template_cells() {
        let groups = [
            StationGroup {
                key: CellValue::from("North"),
                stations: vec![],
            },
            StationGroup {
                key: CellValue::from("South"),
                stations: vec![],
            },
        ];
        let layout = Layout::new(4, &groups);
        assert_eq!(layout.header_rows, vec![4, 5]);
        assert_eq!(
            layout.remap(CellRef::new(9, 2), 4, 5, 3),
            vec![CellRef::new(12, 2)]
        );
        assert_eq!(layout.remap(CellRef::new(1, 0), 4, 5, 3), vec![CellRef::new(1, 0)]);
    }
}
