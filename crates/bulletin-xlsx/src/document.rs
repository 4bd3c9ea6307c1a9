use std::io::{Read, Seek, Write};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use bulletin_model::Workbook;

use crate::openxml::{
    parse_relationships, parse_workbook_sheets, rels_part_name, resolve_target, Relationship,
    REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES, REL_TYPE_WORKSHEET,
};
use crate::read::parse_worksheet;
use crate::recalc::force_full_recalc;
use crate::row_shift::{shift_defined_names, RowEdits};
use crate::shared_strings::SharedStrings;
use crate::styles::StylesPart;
use crate::write::{patch_worksheet_xml, render_sheet_data, worksheet_prefix, RenderStats};
use crate::{XlsxError, XlsxPackage, XlsxPackageLimits};

const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const CONTENT_TYPE_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
const CONTENT_TYPE_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

#[derive(Debug, Clone)]
struct SheetPart {
    part_name: String,
    prefix: Option<String>,
}

/// A loaded `.xlsx` template: the editable [`Workbook`] plus the package it came from.
///
/// Saving regenerates sheet data, merges, shared strings and appended styles; every other part
/// is written back byte-for-byte.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    pub workbook: Workbook,
    package: XlsxPackage,
    workbook_part: String,
    sheet_parts: Vec<SheetPart>,
    shared_strings_part: Option<String>,
    shared_strings: SharedStrings,
    styles_part_name: Option<String>,
    styles: StylesPart,
}

impl XlsxDocument {
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::load_from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn load_from_bytes_limited(
        bytes: &[u8],
        limits: XlsxPackageLimits,
    ) -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::from_bytes_limited(bytes, limits)?)
    }

    pub fn load_from_reader<R: Read + Seek>(
        reader: R,
        limits: XlsxPackageLimits,
    ) -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::from_reader_limited(reader, limits)?)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::load_from_reader(std::io::BufReader::new(file), XlsxPackageLimits::default())
    }

    pub fn from_package(package: XlsxPackage) -> Result<Self, XlsxError> {
        let workbook_part = find_workbook_part(&package)?;
        let workbook_xml = package
            .part(&workbook_part)
            .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;
        let sheets = parse_workbook_sheets(workbook_xml)?;

        let rels = match package.part(&rels_part_name(&workbook_part)) {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };
        let target_of = |type_uri: &str| {
            rels.iter()
                .find(|rel| rel.type_uri == type_uri && !rel.is_external())
                .map(|rel| resolve_target(&workbook_part, &rel.target))
        };

        let shared_strings_part = target_of(REL_TYPE_SHARED_STRINGS);
        let shared_strings = match shared_strings_part.as_deref().and_then(|p| package.part(p)) {
            Some(bytes) => SharedStrings::parse(bytes)?,
            None => SharedStrings::default(),
        };

        let styles_part_name = target_of(REL_TYPE_STYLES);
        let styles =
            StylesPart::parse_or_default(styles_part_name.as_deref().and_then(|p| package.part(p)))?;

        let mut workbook = Workbook::new();
        let mut sheet_parts = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let Some(rel) = rels.iter().find(|rel| rel.id == sheet.rel_id) else {
                return Err(XlsxError::Invalid(format!(
                    "sheet {:?} references missing relationship {}",
                    sheet.name, sheet.rel_id
                )));
            };
            if rel.type_uri != REL_TYPE_WORKSHEET {
                // Chartsheets and dialog sheets carry no grid; they stay untouched in the package.
                log::debug!("skipping non-worksheet sheet {:?} ({})", sheet.name, rel.type_uri);
                continue;
            }
            let part_name = resolve_target(&workbook_part, &rel.target);
            let xml = package
                .part(&part_name)
                .ok_or_else(|| XlsxError::MissingPart(part_name.clone()))?;

            let idx = workbook.add_sheet(sheet.name.clone());
            let Workbook {
                sheets: worksheets,
                styles: style_table,
            } = &mut workbook;
            parse_worksheet(&mut worksheets[idx], &part_name, xml, &shared_strings, style_table)?;

            sheet_parts.push(SheetPart {
                prefix: worksheet_prefix(xml)?,
                part_name,
            });
        }

        log::debug!(
            "loaded workbook {workbook_part}: {} worksheets, {} shared strings, {} cell formats",
            sheet_parts.len(),
            shared_strings.len(),
            styles.cell_xfs_count()
        );

        Ok(Self {
            workbook,
            package,
            workbook_part,
            sheet_parts,
            shared_strings_part,
            shared_strings,
            styles_part_name,
            styles,
        })
    }

    /// Package part backing sheet `index`.
    pub fn sheet_part_name(&self, index: usize) -> Option<&str> {
        self.sheet_parts.get(index).map(|s| s.part_name.as_str())
    }

    /// Assemble the package for the current workbook state.
    ///
    /// `self` is not modified, so a document can be saved repeatedly.
    pub fn to_package(&self) -> Result<XlsxPackage, XlsxError> {
        let mut package = self.package.clone();
        let mut shared_strings = self.shared_strings.clone();
        let mut styles = self.styles.clone();
        let mut stats = RenderStats::default();
        let edits = RowEdits::from_workbook(&self.workbook);

        for (sheet, part) in self.workbook.sheets.iter().zip(&self.sheet_parts) {
            let original = package
                .part(&part.part_name)
                .ok_or_else(|| XlsxError::MissingPart(part.part_name.clone()))?;
            let sheet_data = render_sheet_data(
                sheet,
                part.prefix.as_deref(),
                &self.workbook.styles,
                &mut styles,
                &mut shared_strings,
                &mut stats,
            );
            let merges: Vec<_> = sheet.merges().iter().collect();
            let patched = patch_worksheet_xml(
                original,
                part.prefix.as_deref(),
                &sheet.name,
                &sheet_data,
                &merges,
                sheet.used_range(),
                &edits,
            )?;
            package.set_part(part.part_name.clone(), patched);
        }

        if !edits.is_empty() {
            if let Some(workbook_xml) = package.part(&self.workbook_part) {
                let shifted = shift_defined_names(workbook_xml, &edits)?;
                package.set_part(self.workbook_part.clone(), shifted);
            }
        }

        if self.shared_strings_part.is_some() || !shared_strings.is_empty() {
            let part_name = self
                .shared_strings_part
                .clone()
                .unwrap_or_else(|| "xl/sharedStrings.xml".to_string());
            if self.shared_strings_part.is_none() {
                register_part(
                    &mut package,
                    &self.workbook_part,
                    &part_name,
                    REL_TYPE_SHARED_STRINGS,
                    CONTENT_TYPE_SHARED_STRINGS,
                )?;
            }
            package.set_part(part_name, shared_strings.to_xml_bytes(stats.shared_string_refs));
        }

        if styles.is_modified() || self.styles_part_name.is_none() {
            let part_name = self
                .styles_part_name
                .clone()
                .unwrap_or_else(|| "xl/styles.xml".to_string());
            if self.styles_part_name.is_none() {
                register_part(
                    &mut package,
                    &self.workbook_part,
                    &part_name,
                    REL_TYPE_STYLES,
                    CONTENT_TYPE_STYLES,
                )?;
            }
            package.set_part(part_name, styles.to_xml_bytes()?);
        }

        if self.workbook.has_formulas() {
            force_full_recalc(&mut package, &self.workbook_part)?;
        }

        Ok(package)
    }

    pub fn save_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        self.to_package()?.write_to_bytes()
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), XlsxError> {
        self.to_package()?.write_to(writer)
    }

    /// Write to `path` atomically: the package is staged in a temporary file next to the
    /// destination and renamed over it only once fully written.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        let path = path.as_ref();
        let bytes = self.save_to_bytes()?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| XlsxError::Io(err.error))?;
        log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

fn find_workbook_part(package: &XlsxPackage) -> Result<String, XlsxError> {
    if let Some(rels) = package.part("_rels/.rels") {
        let rels: Vec<Relationship> = parse_relationships(rels)?;
        if let Some(rel) = rels.iter().find(|rel| rel.type_uri == REL_TYPE_OFFICE_DOCUMENT) {
            return Ok(resolve_target("", &rel.target));
        }
    }
    if package.part("xl/workbook.xml").is_some() {
        return Ok("xl/workbook.xml".to_string());
    }
    Err(XlsxError::MissingPart("xl/workbook.xml".to_string()))
}

/// Add a relationship from the workbook and a content-type override for a new part.
fn register_part(
    package: &mut XlsxPackage,
    workbook_part: &str,
    part_name: &str,
    rel_type: &str,
    content_type: &str,
) -> Result<(), XlsxError> {
    let rels_name = rels_part_name(workbook_part);
    if let Some(existing) = package.part(&rels_name) {
        let mut xml = String::from_utf8(existing.to_vec())?;
        let next = next_relationship_id(&parse_relationships(existing)?);
        let target = relative_target(workbook_part, part_name);
        let rel = format!(r#"<Relationship Id="rId{next}" Type="{rel_type}" Target="{target}"/>"#);
        if let Some(idx) = xml.rfind("</Relationships>") {
            xml.insert_str(idx, &rel);
        }
        package.set_part(rels_name, xml.into_bytes());
    }

    if let Some(existing) = package.part("[Content_Types].xml") {
        let mut xml = String::from_utf8(existing.to_vec())?;
        if !xml.contains(&format!(r#"PartName="/{part_name}""#)) {
            if let Some(idx) = xml.rfind("</Types>") {
                let insert = format!(
                    r#"<Override PartName="/{part_name}" ContentType="{content_type}"/>"#
                );
                xml.insert_str(idx, &insert);
            }
        }
        package.set_part("[Content_Types].xml", xml.into_bytes());
    }
    Ok(())
}

fn next_relationship_id(rels: &[Relationship]) -> u32 {
    rels.iter()
        .filter_map(|rel| rel.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// `part_name` relative to the directory of `source_part` when it lives beneath it.
fn relative_target(source_part: &str, part_name: &str) -> String {
    let dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    match part_name.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) if !dir.is_empty() => rest.to_string(),
        _ => format!("/{part_name}"),
    }
}
