use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use thiserror::Error;

use crate::zip_util::{read_zip_file_bytes_with_budget, zip_part_names_equivalent, ZipInflateBudget};

/// Maximum allowed *inflated* bytes for a single ZIP entry in an XLSX package.
pub const MAX_XLSX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all ZIP entries in an XLSX package.
pub const MAX_XLSX_PACKAGE_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Size limits enforced while inflating a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XlsxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_XLSX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_XLSX_PACKAGE_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),
    #[error("invalid merged range in {part}: {source}")]
    Merge {
        part: String,
        #[source]
        source: bulletin_model::MergeError,
    },
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// Raw OPC part map of an `.xlsx` file.
///
/// Parts are kept byte-for-byte; only the parts a caller replaces with [`XlsxPackage::set_part`]
/// change on write.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        Self::from_reader_limited(Cursor::new(bytes), limits)
    }

    pub fn from_reader_limited<R: Read + Seek>(
        reader: R,
        limits: XlsxPackageLimits,
    ) -> Result<Self, XlsxError> {
        let mut zip = zip::ZipArchive::new(reader)?;

        let mut parts = BTreeMap::new();
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let buf =
                read_zip_file_bytes_with_budget(&mut file, &name, limits.max_part_bytes, &mut budget)?;
            parts.insert(name, buf);
        }

        log::debug!(
            "loaded xlsx package: {} parts, {} bytes inflated",
            parts.len(),
            budget.used_bytes()
        );
        Ok(Self { parts })
    }

    /// Look up a part, tolerating a leading `/`, `\` separators and ASCII case differences.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        if let Some(bytes) = self.parts.get(name) {
            return Some(bytes.as_slice());
        }
        if let Some(stripped) = name.strip_prefix('/') {
            if let Some(bytes) = self.parts.get(stripped) {
                return Some(bytes.as_slice());
            }
        }
        self.parts
            .iter()
            .find(|(key, _)| zip_part_names_equivalent(key.as_str(), name))
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let key = self
            .parts
            .keys()
            .find(|key| zip_part_names_equivalent(key, name))
            .cloned()?;
        self.parts.remove(&key)
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn parts_round_trip_byte_for_byte() {
        let bytes = build_zip(&[("xl/workbook.xml", b"<workbook/>"), ("docProps/app.xml", b"app")]);
        let pkg = XlsxPackage::from_bytes(&bytes).unwrap();
        let rewritten = XlsxPackage::from_bytes(&pkg.write_to_bytes().unwrap()).unwrap();
        assert_eq!(rewritten.part("docProps/app.xml"), Some(&b"app"[..]));
        assert_eq!(rewritten.part("/XL/Workbook.xml"), Some(&b"<workbook/>"[..]));
    }

    #[test]
    fn total_limit_is_enforced() {
        let bytes = build_zip(&[("a.xml", b"0123456789"), ("b.xml", b"0123456789")]);
        let limits = XlsxPackageLimits {
            max_part_bytes: 100,
            max_total_bytes: 15,
        };
        let err = XlsxPackage::from_bytes_limited(&bytes, limits).unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { max: 15, .. }), "{err:?}");
    }
}
