use std::path::Path;

use bulletin_xlsx::{XlsxPackageLimits, MAX_XLSX_PACKAGE_PART_BYTES, MAX_XLSX_PACKAGE_TOTAL_BYTES};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::language::Language;
use crate::tag::ReportKind;

/// Settings for a bulletin run, usually read from a JSON file.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulletinConfig {
    /// Template worksheet; the first sheet when unset.
    pub sheet: Option<String>,
    pub language: Language,
    pub report_kind: ReportKind,
    /// Written for a missing observation whose marker sits inside other text.
    pub missing_value_text: String,
    pub limits: PackageLimits,
}

/// Decompression limits applied when loading the template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageLimits {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_XLSX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_XLSX_PACKAGE_TOTAL_BYTES,
        }
    }
}

impl From<PackageLimits> for XlsxPackageLimits {
    fn from(limits: PackageLimits) -> Self {
        XlsxPackageLimits {
            max_part_bytes: limits.max_part_bytes,
            max_total_bytes: limits.max_total_bytes,
        }
    }
}

impl BulletinConfig {
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }
}
