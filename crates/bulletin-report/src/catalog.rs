use serde::Serialize;

use crate::registry::TagRegistry;
use crate::tag::ReportKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Tags usable in templates of one report kind, by where they may appear.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TagCatalog {
    pub general: Vec<TagInfo>,
    pub header: Vec<TagInfo>,
    pub data: Vec<TagInfo>,
}

impl TagCatalog {
    pub fn for_report_kind(registry: &TagRegistry, kind: ReportKind) -> Self {
        let mut catalog = TagCatalog::default();
        for tag in registry
            .iter()
            .filter(|tag| registry.classify_for_report_kind(tag, kind))
        {
            let info = TagInfo {
                name: tag.name,
                description: tag.description,
            };
            if tag.is_general() {
                catalog.general.push(info.clone());
            }
            if tag.is_header {
                catalog.header.push(info.clone());
            }
            if tag.is_data {
                catalog.data.push(info);
            }
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(infos: &[TagInfo]) -> Vec<&'static str> {
        infos.iter().map(|info| info.name).collect()
    }

    #[test]
    fn header_tags_are_listed_as_data_too() {
        let catalog = TagCatalog::for_report_kind(TagRegistry::builtin(), ReportKind::Daily);
        assert_eq!(names(&catalog.header), vec!["SITE_REGION", "SITE_BASIN"]);
        assert!(names(&catalog.data).contains(&"SITE_REGION"));
        assert!(!names(&catalog.general).contains(&"DECADE"));
        assert!(!names(&catalog.data).contains(&"DISCHARGE_DECADE_AVERAGE"));
    }

    #[test]
    fn decadal_catalog_serializes() {
        let catalog = TagCatalog::for_report_kind(TagRegistry::builtin(), ReportKind::Decadal);
        let json = serde_json::to_value(&catalog).unwrap();
        let general = json["general"].as_array().unwrap();
        assert!(general.iter().any(|tag| tag["name"] == "DECADE_START"));
        assert_eq!(json["header"][0]["description"], "Region of the station");
    }
}
