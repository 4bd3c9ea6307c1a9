use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::RegistryError;
use crate::station::Metric;
use crate::tag::{NumericFormatter, ReportKind, Tag, TagKind};

const DECADAL: &[ReportKind] = &[ReportKind::Decadal];

/// Name-indexed set of tags. Built once, then shared read-only.
#[derive(Clone, Debug, Default)]
pub struct TagRegistry {
    tags: Vec<Tag>,
    by_name: HashMap<&'static str, usize>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tag.
    pub fn builtin() -> &'static TagRegistry {
        static BUILTIN: OnceLock<TagRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut registry = TagRegistry::new();
            for tag in builtin_tags() {
                if let Err(err) = registry.register(tag) {
                    log::error!("built-in tag registry: {err}");
                }
            }
            registry
        })
    }

    pub fn register(&mut self, tag: Tag) -> Result<(), RegistryError> {
        if self.by_name.contains_key(tag.name) {
            return Err(RegistryError::DuplicateTag(tag.name.to_string()));
        }
        self.by_name.insert(tag.name, self.tags.len());
        self.tags.push(tag);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Tag, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownTag(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.by_name.get(name).map(|&idx| &self.tags[idx])
    }

    pub fn classify_for_report_kind(&self, tag: &Tag, kind: ReportKind) -> bool {
        tag.applies_to(kind)
    }

    /// Tags in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> + '_ {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn observation(name: &'static str, metric: Metric, description: &'static str) -> Tag {
    let formatter = match metric {
        Metric::DischargeMorning
        | Metric::DischargeEvening
        | Metric::DischargeDailyAverage
        | Metric::DischargeDecadeAverage
        | Metric::DischargeNorm => NumericFormatter::Discharge,
        Metric::WaterLevelMorning
        | Metric::WaterLevelEvening
        | Metric::WaterLevelDailyAverage
        | Metric::WaterLevelDecadeAverage => NumericFormatter::WaterLevel,
        Metric::AirTemperature | Metric::WaterTemperature => NumericFormatter::Temperature,
    };
    Tag::data(name, TagKind::Observation(metric), description).with_formatter(formatter)
}

fn builtin_tags() -> Vec<Tag> {
    vec![
        // General
        Tag::general("DATE", TagKind::Date, "Bulletin date"),
        Tag::general("DATE_DAY", TagKind::DateDay, "Day of month of the bulletin date"),
        Tag::general("DATE_MONTH", TagKind::DateMonth, "Month name of the bulletin date"),
        Tag::general("DATE_YEAR", TagKind::DateYear, "Year of the bulletin date"),
        Tag::general("YESTERDAY", TagKind::Date, "Day before the bulletin date").with_day_offset(-1),
        Tag::general("TOMORROW", TagKind::Date, "Day after the bulletin date").with_day_offset(1),
        Tag::general("DECADE", TagKind::Decade, "Decade of the month (1-3)").only_in(DECADAL),
        Tag::general("DECADE_START", TagKind::DecadeStart, "First day of the decade").only_in(DECADAL),
        Tag::general("DECADE_END", TagKind::DecadeEnd, "Last day of the decade").only_in(DECADAL),
        Tag::general("SITE_COUNT", TagKind::SiteCount, "Number of stations in the bulletin"),
        // Header
        Tag::header("SITE_REGION", TagKind::SiteRegion, "Region of the station"),
        Tag::header("SITE_BASIN", TagKind::SiteBasin, "River basin of the station"),
        // Data
        Tag::data("SITE_NAME", TagKind::SiteName, "Station name"),
        Tag::data("SITE_CODE", TagKind::SiteCode, "Station code"),
        observation("DISCHARGE_MORNING", Metric::DischargeMorning, "Morning discharge, m3/s"),
        observation(
            "DISCHARGE_MORNING_YESTERDAY",
            Metric::DischargeMorning,
            "Previous day's morning discharge, m3/s",
        )
        .with_day_offset(-1),
        observation("DISCHARGE_EVENING", Metric::DischargeEvening, "Evening discharge, m3/s"),
        observation(
            "DISCHARGE_EVENING_YESTERDAY",
            Metric::DischargeEvening,
            "Previous day's evening discharge, m3/s",
        )
        .with_day_offset(-1),
        observation(
            "DISCHARGE_DAILY_AVERAGE",
            Metric::DischargeDailyAverage,
            "Daily average discharge, m3/s",
        ),
        observation("DISCHARGE_NORM", Metric::DischargeNorm, "Long-term norm discharge, m3/s"),
        observation(
            "DISCHARGE_DECADE_AVERAGE",
            Metric::DischargeDecadeAverage,
            "Average discharge over the decade, m3/s",
        )
        .only_in(DECADAL),
        observation("WATER_LEVEL_MORNING", Metric::WaterLevelMorning, "Morning water level, cm"),
        observation(
            "WATER_LEVEL_MORNING_YESTERDAY",
            Metric::WaterLevelMorning,
            "Previous day's morning water level, cm",
        )
        .with_day_offset(-1),
        observation("WATER_LEVEL_EVENING", Metric::WaterLevelEvening, "Evening water level, cm"),
        observation(
            "WATER_LEVEL_DAILY_AVERAGE",
            Metric::WaterLevelDailyAverage,
            "Daily average water level, cm",
        ),
        Tag::data(
            "WATER_LEVEL_TREND",
            TagKind::WaterLevelTrend,
            "Change of the morning water level since the previous day, cm",
        )
        .with_formatter(NumericFormatter::WaterLevel),
        observation(
            "WATER_LEVEL_DECADE_AVERAGE",
            Metric::WaterLevelDecadeAverage,
            "Average water level over the decade, cm",
        )
        .only_in(DECADAL),
        observation("AIR_TEMPERATURE", Metric::AirTemperature, "Air temperature, °C"),
        observation("WATER_TEMPERATURE", Metric::WaterTemperature, "Water temperature, °C"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        let tags = builtin_tags();
        let mut registry = TagRegistry::new();
        for tag in tags.iter().cloned() {
            registry.register(tag).unwrap();
        }
        assert_eq!(registry.len(), tags.len());
        assert_eq!(TagRegistry::builtin().len(), tags.len());
    }

    #[test]
    fn duplicate_and_unknown_names() {
        let mut registry = TagRegistry::new();
        registry
            .register(Tag::general("DATE", TagKind::Date, "Bulletin date"))
            .unwrap();
        assert_eq!(
            registry.register(Tag::general("DATE", TagKind::DateDay, "")),
            Err(RegistryError::DuplicateTag("DATE".into()))
        );
        assert_eq!(
            registry.lookup("NOPE").unwrap_err(),
            RegistryError::UnknownTag("NOPE".into())
        );
    }

    #[test]
    fn decadal_tags_are_classified_by_kind() {
        let registry = TagRegistry::builtin();
        let decade = registry.lookup("DECADE").unwrap();
        assert!(!registry.classify_for_report_kind(decade, ReportKind::Daily));
        assert!(registry.classify_for_report_kind(decade, ReportKind::Decadal));
        let date = registry.lookup("DATE").unwrap();
        assert!(registry.classify_for_report_kind(date, ReportKind::Daily));
    }

    #[test]
    fn families_share_a_kind() {
        let registry = TagRegistry::builtin();
        let today = registry.lookup("DISCHARGE_MORNING").unwrap();
        let yesterday = registry.lookup("DISCHARGE_MORNING_YESTERDAY").unwrap();
        assert_eq!(today.kind, yesterday.kind);
        assert_eq!(yesterday.args.day_offset, -1);
        assert_eq!(today.formatter, Some(NumericFormatter::Discharge));
        let region = registry.lookup("SITE_REGION").unwrap();
        assert!(region.is_header && region.is_data);
    }
}
