//! Tags: named placeholders and how they resolve to cell values.

use std::fmt;
use std::str::FromStr;

use bulletin_model::CellValue;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::station::{Metric, RunContext, Station};

/// Bulletin flavour a template is generated for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    #[default]
    Daily,
    /// Ten-day period bulletins.
    Decadal,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportKind::Daily => "daily",
            ReportKind::Decadal => "decadal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported report kind {0:?} (expected daily or decadal)")]
pub struct ParseReportKindError(String);

impl FromStr for ReportKind {
    type Err = ParseReportKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(ReportKind::Daily),
            "decadal" | "decade" => Ok(ReportKind::Decadal),
            _ => Err(ParseReportKindError(s.to_string())),
        }
    }
}

/// Report kinds a tag may be used in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKinds {
    All,
    Only(&'static [ReportKind]),
}

impl ReportKinds {
    pub fn contains(self, kind: ReportKind) -> bool {
        match self {
            ReportKinds::All => true,
            ReportKinds::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// Resolver selected by a tag. Families of tags differing only in their [`TagArgs`] share a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    /// Long localized date.
    Date,
    DateDay,
    /// Localized month name.
    DateMonth,
    DateYear,
    /// Decade of the month (1, 2 or 3).
    Decade,
    DecadeStart,
    DecadeEnd,
    SiteCount,
    SiteRegion,
    SiteBasin,
    SiteName,
    SiteCode,
    Observation(Metric),
    /// Morning water level minus the previous morning's.
    WaterLevelTrend,
}

impl TagKind {
    fn needs_station(self) -> bool {
        matches!(
            self,
            TagKind::SiteRegion
                | TagKind::SiteBasin
                | TagKind::SiteName
                | TagKind::SiteCode
                | TagKind::Observation(_)
                | TagKind::WaterLevelTrend
        )
    }
}

/// Fixed arguments merged into every resolution of a tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagArgs {
    /// Days added to the report date before resolving.
    pub day_offset: i64,
}

/// Rounding rule applied to numeric tag values.
///
/// Produces the number format code for the destination cell together with the rounded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericFormatter {
    /// Hydrological rounding: three significant figures for small flows, whole numbers from 100.
    Discharge,
    /// Whole centimetres.
    WaterLevel,
    /// One decimal.
    Temperature,
}

impl NumericFormatter {
    pub fn format(self, value: f64) -> (&'static str, f64) {
        let code = match self {
            NumericFormatter::Discharge => {
                let magnitude = value.abs();
                if magnitude < 1.0 {
                    "0.000"
                } else if magnitude < 10.0 {
                    "0.00"
                } else if magnitude < 100.0 {
                    "0.0"
                } else {
                    "0"
                }
            }
            NumericFormatter::WaterLevel => "0",
            NumericFormatter::Temperature => "0.0",
        };
        (code, round_to(value, decimals_in_format(code)))
    }
}

/// Number of decimals a plain `0.00`-style format code shows.
pub fn decimals_in_format(code: &str) -> usize {
    code.split_once('.')
        .map(|(_, frac)| frac.chars().take_while(|c| *c == '0' || *c == '#').count())
        .unwrap_or(0)
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Immutable descriptor of one placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: TagKind,
    pub is_header: bool,
    pub is_data: bool,
    pub report_kinds: ReportKinds,
    pub args: TagArgs,
    pub formatter: Option<NumericFormatter>,
}

impl Tag {
    pub fn general(name: &'static str, kind: TagKind, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            is_header: false,
            is_data: false,
            report_kinds: ReportKinds::All,
            args: TagArgs { day_offset: 0 },
            formatter: None,
        }
    }

    pub fn data(name: &'static str, kind: TagKind, description: &'static str) -> Self {
        Self {
            is_data: true,
            ..Self::general(name, kind, description)
        }
    }

    /// A tag usable both to group stations and inside data rows.
    pub fn header(name: &'static str, kind: TagKind, description: &'static str) -> Self {
        Self {
            is_header: true,
            is_data: true,
            ..Self::general(name, kind, description)
        }
    }

    pub fn with_day_offset(mut self, day_offset: i64) -> Self {
        self.args.day_offset = day_offset;
        self
    }

    pub fn with_formatter(mut self, formatter: NumericFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn only_in(mut self, kinds: &'static [ReportKind]) -> Self {
        self.report_kinds = ReportKinds::Only(kinds);
        self
    }

    pub fn is_general(&self) -> bool {
        !self.is_header && !self.is_data
    }

    pub fn applies_to(&self, kind: ReportKind) -> bool {
        self.report_kinds.contains(kind)
    }

    /// Resolve with this tag's own arguments.
    pub fn resolve(
        &self,
        station: Option<&Station>,
        date: NaiveDate,
        ctx: &RunContext<'_>,
    ) -> Result<CellValue, ResolveError> {
        resolve_kind(self.kind, station, date, ctx, self.args)
    }
}

/// Uniform resolver entry point for every [`TagKind`].
pub fn resolve_kind(
    kind: TagKind,
    station: Option<&Station>,
    date: NaiveDate,
    ctx: &RunContext<'_>,
    args: TagArgs,
) -> Result<CellValue, ResolveError> {
    let date = shift(date, args.day_offset)?;
    let station = match (kind.needs_station(), station) {
        (true, None) => return Err(ResolveError::MissingStation),
        (_, station) => station,
    };

    let value = match kind {
        TagKind::Date => CellValue::String(ctx.language.long_date(date)),
        TagKind::DateDay => CellValue::Number(f64::from(date.day())),
        TagKind::DateMonth => CellValue::String(ctx.language.month_name(date.month()).to_string()),
        TagKind::DateYear => CellValue::Number(f64::from(date.year())),
        TagKind::Decade => CellValue::Number(f64::from(decade_of(date))),
        TagKind::DecadeStart => CellValue::String(ctx.language.long_date(decade_bounds(date).0)),
        TagKind::DecadeEnd => CellValue::String(ctx.language.long_date(decade_bounds(date).1)),
        TagKind::SiteCount => CellValue::Number(ctx.stations.len() as f64),
        TagKind::SiteRegion => text(station.map(|s| s.region.as_str())),
        TagKind::SiteBasin => text(station.map(|s| s.basin.as_str())),
        TagKind::SiteName => text(station.map(|s| s.name.as_str())),
        TagKind::SiteCode => text(station.map(|s| s.code.as_str())),
        TagKind::Observation(metric) => match station {
            Some(station) => ctx
                .source
                .metric(station, metric, date)?
                .map_or(CellValue::Empty, CellValue::Number),
            None => CellValue::Empty,
        },
        TagKind::WaterLevelTrend => match station {
            Some(station) => {
                let previous = shift(date, -1)?;
                let today = ctx.source.metric(station, Metric::WaterLevelMorning, date)?;
                let yesterday = ctx.source.metric(station, Metric::WaterLevelMorning, previous)?;
                match (today, yesterday) {
                    (Some(today), Some(yesterday)) => CellValue::Number(today - yesterday),
                    _ => CellValue::Empty,
                }
            }
            None => CellValue::Empty,
        },
    };
    Ok(value)
}

fn text(value: Option<&str>) -> CellValue {
    match value {
        Some(s) if !s.is_empty() => CellValue::String(s.to_string()),
        _ => CellValue::Empty,
    }
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, ResolveError> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or(ResolveError::DateOutOfRange { date, days })
}

/// Decade of the month: days 1-10, 11-20, and 21 to month end.
pub fn decade_of(date: NaiveDate) -> u32 {
    match date.day() {
        1..=10 => 1,
        11..=20 => 2,
        _ => 3,
    }
}

/// First and last day of the decade containing `date`.
pub fn decade_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start_day = (decade_of(date) - 1) * 10 + 1;
    let start = date.with_day(start_day).unwrap_or(date);
    let end = match decade_of(date) {
        1 | 2 => date.with_day(start_day + 9).unwrap_or(date),
        _ => last_day_of_month(date),
    };
    (start, end)
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::station::JsonMetricSource;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn discharge_rounding_follows_magnitude() {
        let f = NumericFormatter::Discharge;
        assert_eq!(f.format(0.12345), ("0.000", 0.123));
        assert_eq!(f.format(4.567), ("0.00", 4.57));
        assert_eq!(f.format(45.67), ("0.0", 45.7));
        assert_eq!(f.format(456.7), ("0", 457.0));
        assert_eq!(NumericFormatter::Temperature.format(-3.26), ("0.0", -3.3));
        assert_eq!(NumericFormatter::WaterLevel.format(231.6), ("0", 232.0));
    }

    #[test]
    fn format_decimals() {
        assert_eq!(decimals_in_format("0.000"), 3);
        assert_eq!(decimals_in_format("0"), 0);
        assert_eq!(decimals_in_format("#,##0.0"), 1);
    }

    #[test]
    fn decades() {
        assert_eq!(decade_bounds(ymd(2026, 2, 25)), (ymd(2026, 2, 21), ymd(2026, 2, 28)));
        assert_eq!(decade_bounds(ymd(2026, 12, 31)), (ymd(2026, 12, 21), ymd(2026, 12, 31)));
        assert_eq!(decade_bounds(ymd(2026, 10, 16)), (ymd(2026, 10, 11), ymd(2026, 10, 20)));
        assert_eq!(decade_of(ymd(2026, 10, 10)), 1);
    }

    #[test]
    fn resolves_offsets_and_trend() {
        let mut source = JsonMetricSource::default();
        let station = Station {
            id: "15102".into(),
            code: "NR".into(),
            name: "Naryn".into(),
            region: "North".into(),
            basin: String::new(),
        };
        source.insert("15102", ymd(2026, 10, 15), Metric::WaterLevelMorning, 210.0);
        source.insert("15102", ymd(2026, 10, 16), Metric::WaterLevelMorning, 214.0);
        let stations = [station.clone()];
        let ctx = RunContext {
            stations: &stations,
            source: &source,
            language: Language::En,
            report_kind: ReportKind::Daily,
        };
        let date = ymd(2026, 10, 16);

        let yesterday = Tag::general("YESTERDAY", TagKind::Date, "").with_day_offset(-1);
        assert_eq!(
            yesterday.resolve(None, date, &ctx).unwrap(),
            CellValue::String("15 October 2026".into())
        );
        let trend = Tag::data("WATER_LEVEL_TREND", TagKind::WaterLevelTrend, "");
        assert_eq!(trend.resolve(Some(&station), date, &ctx).unwrap(), CellValue::Number(4.0));
        assert_eq!(
            trend.resolve(Some(&station), ymd(2026, 10, 15), &ctx).unwrap(),
            CellValue::Empty
        );
        assert!(matches!(
            trend.resolve(None, date, &ctx),
            Err(ResolveError::MissingStation)
        ));
        let basin = Tag::header("SITE_BASIN", TagKind::SiteBasin, "");
        assert_eq!(basin.resolve(Some(&station), date, &ctx).unwrap(), CellValue::Empty);
    }
}
