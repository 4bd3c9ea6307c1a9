//! Stations and the data-access seam tags resolve through.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;
use crate::tag::ReportKind;

/// A monitoring station (the entity a bulletin data row describes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub code: String,
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub basin: String,
}

/// Observed or derived quantity a data tag reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DischargeMorning,
    DischargeEvening,
    DischargeDailyAverage,
    DischargeDecadeAverage,
    DischargeNorm,
    WaterLevelMorning,
    WaterLevelEvening,
    WaterLevelDailyAverage,
    WaterLevelDecadeAverage,
    AirTemperature,
    WaterTemperature,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::DischargeMorning => "discharge_morning",
            Metric::DischargeEvening => "discharge_evening",
            Metric::DischargeDailyAverage => "discharge_daily_average",
            Metric::DischargeDecadeAverage => "discharge_decade_average",
            Metric::DischargeNorm => "discharge_norm",
            Metric::WaterLevelMorning => "water_level_morning",
            Metric::WaterLevelEvening => "water_level_evening",
            Metric::WaterLevelDailyAverage => "water_level_daily_average",
            Metric::WaterLevelDecadeAverage => "water_level_decade_average",
            Metric::AirTemperature => "air_temperature",
            Metric::WaterTemperature => "water_temperature",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("{metric} for station {station} on {date} is unavailable: {reason}")]
    Unavailable {
        station: String,
        metric: Metric,
        date: NaiveDate,
        reason: String,
    },
    #[error("metric source failed: {0}")]
    Source(String),
}

/// Source of station observations.
///
/// `Ok(None)` means there is no observation for that day; it substitutes as an empty value.
/// Any `Err` aborts bulletin generation.
pub trait MetricSource: Send + Sync {
    fn metric(
        &self,
        station: &Station,
        metric: Metric,
        date: NaiveDate,
    ) -> Result<Option<f64>, MetricError>;
}

#[derive(Debug, Deserialize)]
struct Observation {
    station: String,
    date: NaiveDate,
    metric: Metric,
    value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Dataset {
    #[serde(default)]
    stations: Vec<Station>,
    #[serde(default)]
    observations: Vec<Observation>,
}

/// In-memory [`MetricSource`] backed by a JSON document:
///
/// ```json
/// {"stations": [{"id": "15102", "name": "Naryn", "region": "North"}],
///  "observations": [{"station": "15102", "date": "2026-10-16",
///                    "metric": "discharge_morning", "value": 12.34}]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonMetricSource {
    stations: Vec<Station>,
    values: HashMap<(String, NaiveDate, Metric), f64>,
}

impl JsonMetricSource {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let dataset: Dataset = serde_json::from_str(json)?;
        let mut source = Self {
            stations: dataset.stations,
            values: HashMap::with_capacity(dataset.observations.len()),
        };
        for obs in dataset.observations {
            if let Some(value) = obs.value {
                source.insert(obs.station, obs.date, obs.metric, value);
            }
        }
        log::debug!(
            "loaded {} stations and {} observations",
            source.stations.len(),
            source.values.len()
        );
        Ok(source)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, crate::ReportError> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn insert(&mut self, station: impl Into<String>, date: NaiveDate, metric: Metric, value: f64) {
        self.values.insert((station.into(), date, metric), value);
    }
}

impl MetricSource for JsonMetricSource {
    fn metric(
        &self,
        station: &Station,
        metric: Metric,
        date: NaiveDate,
    ) -> Result<Option<f64>, MetricError> {
        Ok(self.values.get(&(station.id.clone(), date, metric)).copied())
    }
}

/// Shared, read-only state handed to every resolver during one bulletin run.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub stations: &'a [Station],
    pub source: &'a dyn MetricSource,
    pub language: Language,
    pub report_kind: ReportKind,
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("stations", &self.stations.len())
            .field("language", &self.language)
            .field("report_kind", &self.report_kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_source_reads_stations_and_observations() {
        let source = JsonMetricSource::from_json(
            r#"{
                "stations": [{"id": "15102", "code": "NR", "name": "Naryn", "region": "North"}],
                "observations": [
                    {"station": "15102", "date": "2026-10-16", "metric": "discharge_morning", "value": 12.34},
                    {"station": "15102", "date": "2026-10-16", "metric": "air_temperature", "value": null}
                ]
            }"#,
        )
        .unwrap();
        let naryn = &source.stations()[0];
        assert_eq!(naryn.basin, "");
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(source.metric(naryn, Metric::DischargeMorning, date).unwrap(), Some(12.34));
        assert_eq!(source.metric(naryn, Metric::AirTemperature, date).unwrap(), None);
    }
}
