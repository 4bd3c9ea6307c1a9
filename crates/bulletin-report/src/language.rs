use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Language of resolved text (month names, long dates). Numbers are never localized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Ky,
}

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const MONTHS_RU: [&str; 12] = [
    "январь", "февраль", "март", "апрель", "май", "июнь", "июль", "август", "сентябрь",
    "октябрь", "ноябрь", "декабрь",
];

// Genitive forms used after a day number ("16 октября").
const MONTHS_RU_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
    "октября", "ноября", "декабря",
];

const MONTHS_KY: [&str; 12] = [
    "январь", "февраль", "март", "апрель", "май", "июнь", "июль", "август", "сентябрь",
    "октябрь", "ноябрь", "декабрь",
];

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Ky => "ky",
        }
    }

    pub fn month_name(self, month: u32) -> &'static str {
        let idx = (month.clamp(1, 12) - 1) as usize;
        match self {
            Language::En => MONTHS_EN[idx],
            Language::Ru => MONTHS_RU[idx],
            Language::Ky => MONTHS_KY[idx],
        }
    }

    /// Date as written in bulletin prose, e.g. `16 October 2026` / `16 октября 2026 г.`.
    pub fn long_date(self, date: NaiveDate) -> String {
        let idx = date.month0() as usize;
        let (day, year) = (date.day(), date.year());
        match self {
            Language::En => format!("{day} {} {year}", MONTHS_EN[idx]),
            Language::Ru => format!("{day} {} {year} г.", MONTHS_RU_GENITIVE[idx]),
            Language::Ky => format!("{year}-ж. {day}-{}", MONTHS_KY[idx]),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language {0:?} (expected en, ru or ky)")]
pub struct ParseLanguageError(String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ru" => Ok(Language::Ru),
            "ky" | "kg" => Ok(Language::Ky),
            _ => Err(ParseLanguageError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_dates_per_language() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(Language::En.long_date(date), "16 October 2026");
        assert_eq!(Language::Ru.long_date(date), "16 октября 2026 г.");
        assert_eq!(Language::Ky.long_date(date), "2026-ж. 16-октябрь");
        assert_eq!(Language::Ru.month_name(10), "октябрь");
    }

    #[test]
    fn parses_codes() {
        assert_eq!("RU".parse::<Language>(), Ok(Language::Ru));
        assert!("de".parse::<Language>().is_err());
    }
}
