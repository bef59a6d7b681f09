//! Shared data types: accounting scope, reporting months and windows,
//! period labels and CPU-hour formatting.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Accounting scope queried on the portal and matched against registry type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Htc,
    Cloud,
}

impl Scope {
    /// Path segment used by the accounting portal and keyword searched in type tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Htc => "htc",
            Scope::Cloud => "cloud",
        }
    }

    /// Human label used in console output ("HTC CPU/h", "Cloud CPU/h").
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Htc => "HTC",
            Scope::Cloud => "Cloud",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "htc" => Ok(Scope::Htc),
            "cloud" => Ok(Scope::Cloud),
            other => Err(format!("unknown accounting scope '{}' (expected htc or cloud)", other)),
        }
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors raised while parsing reporting months and windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    Malformed { input: String },
    InvertedWindow { from: YearMonth, to: YearMonth },
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { input } => write!(
                f,
                "malformed date '{}' (expected YYYY/MM, YYYY-MM or a full YYYY/MM/DD date)",
                input
            ),
            Self::InvertedWindow { from, to } => {
                write!(f, "reporting window starts ({}) after it ends ({})", from, to)
            }
        }
    }
}

impl std::error::Error for DateError {}

/// A calendar month.
///
/// Ordering matches the lexicographic order of zero-padded `YYYY/MM` strings,
/// which is how validity windows have always been compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::from_date)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = DateError;

    /// Accepts `YYYY/MM`, `YYYY-MM`, `YYYY.MM` and the same with a trailing
    /// day. The day is validated and then dropped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DateError::Malformed {
            input: s.to_string(),
        };
        let normalized = s.trim().replace(|c: char| c == '/' || c == '.', "-");
        let full = match normalized.split('-').count() {
            2 => format!("{}-01", normalized),
            3 => normalized,
            _ => return Err(malformed()),
        };
        if full.split('-').next().map(str::len) != Some(4) {
            return Err(malformed());
        }
        NaiveDate::parse_from_str(&full, "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| malformed())
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// The `[from, to]` month range a run reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportingWindow {
    from: YearMonth,
    to: YearMonth,
}

impl ReportingWindow {
    pub fn new(from: YearMonth, to: YearMonth) -> Result<Self, DateError> {
        if from > to {
            return Err(DateError::InvertedWindow { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> YearMonth {
        self.from
    }

    pub fn to(&self) -> YearMonth {
        self.to
    }

    /// Row label of the reporting period: `YYYY.MM-MM`.
    ///
    /// Only the starting year is kept, so a window spanning a year boundary
    /// renders as e.g. `2024.11-02`.
    pub fn period_label(&self) -> String {
        format!(
            "{:04}.{:02}-{:02}",
            self.from.year, self.from.month, self.to.month
        )
    }
}

impl fmt::Display for ReportingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.from, self.to)
    }
}

/// Thousands-grouped integer right-aligned to seven characters.
pub fn format_cpu_hours(value: i64) -> String {
    format!("{:>7}", group_thousands(value))
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_year_month_formats() {
        assert_eq!(ym("2024/03"), YearMonth::new(2024, 3).unwrap());
        assert_eq!(ym("2024-03"), YearMonth::new(2024, 3).unwrap());
        assert_eq!(ym("2024.03"), YearMonth::new(2024, 3).unwrap());
        assert_eq!(ym("2024/03/31"), YearMonth::new(2024, 3).unwrap());
        assert_eq!(ym(" 2024-3 ").to_string(), "2024/03");
        let d = ym("2031-11-05");
        assert_eq!((d.year(), d.month()), (2031, 11));
    }

    #[test]
    fn test_year_month_rejects_garbage() {
        for bad in ["", "2024", "2024/13", "24/03", "2024/02/30", "march 2024", "2024/03/01/02"] {
            assert!(bad.parse::<YearMonth>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_year_month_order_matches_padded_strings() {
        assert!(ym("2023/12") < ym("2024/01"));
        assert!(ym("2024/02") < ym("2024/10"));
        assert_eq!(ym("2024/05"), ym("2024-05-17"));
    }

    #[test]
    fn test_period_label() {
        let window = ReportingWindow::new(ym("2024/01"), ym("2024/03")).unwrap();
        assert_eq!(window.period_label(), "2024.01-03");

        let across_years = ReportingWindow::new(ym("2024/11"), ym("2025/02")).unwrap();
        assert_eq!(across_years.period_label(), "2024.11-02");
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = ReportingWindow::new(ym("2024/06"), ym("2024/01")).unwrap_err();
        assert!(matches!(err, DateError::InvertedWindow { .. }));
    }

    #[test]
    fn test_format_cpu_hours() {
        assert_eq!(format_cpu_hours(0), "      0");
        assert_eq!(format_cpu_hours(300), "    300");
        assert_eq!(format_cpu_hours(1234), "  1,234");
        assert_eq!(format_cpu_hours(1_234_567), "1,234,567");
        assert_eq!(format_cpu_hours(-4500), " -4,500");
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("HTC".parse::<Scope>().unwrap(), Scope::Htc);
        assert_eq!("cloud".parse::<Scope>().unwrap(), Scope::Cloud);
        assert!("hpc".parse::<Scope>().is_err());
    }
}
