//! VO entries of the registry and their eligibility rules

use crate::models::{DateError, ReportingWindow, Scope, YearMonth};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A registry date as written in the file, plus the month it denotes.
///
/// The original text is written back untouched when the registry is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegistryDate {
    text: String,
    month: YearMonth,
}

impl RegistryDate {
    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl TryFrom<String> for RegistryDate {
    type Error = DateError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        let month = text.parse()?;
        Ok(Self { text, month })
    }
}

impl From<RegistryDate> for String {
    fn from(date: RegistryDate) -> Self {
        date.text
    }
}

impl fmt::Display for RegistryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One organizational unit (VO) with its SLA validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "Name")]
    pub name: String,
    /// Free-form type tag, normally `htc` or `cloud`.
    #[serde(rename = "Type")]
    pub type_tag: String,
    #[serde(rename = "Active", with = "active_flag")]
    pub active: bool,
    #[serde(rename = "SLA_start")]
    pub validity_start: RegistryDate,
    #[serde(rename = "SLA_end")]
    pub validity_end: RegistryDate,
    #[serde(rename = "CPU/h", with = "cpu_hours", default)]
    pub cumulative_cpu_hours: i64,
    /// Fields this tool does not interpret, kept for write-back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why an entity was left out of a run. Checks run in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ScopeMismatch { type_tag: String, scope: Scope },
    NotYetValid { validity_start: YearMonth, from: YearMonth },
    Expired { validity_end: YearMonth, to: YearMonth },
    Inactive,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScopeMismatch { type_tag, scope } => {
                write!(f, "type '{}' does not serve scope {}", type_tag, scope)
            }
            Self::NotYetValid {
                validity_start,
                from,
            } => write!(f, "SLA starts {} after window start {}", validity_start, from),
            Self::Expired { validity_end, to } => {
                write!(f, "SLA ends {} before window end {}", validity_end, to)
            }
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl Entity {
    /// Whether the type tag mentions the scope keyword (case-insensitive).
    pub fn serves(&self, scope: Scope) -> bool {
        self.type_tag.to_ascii_lowercase().contains(scope.as_str())
    }

    /// Short-circuiting eligibility check: scope, SLA start, SLA end, active flag.
    pub fn eligibility(&self, scope: Scope, window: &ReportingWindow) -> Result<(), SkipReason> {
        if !self.serves(scope) {
            return Err(SkipReason::ScopeMismatch {
                type_tag: self.type_tag.clone(),
                scope,
            });
        }
        if window.from() < self.validity_start.month() {
            return Err(SkipReason::NotYetValid {
                validity_start: self.validity_start.month(),
                from: window.from(),
            });
        }
        if window.to() > self.validity_end.month() {
            return Err(SkipReason::Expired {
                validity_end: self.validity_end.month(),
                to: window.to(),
            });
        }
        if !self.active {
            return Err(SkipReason::Inactive);
        }
        Ok(())
    }
}

/// `"Y"` is active, anything else is not. JSON booleans are tolerated.
mod active_flag {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Text(String),
        Bool(bool),
    }

    pub fn serialize<S: Serializer>(active: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *active { "Y" } else { "N" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Text(text) => text.trim() == "Y",
            Flag::Bool(flag) => flag,
        })
    }
}

/// Counter stored either as a JSON integer or as a numeric string.
mod cpu_hours {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counter {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Counter::deserialize(deserializer)? {
            Counter::Number(value) => Ok(value),
            Counter::Text(text) => text.trim().parse().map_err(|_| {
                serde::de::Error::custom(format!("CPU/h counter '{}' is not an integer", text))
            }),
        }
    }
}
