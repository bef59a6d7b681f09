//! Metric records returned by the accounting portal

use serde_json::Value;
use std::fmt;

/// Marker of the aggregate record, the only one summed.
pub const TOTAL_MARKER: &str = "Total";
/// Marker of percentage pseudo-records. Wins over [`TOTAL_MARKER`].
pub const PERCENT_MARKER: &str = "Percent";

/// A record classified by its `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricRecord {
    /// Percentage breakdown, ignored.
    Percent { id: String },
    /// Aggregate record for the VO.
    Total { id: String, total: i64 },
    /// Per-provider breakdown, reported but never summed.
    Provider { id: String, total: i64 },
}

/// A record that does not have the shape the portal normally returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    NotAnObject,
    MissingField(&'static str),
    InvalidField { field: &'static str, value: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "record is not a JSON object"),
            Self::MissingField(field) => write!(f, "record has no '{}' field", field),
            Self::InvalidField { field, value } => {
                write!(f, "record field '{}' has unexpected value {}", field, value)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl MetricRecord {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let object = value.as_object().ok_or(RecordError::NotAnObject)?;
        let id = match object.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: "id",
                    value: other.to_string(),
                })
            }
            None => return Err(RecordError::MissingField("id")),
        };

        if id.contains(PERCENT_MARKER) {
            return Ok(Self::Percent { id });
        }

        let total = match object.get(TOTAL_MARKER) {
            Some(raw) => raw.as_i64().ok_or_else(|| RecordError::InvalidField {
                field: TOTAL_MARKER,
                value: raw.to_string(),
            })?,
            None => return Err(RecordError::MissingField(TOTAL_MARKER)),
        };

        if id.contains(TOTAL_MARKER) {
            Ok(Self::Total { id, total })
        } else {
            Ok(Self::Provider { id, total })
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Percent { id } | Self::Total { id, .. } | Self::Provider { id, .. } => id,
        }
    }

    /// Amount added to the VO and run totals.
    pub fn contribution(&self) -> i64 {
        match self {
            Self::Total { total, .. } => *total,
            _ => 0,
        }
    }
}
