//! Accounting Source
//!
//! Retrieval of per-VO accounting records. The portal client talks HTTP; the
//! records directory replays captured responses. Both degrade to an empty
//! record set on any failure.

pub mod offline;
pub mod portal;
pub mod record;

pub use offline::RecordsDirectory;
pub use portal::AccountingPortalClient;
pub use record::{MetricRecord, RecordError, PERCENT_MARKER, TOTAL_MARKER};

use crate::models::{ReportingWindow, Scope};
use serde_json::Value;
use tracing::warn;

/// Parameters of one accounting request.
#[derive(Debug, Clone, Copy)]
pub struct AccountingQuery<'a> {
    pub entity: &'a str,
    pub scope: Scope,
    pub metric: &'a str,
    pub window: ReportingWindow,
    pub local_job_selector: &'a str,
    pub data_selector: &'a str,
}

pub trait AccountingSource {
    /// Raw records for one VO, or an empty vector when nothing usable came back.
    fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value>;
}

impl<T: AccountingSource + ?Sized> AccountingSource for &T {
    fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value> {
        (**self).fetch(query)
    }
}

impl<T: AccountingSource + ?Sized> AccountingSource for Box<T> {
    fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value> {
        (**self).fetch(query)
    }
}

/// Decodes a response body into raw records.
///
/// Anything other than a JSON array is treated as "no data".
pub fn parse_records(entity: &str, body: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(records)) => records,
        Ok(other) => {
            warn!(
                vo = entity,
                kind = json_kind(&other),
                "accounting response is not a record list, ignoring it"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(vo = entity, error = %e, "accounting response is not valid JSON, ignoring it");
            Vec::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
