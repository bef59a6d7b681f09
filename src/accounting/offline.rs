//! Replays captured portal responses from `<dir>/<vo>.json`.

use super::{parse_records, AccountingQuery, AccountingSource};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RecordsDirectory {
    root: PathBuf,
}

impl RecordsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, entity: &str) -> PathBuf {
        self.root.join(format!("{}.json", entity))
    }
}

impl AccountingSource for RecordsDirectory {
    fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value> {
        let path = self.path_for(query.entity);
        match std::fs::read_to_string(&path) {
            Ok(body) => parse_records(query.entity, &body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(vo = query.entity, path = ?path, "no captured records");
                Vec::new()
            }
            Err(e) => {
                warn!(vo = query.entity, path = ?path, error = %e, "failed to read captured records");
                Vec::new()
            }
        }
    }
}
