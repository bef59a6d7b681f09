//! Aggregator
//!
//! One reconciliation run: resolve the period row, walk the registry, fetch
//! each eligible VO's records, fold the "Total" records into the run total
//! and write them into the VO's column.
//!
//! The run does not mutate the registry. It returns a [`RunReport`] with one
//! [`EntityOutcome`] per registry entry; cumulative counters are updated
//! afterwards with [`RunReport::apply_to`].

use crate::accounting::{AccountingQuery, AccountingSource, MetricRecord, RecordError};
use crate::grid::{GridError, Placement, ReportGrid, Worksheet};
use crate::models::{format_cpu_hours, ReportingWindow, Scope};
use crate::registry::{Entity, Registry, SkipReason};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Request parameters shared by every VO of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub scope: Scope,
    pub metric: String,
    pub window: ReportingWindow,
    pub local_job_selector: String,
    pub data_selector: String,
}

impl RunSettings {
    fn query<'a>(&'a self, entity: &'a str) -> AccountingQuery<'a> {
        AccountingQuery {
            entity,
            scope: self.scope,
            metric: &self.metric,
            window: self.window,
            local_job_selector: &self.local_job_selector,
            data_selector: &self.data_selector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// Filtered out before any fetch.
    Ineligible(SkipReason),
    /// The source returned nothing.
    NoData,
    /// Records came back but none of them was a Total record.
    NoTotal { records: usize },
    Reported { cpu_hours: i64, column: usize },
    /// A malformed record stopped processing; earlier records still count.
    Abandoned {
        cpu_hours: i64,
        column: Option<usize>,
        reason: RecordError,
    },
}

impl EntityStatus {
    /// CPU hours this VO added to the run.
    pub fn contributed(&self) -> i64 {
        match self {
            Self::Reported { cpu_hours, .. } | Self::Abandoned { cpu_hours, .. } => *cpu_hours,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOutcome {
    pub name: String,
    pub type_tag: String,
    pub status: EntityStatus,
}

/// Immutable result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scope: Scope,
    pub window: ReportingWindow,
    pub period_label: String,
    pub period_row: usize,
    pub period_placement: Placement,
    pub outcomes: Vec<EntityOutcome>,
    pub total_cpu_hours: i64,
}

impl RunReport {
    pub fn outcome(&self, name: &str) -> Option<&EntityOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn reported(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, EntityStatus::Reported { .. }))
    }

    pub fn abandoned(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, EntityStatus::Abandoned { .. }))
    }

    /// Adds each VO's contribution to its cumulative counter.
    /// Returns how many registry entries changed.
    pub fn apply_to(&self, registry: &mut Registry) -> usize {
        let mut updated = 0;
        for outcome in &self.outcomes {
            let contributed = outcome.status.contributed();
            if contributed == 0 {
                continue;
            }
            if let Some(entity) = registry.entity_mut(&outcome.name, &outcome.type_tag) {
                entity.cumulative_cpu_hours += contributed;
                updated += 1;
            }
        }
        updated
    }

    /// The closing report printed at the end of a run.
    pub fn summary(&self) -> String {
        let label = self.scope.label();
        let mut out = String::new();
        let _ = writeln!(out, "[REPORT]");
        let _ = writeln!(
            out,
            "- {} CPU/h consumed by the EGI Scientific Communities",
            label
        );
        let _ = writeln!(out, "- Reporting period = {}", self.window);
        let _ = writeln!(
            out,
            "- Total = {} {} CPU/h",
            format_cpu_hours(self.total_cpu_hours).trim(),
            label
        );
        let _ = write!(
            out,
            "- VOs reported = {}, abandoned = {}",
            self.reported().count(),
            self.abandoned().count()
        );
        out
    }
}

pub struct Aggregator<'a, S: AccountingSource + ?Sized> {
    settings: &'a RunSettings,
    source: &'a S,
}

impl<'a, S: AccountingSource + ?Sized> Aggregator<'a, S> {
    pub fn new(settings: &'a RunSettings, source: &'a S) -> Self {
        Self { settings, source }
    }

    /// Runs the reconciliation. Only worksheet failures are fatal.
    pub fn run<W: Worksheet>(
        &self,
        registry: &Registry,
        grid: &mut ReportGrid<W>,
    ) -> Result<RunReport, GridError> {
        let period_label = self.settings.window.period_label();
        let period = grid.ensure_period_row(&period_label)?;

        info!(
            scope = %self.settings.scope,
            "downloading accounting records from the accounting portal, this may take a few minutes"
        );

        let mut outcomes = Vec::with_capacity(registry.len());
        let mut total_cpu_hours = 0i64;

        for entity in registry.entities() {
            let status = match entity.eligibility(self.settings.scope, &self.settings.window) {
                Err(reason) => {
                    debug!(vo = %entity.name, %reason, "VO skipped");
                    EntityStatus::Ineligible(reason)
                }
                Ok(()) => self.process(entity, period.position, grid)?,
            };
            total_cpu_hours += status.contributed();
            outcomes.push(EntityOutcome {
                name: entity.name.clone(),
                type_tag: entity.type_tag.clone(),
                status,
            });
        }

        Ok(RunReport {
            scope: self.settings.scope,
            window: self.settings.window,
            period_label,
            period_row: period.position,
            period_placement: period.placement,
            outcomes,
            total_cpu_hours,
        })
    }

    fn process<W: Worksheet>(
        &self,
        entity: &Entity,
        period_row: usize,
        grid: &mut ReportGrid<W>,
    ) -> Result<EntityStatus, GridError> {
        let scope_label = self.settings.scope.label();
        let records = self.source.fetch(&self.settings.query(&entity.name));
        if records.is_empty() {
            debug!(vo = %entity.name, "no accounting records");
            return Ok(EntityStatus::NoData);
        }

        info!(
            vo = %entity.name.to_uppercase(),
            records = records.len(),
            "fetching the accounting records"
        );

        let mut cpu_hours = 0i64;
        let mut column = None;

        for raw in &records {
            let record = match MetricRecord::from_value(raw) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(vo = %entity.name, %reason, "malformed accounting record, skipping the rest of this VO");
                    return Ok(EntityStatus::Abandoned {
                        cpu_hours,
                        column,
                        reason,
                    });
                }
            };

            match &record {
                MetricRecord::Percent { .. } => continue,
                MetricRecord::Provider { total, .. } => {
                    info!(provider = %record.id(), cpu_hours = %format_cpu_hours(*total), "- Provider");
                    continue;
                }
                MetricRecord::Total { .. } => {}
            }

            let total = record.contribution();
            info!(
                cpu_hours = %format_cpu_hours(total),
                "- Total {} CPU/h", scope_label
            );
            cpu_hours += total;

            let col = grid.ensure_entity_column(&entity.name)?.position;
            grid.write_value(period_row, col, &format_cpu_hours(total))?;
            info!(vo = %entity.name, row = period_row, column = col, "updated the total {} CPU/h for the VO", scope_label);
            column = Some(col);
        }

        Ok(match column {
            Some(column) => EntityStatus::Reported { cpu_hours, column },
            None => EntityStatus::NoTotal {
                records: records.len(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Axis, MemoryWorksheet};
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Canned responses keyed by VO name; remembers who was asked.
    #[derive(Default)]
    struct CannedSource {
        responses: HashMap<String, Vec<Value>>,
        fetched: RefCell<Vec<String>>,
    }

    impl CannedSource {
        fn with(mut self, vo: &str, records: Value) -> Self {
            let records = match records {
                Value::Array(r) => r,
                other => panic!("expected array, got {}", other),
            };
            self.responses.insert(vo.to_string(), records);
            self
        }
    }

    impl AccountingSource for CannedSource {
        fn fetch(&self, query: &AccountingQuery<'_>) -> Vec<Value> {
            self.fetched.borrow_mut().push(query.entity.to_string());
            self.responses.get(query.entity).cloned().unwrap_or_default()
        }
    }

    fn vo(name: &str, kind: &str, active: &str, start: &str, end: &str) -> Value {
        json!({"Name": name, "Type": kind, "Active": active,
               "SLA_start": start, "SLA_end": end, "CPU/h": 100})
    }

    fn registry(vos: Vec<Value>) -> Registry {
        Registry::from_json(&json!([{"vos": [{"vo": vos}]}]).to_string()).unwrap()
    }

    fn settings(scope: Scope) -> RunSettings {
        RunSettings {
            scope,
            metric: "sum_elap_processors".into(),
            window: ReportingWindow::new("2024/01".parse().unwrap(), "2024/03".parse().unwrap())
                .unwrap(),
            local_job_selector: "onlyinfrajobs".into(),
            data_selector: "JSON".into(),
        }
    }

    fn grid() -> ReportGrid<MemoryWorksheet> {
        ReportGrid::new(MemoryWorksheet::new()).unwrap()
    }

    #[test]
    fn test_single_vo_end_to_end() {
        let registry = registry(vec![vo("ALPHA", "htc", "Y", "2023/01", "2025/12")]);
        let source = CannedSource::default().with(
            "ALPHA",
            json!([{"id": "ALPHA-site1", "Total": 40}, {"id": "ALPHA-Total", "Total": 300}]),
        );
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid)
            .unwrap();

        assert_eq!(report.period_label, "2024.01-03");
        assert_eq!(report.period_row, 2);
        assert_eq!(report.period_placement, Placement::Inserted);
        assert_eq!(report.total_cpu_hours, 300);
        assert_eq!(
            report.outcome("ALPHA").unwrap().status,
            EntityStatus::Reported { cpu_hours: 300, column: 2 }
        );
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period", "ALPHA"]);
        assert_eq!(grid.sheet().cell(2, 2).unwrap().as_deref(), Some("300"));

        let mut registry = registry;
        assert_eq!(report.apply_to(&mut registry), 1);
        assert_eq!(registry.entities().next().unwrap().cumulative_cpu_hours, 400);
    }

    #[test]
    fn test_columns_alphabetical_regardless_of_order() {
        let registry = registry(vec![
            vo("BETA", "htc", "Y", "2023/01", "2025/12"),
            vo("ALPHA", "htc", "Y", "2023/01", "2025/12"),
        ]);
        let source = CannedSource::default()
            .with("ALPHA", json!([{"id": "ALPHA-Total", "Total": 1}]))
            .with("BETA", json!([{"id": "BETA-Total", "Total": 2}]));
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid)
            .unwrap();

        assert_eq!(*source.fetched.borrow(), ["BETA", "ALPHA"]);
        assert_eq!(
            grid.axis_labels(Axis::Columns).unwrap(),
            ["Period", "ALPHA", "BETA"]
        );
        // BETA was written at column 2 first, then shifted right by ALPHA
        assert_eq!(grid.sheet().cell(2, 2).unwrap().as_deref(), Some("1"));
        assert_eq!(grid.sheet().cell(2, 3).unwrap().as_deref(), Some("2"));
        assert_eq!(report.total_cpu_hours, 3);
    }

    #[test]
    fn test_ineligible_vos_are_not_fetched_or_written() {
        let registry = registry(vec![
            vo("cloudy", "cloud", "Y", "2023/01", "2025/12"),
            vo("early", "htc", "Y", "2024/02", "2025/12"),
            vo("late", "htc", "Y", "2023/01", "2024/02"),
            vo("idle", "htc", "N", "2023/01", "2025/12"),
        ]);
        let mut source = CannedSource::default();
        for name in ["cloudy", "early", "late", "idle"] {
            source = source.with(name, json!([{"id": "x-Total", "Total": 99}]));
        }
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid)
            .unwrap();

        assert!(source.fetched.borrow().is_empty());
        assert_eq!(report.total_cpu_hours, 0);
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period"]);
        let reasons: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| match &o.status {
                EntityStatus::Ineligible(reason) => reason.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(matches!(reasons[0], SkipReason::ScopeMismatch { .. }));
        assert!(matches!(reasons[1], SkipReason::NotYetValid { .. }));
        assert!(matches!(reasons[2], SkipReason::Expired { .. }));
        assert_eq!(reasons[3], SkipReason::Inactive);
    }

    #[test]
    fn test_percent_records_do_not_contribute() {
        let registry = registry(vec![vo("ALPHA", "htc", "Y", "2023/01", "2025/12")]);
        let source = CannedSource::default().with(
            "ALPHA",
            json!([{"id": "Total", "Total": 100}, {"id": "UK-Total-Percent", "Total": 50}]),
        );
        let settings = settings(Scope::Htc);
        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid())
            .unwrap();
        assert_eq!(report.total_cpu_hours, 100);
    }

    #[test]
    fn test_malformed_record_is_entity_local() {
        let registry = registry(vec![
            vo("ALPHA", "htc", "Y", "2023/01", "2025/12"),
            vo("BETA", "htc", "Y", "2023/01", "2025/12"),
        ]);
        let source = CannedSource::default()
            .with(
                "ALPHA",
                json!([{"id": "ALPHA-Total", "Total": 7}, {"id": "ALPHA-site"}, {"id": "ALPHA-Total", "Total": 1000}]),
            )
            .with("BETA", json!([{"id": "BETA-Total", "Total": 5}]));
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid)
            .unwrap();

        assert_eq!(
            report.outcome("ALPHA").unwrap().status,
            EntityStatus::Abandoned {
                cpu_hours: 7,
                column: Some(2),
                reason: RecordError::MissingField("Total"),
            }
        );
        assert_eq!(
            report.outcome("BETA").unwrap().status,
            EntityStatus::Reported { cpu_hours: 5, column: 3 }
        );
        assert_eq!(report.total_cpu_hours, 12);
        assert_eq!(report.abandoned().count(), 1);
        assert_eq!(grid.sheet().cell(2, 2).unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn test_empty_and_total_less_responses() {
        let registry = registry(vec![
            vo("ALPHA", "htc", "Y", "2023/01", "2025/12"),
            vo("BETA", "htc", "Y", "2023/01", "2025/12"),
        ]);
        let source = CannedSource::default()
            .with("BETA", json!([{"id": "BETA-site", "Total": 5}, {"id": "Percent"}]));
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid)
            .unwrap();

        assert_eq!(report.outcome("ALPHA").unwrap().status, EntityStatus::NoData);
        assert_eq!(
            report.outcome("BETA").unwrap().status,
            EntityStatus::NoTotal { records: 2 }
        );
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period"]);
    }

    #[test]
    fn test_rerun_updates_in_place() {
        let registry = registry(vec![vo("ALPHA", "htc", "Y", "2023/01", "2025/12")]);
        let settings = settings(Scope::Htc);
        let mut grid = grid();

        let first = CannedSource::default().with("ALPHA", json!([{"id": "ALPHA-Total", "Total": 10}]));
        Aggregator::new(&settings, &first).run(&registry, &mut grid).unwrap();

        let second =
            CannedSource::default().with("ALPHA", json!([{"id": "ALPHA-Total", "Total": 2500}]));
        let report = Aggregator::new(&settings, &second)
            .run(&registry, &mut grid)
            .unwrap();

        assert_eq!(report.period_placement, Placement::Found);
        assert_eq!(grid.axis_labels(Axis::Rows).unwrap(), ["Period", "2024.01-03"]);
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period", "ALPHA"]);
        assert_eq!(grid.sheet().cell(2, 2).unwrap().as_deref(), Some("2,500"));
    }

    #[test]
    fn test_summary_text() {
        let registry = registry(vec![vo("ALPHA", "cloud", "Y", "2023/01", "2025/12")]);
        let source =
            CannedSource::default().with("ALPHA", json!([{"id": "ALPHA-Total", "Total": 12345}]));
        let settings = settings(Scope::Cloud);
        let report = Aggregator::new(&settings, &source)
            .run(&registry, &mut grid())
            .unwrap();

        let summary = report.summary();
        assert!(summary.starts_with("[REPORT]\n"));
        assert!(summary.contains("- Cloud CPU/h consumed by the EGI Scientific Communities"));
        assert!(summary.contains("- Reporting period = 2024/01 - 2024/03"));
        assert!(summary.contains("- Total = 12,345 Cloud CPU/h"));
    }

    /// In-memory sheet that starts failing after a number of column
    /// insertions, or on every cell write below the header row.
    struct FailingSheet {
        inner: MemoryWorksheet,
        column_inserts_left: usize,
        fail_value_writes: bool,
    }

    impl FailingSheet {
        fn new(column_inserts_left: usize, fail_value_writes: bool) -> Self {
            Self {
                inner: MemoryWorksheet::from_rows(&[&["Period"]]),
                column_inserts_left,
                fail_value_writes,
            }
        }

        fn refused(operation: &'static str) -> GridError {
            GridError::Storage {
                operation,
                source: rusqlite::Error::InvalidQuery,
            }
        }
    }

    impl Worksheet for FailingSheet {
        fn col_values(&self, col: usize) -> Result<Vec<String>, GridError> {
            self.inner.col_values(col)
        }

        fn row_values(&self, row: usize) -> Result<Vec<String>, GridError> {
            self.inner.row_values(row)
        }

        fn insert_row(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
            self.inner.insert_row(index, values)
        }

        fn insert_column(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
            if self.column_inserts_left == 0 {
                return Err(Self::refused("insert"));
            }
            self.column_inserts_left -= 1;
            self.inner.insert_column(index, values)
        }

        fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError> {
            if self.fail_value_writes && row > 1 && col > 1 {
                return Err(Self::refused("update"));
            }
            self.inner.update_cell(row, col, value)
        }

        fn cell(&self, row: usize, col: usize) -> Result<Option<String>, GridError> {
            self.inner.cell(row, col)
        }
    }

    fn two_vos() -> (Registry, CannedSource) {
        let registry = registry(vec![
            vo("ALPHA", "htc", "Y", "2023/01", "2025/12"),
            vo("BETA", "htc", "Y", "2023/01", "2025/12"),
        ]);
        let source = CannedSource::default()
            .with("ALPHA", json!([{"id": "ALPHA-Total", "Total": 300}]))
            .with("BETA", json!([{"id": "BETA-Total", "Total": 5}]));
        (registry, source)
    }

    #[test]
    fn test_failed_column_insert_aborts_and_keeps_earlier_work() {
        let (registry, source) = two_vos();
        let settings = settings(Scope::Htc);
        let mut grid = ReportGrid::new(FailingSheet::new(1, false)).unwrap();

        let result = Aggregator::new(&settings, &source).run(&registry, &mut grid);
        assert!(matches!(result, Err(GridError::Storage { operation: "insert", .. })));

        // Nothing is rolled back
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period", "ALPHA"]);
        assert_eq!(grid.axis_labels(Axis::Rows).unwrap(), ["Period", "2024.01-03"]);
        assert_eq!(grid.sheet().cell(2, 2).unwrap().as_deref(), Some("300"));
    }

    #[test]
    fn test_failed_cell_write_aborts_after_column_insert() {
        let (registry, source) = two_vos();
        let settings = settings(Scope::Htc);
        let mut grid = ReportGrid::new(FailingSheet::new(usize::MAX, true)).unwrap();

        let result = Aggregator::new(&settings, &source).run(&registry, &mut grid);
        assert!(matches!(result, Err(GridError::Storage { operation: "update", .. })));

        // ALPHA's column went in before its write failed; BETA was never reached
        assert_eq!(grid.axis_labels(Axis::Columns).unwrap(), ["Period", "ALPHA"]);
        assert_eq!(*source.fetched.borrow(), ["ALPHA"]);
    }
}
