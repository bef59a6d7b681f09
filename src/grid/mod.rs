//! Report Grid
//!
//! The report is a sparse worksheet: reporting periods down column A, VO
//! names across row 1, CPU hours at the intersections. Both header axes are
//! kept in ascending (lexicographic) order.
//!
//! Coordinates are 1-indexed like a spreadsheet. Cell A1 holds the header
//! marker [`HEADER_LABEL`].
//!
//! - [`positioner`] decides where a label belongs on an axis
//! - [`mutator`] inserts labels and writes cells
//! - [`report`] ties both together for the aggregator
//! - [`memory`] and [`sqlite`] are the worksheet backends

pub mod memory;
pub mod mutator;
pub mod positioner;
pub mod report;
pub mod sqlite;

pub use memory::MemoryWorksheet;
pub use mutator::GridMutator;
pub use positioner::{locate, resolve_vacant, Slot};
pub use report::{Axis, Placement, ReportGrid, Resolved};
pub use sqlite::SqliteWorksheet;

use std::fmt;

/// Label written in A1. Any axis label containing it is treated as header.
pub const HEADER_LABEL: &str = "Period";
/// Row holding the VO labels.
pub const HEADER_ROW: usize = 1;
/// Column holding the period labels.
pub const HEADER_COLUMN: usize = 1;
/// First data slot on either axis.
pub const FIRST_DATA_SLOT: usize = 2;

/// Failures of the backing document. Not recovered by the aggregator.
#[derive(Debug)]
pub enum GridError {
    InvalidCoordinate { row: usize, col: usize },
    Storage {
        operation: &'static str,
        source: rusqlite::Error,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCoordinate { row, col } => {
                write!(f, "invalid cell coordinate ({}, {}), grid is 1-indexed", row, col)
            }
            Self::Storage { operation, source } => {
                write!(f, "worksheet {} failed: {}", operation, source)
            }
        }
    }
}

impl std::error::Error for GridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::InvalidCoordinate { .. } => None,
        }
    }
}

/// Minimal spreadsheet surface the report needs.
///
/// Values are stored the way a spreadsheet stores typed-in input: surrounding
/// whitespace is dropped and an empty value clears the cell.
pub trait Worksheet {
    /// Column contents top to bottom, empty cells as `""`, trailing empties dropped.
    fn col_values(&self, col: usize) -> Result<Vec<String>, GridError>;

    /// Row contents left to right, empty cells as `""`, trailing empties dropped.
    fn row_values(&self, row: usize) -> Result<Vec<String>, GridError>;

    /// Inserts a row before `index`, shifting it and every later row down.
    fn insert_row(&mut self, index: usize, values: &[&str]) -> Result<(), GridError>;

    /// Inserts a column before `index`, shifting it and every later column right.
    fn insert_column(&mut self, index: usize, values: &[&str]) -> Result<(), GridError>;

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError>;

    fn cell(&self, row: usize, col: usize) -> Result<Option<String>, GridError>;
}

pub(crate) fn check_coordinate(row: usize, col: usize) -> Result<(), GridError> {
    if row == 0 || col == 0 {
        return Err(GridError::InvalidCoordinate { row, col });
    }
    Ok(())
}

pub(crate) fn trim_trailing_empty(mut values: Vec<String>) -> Vec<String> {
    while values.last().is_some_and(|v| v.is_empty()) {
        values.pop();
    }
    values
}
