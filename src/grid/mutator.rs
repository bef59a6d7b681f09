//! Grid Mutator
//!
//! Label insertion and single-cell writes. Nothing is buffered and nothing
//! is rolled back: an insertion that succeeded stays even if a later write
//! fails.

use super::{GridError, Worksheet, HEADER_COLUMN, HEADER_ROW};
use tracing::debug;

pub struct GridMutator<'w, W: Worksheet + ?Sized> {
    sheet: &'w mut W,
}

impl<'w, W: Worksheet + ?Sized> GridMutator<'w, W> {
    pub fn new(sheet: &'w mut W) -> Self {
        Self { sheet }
    }

    /// New row at `position` holding `[label, initial_value]`.
    pub fn insert_row_label(
        &mut self,
        position: usize,
        label: &str,
        initial_value: &str,
    ) -> Result<(), GridError> {
        debug!(position, label, "inserting row");
        self.sheet.insert_row(position, &[label, initial_value])
    }

    /// New column at `position` holding only its label.
    pub fn insert_column_label(&mut self, position: usize, label: &str) -> Result<(), GridError> {
        debug!(position, label, "inserting column");
        self.sheet.insert_column(position, &[label])
    }

    /// Writes a label into an existing, unused header slot of the row axis.
    pub fn claim_row_label(&mut self, position: usize, label: &str) -> Result<(), GridError> {
        self.sheet.update_cell(position, HEADER_COLUMN, label)
    }

    /// Writes a label into an existing, unused header slot of the column axis.
    pub fn claim_column_label(&mut self, position: usize, label: &str) -> Result<(), GridError> {
        self.sheet.update_cell(HEADER_ROW, position, label)
    }

    pub fn write_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError> {
        self.sheet.update_cell(row, col, value)
    }
}
