//! In-memory worksheet, used for dry runs and tests.

use super::{check_coordinate, trim_trailing_empty, GridError, Worksheet};

/// Ragged row-major cell storage. Missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryWorksheet {
    rows: Vec<Vec<String>>,
}

impl MemoryWorksheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.trim().to_string()).collect())
                .collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn ensure_row(&mut self, row: usize) -> &mut Vec<String> {
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        &mut self.rows[row - 1]
    }
}

impl Worksheet for MemoryWorksheet {
    fn col_values(&self, col: usize) -> Result<Vec<String>, GridError> {
        check_coordinate(1, col)?;
        let values = self
            .rows
            .iter()
            .map(|row| row.get(col - 1).cloned().unwrap_or_default())
            .collect();
        Ok(trim_trailing_empty(values))
    }

    fn row_values(&self, row: usize) -> Result<Vec<String>, GridError> {
        check_coordinate(row, 1)?;
        Ok(trim_trailing_empty(
            self.rows.get(row - 1).cloned().unwrap_or_default(),
        ))
    }

    fn insert_row(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
        check_coordinate(index, 1)?;
        if self.rows.len() < index - 1 {
            self.rows.resize_with(index - 1, Vec::new);
        }
        let row = values.iter().map(|v| v.trim().to_string()).collect();
        self.rows.insert(index - 1, row);
        Ok(())
    }

    fn insert_column(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
        check_coordinate(1, index)?;
        if self.rows.len() < values.len() {
            self.rows.resize_with(values.len(), Vec::new);
        }
        for (r, row) in self.rows.iter_mut().enumerate() {
            let value = values.get(r).map(|v| v.trim()).unwrap_or_default();
            if row.len() >= index - 1 {
                row.insert(index - 1, value.to_string());
            } else if !value.is_empty() {
                row.resize(index - 1, String::new());
                row.push(value.to_string());
            }
        }
        Ok(())
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError> {
        check_coordinate(row, col)?;
        let cells = self.ensure_row(row);
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.trim().to_string();
        Ok(())
    }

    fn cell(&self, row: usize, col: usize) -> Result<Option<String>, GridError> {
        check_coordinate(row, col)?;
        Ok(self
            .rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .filter(|v| !v.is_empty())
            .cloned())
    }
}
