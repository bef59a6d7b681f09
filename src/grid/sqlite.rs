//! SQLite-backed worksheet
//!
//! Each non-empty cell is one row of `cells`, keyed by worksheet name and
//! coordinate. Several worksheets (e.g. one per scope) can share a file.
//! Row and column insertions renumber coordinates inside a transaction so
//! a failed insertion leaves the worksheet untouched.

use super::{check_coordinate, trim_trailing_empty, GridError, Worksheet};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::info;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS cells (
    worksheet TEXT NOT NULL,
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (worksheet, row, col)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_cells_col
    ON cells(worksheet, col, row);
"#;

pub struct SqliteWorksheet {
    conn: Connection,
    worksheet: String,
}

fn storage(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> GridError {
    move |source| GridError::Storage { operation, source }
}

impl SqliteWorksheet {
    pub fn open(path: &Path, worksheet: &str) -> Result<Self, GridError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags).map_err(storage("open"))?;
        let sheet = Self::with_connection(conn, worksheet)?;
        info!(path = ?path, worksheet, "📊 Worksheet opened");
        Ok(sheet)
    }

    pub fn open_in_memory(worksheet: &str) -> Result<Self, GridError> {
        let conn = Connection::open_in_memory().map_err(storage("open"))?;
        Self::with_connection(conn, worksheet)
    }

    fn with_connection(conn: Connection, worksheet: &str) -> Result<Self, GridError> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(storage("schema initialisation"))?;
        Ok(Self {
            conn,
            worksheet: worksheet.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.worksheet
    }

    /// `(rows, columns)` spanned by non-empty cells.
    pub fn dimensions(&self) -> Result<(usize, usize), GridError> {
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(row), 0), COALESCE(MAX(col), 0) FROM cells WHERE worksheet = ?1",
                params![self.worksheet],
                |r| Ok((r.get::<_, i64>(0)? as usize, r.get::<_, i64>(1)? as usize)),
            )
            .map_err(storage("dimensions"))
    }

    /// Whole worksheet as dense rows.
    pub fn snapshot(&self) -> Result<Vec<Vec<String>>, GridError> {
        let (rows, cols) = self.dimensions()?;
        let mut grid = vec![vec![String::new(); cols]; rows];
        let mut stmt = self
            .conn
            .prepare("SELECT row, col, value FROM cells WHERE worksheet = ?1")
            .map_err(storage("snapshot"))?;
        let cells = stmt
            .query_map(params![self.worksheet], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
            })
            .map_err(storage("snapshot"))?;
        for cell in cells {
            let (row, col, value) = cell.map_err(storage("snapshot"))?;
            grid[row as usize - 1][col as usize - 1] = value;
        }
        Ok(grid)
    }

    fn line(&self, sql: &str, fixed: usize) -> Result<Vec<String>, GridError> {
        let mut stmt = self.conn.prepare(sql).map_err(storage("read"))?;
        let cells = stmt
            .query_map(params![self.worksheet, fixed as i64], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })
            .map_err(storage("read"))?;

        let mut values = Vec::new();
        for cell in cells {
            let (index, value) = cell.map_err(storage("read"))?;
            let index = index as usize;
            if values.len() < index {
                values.resize(index, String::new());
            }
            values[index - 1] = value;
        }
        Ok(trim_trailing_empty(values))
    }

    /// Moves every coordinate `>= index` on one axis by one.
    ///
    /// Goes through negative coordinates first so the primary key never
    /// collides half-way through the shift.
    fn shift(&mut self, axis: &str, index: usize, values: &[&str]) -> Result<(), GridError> {
        let tx = self.conn.transaction().map_err(storage("insert"))?;
        tx.execute(
            &format!(
                "UPDATE cells SET {axis} = -({axis} + 1) WHERE worksheet = ?1 AND {axis} >= ?2"
            ),
            params![self.worksheet, index as i64],
        )
        .map_err(storage("insert"))?;
        tx.execute(
            &format!("UPDATE cells SET {axis} = -{axis} WHERE worksheet = ?1 AND {axis} < 0"),
            params![self.worksheet],
        )
        .map_err(storage("insert"))?;

        for (offset, value) in values.iter().enumerate() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let (row, col) = if axis == "row" {
                (index, offset + 1)
            } else {
                (offset + 1, index)
            };
            tx.execute(
                "INSERT INTO cells (worksheet, row, col, value) VALUES (?1, ?2, ?3, ?4)",
                params![self.worksheet, row as i64, col as i64, value],
            )
            .map_err(storage("insert"))?;
        }
        tx.commit().map_err(storage("insert"))
    }
}

impl Worksheet for SqliteWorksheet {
    fn col_values(&self, col: usize) -> Result<Vec<String>, GridError> {
        check_coordinate(1, col)?;
        self.line(
            "SELECT row, value FROM cells WHERE worksheet = ?1 AND col = ?2 ORDER BY row",
            col,
        )
    }

    fn row_values(&self, row: usize) -> Result<Vec<String>, GridError> {
        check_coordinate(row, 1)?;
        self.line(
            "SELECT col, value FROM cells WHERE worksheet = ?1 AND row = ?2 ORDER BY col",
            row,
        )
    }

    fn insert_row(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
        check_coordinate(index, 1)?;
        self.shift("row", index, values)
    }

    fn insert_column(&mut self, index: usize, values: &[&str]) -> Result<(), GridError> {
        check_coordinate(1, index)?;
        self.shift("col", index, values)
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError> {
        check_coordinate(row, col)?;
        let value = value.trim();
        if value.is_empty() {
            self.conn
                .execute(
                    "DELETE FROM cells WHERE worksheet = ?1 AND row = ?2 AND col = ?3",
                    params![self.worksheet, row as i64, col as i64],
                )
                .map_err(storage("update"))?;
            return Ok(());
        }
        self.conn
            .execute(
                "INSERT INTO cells (worksheet, row, col, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(worksheet, row, col)
                 DO UPDATE SET value = excluded.value, updated_at = strftime('%s', 'now')",
                params![self.worksheet, row as i64, col as i64, value],
            )
            .map_err(storage("update"))?;
        Ok(())
    }

    fn cell(&self, row: usize, col: usize) -> Result<Option<String>, GridError> {
        check_coordinate(row, col)?;
        self.conn
            .query_row(
                "SELECT value FROM cells WHERE worksheet = ?1 AND row = ?2 AND col = ?3",
                params![self.worksheet, row as i64, col as i64],
                |r| r.get(0),
            )
            .optional()
            .map_err(storage("read"))
    }
}
