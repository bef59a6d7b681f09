//! Period x VO report on top of a [`Worksheet`].

use super::{
    locate, resolve_vacant, GridError, GridMutator, Slot, Worksheet, HEADER_COLUMN,
    HEADER_LABEL, HEADER_ROW,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Reporting periods, down column A.
    Rows,
    /// VO names, across row 1.
    Columns,
}

/// What had to be done to get a label onto its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Found,
    /// An unused header slot was labelled in place.
    Claimed,
    Inserted,
}

/// A label's position after it was ensured on its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub position: usize,
    pub placement: Placement,
}

pub struct ReportGrid<W: Worksheet> {
    sheet: W,
}

impl<W: Worksheet> ReportGrid<W> {
    /// Wraps a worksheet, labelling A1 if the worksheet is blank there.
    pub fn new(mut sheet: W) -> Result<Self, GridError> {
        if sheet.cell(HEADER_ROW, HEADER_COLUMN)?.is_none() {
            sheet.update_cell(HEADER_ROW, HEADER_COLUMN, HEADER_LABEL)?;
        }
        Ok(Self { sheet })
    }

    pub fn sheet(&self) -> &W {
        &self.sheet
    }

    pub fn into_inner(self) -> W {
        self.sheet
    }

    pub fn axis_labels(&self, axis: Axis) -> Result<Vec<String>, GridError> {
        match axis {
            Axis::Rows => self.sheet.col_values(HEADER_COLUMN),
            Axis::Columns => self.sheet.row_values(HEADER_ROW),
        }
    }

    pub fn locate(&self, axis: Axis, label: &str) -> Result<Slot, GridError> {
        Ok(locate(&self.axis_labels(axis)?, label))
    }

    /// Row of the reporting period, inserted as `[label, 0]` when absent.
    pub fn ensure_period_row(&mut self, label: &str) -> Result<Resolved, GridError> {
        let resolved = self.ensure(Axis::Rows, label)?;
        match resolved.placement {
            Placement::Inserted => {
                info!(period = label, row = resolved.position, "adding the reporting period")
            }
            _ => info!(
                period = label,
                row = resolved.position,
                "reporting period already in the worksheet"
            ),
        }
        Ok(resolved)
    }

    /// Column of the VO, inserted when absent.
    pub fn ensure_entity_column(&mut self, name: &str) -> Result<Resolved, GridError> {
        let resolved = self.ensure(Axis::Columns, name)?;
        match resolved.placement {
            Placement::Inserted | Placement::Claimed => {
                info!(vo = name, column = resolved.position, "adding VO column")
            }
            Placement::Found => info!(vo = name, "VO already in the worksheet"),
        }
        Ok(resolved)
    }

    pub fn write_value(&mut self, row: usize, col: usize, value: &str) -> Result<(), GridError> {
        GridMutator::new(&mut self.sheet).write_cell(row, col, value)
    }

    /// Idempotent per `(axis, label)`: a label already present anywhere on
    /// the axis is never inserted twice.
    ///
    /// An unused slot is claimed only when it is the label's sorted place;
    /// otherwise the label is inserted so no populated header is overwritten
    /// and the axis stays ascending.
    fn ensure(&mut self, axis: Axis, label: &str) -> Result<Resolved, GridError> {
        let labels = self.axis_labels(axis)?;
        let slot = match locate(&labels, label) {
            Slot::Vacant(_) => resolve_vacant(&labels, label),
            slot => slot,
        };
        debug!(?axis, label, position = slot.position(), exists = slot.exists(), "label located");
        let position = slot.position();
        let mut mutator = GridMutator::new(&mut self.sheet);

        let placement = match slot {
            Slot::Existing(_) => Placement::Found,
            Slot::Vacant(_) => {
                match axis {
                    Axis::Rows => mutator.claim_row_label(position, label)?,
                    Axis::Columns => mutator.claim_column_label(position, label)?,
                }
                Placement::Claimed
            }
            Slot::Insert(_) => {
                match axis {
                    Axis::Rows => mutator.insert_row_label(position, label, "0")?,
                    Axis::Columns => mutator.insert_column_label(position, label)?,
                }
                Placement::Inserted
            }
        };

        Ok(Resolved {
            position,
            placement,
        })
    }
}
