//! Ordered Grid Positioner
//!
//! Finds where a label sits, or belongs, on a sorted header axis.

use super::{FIRST_DATA_SLOT, HEADER_LABEL};

/// Outcome of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The label is already on the axis at this position.
    Existing(usize),
    /// The scan hit an unused (empty) label before finding the candidate.
    Vacant(usize),
    /// The label is absent and must be inserted at this position.
    Insert(usize),
}

impl Slot {
    pub fn position(&self) -> usize {
        match *self {
            Slot::Existing(p) | Slot::Vacant(p) | Slot::Insert(p) => p,
        }
    }

    /// `true` for an exact match and for an unused slot.
    pub fn exists(&self) -> bool {
        !matches!(self, Slot::Insert(_))
    }
}

/// Scans `labels` (the full axis, header cell included) for `candidate`.
///
/// Header cells are skipped. The scan stops at an exact match or at the first
/// empty label; otherwise every label sorting before `candidate` pushes the
/// position one slot further. Ordering is plain string ordering, which keeps
/// zero-padded period labels chronological.
pub fn locate<S: AsRef<str>>(labels: &[S], candidate: &str) -> Slot {
    let mut position = FIRST_DATA_SLOT;
    if labels.len() <= 1 {
        return Slot::Insert(position);
    }

    for label in labels.iter().map(AsRef::as_ref) {
        if label.contains(HEADER_LABEL) {
            continue;
        }
        if label == candidate {
            return Slot::Existing(position);
        }
        if label.is_empty() {
            return Slot::Vacant(position);
        }
        if label < candidate {
            position += 1;
        }
    }

    Slot::Insert(position)
}

/// Settles a [`Slot::Vacant`] scan against the whole axis.
///
/// A label already present after the gap is reported as
/// [`Slot::Existing`]. An unused slot is only offered when it lies after
/// every label sorting before `candidate` and before the first label sorting
/// after it; otherwise the candidate goes in front of that first larger
/// label.
pub fn resolve_vacant<S: AsRef<str>>(labels: &[S], candidate: &str) -> Slot {
    let mut last_smaller = 0;
    let mut next_larger = None;

    for (index, label) in labels.iter().map(AsRef::as_ref).enumerate() {
        let position = index + 1;
        if label.is_empty() || label.contains(HEADER_LABEL) {
            continue;
        }
        if label == candidate {
            return Slot::Existing(position);
        }
        if label < candidate {
            last_smaller = position;
        } else if next_larger.is_none() {
            next_larger = Some(position);
        }
    }

    let insert_at = next_larger.unwrap_or(labels.len() + 1);
    let gap = labels
        .iter()
        .map(AsRef::as_ref)
        .enumerate()
        .map(|(index, label)| (index + 1, label))
        .find(|&(position, label)| {
            label.is_empty()
                && position >= FIRST_DATA_SLOT
                && position > last_smaller
                && position < insert_at
        });

    match gap {
        Some((position, _)) => Slot::Vacant(position),
        None => Slot::Insert(insert_at),
    }
}
