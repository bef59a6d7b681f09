//! VO CPU-hour accounting
//!
//! Pulls per-VO CPU-hour totals from the EGI Accounting Portal and
//! reconciles them into a period x VO report worksheet.
//!
//! Exposes the engine for the binary and for integration tests.

pub mod accounting;
pub mod aggregator;
pub mod config;
pub mod grid;
pub mod models;
pub mod registry;

pub use aggregator::{Aggregator, EntityOutcome, EntityStatus, RunReport, RunSettings};
pub use grid::{GridError, ReportGrid, Worksheet};
pub use registry::Registry;
