//! Domain model: lifecycle vocabulary, work items, and snapshots.

pub mod category;
pub mod item;
pub mod snapshot;

use std::fmt;

pub use category::{AgeField, Period, PeriodField, StateCategory, StateType};
pub use item::WorkItem;
pub use snapshot::{RawSnapshotRow, Snapshot};

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}
