use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::category::{StateCategory, StateType};

/// One per-day observation exactly as the snapshot provider returns it.
///
/// Carries the item's current departure timestamp so the reconstructor can
/// apply the departure exclusion and state type override without a second
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshotRow {
    pub work_item_id: String,
    pub snapshot_date: DateTime<Utc>,
    pub departure_date: Option<DateTime<Utc>>,
    pub state: String,
    pub state_category: StateCategory,
    pub state_type: StateType,
    pub step_category: String,
    pub title: Option<String>,
    pub assignee: Option<String>,
    pub work_item_type: Option<String>,
}

/// A cleaned per-day observation in the caller's timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub work_item_id: String,
    pub snapshot_date: DateTime<Tz>,
    pub state: String,
    pub state_category: StateCategory,
    pub state_type: StateType,
    pub step_category: String,
    pub title: Option<String>,
    pub assignee: Option<String>,
    pub work_item_type: Option<String>,
    /// True when gap fill synthesized this row.
    pub interpolated: bool,
}

impl Snapshot {
    /// Calendar date of the snapshot in its timezone.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.snapshot_date.date_naive()
    }

    pub(crate) fn from_raw(row: RawSnapshotRow, tz: Tz) -> Self {
        Self {
            work_item_id: row.work_item_id,
            snapshot_date: row.snapshot_date.with_timezone(&tz),
            state: row.state,
            state_category: row.state_category,
            state_type: row.state_type,
            step_category: row.step_category,
            title: row.title,
            assignee: row.assignee,
            work_item_type: row.work_item_type,
            interpolated: false,
        }
    }
}
