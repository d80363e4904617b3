use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::category::{AgeField, PeriodField, StateCategory};

/// Current state of a work item as reported by the tracker.
///
/// Identity is owned by the external tracker; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub work_item_id: String,
    pub work_item_type_id: String,
    pub work_item_type: String,
    pub level: Option<String>,
    pub normalised_display_name: Option<String>,
    pub title: String,
    pub state: String,
    pub state_category: StateCategory,
    pub arrival_date: Option<DateTime<Utc>>,
    pub commitment_date: Option<DateTime<Utc>>,
    pub departure_date: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Read the timestamp behind a period anchor.
    #[must_use]
    pub const fn period_timestamp(&self, field: PeriodField) -> Option<DateTime<Utc>> {
        match field {
            PeriodField::ArrivalDate => self.arrival_date,
            PeriodField::CommitmentDate => self.commitment_date,
            PeriodField::DepartureDate => self.departure_date,
        }
    }

    /// Whole-day age for the given metric, counted on calendar dates in `tz`.
    ///
    /// Lead time runs from commitment (arrival when the item skipped
    /// commitment) to departure. WIP age runs from commitment to `as_of`,
    /// inventory age from arrival to `as_of`. Both ends count, so an item
    /// that starts and ends on the same day is one day old.
    ///
    /// Returns `None` when the anchor timestamps are missing.
    #[must_use]
    pub fn age_in_whole_days<Tz: TimeZone>(
        &self,
        field: AgeField,
        as_of: DateTime<Utc>,
        tz: &Tz,
    ) -> Option<i64> {
        let (start, end) = match field {
            AgeField::LeadTimeInWholeDays => {
                (self.commitment_date.or(self.arrival_date)?, self.departure_date?)
            }
            AgeField::WipAgeInWholeDays => (self.commitment_date?, as_of),
            AgeField::InventoryAgeInWholeDays => (self.arrival_date?, as_of),
        };
        Some(whole_days_between(
            start.with_timezone(tz).date_naive(),
            end.with_timezone(tz).date_naive(),
        ))
    }

    /// Label used when grouping by normalised display name.
    ///
    /// Falls back to the raw type name for unmapped types.
    #[must_use]
    pub fn display_group(&self) -> &str {
        self.normalised_display_name
            .as_deref()
            .unwrap_or(&self.work_item_type)
    }
}

/// Inclusive calendar-day count between two dates, never below one.
#[must_use]
pub fn whole_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end.signed_duration_since(start).num_days() + 1).max(1)
}
