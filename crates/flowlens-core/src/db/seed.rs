//! Write helpers for fixtures, tests, and benchmarks.
//!
//! Production stores are filled by an external loader; these helpers only
//! exist so the read path can be exercised against a real database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{SavedFilter, SnapshotStore};
use crate::model::{RawSnapshotRow, WorkItem};

impl SnapshotStore {
    /// Insert or replace a work item's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_work_item(&self, org_id: &str, item: &WorkItem) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO work_items (
                    org_id, work_item_id, work_item_type_id, work_item_type, level,
                    normalised_display_name, title, state, state_category,
                    arrival_date_us, commitment_date_us, departure_date_us
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    org_id,
                    item.work_item_id,
                    item.work_item_type_id,
                    item.work_item_type,
                    item.level,
                    item.normalised_display_name,
                    item.title,
                    item.state,
                    item.state_category.as_str(),
                    micros(item.arrival_date),
                    micros(item.commitment_date),
                    micros(item.departure_date),
                ],
            )
            .with_context(|| format!("insert work item '{}'", item.work_item_id))?;
        Ok(())
    }

    /// Append one raw snapshot row. `departure_date` on the row is ignored;
    /// it comes from `work_items` on read.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_snapshot(&self, org_id: &str, row: &RawSnapshotRow) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO snapshots (
                    org_id, work_item_id, snapshot_date_us, state, state_category,
                    state_type, step_category, title, assignee, work_item_type
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    org_id,
                    row.work_item_id,
                    row.snapshot_date.timestamp_micros(),
                    row.state,
                    row.state_category.as_str(),
                    row.state_type.as_str(),
                    row.step_category,
                    row.title,
                    row.assignee,
                    row.work_item_type,
                ],
            )
            .with_context(|| format!("insert snapshot for '{}'", row.work_item_id))?;
        Ok(())
    }

    /// Insert or replace a saved filter definition.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub fn insert_saved_filter(&self, filter: &SavedFilter) -> Result<()> {
        let type_ids = serde_json::to_string(&filter.work_item_type_ids)
            .context("serialize work_item_type_ids")?;
        let names = serde_json::to_string(&filter.normalised_display_names)
            .context("serialize normalised_display_names")?;

        self.conn()
            .execute(
                "INSERT OR REPLACE INTO saved_filters (
                    org_id, tag, name, work_item_type_ids, normalised_display_names
                 ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![filter.org_id, filter.tag, filter.name, type_ids, names],
            )
            .with_context(|| format!("insert saved filter '{}'", filter.tag))?;
        Ok(())
    }
}

fn micros(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|ts| ts.timestamp_micros())
}
