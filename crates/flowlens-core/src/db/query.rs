//! Read contract between the engine and its data source.
//!
//! [`SnapshotProvider`] and [`WorkItemProvider`] are the collaborator seams
//! the reconstructor and the metric calculators depend on. [`SnapshotStore`]
//! implements both over SQLite; tests and other backends can supply their
//! own implementations.
//!
//! Query structs are plain immutable values. Optional id lists follow one
//! rule: `None` means "no filter", `Some(empty)` means "match nothing".

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{Row, params, params_from_iter, types::Type};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::SnapshotStore;
use crate::error::FlowError;
use crate::model::{ParseEnumError, PeriodField, RawSnapshotRow, StateCategory, WorkItem};

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Inclusive UTC instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidDateRange`] when the bounds are reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FlowError> {
        if start > end {
            return Err(FlowError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Optional descriptive snapshot columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotColumn {
    Title,
    Assignee,
    WorkItemType,
}

/// Parameters for one snapshot fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotQuery {
    pub org_id: String,
    /// Descriptive columns to load; `None` loads all of them.
    pub columns: Option<Vec<SnapshotColumn>>,
    /// Target timezone for reconstruction; `None` uses the configured default.
    pub timezone: Option<Tz>,
    pub work_item_ids: Option<Vec<String>>,
    pub work_item_type_ids: Option<Vec<String>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl SnapshotQuery {
    #[must_use]
    pub fn for_org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            ..Self::default()
        }
    }

    /// True when the descriptive column should be populated.
    #[must_use]
    pub fn wants(&self, column: SnapshotColumn) -> bool {
        self.columns
            .as_ref()
            .is_none_or(|columns| columns.contains(&column))
    }

    fn matches_nothing(&self) -> bool {
        self.work_item_ids.as_ref().is_some_and(Vec::is_empty)
            || self.work_item_type_ids.as_ref().is_some_and(Vec::is_empty)
    }
}

/// Parameters for one work item population fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItemQuery {
    pub org_id: String,
    pub state_category: Option<StateCategory>,
    /// Keep items whose anchor timestamp falls inside the range.
    pub date_filter: Option<(PeriodField, DateRange)>,
    pub work_item_ids: Option<Vec<String>>,
    pub work_item_type_ids: Option<Vec<String>>,
    pub normalised_display_names: Option<Vec<String>>,
}

impl WorkItemQuery {
    #[must_use]
    pub fn for_org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            ..Self::default()
        }
    }

    fn matches_nothing(&self) -> bool {
        [
            &self.work_item_ids,
            &self.work_item_type_ids,
            &self.normalised_display_names,
        ]
        .iter()
        .any(|list| list.as_ref().is_some_and(Vec::is_empty))
    }
}

/// An organisation-scoped saved filter definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilter {
    pub org_id: String,
    pub tag: String,
    pub name: String,
    pub work_item_type_ids: Vec<String>,
    pub normalised_display_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Source of raw per-day snapshot rows.
pub trait SnapshotProvider {
    /// Fetch raw rows joined with each item's current departure timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    fn get_snapshots(&self, query: &SnapshotQuery) -> Result<Vec<RawSnapshotRow>>;
}

/// Source of current work item state.
pub trait WorkItemProvider {
    /// Fetch the work items matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    fn get_work_items(&self, query: &WorkItemQuery) -> Result<Vec<WorkItem>>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

impl SnapshotProvider for SnapshotStore {
    #[instrument(skip_all, fields(org = %query.org_id))]
    fn get_snapshots(&self, query: &SnapshotQuery) -> Result<Vec<RawSnapshotRow>> {
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut sql = SqlBuilder::default();
        sql.condition("s.org_id = ?", Box::new(query.org_id.clone()));
        if let Some(ids) = &query.work_item_ids {
            sql.in_list("s.work_item_id", ids);
        }
        if let Some(type_ids) = &query.work_item_type_ids {
            sql.in_list("w.work_item_type_id", type_ids);
        }
        if let Some(start) = query.start_date {
            sql.condition("s.snapshot_date_us >= ?", Box::new(start.timestamp_micros()));
        }
        if let Some(end) = query.end_date {
            sql.condition("s.snapshot_date_us <= ?", Box::new(end.timestamp_micros()));
        }

        let optional = |column: SnapshotColumn, name: &str| {
            if query.wants(column) {
                format!("s.{name}")
            } else {
                "NULL".to_string()
            }
        };

        let statement = format!(
            "SELECT s.work_item_id, s.snapshot_date_us, w.departure_date_us, \
             s.state, s.state_category, s.state_type, s.step_category, {}, {}, {} \
             FROM snapshots s \
             LEFT JOIN work_items w ON w.org_id = s.org_id AND w.work_item_id = s.work_item_id\
             {} ORDER BY s.snapshot_id",
            optional(SnapshotColumn::Title, "title"),
            optional(SnapshotColumn::Assignee, "assignee"),
            optional(SnapshotColumn::WorkItemType, "work_item_type"),
            sql.where_clause(),
        );

        let rows = sql
            .query(self.conn(), &statement, row_to_raw_snapshot)
            .context("execute get_snapshots query")?;
        debug!(rows = rows.len(), "fetched raw snapshots");
        Ok(rows)
    }
}

impl WorkItemProvider for SnapshotStore {
    #[instrument(skip_all, fields(org = %query.org_id, category = ?query.state_category))]
    fn get_work_items(&self, query: &WorkItemQuery) -> Result<Vec<WorkItem>> {
        if query.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut sql = SqlBuilder::default();
        sql.condition("w.org_id = ?", Box::new(query.org_id.clone()));
        if let Some(category) = query.state_category {
            sql.condition("w.state_category = ?", Box::new(category.as_str()));
        }
        if let Some((field, range)) = query.date_filter {
            let column = field.column();
            sql.condition(
                &format!("w.{column} >= ?"),
                Box::new(range.start().timestamp_micros()),
            );
            sql.condition(
                &format!("w.{column} <= ?"),
                Box::new(range.end().timestamp_micros()),
            );
        }
        if let Some(ids) = &query.work_item_ids {
            sql.in_list("w.work_item_id", ids);
        }
        if let Some(type_ids) = &query.work_item_type_ids {
            sql.in_list("w.work_item_type_id", type_ids);
        }
        if let Some(names) = &query.normalised_display_names {
            sql.in_list("w.normalised_display_name", names);
        }

        let statement = format!(
            "SELECT w.work_item_id, w.work_item_type_id, w.work_item_type, w.level, \
             w.normalised_display_name, w.title, w.state, w.state_category, \
             w.arrival_date_us, w.commitment_date_us, w.departure_date_us \
             FROM work_items w{} ORDER BY w.work_item_id",
            sql.where_clause(),
        );

        let items = sql
            .query(self.conn(), &statement, row_to_work_item)
            .context("execute get_work_items query")?;
        debug!(items = items.len(), "fetched work items");
        Ok(items)
    }
}

impl SnapshotStore {
    /// Fetch one saved filter by organisation and tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored id lists are not
    /// valid JSON arrays.
    pub fn get_saved_filter(&self, org_id: &str, tag: &str) -> Result<Option<SavedFilter>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT org_id, tag, name, work_item_type_ids, normalised_display_names \
                 FROM saved_filters WHERE org_id = ?1 AND tag = ?2",
            )
            .context("prepare get_saved_filter")?;

        let result = stmt.query_row(params![org_id, tag], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        });

        let (org_id, tag, name, type_ids, names) = match result {
            Ok(fields) => fields,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e).context(format!("get_saved_filter for '{org_id}/{tag}'")),
        };

        Ok(Some(SavedFilter {
            work_item_type_ids: serde_json::from_str(&type_ids)
                .with_context(|| format!("parse work_item_type_ids of filter '{tag}'"))?,
            normalised_display_names: serde_json::from_str(&names)
                .with_context(|| format!("parse normalised_display_names of filter '{tag}'"))?,
            org_id,
            tag,
            name,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Accumulates `WHERE` conditions with positional parameters.
#[derive(Default)]
struct SqlBuilder {
    conditions: Vec<String>,
    params: Vec<Box<dyn rusqlite::types::ToSql>>,
}

impl SqlBuilder {
    /// Add a condition with a single `?` placeholder.
    fn condition(&mut self, template: &str, value: Box<dyn rusqlite::types::ToSql>) {
        self.params.push(value);
        self.conditions
            .push(template.replace('?', &format!("?{}", self.params.len())));
    }

    fn in_list(&mut self, column: &str, values: &[String]) {
        let placeholders: Vec<String> = values
            .iter()
            .map(|value| {
                self.params.push(Box::new(value.clone()));
                format!("?{}", self.params.len())
            })
            .collect();
        self.conditions
            .push(format!("{column} IN ({})", placeholders.join(", ")));
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn query<T>(
        &self,
        conn: &rusqlite::Connection,
        sql: &str,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = conn
            .prepare(sql)
            .with_context(|| format!("prepare query: {sql}"))?;

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            self.params.iter().map(AsRef::as_ref).collect();

        let rows = stmt.query_map(params_from_iter(params_ref), map)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read row")?);
        }
        Ok(out)
    }
}

fn row_to_raw_snapshot(row: &Row<'_>) -> rusqlite::Result<RawSnapshotRow> {
    Ok(RawSnapshotRow {
        work_item_id: row.get(0)?,
        snapshot_date: micros_to_datetime(1, row.get(1)?)?,
        departure_date: optional_micros(2, row.get(2)?)?,
        state: row.get(3)?,
        state_category: parse_column(4, &row.get::<_, String>(4)?)?,
        state_type: parse_column(5, &row.get::<_, String>(5)?)?,
        step_category: row.get(6)?,
        title: row.get(7)?,
        assignee: row.get(8)?,
        work_item_type: row.get(9)?,
    })
}

fn row_to_work_item(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        work_item_id: row.get(0)?,
        work_item_type_id: row.get(1)?,
        work_item_type: row.get(2)?,
        level: row.get(3)?,
        normalised_display_name: row.get(4)?,
        title: row.get(5)?,
        state: row.get(6)?,
        state_category: parse_column(7, &row.get::<_, String>(7)?)?,
        arrival_date: optional_micros(8, row.get(8)?)?,
        commitment_date: optional_micros(9, row.get(9)?)?,
        departure_date: optional_micros(10, row.get(10)?)?,
    })
}

fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(FlowError::from(e)))
    })
}

fn micros_to_datetime(idx: usize, us: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, us))
}

fn optional_micros(idx: usize, us: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    us.map(|us| micros_to_datetime(idx, us)).transpose()
}
