//! Request filters and the saved-filter cache.
//!
//! A [`FlowQuery`] is an immutable description of one request. Saved
//! filters are merged into a new query value rather than toggled in place,
//! so the same base query can be reused with and without them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use flowlens_core::db::{DateRange, SavedFilter, SnapshotQuery, SnapshotStore, WorkItemQuery};
use flowlens_core::model::Period;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Source of saved filter definitions.
pub trait FilterSource {
    /// Look up a saved filter by organisation and tag.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store fails.
    fn get_saved_filter(&self, org_id: &str, tag: &str) -> Result<Option<SavedFilter>>;
}

impl FilterSource for SnapshotStore {
    fn get_saved_filter(&self, org_id: &str, tag: &str) -> Result<Option<SavedFilter>> {
        Self::get_saved_filter(self, org_id, tag)
    }
}

type CacheKey = (String, String);

/// Read-mostly cache of saved filters keyed by (organisation, tag).
///
/// Each key is loaded from its source at most once; misses are cached too.
#[derive(Debug, Default)]
pub struct FilterCache {
    entries: RwLock<HashMap<CacheKey, Option<Arc<SavedFilter>>>>,
}

impl FilterCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a saved filter, loading it from `source` on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails. Failures are not cached.
    pub fn get<S: FilterSource + ?Sized>(
        &self,
        source: &S,
        org_id: &str,
        tag: &str,
    ) -> Result<Option<Arc<SavedFilter>>> {
        let key = (org_id.to_string(), tag.to_string());
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = entries.get(&key) {
                return Ok(hit.clone());
            }
        }

        let loaded = source
            .get_saved_filter(org_id, tag)
            .with_context(|| format!("load saved filter '{org_id}/{tag}'"))?
            .map(Arc::new);
        debug!(org = org_id, tag, found = loaded.is_some(), "cached saved filter");

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(key).or_insert(loaded).clone())
    }

    /// Number of cached keys, hits and misses alike.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable parameters of one metrics request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowQuery {
    pub org_id: String,
    /// Completed work and throughput are restricted to this range.
    pub date_range: Option<DateRange>,
    pub timezone: Tz,
    pub work_item_type_ids: Option<Vec<String>>,
    pub normalised_display_names: Option<Vec<String>>,
    /// Instant ages are measured to.
    pub as_of: DateTime<Utc>,
}

impl FlowQuery {
    #[must_use]
    pub fn new(org_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            org_id: org_id.into(),
            date_range: None,
            timezone: Tz::UTC,
            work_item_type_ids: None,
            normalised_display_names: None,
            as_of,
        }
    }

    /// A copy of this query further narrowed by `filter`.
    ///
    /// Empty lists on the saved filter add no constraint. A list that is
    /// already constrained is intersected, so the result never widens.
    #[must_use]
    pub fn with_saved_filter(&self, filter: &SavedFilter) -> Self {
        Self {
            work_item_type_ids: narrow(
                self.work_item_type_ids.as_deref(),
                &filter.work_item_type_ids,
            ),
            normalised_display_names: narrow(
                self.normalised_display_names.as_deref(),
                &filter.normalised_display_names,
            ),
            ..self.clone()
        }
    }

    /// Work item query for the population behind `period`.
    ///
    /// With `filter_by_date`, the period's anchor timestamp must fall in
    /// [`Self::date_range`] when one is set.
    #[must_use]
    pub fn work_item_query(&self, period: Period, filter_by_date: bool) -> WorkItemQuery {
        WorkItemQuery {
            org_id: self.org_id.clone(),
            state_category: Some(period.state_category()),
            date_filter: self
                .date_range
                .filter(|_| filter_by_date)
                .map(|range| (period.period_field(), range)),
            work_item_ids: None,
            work_item_type_ids: self.work_item_type_ids.clone(),
            normalised_display_names: self.normalised_display_names.clone(),
        }
    }

    /// Work item query for every item in the org whatever its state
    /// category, still narrowed by the type and display name filters.
    #[must_use]
    pub fn all_items_query(&self) -> WorkItemQuery {
        WorkItemQuery {
            org_id: self.org_id.clone(),
            state_category: None,
            date_filter: None,
            work_item_ids: None,
            work_item_type_ids: self.work_item_type_ids.clone(),
            normalised_display_names: self.normalised_display_names.clone(),
        }
    }

    /// Snapshot query for the given items in this request's timezone.
    #[must_use]
    pub fn snapshot_query(&self, work_item_ids: Vec<String>) -> SnapshotQuery {
        SnapshotQuery {
            org_id: self.org_id.clone(),
            columns: Some(Vec::new()),
            timezone: Some(self.timezone),
            work_item_ids: Some(work_item_ids),
            work_item_type_ids: None,
            start_date: None,
            end_date: None,
        }
    }
}

fn narrow(current: Option<&[String]>, saved: &[String]) -> Option<Vec<String>> {
    match (current, saved.is_empty()) {
        (None, true) => None,
        (Some(current), true) => Some(current.to_vec()),
        (None, false) => Some(saved.to_vec()),
        (Some(current), false) => Some(
            current
                .iter()
                .filter(|id| saved.contains(id))
                .cloned()
                .collect(),
        ),
    }
}
