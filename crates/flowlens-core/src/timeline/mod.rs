//! Snapshot timeline reconstruction.
//!
//! # Pipeline
//!
//! Raw per-day rows arrive from a [`SnapshotProvider`] in no particular
//! order. [`clean_rows`] turns them into one timeline per work item:
//!
//! 1. **Exclusion**: rows at or after the item's departure are dropped.
//! 2. **Override**: a row on the departure's calendar day (UTC) is Active.
//! 3. **Timezone**: timestamps move into the caller's timezone.
//! 4. **Dedup**: the first row seen for each local calendar date wins.
//! 5. **Sort**: ascending by timestamp.
//! 6. **Gap fill**: a pair of adjacent rows further apart than the gap
//!    threshold gets exactly one synthetic row at the temporal midpoint,
//!    cloned from the earlier row. Longer gaps are not filled day by day.
//!    A synthetic row on the departure's UTC day is Active, like a real one.
//!
//! After cleaning, each timeline has strictly ascending local dates, no
//! duplicates, and nothing at or after departure.

pub mod time_in_state;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument};

use crate::config::TimelineConfig;
use crate::db::{SnapshotProvider, SnapshotQuery};
use crate::model::{RawSnapshotRow, Snapshot, StateType};

/// Cleaned timelines keyed by work item id.
pub type Timelines = BTreeMap<String, Vec<Snapshot>>;

/// Counters describing what cleaning changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub rows_in: usize,
    pub excluded_after_departure: usize,
    pub forced_active: usize,
    pub duplicates_dropped: usize,
    pub gaps_filled: usize,
}

/// Fetches raw rows and reconstructs clean timelines.
pub struct TimelineReconstructor<'a, P: SnapshotProvider + ?Sized> {
    provider: &'a P,
    config: TimelineConfig,
}

impl<'a, P: SnapshotProvider + ?Sized> TimelineReconstructor<'a, P> {
    #[must_use]
    pub const fn new(provider: &'a P, config: TimelineConfig) -> Self {
        Self { provider, config }
    }

    /// Reconstruct the timelines selected by `query`.
    ///
    /// The query's timezone wins over the configured default. An empty
    /// result is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or the configured default
    /// timezone is invalid.
    #[instrument(skip_all, fields(org = %query.org_id))]
    pub fn reconstruct(&self, query: &SnapshotQuery) -> Result<Timelines> {
        let tz = match query.timezone {
            Some(tz) => tz,
            None => self.config.timezone()?,
        };

        let rows = self
            .provider
            .get_snapshots(query)
            .with_context(|| format!("fetch snapshots for org '{}'", query.org_id))?;

        let (timelines, stats) = clean_rows(rows, tz, self.config.gap_threshold_days);
        debug!(
            items = timelines.len(),
            rows_in = stats.rows_in,
            excluded = stats.excluded_after_departure,
            forced_active = stats.forced_active,
            duplicates = stats.duplicates_dropped,
            gaps = stats.gaps_filled,
            "reconstructed timelines"
        );
        Ok(timelines)
    }
}

/// Clean raw rows into per-item timelines. Pure; no I/O.
#[must_use]
pub fn clean_rows(
    rows: Vec<RawSnapshotRow>,
    tz: Tz,
    gap_threshold_days: f64,
) -> (Timelines, CleanStats) {
    let mut stats = CleanStats {
        rows_in: rows.len(),
        ..CleanStats::default()
    };
    let mut timelines = Timelines::new();
    let mut seen_dates: HashMap<String, HashSet<NaiveDate>> = HashMap::new();
    let mut departures: HashMap<String, DateTime<Utc>> = HashMap::new();

    for mut row in rows {
        if let Some(departure) = row.departure_date {
            departures
                .entry(row.work_item_id.clone())
                .or_insert(departure);
            if row.snapshot_date >= departure {
                stats.excluded_after_departure += 1;
                continue;
            }
            if on_departure_day(row.snapshot_date, departure) {
                if row.state_type != StateType::Active {
                    stats.forced_active += 1;
                }
                row.state_type = StateType::Active;
            }
        }

        let snapshot = Snapshot::from_raw(row, tz);
        let dates = seen_dates
            .entry(snapshot.work_item_id.clone())
            .or_default();
        if !dates.insert(snapshot.local_date()) {
            stats.duplicates_dropped += 1;
            continue;
        }

        timelines
            .entry(snapshot.work_item_id.clone())
            .or_default()
            .push(snapshot);
    }

    for (id, timeline) in &mut timelines {
        timeline.sort_by_key(|snapshot| snapshot.snapshot_date);
        let departure = departures.get(id).copied();
        let filled = fill_gaps(std::mem::take(timeline), gap_threshold_days, departure);
        *timeline = filled.timeline;
        stats.gaps_filled += filled.inserted;
        stats.forced_active += filled.forced_active;
    }

    (timelines, stats)
}

/// Whether `ts` falls on the departure's UTC calendar day.
fn on_departure_day(ts: DateTime<Utc>, departure: DateTime<Utc>) -> bool {
    ts.date_naive() == departure.date_naive()
}

struct Filled {
    timeline: Vec<Snapshot>,
    inserted: usize,
    forced_active: usize,
}

/// Insert one midpoint row after every snapshot whose successor is more
/// than `threshold` days away. The synthetic row is never compared again.
fn fill_gaps(
    timeline: Vec<Snapshot>,
    threshold: f64,
    departure: Option<DateTime<Utc>>,
) -> Filled {
    let mut filled = Vec::with_capacity(timeline.len() + timeline.len() / 2);
    let mut inserted = 0;
    let mut forced_active = 0;
    let mut iter = timeline.into_iter().peekable();

    while let Some(current) = iter.next() {
        let synthetic = iter
            .peek()
            .filter(|next| day_difference(current.local_date(), next.local_date()) > threshold)
            .map(|next| {
                let mut synthetic = current.clone();
                synthetic.snapshot_date = midpoint(&current.snapshot_date, &next.snapshot_date);
                synthetic.interpolated = true;
                synthetic
            });

        filled.push(current);
        if let Some(mut synthetic) = synthetic {
            let utc = synthetic.snapshot_date.with_timezone(&Utc);
            if departure.is_some_and(|departure| on_departure_day(utc, departure))
                && synthetic.state_type != StateType::Active
            {
                synthetic.state_type = StateType::Active;
                forced_active += 1;
            }
            filled.push(synthetic);
            inserted += 1;
        }
    }

    Filled {
        timeline: filled,
        inserted,
        forced_active,
    }
}

/// Midpoint of two instants on the local wall clock, so the result always
/// falls on a calendar date strictly between two dates that are at least
/// two days apart, even across a DST change.
fn midpoint(earlier: &DateTime<Tz>, later: &DateTime<Tz>) -> DateTime<Tz> {
    let (a, b) = (earlier.naive_local(), later.naive_local());
    let local = a + (b - a) / 2;
    earlier
        .timezone()
        .from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| *earlier + (*later - *earlier) / 2)
}

/// Days between two calendar dates, both taken at midday so DST
/// transitions cannot shift the result.
#[allow(clippy::cast_precision_loss)]
fn day_difference(earlier: NaiveDate, later: NaiveDate) -> f64 {
    let midday = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
    let seconds = later
        .and_time(midday)
        .signed_duration_since(earlier.and_time(midday))
        .num_seconds();
    seconds as f64 / 86_400.0
}
