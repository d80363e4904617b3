//! Throughput: departures per week, and demand against capacity.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use flowlens_core::model::{Period, WorkItem};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::{CalculationSession, FlowProvider, TREND_WEEKS, report_window};
use crate::stats::{PercentileSet, mean, ratio_label, safe_ratio};
use crate::trend::{MultiPeriodTrend, Polarity, Reducer, WeekBucket, bucket_by_week, multi_period};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyCount {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeThroughput {
    pub item_type_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputReport {
    pub total: usize,
    pub by_item_type: Vec<TypeThroughput>,
    pub weekly: Vec<WeeklyCount>,
    /// Percentiles of the weekly counts.
    pub percentiles: PercentileSet,
    pub average_per_week: f64,
    pub trend: MultiPeriodTrend,
    /// Items that arrived in the same window.
    pub arrivals: usize,
    /// `arrivals / departures`, 0 when nothing departed.
    pub demand_capacity_ratio: f64,
    /// Two-decimal ratio, or `"-"` when nothing departed.
    pub demand_capacity_label: String,
}

/// Throughput of the query's range, or of the trailing trend window when
/// the query has no range.
///
/// # Errors
///
/// Returns an error if a population cannot be loaded.
#[instrument(skip_all, fields(org = %session.query().org_id))]
pub fn calculate<P: FlowProvider + ?Sized>(
    session: &mut CalculationSession<'_, P>,
) -> Result<ThroughputReport> {
    let history = session.population(Period::Past, false)?;
    let mut candidates: Vec<WorkItem> = Vec::new();
    for period in [Period::Future, Period::Present, Period::Past] {
        candidates.extend(session.population(period, false)?.iter().cloned());
    }

    let query = session.query();
    let tz = query.timezone;
    let (start, end) = report_window(query);
    let in_window = |ts: Option<DateTime<Utc>>| {
        ts.is_some_and(|ts| {
            let day = ts.with_timezone(&tz).date_naive();
            start <= day && day <= end
        })
    };

    let departed: Vec<&WorkItem> = history
        .iter()
        .filter(|item| in_window(item.departure_date))
        .collect();
    let arrivals = candidates
        .iter()
        .filter(|item| in_window(item.arrival_date))
        .count();
    debug!(departed = departed.len(), arrivals, "counted flow");

    let weeks = week_count(start, end);
    let weekly: Vec<WeeklyCount> = bucket_by_week(&departures(&departed, tz), end, weeks)
        .into_iter()
        .map(|bucket| WeeklyCount {
            start: bucket.start,
            end: bucket.end,
            count: bucket.values.len(),
        })
        .collect();
    let counts = weekly_values(&weekly);

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &departed {
        *by_type.entry(item.work_item_type.as_str()).or_default() += 1;
    }

    let history_refs: Vec<&WorkItem> = history.iter().collect();
    let trend_end = query.as_of.with_timezone(&tz).date_naive();
    let trend_weeks: Vec<WeekBucket> =
        bucket_by_week(&departures(&history_refs, tz), trend_end, TREND_WEEKS);

    #[allow(clippy::cast_precision_loss)]
    let (demand, capacity) = (arrivals as f64, departed.len() as f64);

    Ok(ThroughputReport {
        total: departed.len(),
        by_item_type: by_type
            .into_iter()
            .map(|(name, count)| TypeThroughput {
                item_type_name: name.to_string(),
                count,
            })
            .collect(),
        percentiles: PercentileSet::from_values(&counts),
        average_per_week: mean(&counts),
        weekly,
        trend: multi_period(
            &trend_weeks,
            Reducer::Count,
            "items",
            Polarity::HigherIsBetter,
            &session.config().trend,
        ),
        arrivals,
        demand_capacity_ratio: safe_ratio(demand, capacity),
        demand_capacity_label: ratio_label(demand, capacity),
    })
}

/// Whole weeks needed to cover `start..=end`, at least one.
fn week_count(start: NaiveDate, end: NaiveDate) -> usize {
    let days = (end - start).num_days() + 1;
    usize::try_from((days + 6) / 7).unwrap_or(0).max(1)
}

fn departures(items: &[&WorkItem], tz: Tz) -> Vec<(NaiveDate, f64)> {
    items
        .iter()
        .filter_map(|item| item.departure_date)
        .map(|ts| (ts.with_timezone(&tz).date_naive(), 1.0))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn weekly_values(weekly: &[WeeklyCount]) -> Vec<f64> {
    weekly.iter().map(|week| week.count as f64).collect()
}
