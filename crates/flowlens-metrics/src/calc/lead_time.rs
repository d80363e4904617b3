//! Lead time of completed work.
//!
//! The distribution covers items that departed inside the query's date
//! range. Trends look further back: every completed item's departure is
//! bucketed into weeks ending on `as_of`, so a narrow range still gets a
//! four-week comparison.

use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use flowlens_core::config::FlowConfig;
use flowlens_core::model::{AgeField, Period, WorkItem};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::age::{AgeSummary, ItemAge, item_ages, report};
use super::{CalculationSession, FlowProvider, TREND_WEEKS};
use crate::stats::{Variability, as_population, classify_variability, percentile};
use crate::trend::{MultiPeriodTrend, Polarity, Reducer, bucket_by_week, multi_period};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadTimeByType {
    pub item_type_name: String,
    pub count: usize,
    /// Lead time at the configured headline percentile.
    pub leadtime_percentile: f64,
    pub trend_analysis_lead_time: MultiPeriodTrend,
    pub variability_lead_time: Variability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadTimeReport {
    #[serde(flatten)]
    pub summary: AgeSummary,
    pub headline_percentile: f64,
    pub by_item_type: Vec<LeadTimeByType>,
    pub trend: MultiPeriodTrend,
    pub items: Vec<ItemAge>,
}

/// Lead time report for the session's query.
///
/// # Errors
///
/// Returns an error if a population cannot be loaded.
#[instrument(skip_all, fields(org = %session.query().org_id))]
pub fn calculate<P: FlowProvider + ?Sized>(
    session: &mut CalculationSession<'_, P>,
) -> Result<LeadTimeReport> {
    let in_range = session.population(Period::Past, true)?;
    let history = session.population(Period::Past, false)?;
    let query = session.query();
    let config = session.config();
    let tz = query.timezone;
    let end = query.as_of.with_timezone(&tz).date_naive();

    let field = AgeField::LeadTimeInWholeDays;
    let ages = item_ages(&in_range, field, query.as_of, &tz);
    let history_ages = item_ages(&history, field, query.as_of, &tz);
    debug!(in_range = ages.len(), history = history_ages.len(), "computed lead times");

    let headline = config.stats.headline_percentile;
    let base = report(field, &ages, &config.stats);

    let mut by_type: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (item, age) in &ages {
        by_type.entry(item.work_item_type.as_str()).or_default().push(*age);
    }
    let by_item_type = by_type
        .into_iter()
        .map(|(name, lead_times)| {
            let values = as_population(&lead_times);
            let of_type: Vec<(&WorkItem, i64)> = history_ages
                .iter()
                .filter(|(item, _)| item.work_item_type == name)
                .copied()
                .collect();
            LeadTimeByType {
                item_type_name: name.to_string(),
                count: values.len(),
                leadtime_percentile: percentile(headline, &values),
                trend_analysis_lead_time: weekly_trend(&of_type, end, tz, config),
                variability_lead_time: classify_variability(
                    percentile(50.0, &values),
                    percentile(98.0, &values),
                    &config.stats,
                ),
            }
        })
        .collect();

    Ok(LeadTimeReport {
        summary: base.summary,
        headline_percentile: headline,
        by_item_type,
        trend: weekly_trend(&history_ages, end, tz, config),
        items: base.items,
    })
}

/// Headline percentile of lead time per departure week; lower is better.
#[allow(clippy::cast_precision_loss)]
fn weekly_trend(
    ages: &[(&WorkItem, i64)],
    end: NaiveDate,
    tz: Tz,
    config: &FlowConfig,
) -> MultiPeriodTrend {
    let observations: Vec<(NaiveDate, f64)> = ages
        .iter()
        .filter_map(|(item, age)| {
            let departed = item.departure_date?.with_timezone(&tz).date_naive();
            Some((departed, *age as f64))
        })
        .collect();
    let weeks = bucket_by_week(&observations, end, TREND_WEEKS);
    multi_period(
        &weeks,
        Reducer::Percentile(config.stats.headline_percentile),
        "days",
        Polarity::LowerIsBetter,
        &config.trend,
    )
}
