//! Whole-day age reports: WIP age (present) and inventory age (future).
//!
//! Lead time reuses [`summarize`] and [`item_ages`] over the past period.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use flowlens_core::config::StatsConfig;
use flowlens_core::model::{AgeField, Period, WorkItem};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use super::{CalculationSession, FlowProvider};
use crate::stats::{
    BoxPlotSummary, DistributionShape, PercentileSet, Variability, as_population, box_plot,
    classify_distribution_shape, classify_variability, mean, mode, percent_rank,
};

/// Distribution summary shared by every age metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeSummary {
    pub count: usize,
    pub box_plot: BoxPlotSummary,
    pub percentiles: PercentileSet,
    pub average: f64,
    pub mode: Vec<f64>,
    pub variability: Variability,
    pub distribution_shape: DistributionShape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeGroup {
    pub name: String,
    pub count: usize,
    pub percentiles: PercentileSet,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAge {
    pub work_item_id: String,
    pub work_item_type: String,
    pub age_in_whole_days: i64,
    /// Share of the population strictly younger than this item.
    pub percent_rank: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeReport {
    pub age_field: &'static str,
    #[serde(flatten)]
    pub summary: AgeSummary,
    pub by_item_type: Vec<AgeGroup>,
    pub by_display_name: Vec<AgeGroup>,
    pub items: Vec<ItemAge>,
}

/// Age report for the population behind `period`.
///
/// # Errors
///
/// Returns an error if the population cannot be loaded.
#[instrument(skip(session), fields(period = period.as_str()))]
pub fn calculate<P: FlowProvider + ?Sized>(
    session: &mut CalculationSession<'_, P>,
    period: Period,
) -> Result<AgeReport> {
    let population = session.population(period, false)?;
    let query = session.query();
    let field = period.age_field();
    let ages = item_ages(&population, field, query.as_of, &query.timezone);
    debug!(items = population.len(), aged = ages.len(), "computed ages");

    Ok(report(field, &ages, &session.config().stats))
}

/// Build a report from already computed `(item, age)` pairs.
#[must_use]
pub fn report(field: AgeField, ages: &[(&WorkItem, i64)], config: &StatsConfig) -> AgeReport {
    let values = as_population(&ages.iter().map(|(_, age)| *age).collect::<Vec<_>>());

    let items = ages
        .iter()
        .zip(&values)
        .map(|((item, age), value)| ItemAge {
            work_item_id: item.work_item_id.clone(),
            work_item_type: item.work_item_type.clone(),
            age_in_whole_days: *age,
            percent_rank: percent_rank(*value, &values),
        })
        .collect();

    AgeReport {
        age_field: field.as_str(),
        summary: summarize(&values, config),
        by_item_type: group_by(ages, |item| item.work_item_type.as_str()),
        by_display_name: group_by(ages, WorkItem::display_group),
        items,
    }
}

/// Whole-day ages for every item that has the anchors `field` needs.
///
/// Items missing an anchor are skipped with a warning.
#[must_use]
pub fn item_ages<'i>(
    items: &'i [WorkItem],
    field: AgeField,
    as_of: DateTime<Utc>,
    tz: &Tz,
) -> Vec<(&'i WorkItem, i64)> {
    items
        .iter()
        .filter_map(|item| match item.age_in_whole_days(field, as_of, tz) {
            Some(age) => Some((item, age)),
            None => {
                warn!(
                    item = %item.work_item_id,
                    field = field.as_str(),
                    "skipping item without anchor date"
                );
                None
            }
        })
        .collect()
}

/// Box plot, percentiles, and classification of one population.
#[must_use]
pub fn summarize(values: &[f64], config: &StatsConfig) -> AgeSummary {
    let percentiles = PercentileSet::from_values(values);
    AgeSummary {
        count: values.len(),
        box_plot: box_plot(values),
        percentiles,
        average: mean(values),
        mode: mode(values),
        variability: classify_variability(percentiles.p50, percentiles.p98, config),
        distribution_shape: classify_distribution_shape(percentiles.p50, percentiles.p98, config),
    }
}

/// Percentiles per group label, ordered by label.
pub fn group_by<'i, F>(ages: &[(&'i WorkItem, i64)], label: F) -> Vec<AgeGroup>
where
    F: Fn(&'i WorkItem) -> &'i str,
{
    let mut groups: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (item, age) in ages {
        groups.entry(label(*item)).or_default().push(*age);
    }

    groups
        .into_iter()
        .map(|(name, ages)| {
            let values = as_population(&ages);
            AgeGroup {
                name: name.to_string(),
                count: values.len(),
                percentiles: PercentileSet::from_values(&values),
                average: mean(&values),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::fixtures::{MemoryProvider, at, item};
    use crate::filters::FlowQuery;
    use flowlens_core::config::FlowConfig;
    use flowlens_core::model::StateCategory;

    fn wip(id: &str, type_name: &str, committed_day: u32) -> WorkItem {
        let mut it = item(id, type_name, StateCategory::InProgress);
        it.arrival_date = Some(at(4, 1));
        it.commitment_date = Some(at(5, committed_day));
        it
    }

    #[test]
    fn wip_age_groups_by_type_and_display_name() {
        let mut bug = wip("W3", "Bug", 29);
        bug.normalised_display_name = Some("Defect".into());
        let mut uncommitted = item("W4", "Story", StateCategory::InProgress);
        uncommitted.arrival_date = Some(at(5, 1));
        let provider = MemoryProvider {
            items: vec![wip("W1", "Story", 1), wip("W2", "Story", 22), bug, uncommitted],
            ..MemoryProvider::default()
        };
        let mut session = CalculationSession::new(
            &provider,
            FlowQuery::new("acme", at(5, 31)),
            FlowConfig::default(),
        );

        let report = calculate(&mut session, Period::Present).unwrap();
        assert_eq!(report.age_field, "wipAgeInWholeDays");
        assert_eq!(report.summary.count, 3);

        let ages: Vec<(&str, i64)> = report
            .items
            .iter()
            .map(|i| (i.work_item_id.as_str(), i.age_in_whole_days))
            .collect();
        assert_eq!(ages, [("W1", 31), ("W2", 10), ("W3", 3)]);

        let types: Vec<(&str, usize)> = report
            .by_item_type
            .iter()
            .map(|g| (g.name.as_str(), g.count))
            .collect();
        assert_eq!(types, [("Bug", 1), ("Story", 2)]);
        let names: Vec<&str> = report.by_display_name.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Defect", "Story"]);

        assert!((report.items[0].percent_rank - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn inventory_age_measures_from_arrival() {
        let mut proposed = item("P1", "Story", StateCategory::Proposed);
        proposed.arrival_date = Some(at(5, 25));
        let provider = MemoryProvider {
            items: vec![proposed, wip("W1", "Story", 1)],
            ..MemoryProvider::default()
        };
        let mut session = CalculationSession::new(
            &provider,
            FlowQuery::new("acme", at(5, 31)),
            FlowConfig::default(),
        );

        let report = calculate(&mut session, Period::Future).unwrap();
        assert_eq!(report.age_field, "inventoryAgeInWholeDays");
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].age_in_whole_days, 7);
        assert_eq!(report.summary.mode, [7.0]);
    }

    #[test]
    fn empty_population_is_zeroed() {
        let provider = MemoryProvider::default();
        let mut session = CalculationSession::new(
            &provider,
            FlowQuery::new("acme", at(5, 31)),
            FlowConfig::default(),
        );
        let report = calculate(&mut session, Period::Present).unwrap();
        assert_eq!(report.summary.count, 0);
        assert_eq!(report.summary.box_plot, BoxPlotSummary::default());
        assert!(report.summary.mode.is_empty());
        assert_eq!(report.summary.variability, Variability::Low);
    }
}
