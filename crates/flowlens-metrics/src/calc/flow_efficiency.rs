//! Flow efficiency: share of in-process time spent in active states.
//!
//! Computed from reconstructed timelines of items completed in range.
//! Only snapshots in the in-progress category count toward the total.

use anyhow::Result;
use flowlens_core::model::{Period, StateCategory, StateType};
use flowlens_core::timeline::time_in_state::{
    StateDistribution, TimeInStateRun, aggregate_time_in_state, state_distribution,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use super::{CalculationSession, FlowProvider};
use crate::stats::{mean, safe_ratio};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEfficiency {
    pub work_item_id: String,
    pub work_item_type: String,
    pub active_days: u64,
    pub in_process_days: u64,
    /// `active / in process`, 0 to 1.
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeEfficiency {
    pub item_type_name: String,
    pub count: usize,
    pub average_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEfficiencyReport {
    pub overall_efficiency: f64,
    pub active_days: u64,
    pub in_process_days: u64,
    pub items: Vec<ItemEfficiency>,
    pub by_item_type: Vec<TypeEfficiency>,
    pub state_distribution: Vec<StateDistribution>,
}

/// Flow efficiency of items completed in the query's range.
///
/// # Errors
///
/// Returns an error if the population or its snapshots cannot be loaded.
#[instrument(skip_all, fields(org = %session.query().org_id))]
pub fn calculate<P: FlowProvider + ?Sized>(
    session: &mut CalculationSession<'_, P>,
) -> Result<FlowEfficiencyReport> {
    let population = session.population(Period::Past, true)?;
    let timelines = session.timelines(&population)?;
    let runs = aggregate_time_in_state(timelines.values().flatten());

    let type_names: HashMap<&str, &str> = population
        .iter()
        .map(|item| (item.work_item_id.as_str(), item.work_item_type.as_str()))
        .collect();

    let items = item_efficiency(&runs, &type_names);
    debug!(
        items = population.len(),
        measured = items.len(),
        runs = runs.len(),
        "computed flow efficiency"
    );

    let active_days = items.iter().map(|i| i.active_days).sum();
    let in_process_days = items.iter().map(|i| i.in_process_days).sum();

    Ok(FlowEfficiencyReport {
        overall_efficiency: days_ratio(active_days, in_process_days),
        active_days,
        in_process_days,
        by_item_type: by_item_type(&items),
        state_distribution: state_distribution(&runs),
        items,
    })
}

/// Per-item active and in-process day counts. Items that never entered an
/// in-progress state are left out.
fn item_efficiency(
    runs: &[TimeInStateRun],
    type_names: &HashMap<&str, &str>,
) -> Vec<ItemEfficiency> {
    let mut days: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for run in runs.iter().filter(|r| r.state_category == StateCategory::InProgress) {
        let (active, total) = days.entry(run.work_item_id.as_str()).or_default();
        let run_days = u64::from(run.days_in_state);
        *total += run_days;
        if run.state_type == StateType::Active {
            *active += run_days;
        }
    }

    days.into_iter()
        .map(|(id, (active_days, in_process_days))| ItemEfficiency {
            work_item_id: id.to_string(),
            work_item_type: type_names.get(id).copied().unwrap_or_default().to_string(),
            active_days,
            in_process_days,
            efficiency: days_ratio(active_days, in_process_days),
        })
        .collect()
}

fn by_item_type(items: &[ItemEfficiency]) -> Vec<TypeEfficiency> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.work_item_type.as_str())
            .or_default()
            .push(item.efficiency);
    }
    groups
        .into_iter()
        .map(|(name, values)| TypeEfficiency {
            item_type_name: name.to_string(),
            count: values.len(),
            average_efficiency: mean(&values),
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn days_ratio(active: u64, total: u64) -> f64 {
    safe_ratio(active as f64, total as f64)
}
