//! Cumulative flow: items per state category on each local day.
//!
//! Each day an item counts in the category of its latest snapshot on or
//! before that day. From its departure day onward it counts as completed,
//! whether or not snapshots continue. Every item is counted whatever its
//! current category, so removed items keep their history.

use anyhow::Result;
use chrono::NaiveDate;
use flowlens_core::model::{Snapshot, StateCategory};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::{CalculationSession, FlowProvider, report_window};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CfdDay {
    pub date: NaiveDate,
    pub counts: BTreeMap<StateCategory, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CfdReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<CfdDay>,
}

/// Daily category counts over the query's window.
///
/// # Errors
///
/// Returns an error if a population or its snapshots cannot be loaded.
#[instrument(skip_all, fields(org = %session.query().org_id))]
pub fn calculate<P: FlowProvider + ?Sized>(
    session: &mut CalculationSession<'_, P>,
) -> Result<CfdReport> {
    let items = session.all_items()?;
    let timelines = session.timelines(&items)?;
    let query = session.query();
    let (start, end) = report_window(query);

    let mut days: Vec<CfdDay> = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|date| CfdDay {
            date,
            counts: StateCategory::ALL.into_iter().map(|c| (c, 0)).collect(),
        })
        .collect();

    for item in items.iter() {
        let timeline = timelines
            .get(&item.work_item_id)
            .map_or(&[][..], Vec::as_slice);
        let departed_on = item
            .departure_date
            .map(|ts| ts.with_timezone(&query.timezone).date_naive());
        count_item(&mut days, timeline, departed_on);
    }
    debug!(items = items.len(), days = days.len(), "built cumulative flow");

    Ok(CfdReport { start, end, days })
}

fn count_item(days: &mut [CfdDay], timeline: &[Snapshot], departed_on: Option<NaiveDate>) {
    let mut cursor = timeline.iter().peekable();
    let mut current: Option<StateCategory> = None;

    for day in days {
        while let Some(snapshot) = cursor.next_if(|s| s.local_date() <= day.date) {
            current = Some(snapshot.state_category);
        }
        let category = if departed_on.is_some_and(|departed| departed <= day.date) {
            Some(StateCategory::Completed)
        } else {
            current
        };
        if let Some(category) = category {
            *day.counts.entry(category).or_default() += 1;
        }
    }
}
