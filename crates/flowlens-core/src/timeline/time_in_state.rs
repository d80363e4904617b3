//! Collapse clean timelines into runs of consecutive days in one state.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::model::{Snapshot, StateCategory, StateType};

/// Anything that records a work item being in a state on one day.
pub trait StateObservation {
    fn work_item_id(&self) -> &str;
    fn state(&self) -> &str;
    fn state_category(&self) -> StateCategory;
    fn state_type(&self) -> StateType;
    fn work_item_type(&self) -> Option<&str>;
}

impl StateObservation for Snapshot {
    fn work_item_id(&self) -> &str {
        &self.work_item_id
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn state_category(&self) -> StateCategory {
        self.state_category
    }

    fn state_type(&self) -> StateType {
        self.state_type
    }

    fn work_item_type(&self) -> Option<&str> {
        self.work_item_type.as_deref()
    }
}

/// A maximal run of adjacent observations with the same item and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInStateRun {
    pub work_item_id: String,
    pub state: String,
    pub state_category: StateCategory,
    pub state_type: StateType,
    pub work_item_type: Option<String>,
    pub days_in_state: u32,
}

/// Total time spent in one state across a population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDistribution {
    pub state: String,
    pub state_category: StateCategory,
    pub state_type: StateType,
    pub total_days: u64,
    pub work_item_count: usize,
}

/// Collapse observations, sorted by work item then date, into runs.
///
/// Metadata comes from the first observation of each run. Runs of the same
/// state separated by another state stay separate.
pub fn aggregate_time_in_state<'a, T, I>(rows: I) -> Vec<TimeInStateRun>
where
    T: StateObservation + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut runs: Vec<TimeInStateRun> = Vec::new();

    for row in rows {
        if let Some(last) = runs.last_mut() {
            if last.work_item_id == row.work_item_id() && last.state == row.state() {
                last.days_in_state += 1;
                continue;
            }
        }

        runs.push(TimeInStateRun {
            work_item_id: row.work_item_id().to_string(),
            state: row.state().to_string(),
            state_category: row.state_category(),
            state_type: row.state_type(),
            work_item_type: row.work_item_type().map(str::to_string),
            days_in_state: 1,
        });
    }

    runs
}

/// Fold runs into one entry per state, ordered by category then name.
#[must_use]
pub fn state_distribution(runs: &[TimeInStateRun]) -> Vec<StateDistribution> {
    let mut by_state: BTreeMap<&str, (StateDistribution, HashSet<&str>)> = BTreeMap::new();

    for run in runs {
        let (entry, items) = by_state.entry(run.state.as_str()).or_insert_with(|| {
            (
                StateDistribution {
                    state: run.state.clone(),
                    state_category: run.state_category,
                    state_type: run.state_type,
                    total_days: 0,
                    work_item_count: 0,
                },
                HashSet::new(),
            )
        });
        entry.total_days += u64::from(run.days_in_state);
        items.insert(run.work_item_id.as_str());
    }

    let mut out: Vec<StateDistribution> = by_state
        .into_values()
        .map(|(mut entry, items)| {
            entry.work_item_count = items.len();
            entry
        })
        .collect();
    out.sort_by(|a, b| {
        a.state_category
            .cmp(&b.state_category)
            .then_with(|| a.state.cmp(&b.state))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Obs {
        id: &'static str,
        state: &'static str,
        category: StateCategory,
        kind: StateType,
    }

    impl StateObservation for Obs {
        fn work_item_id(&self) -> &str {
            self.id
        }
        fn state(&self) -> &str {
            self.state
        }
        fn state_category(&self) -> StateCategory {
            self.category
        }
        fn state_type(&self) -> StateType {
            self.kind
        }
        fn work_item_type(&self) -> Option<&str> {
            Some("Story")
        }
    }

    fn obs(id: &'static str, state: &'static str) -> Obs {
        let (category, kind) = match state {
            "Backlog" => (StateCategory::Proposed, StateType::Queue),
            "Review" => (StateCategory::InProgress, StateType::Queue),
            _ => (StateCategory::InProgress, StateType::Active),
        };
        Obs {
            id,
            state,
            category,
            kind,
        }
    }

    #[test]
    fn adjacent_same_state_rows_collapse() {
        let rows = [obs("W1", "A"), obs("W1", "A"), obs("W1", "B")];
        let runs = aggregate_time_in_state(&rows);

        assert_eq!(runs.len(), 2);
        assert_eq!((runs[0].state.as_str(), runs[0].days_in_state), ("A", 2));
        assert_eq!((runs[1].state.as_str(), runs[1].days_in_state), ("B", 1));
    }

    #[test]
    fn revisited_state_starts_new_run() {
        let rows = [obs("W1", "A"), obs("W1", "B"), obs("W1", "A")];
        let runs = aggregate_time_in_state(&rows);
        let days: Vec<u32> = runs.iter().map(|r| r.days_in_state).collect();
        assert_eq!(days, [1, 1, 1]);
    }

    #[test]
    fn item_boundary_splits_runs() {
        let rows = [obs("W1", "A"), obs("W2", "A"), obs("W2", "A")];
        let runs = aggregate_time_in_state(&rows);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].work_item_id, "W1");
        assert_eq!(runs[1].days_in_state, 2);
    }

    #[test]
    fn metadata_comes_from_first_row() {
        let rows = [obs("W1", "Backlog")];
        let runs = aggregate_time_in_state(&rows);
        assert_eq!(runs[0].state_category, StateCategory::Proposed);
        assert_eq!(runs[0].state_type, StateType::Queue);
        assert_eq!(runs[0].work_item_type.as_deref(), Some("Story"));
    }

    #[test]
    fn empty_input_has_no_runs() {
        let rows: [Obs; 0] = [];
        assert!(aggregate_time_in_state(&rows).is_empty());
        assert!(state_distribution(&[]).is_empty());
    }

    #[test]
    fn distribution_sums_days_and_counts_items() {
        let rows = [
            obs("W1", "Backlog"),
            obs("W1", "Doing"),
            obs("W1", "Doing"),
            obs("W1", "Review"),
            obs("W1", "Doing"),
            obs("W2", "Doing"),
        ];
        let runs = aggregate_time_in_state(&rows);
        let dist = state_distribution(&runs);

        let summary: Vec<(&str, u64, usize)> = dist
            .iter()
            .map(|d| (d.state.as_str(), d.total_days, d.work_item_count))
            .collect();
        assert_eq!(
            summary,
            [("Backlog", 1, 1), ("Doing", 4, 2), ("Review", 1, 1)]
        );
    }
}
