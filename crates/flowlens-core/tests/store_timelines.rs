//! Store-backed reconstruction: rows written through the seed helpers are
//! read back through the provider traits and cleaned.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use flowlens_core::config::TimelineConfig;
use flowlens_core::db::{
    DateRange, SavedFilter, SnapshotColumn, SnapshotProvider, SnapshotQuery, SnapshotStore,
    WorkItemProvider, WorkItemQuery,
};
use flowlens_core::model::{PeriodField, RawSnapshotRow, StateCategory, StateType, WorkItem};
use flowlens_core::timeline::TimelineReconstructor;
use flowlens_core::timeline::time_in_state::aggregate_time_in_state;

const ORG: &str = "acme";

fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).unwrap()
}

fn work_item(id: &str, type_id: &str, departure: Option<DateTime<Utc>>) -> WorkItem {
    WorkItem {
        work_item_id: id.into(),
        work_item_type_id: type_id.into(),
        work_item_type: if type_id == "bug" { "Bug" } else { "Story" }.into(),
        level: None,
        normalised_display_name: None,
        title: format!("{id} title"),
        state: if departure.is_some() { "Done" } else { "Doing" }.into(),
        state_category: if departure.is_some() {
            StateCategory::Completed
        } else {
            StateCategory::InProgress
        },
        arrival_date: Some(at(5, 1, 9)),
        commitment_date: Some(at(5, 2, 9)),
        departure_date: departure,
    }
}

fn snapshot(id: &str, ts: DateTime<Utc>, state: &str, state_type: StateType) -> RawSnapshotRow {
    RawSnapshotRow {
        work_item_id: id.into(),
        snapshot_date: ts,
        departure_date: None,
        state: state.into(),
        state_category: StateCategory::InProgress,
        state_type,
        step_category: "inprocess".into(),
        title: Some(format!("{id} title")),
        assignee: Some("sam".into()),
        work_item_type: Some("Story".into()),
    }
}

fn seeded_store() -> SnapshotStore {
    let store = SnapshotStore::open_in_memory().expect("open store");
    store
        .insert_work_item(ORG, &work_item("W1", "story", Some(at(5, 6, 15))))
        .expect("insert W1");
    store
        .insert_work_item(ORG, &work_item("W2", "bug", None))
        .expect("insert W2");
    store
        .insert_work_item("other", &work_item("W9", "story", None))
        .expect("insert W9");

    // W1: gap between 2 and 5 May, a later duplicate on 2 May,
    // departure-day row stored as Queue, and one row after departure.
    for row in [
        snapshot("W1", at(5, 5, 0), "Review", StateType::Queue),
        snapshot("W1", at(5, 2, 0), "Doing", StateType::Active),
        snapshot("W1", at(5, 6, 0), "Review", StateType::Queue),
        snapshot("W1", at(5, 2, 6), "Stale", StateType::Queue),
        snapshot("W1", at(5, 7, 0), "Done", StateType::Queue),
    ] {
        store.insert_snapshot(ORG, &row).expect("insert W1 row");
    }
    for day in 2..=4 {
        store
            .insert_snapshot(ORG, &snapshot("W2", at(5, day, 0), "Doing", StateType::Active))
            .expect("insert W2 row");
    }
    store
        .insert_snapshot("other", &snapshot("W9", at(5, 2, 0), "Doing", StateType::Active))
        .expect("insert W9 row");
    store
}

#[test]
fn provider_joins_departure_and_scopes_org() {
    let store = seeded_store();
    let rows = store
        .get_snapshots(&SnapshotQuery::for_org(ORG))
        .expect("get snapshots");

    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r.work_item_id != "W9"));
    let w1 = rows.iter().find(|r| r.work_item_id == "W1").unwrap();
    assert_eq!(w1.departure_date, Some(at(5, 6, 15)));
    let w2 = rows.iter().find(|r| r.work_item_id == "W2").unwrap();
    assert_eq!(w2.departure_date, None);
}

#[test]
fn reconstructs_clean_timelines_from_store() {
    let store = seeded_store();
    let reconstructor = TimelineReconstructor::new(&store, TimelineConfig::default());
    let timelines = reconstructor
        .reconstruct(&SnapshotQuery::for_org(ORG))
        .expect("reconstruct");

    let w1 = &timelines["W1"];
    let states: Vec<(&str, bool)> = w1
        .iter()
        .map(|s| (s.state.as_str(), s.interpolated))
        .collect();
    assert_eq!(
        states,
        [
            ("Doing", false),
            ("Doing", true),
            ("Review", false),
            ("Review", false)
        ]
    );
    assert_eq!(w1[3].state_type, StateType::Active);
    assert_eq!(timelines["W2"].len(), 3);

    let runs = aggregate_time_in_state(timelines.values().flatten());
    let w1_runs: Vec<(&str, u32)> = runs
        .iter()
        .filter(|r| r.work_item_id == "W1")
        .map(|r| (r.state.as_str(), r.days_in_state))
        .collect();
    assert_eq!(w1_runs, [("Doing", 2), ("Review", 2)]);
}

#[test]
fn type_filter_and_column_subset_apply() {
    let store = seeded_store();
    let query = SnapshotQuery {
        work_item_type_ids: Some(vec!["bug".into()]),
        columns: Some(vec![SnapshotColumn::Title]),
        ..SnapshotQuery::for_org(ORG)
    };
    let rows = store.get_snapshots(&query).expect("get snapshots");

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.work_item_id == "W2"));
    assert!(rows.iter().all(|r| r.title.is_some()));
    assert!(rows.iter().all(|r| r.assignee.is_none() && r.work_item_type.is_none()));
}

#[test]
fn empty_id_list_returns_nothing() {
    let store = seeded_store();
    let query = SnapshotQuery {
        work_item_ids: Some(Vec::new()),
        ..SnapshotQuery::for_org(ORG)
    };
    assert!(store.get_snapshots(&query).expect("query").is_empty());

    let reconstructor = TimelineReconstructor::new(&store, TimelineConfig::default());
    assert!(reconstructor.reconstruct(&query).expect("reconstruct").is_empty());
}

#[test]
fn query_timezone_overrides_config() {
    let store = seeded_store();
    let config = TimelineConfig {
        default_timezone: "Not/AZone".into(),
        ..TimelineConfig::default()
    };
    let reconstructor = TimelineReconstructor::new(&store, config);

    assert!(reconstructor.reconstruct(&SnapshotQuery::for_org(ORG)).is_err());

    let tz: Tz = "Pacific/Auckland".parse().unwrap();
    let query = SnapshotQuery {
        timezone: Some(tz),
        ..SnapshotQuery::for_org(ORG)
    };
    let timelines = reconstructor.reconstruct(&query).expect("reconstruct");
    assert!(timelines["W2"].iter().all(|s| s.snapshot_date.timezone() == tz));
}

#[test]
fn work_items_filter_by_category_and_period() {
    let store = seeded_store();

    let completed = WorkItemQuery {
        state_category: Some(StateCategory::Completed),
        ..WorkItemQuery::for_org(ORG)
    };
    let items = store.get_work_items(&completed).expect("completed items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].work_item_id, "W1");

    let range = DateRange::new(at(5, 7, 0), at(5, 31, 0)).expect("range");
    let late = WorkItemQuery {
        date_filter: Some((PeriodField::DepartureDate, range)),
        ..WorkItemQuery::for_org(ORG)
    };
    assert!(store.get_work_items(&late).expect("late items").is_empty());
}

#[test]
fn saved_filters_round_trip_through_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SnapshotStore::open(&dir.path().join("flow.sqlite3")).expect("open store");
    let filter = SavedFilter {
        org_id: ORG.into(),
        tag: "team-a".into(),
        name: "Team A".into(),
        work_item_type_ids: vec!["story".into()],
        normalised_display_names: Vec::new(),
    };
    store.insert_saved_filter(&filter).expect("insert filter");

    assert_eq!(
        store.get_saved_filter(ORG, "team-a").expect("get filter"),
        Some(filter)
    );
    assert_eq!(store.get_saved_filter(ORG, "missing").expect("get"), None);
}
