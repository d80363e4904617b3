//! Property tests for timeline cleaning.
//!
//! Raw rows are generated in arbitrary order, with duplicates, gaps, and
//! departures, across timezones with and without DST.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use flowlens_core::model::{RawSnapshotRow, StateCategory, StateType};
use flowlens_core::timeline::clean_rows;
use proptest::prelude::*;

const ZONES: [&str; 4] = [
    "UTC",
    "Australia/Brisbane",
    "Europe/London",
    "America/Los_Angeles",
];

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn arb_item() -> impl Strategy<Value = (Vec<(i64, i64)>, Option<(i64, i64)>)> {
    (
        prop::collection::vec((0_i64..45, 0_i64..24), 0..20),
        prop::option::of((0_i64..50, 0_i64..24)),
    )
}

fn build_rows(items: &[(Vec<(i64, i64)>, Option<(i64, i64)>)]) -> Vec<RawSnapshotRow> {
    let mut rows = Vec::new();
    for (idx, (offsets, departure)) in items.iter().enumerate() {
        let departure =
            departure.map(|(day, hour)| epoch() + Duration::days(day) + Duration::hours(hour));
        for (n, (day, hour)) in offsets.iter().enumerate() {
            rows.push(RawSnapshotRow {
                work_item_id: format!("W{idx}"),
                snapshot_date: epoch() + Duration::days(*day) + Duration::hours(*hour),
                departure_date: departure,
                state: if n % 3 == 0 { "Doing" } else { "Review" }.to_string(),
                state_category: StateCategory::InProgress,
                state_type: if n % 2 == 0 {
                    StateType::Queue
                } else {
                    StateType::Active
                },
                step_category: "inprocess".into(),
                title: None,
                assignee: None,
                work_item_type: Some("Story".into()),
            });
        }
    }
    rows
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn local_dates_strictly_ascending(
        items in prop::collection::vec(arb_item(), 1..4),
        zone in 0_usize..ZONES.len(),
    ) {
        let tz: Tz = ZONES[zone].parse().unwrap();
        let (timelines, _) = clean_rows(build_rows(&items), tz, 1.1);

        for timeline in timelines.values() {
            for pair in timeline.windows(2) {
                prop_assert!(pair[0].local_date() < pair[1].local_date());
                prop_assert!(pair[0].snapshot_date < pair[1].snapshot_date);
            }
        }
    }

    #[test]
    fn nothing_at_or_after_departure(
        items in prop::collection::vec(arb_item(), 1..4),
        zone in 0_usize..ZONES.len(),
    ) {
        let tz: Tz = ZONES[zone].parse().unwrap();
        let rows = build_rows(&items);
        let departures: std::collections::HashMap<String, Option<DateTime<Utc>>> = rows
            .iter()
            .map(|r| (r.work_item_id.clone(), r.departure_date))
            .collect();

        let (timelines, _) = clean_rows(rows, tz, 1.1);
        for (id, timeline) in &timelines {
            if let Some(departure) = departures[id] {
                for snapshot in timeline {
                    prop_assert!(snapshot.snapshot_date.with_timezone(&Utc) < departure);
                }
            }
        }
    }

    #[test]
    fn departure_day_rows_are_active(
        items in prop::collection::vec(arb_item(), 1..4),
        zone in 0_usize..ZONES.len(),
    ) {
        let tz: Tz = ZONES[zone].parse().unwrap();
        let rows = build_rows(&items);
        let departures: std::collections::HashMap<String, Option<DateTime<Utc>>> = rows
            .iter()
            .map(|r| (r.work_item_id.clone(), r.departure_date))
            .collect();

        let (timelines, _) = clean_rows(rows, tz, 1.1);
        for (id, timeline) in &timelines {
            let Some(departure) = departures[id] else { continue };
            for snapshot in timeline {
                let utc = snapshot.snapshot_date.with_timezone(&Utc);
                if utc.date_naive() == departure.date_naive() {
                    prop_assert_eq!(snapshot.state_type, StateType::Active);
                }
            }
        }
    }

    #[test]
    fn counters_balance(
        items in prop::collection::vec(arb_item(), 1..4),
        zone in 0_usize..ZONES.len(),
    ) {
        let tz: Tz = ZONES[zone].parse().unwrap();
        let rows = build_rows(&items);
        let (timelines, stats) = clean_rows(rows, tz, 1.1);

        let kept: usize = timelines.values().map(Vec::len).sum();
        let synthetic: usize = timelines
            .values()
            .flatten()
            .filter(|s| s.interpolated)
            .count();
        prop_assert_eq!(synthetic, stats.gaps_filled);
        prop_assert_eq!(
            kept - synthetic,
            stats.rows_in - stats.excluded_after_departure - stats.duplicates_dropped
        );
    }
}
