//! Period-over-period trend analysis.
//!
//! A comparison reduces two populations to one number each and reports the
//! rounded percentage change with an arrow and a colour. Whether "up" is
//! good depends on the metric's [`Polarity`].

use chrono::{Duration, NaiveDate};
use flowlens_core::config::TrendConfig;
use serde::Serialize;

use crate::stats::{mean, percentile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowColour {
    Green,
    Red,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendPeriod {
    LastWeek,
    LastTwoWeeks,
    LastFourWeeks,
}

impl TrendPeriod {
    pub const ALL: [Self; 3] = [Self::LastWeek, Self::LastTwoWeeks, Self::LastFourWeeks];

    /// Number of weekly buckets on each side of the comparison.
    #[must_use]
    pub const fn weeks(self) -> usize {
        match self {
            Self::LastWeek => 1,
            Self::LastTwoWeeks => 2,
            Self::LastFourWeeks => 4,
        }
    }

    /// How the previous window reads in a sentence.
    #[must_use]
    pub const fn previous_label(self) -> &'static str {
        match self {
            Self::LastWeek => "last week",
            Self::LastTwoWeeks => "the previous two weeks",
            Self::LastFourWeeks => "the previous four weeks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendComparison {
    pub percentage_change: i64,
    pub arrow_direction: ArrowDirection,
    pub arrow_colour: ArrowColour,
    pub text: String,
    pub period: TrendPeriod,
    pub previous: f64,
    pub current: f64,
}

impl TrendComparison {
    /// Comparison used when there is not enough history.
    #[must_use]
    pub fn neutral(period: TrendPeriod) -> Self {
        Self {
            percentage_change: 0,
            arrow_direction: ArrowDirection::Stable,
            arrow_colour: ArrowColour::Yellow,
            text: format!("not enough history to compare with {}", period.previous_label()),
            period,
            previous: 0.0,
            current: 0.0,
        }
    }
}

/// Compare `current` against `previous`.
///
/// A zero `previous` gives a 0% change, which always reads as stable.
#[must_use]
pub fn compare(
    previous: f64,
    current: f64,
    unit: &str,
    polarity: Polarity,
    period: TrendPeriod,
    config: &TrendConfig,
) -> TrendComparison {
    let percentage_change = percentage_change(previous, current);

    #[allow(clippy::cast_precision_loss)]
    let arrow_direction = if (percentage_change.abs() as f64) <= config.stable_band_percent {
        ArrowDirection::Stable
    } else if percentage_change > 0 {
        ArrowDirection::Up
    } else {
        ArrowDirection::Down
    };

    let arrow_colour = match (arrow_direction, polarity) {
        (ArrowDirection::Stable, _) => ArrowColour::Yellow,
        (ArrowDirection::Up, Polarity::HigherIsBetter)
        | (ArrowDirection::Down, Polarity::LowerIsBetter) => ArrowColour::Green,
        (ArrowDirection::Up, Polarity::LowerIsBetter)
        | (ArrowDirection::Down, Polarity::HigherIsBetter) => ArrowColour::Red,
    };

    let since = period.previous_label();
    let text = match arrow_direction {
        ArrowDirection::Stable => format!("no significant change since {since}"),
        ArrowDirection::Up | ArrowDirection::Down => format!(
            "{}% {} than {since} ({} → {} {unit})",
            percentage_change.abs(),
            if arrow_direction == ArrowDirection::Up {
                "higher"
            } else {
                "lower"
            },
            display_value(previous),
            display_value(current),
        ),
    };

    TrendComparison {
        percentage_change,
        arrow_direction,
        arrow_colour,
        text,
        period,
        previous,
        current,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percentage_change(previous: f64, current: f64) -> i64 {
    if previous == 0.0 {
        return 0;
    }
    ((current - previous) / previous * 100.0).round() as i64
}

fn display_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

// ---------------------------------------------------------------------------
// Weekly buckets
// ---------------------------------------------------------------------------

/// Observations falling in one inclusive seven-day window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBucket {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub values: Vec<f64>,
}

/// How a merged window is reduced to the number being compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    Sum,
    Count,
    Mean,
    Percentile(f64),
}

impl Reducer {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Count => values.len() as f64,
            Self::Mean => mean(values),
            Self::Percentile(p) => percentile(p, values),
        }
    }
}

/// Build `weeks` contiguous buckets, oldest first, the last one ending on
/// `end` inclusive. Weeks without observations are kept as empty buckets;
/// observations outside the span are ignored.
#[must_use]
pub fn bucket_by_week(
    observations: &[(NaiveDate, f64)],
    end: NaiveDate,
    weeks: usize,
) -> Vec<WeekBucket> {
    let mut buckets: Vec<WeekBucket> = (0..weeks)
        .rev()
        .map(|back| {
            let offset = i64::try_from(back).unwrap_or(i64::MAX / 7);
            let bucket_end = end - Duration::days(offset * 7);
            WeekBucket {
                start: bucket_end - Duration::days(6),
                end: bucket_end,
                values: Vec::new(),
            }
        })
        .collect();

    for (date, value) in observations {
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| b.start <= *date && *date <= b.end)
        {
            bucket.values.push(*value);
        }
    }
    buckets
}

/// Last week, last two weeks, and last four weeks against the windows of
/// equal length before them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPeriodTrend {
    pub last_week: TrendComparison,
    pub last_two_weeks: TrendComparison,
    pub last_four_weeks: TrendComparison,
}

/// Compare each trailing window of `weeks` (oldest first) with the window
/// of the same length before it. Too little history gives a neutral result.
#[must_use]
pub fn multi_period(
    weeks: &[WeekBucket],
    reducer: Reducer,
    unit: &str,
    polarity: Polarity,
    config: &TrendConfig,
) -> MultiPeriodTrend {
    let window = |period: TrendPeriod| {
        let k = period.weeks();
        if weeks.len() < 2 * k {
            return TrendComparison::neutral(period);
        }
        let split = weeks.len() - k;
        let merge = |buckets: &[WeekBucket]| -> Vec<f64> {
            buckets.iter().flat_map(|b| b.values.iter().copied()).collect()
        };
        let previous = reducer.apply(&merge(&weeks[split - k..split]));
        let current = reducer.apply(&merge(&weeks[split..]));
        compare(previous, current, unit, polarity, period, config)
    };

    MultiPeriodTrend {
        last_week: window(TrendPeriod::LastWeek),
        last_two_weeks: window(TrendPeriod::LastTwoWeeks),
        last_four_weeks: window(TrendPeriod::LastFourWeeks),
    }
}
