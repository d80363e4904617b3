//! Statistical primitives shared by every calculator.
//!
//! All functions take a population by slice, work on a sorted copy, and
//! never mutate their input. Empty populations yield zero or empty results
//! rather than errors.

use flowlens_core::config::StatsConfig;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Quantiles
// ---------------------------------------------------------------------------

/// Percentile `p` (0-100) by linear interpolation between closest ranks.
///
/// Uses `rank = p / 100 * (n - 1)`, so `percentile(50, [1, 2, 3, 4]) = 2.5`.
/// Out of range `p` is clamped. Returns 0 for an empty population.
#[must_use]
pub fn percentile(p: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    percentile_sorted(p, &sorted(values))
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile_sorted(p: f64, sorted: &[f64]) -> f64 {
    let Some(&last) = sorted.last() else {
        return 0.0;
    };
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if upper >= sorted.len() {
        return last;
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Percentage of the population strictly below `value`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent_rank(value: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let below = values.iter().filter(|v| **v < value).count();
    below as f64 / values.len() as f64 * 100.0
}

/// The percentiles every report carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PercentileSet {
    pub p50: f64,
    pub p85: f64,
    pub p95: f64,
    pub p98: f64,
}

impl PercentileSet {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted(values);
        Self {
            p50: percentile_sorted(50.0, &sorted),
            p85: percentile_sorted(85.0, &sorted),
            p95: percentile_sorted(95.0, &sorted),
            p98: percentile_sorted(98.0, &sorted),
        }
    }
}

// ---------------------------------------------------------------------------
// Box plot
// ---------------------------------------------------------------------------

/// Quartiles, Tukey whiskers, and the points beyond them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPlotSummary {
    pub median: f64,
    pub quartile_1st: f64,
    pub quartile_3rd: f64,
    pub inter_quartile_range: f64,
    /// `Q1 - 1.5 * IQR`; not clamped to the smallest observation.
    pub lower_whisker: f64,
    /// `Q3 + 1.5 * IQR`; not clamped to the largest observation.
    pub upper_whisker: f64,
    /// Distinct values strictly below the lower whisker, ascending.
    pub lower_outliers: Vec<f64>,
    /// Distinct values strictly above the upper whisker, ascending.
    pub upper_outliers: Vec<f64>,
}

/// Summarise a population as a box plot. Empty input gives all zeros.
#[must_use]
pub fn box_plot(values: &[f64]) -> BoxPlotSummary {
    if values.is_empty() {
        return BoxPlotSummary::default();
    }
    let sorted = sorted(values);
    let quartile_1st = percentile_sorted(25.0, &sorted);
    let median = percentile_sorted(50.0, &sorted);
    let quartile_3rd = percentile_sorted(75.0, &sorted);
    let inter_quartile_range = quartile_3rd - quartile_1st;
    let lower_whisker = 1.5f64.mul_add(-inter_quartile_range, quartile_1st);
    let upper_whisker = 1.5f64.mul_add(inter_quartile_range, quartile_3rd);

    let mut lower_outliers: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| *v < lower_whisker)
        .collect();
    lower_outliers.dedup();
    let mut upper_outliers: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| *v > upper_whisker)
        .collect();
    upper_outliers.dedup();

    BoxPlotSummary {
        median,
        quartile_1st,
        quartile_3rd,
        inter_quartile_range,
        lower_whisker,
        upper_whisker,
        lower_outliers,
        upper_outliers,
    }
}

// ---------------------------------------------------------------------------
// Central tendency
// ---------------------------------------------------------------------------

/// Arithmetic mean, 0 for an empty population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Every most-frequent value, ascending. Empty for an empty population.
#[must_use]
pub fn mode(values: &[f64]) -> Vec<f64> {
    let sorted = sorted(values);
    let mut runs: Vec<(f64, usize)> = Vec::new();
    for value in sorted {
        match runs.last_mut() {
            Some((last, count)) if last.total_cmp(&value).is_eq() => *count += 1,
            _ => runs.push((value, 1)),
        }
    }

    let best = runs.iter().map(|(_, count)| *count).max().unwrap_or(0);
    runs.into_iter()
        .filter(|(_, count)| *count == best)
        .map(|(value, _)| value)
        .collect()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variability {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionShape {
    Normal,
    Skewed,
}

/// High when the tail is more than `high_variability_ratio` times the median.
#[must_use]
pub fn classify_variability(p50: f64, p98: f64, config: &StatsConfig) -> Variability {
    if p50 <= 0.0 {
        return if p98 > 0.0 {
            Variability::High
        } else {
            Variability::Low
        };
    }
    if p98 / p50 > config.high_variability_ratio {
        Variability::High
    } else {
        Variability::Low
    }
}

/// Skewed when the median sits below `skewed_median_ratio` of the tail.
#[must_use]
pub fn classify_distribution_shape(p50: f64, p98: f64, config: &StatsConfig) -> DistributionShape {
    if p98 <= 0.0 {
        return DistributionShape::Normal;
    }
    if p50 / p98 < config.skewed_median_ratio {
        DistributionShape::Skewed
    } else {
        DistributionShape::Normal
    }
}

// ---------------------------------------------------------------------------
// Ratios
// ---------------------------------------------------------------------------

/// Round `value` to `decimals` decimal places.
#[must_use]
pub fn round_f64(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 4-decimal ratio with division by zero guarded to 0.
#[must_use]
pub fn safe_ratio(numer: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        round_f64(numer / denom, 4)
    }
}

/// Ratio rendered with two decimals, or `"-"` when undefined.
#[must_use]
pub fn ratio_label(numer: f64, denom: f64) -> String {
    if denom == 0.0 {
        "-".to_string()
    } else {
        format!("{:.2}", numer / denom)
    }
}

/// Whole-day ages as a float population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn as_population(ages: &[i64]) -> Vec<f64> {
    ages.iter().map(|age| *age as f64).collect()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert!(approx(percentile(50.0, &[]), 0.0));
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        assert!(approx(percentile(50.0, &[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0));
        assert!(approx(percentile(50.0, &[4.0, 1.0, 3.0, 2.0]), 2.5));
        assert!(approx(percentile(85.0, &[1.0, 2.0, 3.0, 4.0, 5.0]), 4.4));
        assert!(approx(percentile(0.0, &[7.0, 3.0]), 3.0));
        assert!(approx(percentile(100.0, &[7.0, 3.0]), 7.0));
    }

    #[test]
    fn percentile_clamps_p() {
        let values = [1.0, 2.0, 3.0];
        assert!(approx(percentile(-10.0, &values), 1.0));
        assert!(approx(percentile(250.0, &values), 3.0));
    }

    #[test]
    fn percentile_does_not_mutate_input() {
        let values = [3.0, 1.0, 2.0];
        let _ = percentile(50.0, &values);
        assert_eq!(values, [3.0, 1.0, 2.0]);
    }

    #[test]
    fn percent_rank_counts_strictly_below() {
        let values = [1.0, 2.0, 2.0, 3.0];
        assert!(approx(percent_rank(2.0, &values), 25.0));
        assert!(approx(percent_rank(10.0, &values), 100.0));
        assert!(approx(percent_rank(1.0, &[]), 0.0));
    }

    #[test]
    fn box_plot_reports_whiskers_and_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 40.0, 40.0, -30.0];
        let summary = box_plot(&values);

        // sorted: -30 1 2 3 4 5 6 7 8 40 40; rank(25) = 2.5, rank(75) = 7.5
        assert!(approx(summary.quartile_1st, 2.5));
        assert!(approx(summary.median, 5.0));
        assert!(approx(summary.quartile_3rd, 7.5));
        assert!(approx(summary.inter_quartile_range, 5.0));
        assert!(approx(summary.lower_whisker, -5.0));
        assert!(approx(summary.upper_whisker, 15.0));
        assert_eq!(summary.lower_outliers, [-30.0]);
        assert_eq!(summary.upper_outliers, [40.0]);
    }

    #[test]
    fn box_plot_of_empty_is_default() {
        assert_eq!(box_plot(&[]), BoxPlotSummary::default());
    }

    #[test]
    fn box_plot_serializes_camel_case() {
        let json = serde_json::to_value(box_plot(&[1.0, 2.0])).unwrap();
        for key in [
            "median",
            "quartile1st",
            "quartile3rd",
            "interQuartileRange",
            "lowerWhisker",
            "upperWhisker",
            "lowerOutliers",
            "upperOutliers",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn mean_and_mode() {
        assert!(approx(mean(&[]), 0.0));
        assert!(approx(mean(&[1.0, 2.0, 6.0]), 3.0));
        assert!(mode(&[]).is_empty());
        assert_eq!(mode(&[3.0, 1.0, 3.0, 1.0, 2.0]), [1.0, 3.0]);
        assert_eq!(mode(&[5.0, 2.0, 5.0]), [5.0]);
    }

    #[test]
    fn variability_threshold_is_pinned_at_default() {
        let config = StatsConfig::default();
        assert_eq!(classify_variability(10.0, 56.0, &config), Variability::Low);
        assert_eq!(classify_variability(10.0, 56.1, &config), Variability::High);
        assert_eq!(classify_variability(0.0, 3.0, &config), Variability::High);
        assert_eq!(classify_variability(0.0, 0.0, &config), Variability::Low);
    }

    #[test]
    fn distribution_shape_threshold_is_pinned_at_default() {
        let config = StatsConfig::default();
        assert_eq!(
            classify_distribution_shape(35.0, 100.0, &config),
            DistributionShape::Normal
        );
        assert_eq!(
            classify_distribution_shape(34.9, 100.0, &config),
            DistributionShape::Skewed
        );
        assert_eq!(
            classify_distribution_shape(5.0, 0.0, &config),
            DistributionShape::Normal
        );
    }

    #[test]
    fn ratios_guard_zero_denominator() {
        assert!(approx(safe_ratio(5.0, 0.0), 0.0));
        assert!(approx(safe_ratio(1.0, 3.0), 0.3333));
        assert_eq!(ratio_label(5.0, 0.0), "-");
        assert_eq!(ratio_label(3.0, 2.0), "1.50");
    }

    #[test]
    fn percentile_set_matches_percentile() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let set = PercentileSet::from_values(&values);
        assert!(approx(set.p50, percentile(50.0, &values)));
        assert!(approx(set.p98, percentile(98.0, &values)));
    }
}
