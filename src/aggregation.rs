//! Period averaging of daily wearable metrics
//!
//! Reduces raw per-day samples into per-athlete averages over the three dashboard
//! windows (today, last 7 days, last 30 days). Windows are calendar-day based and
//! anchored on a single reference day so all periods agree on what "today" is.
//!
//! An athlete with no qualifying value in a window has no entry at all, and a metric
//! with no qualifying value is absent from the athlete's averages. Callers must never
//! read "absent" as "zero".

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{AthleteId, DailyMetricRow, MetricKind, MetricSample, Period};

/// Average value per metric for one athlete over one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    values: BTreeMap<MetricKind, f64>,
}

impl MetricAverages {
    /// Average for `metric`, or `None` when the window held no usable value
    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn insert(&mut self, metric: MetricKind, value: f64) {
        self.values.insert(metric, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, f64)> + '_ {
        self.values.iter().map(|(metric, value)| (*metric, *value))
    }
}

impl FromIterator<(MetricKind, f64)> for MetricAverages {
    fn from_iter<I: IntoIterator<Item = (MetricKind, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Per-athlete averages for a single period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAverages {
    pub period: Period,

    /// Reference day the window ends on
    pub as_of: NaiveDate,

    athletes: BTreeMap<AthleteId, MetricAverages>,
}

impl PeriodAverages {
    pub fn new(period: Period, as_of: NaiveDate) -> Self {
        Self {
            period,
            as_of,
            athletes: BTreeMap::new(),
        }
    }

    /// Averages for one athlete, `None` if the athlete had no data in the window
    pub fn get(&self, athlete_id: AthleteId) -> Option<&MetricAverages> {
        self.athletes.get(&athlete_id)
    }

    /// Convenience accessor for one athlete and metric
    pub fn value(&self, athlete_id: AthleteId, metric: MetricKind) -> Option<f64> {
        self.get(athlete_id).and_then(|averages| averages.get(metric))
    }

    /// Insert averages for an athlete; empty averages are dropped to keep absence explicit
    pub fn insert(&mut self, athlete_id: AthleteId, averages: MetricAverages) {
        if !averages.is_empty() {
            self.athletes.insert(athlete_id, averages);
        }
    }

    pub fn contains(&self, athlete_id: AthleteId) -> bool {
        self.athletes.contains_key(&athlete_id)
    }

    pub fn athlete_ids(&self) -> impl Iterator<Item = AthleteId> + '_ {
        self.athletes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AthleteId, &MetricAverages)> + '_ {
        self.athletes.iter().map(|(id, averages)| (*id, averages))
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }
}

/// Running sum used while folding samples
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: u32,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Stateless aggregator for period averages
pub struct MetricAggregator;

impl MetricAggregator {
    /// Average every metric per athlete over `period` ending on `today`.
    ///
    /// Samples outside the window, null values and non-finite values are skipped.
    pub fn aggregate(samples: &[MetricSample], period: Period, today: NaiveDate) -> PeriodAverages {
        let mut sums: BTreeMap<AthleteId, BTreeMap<MetricKind, Accumulator>> = BTreeMap::new();
        let mut in_window = 0usize;

        for sample in samples {
            if !period.contains(sample.date, today) {
                continue;
            }

            if let Some(value) = sample.usable_value() {
                in_window += 1;
                sums.entry(sample.athlete_id)
                    .or_default()
                    .entry(sample.metric)
                    .or_default()
                    .push(value);
            }
        }

        let mut averages = PeriodAverages::new(period, today);
        for (athlete_id, metrics) in sums {
            let athlete_averages: MetricAverages = metrics
                .into_iter()
                .filter_map(|(metric, acc)| acc.mean().map(|mean| (metric, mean)))
                .collect();
            averages.insert(athlete_id, athlete_averages);
        }

        debug!(
            period = %period,
            as_of = %today,
            samples = samples.len(),
            qualifying = in_window,
            athletes = averages.len(),
            "Aggregated period averages"
        );

        averages
    }

    /// Aggregate directly from wide backend rows
    pub fn aggregate_rows(rows: &[DailyMetricRow], period: Period, today: NaiveDate) -> PeriodAverages {
        let samples: Vec<MetricSample> = rows.iter().flat_map(|row| row.samples()).collect();
        Self::aggregate(&samples, period, today)
    }

    /// Aggregate all three periods against the same reference day
    pub fn aggregate_all(samples: &[MetricSample], today: NaiveDate) -> BTreeMap<Period, PeriodAverages> {
        Period::ALL
            .into_iter()
            .map(|period| (period, Self::aggregate(samples, period, today)))
            .collect()
    }

    /// Aggregate against the local process clock
    pub fn aggregate_now(samples: &[MetricSample], period: Period) -> PeriodAverages {
        Self::aggregate(samples, period, Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    fn days_ago(n: u64) -> NaiveDate {
        today().checked_sub_days(Days::new(n)).unwrap()
    }

    fn sample(athlete: AthleteId, metric: MetricKind, value: Option<f64>, date: NaiveDate) -> MetricSample {
        MetricSample::new(athlete, metric, value, date)
    }

    #[test]
    fn test_last7_excludes_nulls_and_old_samples() {
        let samples = vec![
            sample(1, MetricKind::RecoveryScore, Some(80.0), today()),
            sample(1, MetricKind::RecoveryScore, None, today()),
            sample(1, MetricKind::RecoveryScore, Some(20.0), days_ago(8)),
        ];

        let averages = MetricAggregator::aggregate(&samples, Period::Last7Days, today());
        assert_eq!(averages.value(1, MetricKind::RecoveryScore), Some(80.0));
    }

    #[test]
    fn test_window_boundaries() {
        let samples = vec![
            sample(1, MetricKind::Hrv, Some(60.0), days_ago(6)),
            sample(1, MetricKind::Hrv, Some(100.0), days_ago(7)),
            sample(1, MetricKind::Hrv, Some(40.0), days_ago(29)),
            sample(1, MetricKind::Hrv, Some(500.0), days_ago(30)),
        ];

        let week = MetricAggregator::aggregate(&samples, Period::Last7Days, today());
        assert_eq!(week.value(1, MetricKind::Hrv), Some(60.0));

        let month = MetricAggregator::aggregate(&samples, Period::Last30Days, today());
        assert_eq!(month.value(1, MetricKind::Hrv), Some(200.0 / 3.0));

        let day = MetricAggregator::aggregate(&samples, Period::Today, today());
        assert!(day.get(1).is_none());
    }

    #[test]
    fn test_future_samples_ignored() {
        let tomorrow = today().succ_opt().unwrap();
        let samples = vec![sample(1, MetricKind::Strain, Some(15.0), tomorrow)];

        let averages = MetricAggregator::aggregate(&samples, Period::Last30Days, today());
        assert!(averages.is_empty());
    }

    #[test]
    fn test_absent_athlete_not_zero_filled() {
        let samples = vec![
            sample(1, MetricKind::RecoveryScore, Some(55.0), today()),
            sample(2, MetricKind::RecoveryScore, None, today()),
            sample(3, MetricKind::RecoveryScore, Some(70.0), days_ago(3)),
        ];

        let averages = MetricAggregator::aggregate(&samples, Period::Today, today());
        assert_eq!(averages.len(), 1);
        assert!(averages.contains(1));
        assert!(!averages.contains(2));
        assert!(!averages.contains(3));
    }

    #[test]
    fn test_missing_metric_absent_per_athlete() {
        let samples = vec![
            sample(1, MetricKind::RecoveryScore, Some(55.0), today()),
            sample(1, MetricKind::Hrv, None, today()),
        ];

        let averages = MetricAggregator::aggregate(&samples, Period::Today, today());
        let athlete = averages.get(1).unwrap();
        assert_eq!(athlete.len(), 1);
        assert_eq!(athlete.get(MetricKind::Hrv), None);
    }

    #[test]
    fn test_zero_values_are_averaged() {
        let samples = vec![
            sample(1, MetricKind::Strain, Some(0.0), today()),
            sample(1, MetricKind::Strain, Some(10.0), days_ago(1)),
        ];

        let averages = MetricAggregator::aggregate(&samples, Period::Last7Days, today());
        assert_eq!(averages.value(1, MetricKind::Strain), Some(5.0));
    }

    #[test]
    fn test_non_finite_values_treated_as_missing() {
        let samples = vec![
            sample(1, MetricKind::Hrv, Some(f64::NAN), today()),
            sample(1, MetricKind::Hrv, Some(f64::INFINITY), today()),
            sample(1, MetricKind::Hrv, Some(70.0), today()),
        ];

        let averages = MetricAggregator::aggregate(&samples, Period::Today, today());
        assert_eq!(averages.value(1, MetricKind::Hrv), Some(70.0));
    }

    #[test]
    fn test_aggregate_rows_and_all_periods() {
        let rows = vec![
            DailyMetricRow::new(9, today())
                .with(MetricKind::RecoveryScore, 40.0)
                .with(MetricKind::RestingHeartRate, 58.0),
            DailyMetricRow::new(9, days_ago(10)).with(MetricKind::RecoveryScore, 80.0),
        ];

        let week = MetricAggregator::aggregate_rows(&rows, Period::Last7Days, today());
        assert_eq!(week.value(9, MetricKind::RecoveryScore), Some(40.0));
        assert_eq!(week.value(9, MetricKind::RestingHeartRate), Some(58.0));

        let samples: Vec<_> = rows.iter().flat_map(|r| r.samples()).collect();
        let all = MetricAggregator::aggregate_all(&samples, today());
        assert_eq!(all.len(), 3);
        assert_eq!(all[&Period::Last30Days].value(9, MetricKind::RecoveryScore), Some(60.0));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let samples = vec![
            sample(1, MetricKind::SleepDuration, Some(7.5), today()),
            sample(2, MetricKind::SleepDuration, Some(6.0), days_ago(2)),
        ];

        let first = MetricAggregator::aggregate(&samples, Period::Last7Days, today());
        let second = MetricAggregator::aggregate(&samples, Period::Last7Days, today());
        assert_eq!(first, second);
    }
}
