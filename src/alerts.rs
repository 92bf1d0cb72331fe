//! Per-athlete alert records
//!
//! Folds per-metric deviation assessments into one [`AlertRecord`] per athlete per
//! period. Records are recomputed from scratch on every call; nothing is cached or
//! mutated incrementally, and the three periods never share state.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info_span};

use crate::aggregation::{MetricAggregator, MetricAverages, PeriodAverages};
use crate::baseline::BaselineProvider;
use crate::deviation::{Assessment, DeviationClassifier, Severity};
use crate::models::{AthleteId, BaselineHorizon, MetricKind, MetricSample, Period};

/// A metric that moved away from baseline in the unfavourable direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviatingMetric {
    pub metric: MetricKind,

    /// Current period average
    pub value: f64,

    /// Baseline mean it was compared against
    pub avg_value: f64,

    /// Severity of the deviation (1 or 2)
    pub deviation: Severity,

    /// Distance from baseline in standard deviations
    pub deviation_amount: f64,
}

/// Alert state of one athlete for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub athlete_id: AthleteId,

    /// Worst severity across `deviating_metrics`
    pub alert: Severity,

    #[serde(rename = "deviatingMetrics")]
    pub deviating_metrics: Vec<DeviatingMetric>,

    /// Monitored metrics with data that could not be checked against a baseline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unevaluated: Vec<MetricKind>,
}

impl AlertRecord {
    pub fn new(athlete_id: AthleteId) -> Self {
        Self {
            athlete_id,
            alert: Severity::None,
            deviating_metrics: Vec::new(),
            unevaluated: Vec::new(),
        }
    }

    pub fn push(&mut self, deviating: DeviatingMetric) {
        self.alert = self.alert.max(deviating.deviation);
        self.deviating_metrics.push(deviating);
    }

    pub fn is_alert(&self) -> bool {
        self.alert.is_alert()
    }

    /// True when nothing deviated but some metrics could not be checked
    pub fn has_data_gaps(&self) -> bool {
        !self.unevaluated.is_empty()
    }
}

/// Alert records for one period, keyed by athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAlerts {
    pub period: Period,
    pub horizon: BaselineHorizon,
    pub records: BTreeMap<AthleteId, AlertRecord>,
}

impl PeriodAlerts {
    pub fn new(period: Period, horizon: BaselineHorizon) -> Self {
        Self {
            period,
            horizon,
            records: BTreeMap::new(),
        }
    }

    /// Record for an athlete, `None` if the athlete had no data in the period
    pub fn get(&self, athlete_id: AthleteId) -> Option<&AlertRecord> {
        self.records.get(&athlete_id)
    }

    /// Records with at least a moderate alert
    pub fn flagged(&self) -> impl Iterator<Item = &AlertRecord> + '_ {
        self.records.values().filter(|record| record.is_alert())
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.records.values().filter(|r| r.alert == severity).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Alerts for all periods against one reference day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    pub generated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub periods: Vec<PeriodAlerts>,
}

impl AlertReport {
    pub fn period(&self, period: Period) -> Option<&PeriodAlerts> {
        self.periods.iter().find(|p| p.period == period)
    }
}

/// Runs the deviation classifier over every monitored metric of every athlete
#[derive(Debug, Clone, Default)]
pub struct AlertAggregator {
    classifier: DeviationClassifier,
}

impl AlertAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: DeviationClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &DeviationClassifier {
        &self.classifier
    }

    /// Evaluate one athlete's averages against `horizon` baselines.
    ///
    /// Metrics are visited in [`MetricKind::MONITORED`] order, so the deviating list
    /// order is stable for a given input.
    pub fn evaluate_athlete<P: BaselineProvider + ?Sized>(
        &self,
        athlete_id: AthleteId,
        averages: &MetricAverages,
        horizon: BaselineHorizon,
        provider: &P,
    ) -> AlertRecord {
        let mut record = AlertRecord::new(athlete_id);

        for metric in MetricKind::MONITORED {
            let current = averages.get(metric);
            let baseline = provider.baseline(athlete_id, metric, horizon);

            match self.classifier.assess(metric, current, baseline) {
                Assessment::Deviation { severity, amount } => {
                    // Deviation is only produced with a usable baseline and value
                    if let (Some(value), Some(stat)) = (current, baseline) {
                        record.push(DeviatingMetric {
                            metric,
                            value,
                            avg_value: stat.mean,
                            deviation: severity,
                            deviation_amount: amount,
                        });
                    }
                }
                Assessment::NotEvaluated { reason } if reason.is_data_gap() => {
                    record.unevaluated.push(metric);
                }
                _ => {}
            }
        }

        record
    }

    /// Evaluate every athlete present in `averages`; absent athletes get no record
    pub fn evaluate_period<P: BaselineProvider + ?Sized>(
        &self,
        averages: &PeriodAverages,
        provider: &P,
    ) -> PeriodAlerts {
        let period = averages.period;
        let horizon = self.classifier.horizon_for(period);
        let _span = info_span!("evaluate_period", period = %period, horizon = %horizon).entered();

        let mut alerts = PeriodAlerts::new(period, horizon);
        for (athlete_id, athlete_averages) in averages.iter() {
            let record = self.evaluate_athlete(athlete_id, athlete_averages, horizon, provider);
            alerts.records.insert(athlete_id, record);
        }

        debug!(
            athletes = alerts.len(),
            moderate = alerts.count_at(Severity::Moderate),
            severe = alerts.count_at(Severity::Severe),
            "Evaluated period alerts"
        );

        alerts
    }

    /// Aggregate samples and evaluate alerts for all three periods independently
    pub fn evaluate_report<P: BaselineProvider + ?Sized>(
        &self,
        samples: &[MetricSample],
        provider: &P,
        today: NaiveDate,
    ) -> AlertReport {
        let periods = Period::ALL
            .into_iter()
            .map(|period| {
                let averages = MetricAggregator::aggregate(samples, period, today);
                self.evaluate_period(&averages, provider)
            })
            .collect();

        AlertReport {
            generated_at: Utc::now(),
            as_of: today,
            periods,
        }
    }

    /// [`evaluate_report`](Self::evaluate_report) against the local process clock
    pub fn evaluate_report_now<P: BaselineProvider + ?Sized>(
        &self,
        samples: &[MetricSample],
        provider: &P,
    ) -> AlertReport {
        self.evaluate_report(samples, provider, Local::now().date_naive())
    }
}
