//! Baseline deviation classification
//!
//! Compares a period average against the athlete's own baseline and grades how far
//! it sits from normal, in standard deviations:
//!
//! - **Severe (2)**: at least 2 standard deviations in the unfavourable direction
//! - **Moderate (1)**: at least 1 standard deviation in the unfavourable direction
//! - **None (0)**: within range, favourable direction, or not evaluable
//!
//! # Direction
//!
//! Only unfavourable movement is interesting. Recovery, HRV and the sleep metrics are
//! flagged when they drop below baseline; resting heart rate is flagged when it rises
//! above baseline. Strain is not monitored here. The policy lives in [`POLARITY_TABLE`].
//!
//! # Baseline horizon
//!
//! Short windows (today, last 7 days) compare against the 3-month baseline while the
//! 30-day window compares against the all-time baseline. This asymmetry is inherited
//! from the dashboard's original alerting rules and has not been confirmed with the
//! coaching staff, so it is exposed as [`HorizonPolicy`] rather than hard-wired.
//!
//! Every failure mode degrades to "no alert"; [`Assessment::NotEvaluated`] records why.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::trace;

use crate::error::{RecoveryRsError, Result};
use crate::models::{BaselineHorizon, BaselineStat, MetricKind, Period};

/// Which direction of movement is healthy for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Drops below baseline are flagged
    HigherIsBetter,
    /// Rises above baseline are flagged
    LowerIsBetter,
    /// Never flagged by the classifier
    NotMonitored,
}

/// Per-metric direction policy consulted by the classifier
pub const POLARITY_TABLE: [(MetricKind, Polarity); 10] = [
    (MetricKind::RecoveryScore, Polarity::HigherIsBetter),
    (MetricKind::Strain, Polarity::NotMonitored),
    (MetricKind::RestingHeartRate, Polarity::LowerIsBetter),
    (MetricKind::Hrv, Polarity::HigherIsBetter),
    (MetricKind::SleepPerformance, Polarity::HigherIsBetter),
    (MetricKind::SleepConsistency, Polarity::HigherIsBetter),
    (MetricKind::SleepEfficiency, Polarity::HigherIsBetter),
    (MetricKind::SleepDuration, Polarity::HigherIsBetter),
    (MetricKind::RestorativeSleepDuration, Polarity::HigherIsBetter),
    (MetricKind::RestorativeSleepPercentage, Polarity::HigherIsBetter),
];

impl Polarity {
    pub fn of(metric: MetricKind) -> Polarity {
        POLARITY_TABLE
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, polarity)| *polarity)
            .unwrap_or(Polarity::NotMonitored)
    }

    /// Whether moving from `mean` to `value` is in the healthy direction
    fn is_favourable(&self, value: f64, mean: f64) -> bool {
        match self {
            Polarity::HigherIsBetter => value > mean,
            Polarity::LowerIsBetter => value < mean,
            Polarity::NotMonitored => true,
        }
    }
}

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    None,
    Moderate,
    Severe,
}

impl Severity {
    /// Integer level used by the dashboard (0, 1, 2)
    pub fn level(&self) -> u8 {
        match self {
            Severity::None => 0,
            Severity::Moderate => 1,
            Severity::Severe => 2,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Severity::None),
            1 => Some(Severity::Moderate),
            2 => Some(Severity::Severe),
            _ => None,
        }
    }

    pub fn is_alert(&self) -> bool {
        *self > Severity::None
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "None"),
            Severity::Moderate => write!(f, "Moderate"),
            Severity::Severe => write!(f, "Severe"),
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let level = u8::deserialize(deserializer)?;
        Severity::from_level(level)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid severity level: {}", level)))
    }
}

/// Why a metric could not be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Metric is excluded from deviation alerting (strain)
    NotMonitored,
    /// No current value for the period
    MissingValue,
    /// Current value is NaN or infinite
    NonFiniteValue,
    /// Current value is exactly zero, the backend's missing-data sentinel
    ZeroValue,
    /// No baseline for the athlete, metric and horizon
    MissingBaseline,
    /// Baseline spread is zero, negative or non-finite
    DegenerateBaseline,
}

impl SkipReason {
    /// Skips that hide a real data gap rather than an intentional exclusion
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self,
            SkipReason::NonFiniteValue | SkipReason::MissingBaseline | SkipReason::DegenerateBaseline
        )
    }
}

/// Detailed outcome of classifying one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Assessment {
    /// Unfavourable deviation at or beyond the moderate threshold
    Deviation { severity: Severity, amount: f64 },
    /// Evaluated and found within normal range (or favourable)
    WithinRange { amount: f64 },
    /// Could not be evaluated
    NotEvaluated { reason: SkipReason },
}

impl Assessment {
    pub fn severity(&self) -> Severity {
        match self {
            Assessment::Deviation { severity, .. } => *severity,
            _ => Severity::None,
        }
    }

    pub fn was_evaluated(&self) -> bool {
        !matches!(self, Assessment::NotEvaluated { .. })
    }
}

/// Deviation thresholds in standard deviations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviationThresholds {
    pub moderate: f64,
    pub severe: f64,
}

impl Default for DeviationThresholds {
    fn default() -> Self {
        Self {
            moderate: 1.0,
            severe: 2.0,
        }
    }
}

impl DeviationThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.moderate.is_finite() && self.moderate > 0.0) {
            return Err(RecoveryRsError::Configuration(format!(
                "moderate threshold must be positive, got {}",
                self.moderate
            )));
        }
        if !(self.severe.is_finite() && self.severe >= self.moderate) {
            return Err(RecoveryRsError::Configuration(format!(
                "severe threshold ({}) must be at least the moderate threshold ({})",
                self.severe, self.moderate
            )));
        }
        Ok(())
    }

    /// Grade an unfavourable deviation amount
    pub fn grade(&self, amount: f64) -> Severity {
        if amount >= self.severe {
            Severity::Severe
        } else if amount >= self.moderate {
            Severity::Moderate
        } else {
            Severity::None
        }
    }
}

/// Baseline horizon used for each period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonPolicy {
    pub today: BaselineHorizon,
    pub last_7_days: BaselineHorizon,
    pub last_30_days: BaselineHorizon,
}

impl Default for HorizonPolicy {
    fn default() -> Self {
        Self {
            today: BaselineHorizon::ThreeMonth,
            last_7_days: BaselineHorizon::ThreeMonth,
            last_30_days: BaselineHorizon::AllTime,
        }
    }
}

impl HorizonPolicy {
    pub fn horizon_for(&self, period: Period) -> BaselineHorizon {
        match period {
            Period::Today => self.today,
            Period::Last7Days => self.last_7_days,
            Period::Last30Days => self.last_30_days,
        }
    }
}

/// Classifies a current metric value against a baseline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviationClassifier {
    thresholds: DeviationThresholds,
    horizons: HorizonPolicy,
}

impl DeviationClassifier {
    /// Classifier with the standard 1/2 standard deviation thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with custom thresholds and horizon policy
    pub fn with_config(thresholds: DeviationThresholds, horizons: HorizonPolicy) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            horizons,
        })
    }

    pub fn thresholds(&self) -> DeviationThresholds {
        self.thresholds
    }

    /// Baseline horizon to compare `period` averages against
    pub fn horizon_for(&self, period: Period) -> BaselineHorizon {
        self.horizons.horizon_for(period)
    }

    /// Full assessment of one metric value against its baseline
    pub fn assess(
        &self,
        metric: MetricKind,
        current: Option<f64>,
        baseline: Option<BaselineStat>,
    ) -> Assessment {
        let polarity = Polarity::of(metric);
        if polarity == Polarity::NotMonitored {
            return Assessment::NotEvaluated {
                reason: SkipReason::NotMonitored,
            };
        }

        let value = match current {
            None => {
                return Assessment::NotEvaluated {
                    reason: SkipReason::MissingValue,
                }
            }
            Some(v) if !v.is_finite() => {
                return Assessment::NotEvaluated {
                    reason: SkipReason::NonFiniteValue,
                }
            }
            Some(v) if v == 0.0 => {
                return Assessment::NotEvaluated {
                    reason: SkipReason::ZeroValue,
                }
            }
            Some(v) => v,
        };

        let stat = match baseline {
            None => {
                return Assessment::NotEvaluated {
                    reason: SkipReason::MissingBaseline,
                }
            }
            Some(stat) if !stat.is_usable() => {
                return Assessment::NotEvaluated {
                    reason: SkipReason::DegenerateBaseline,
                }
            }
            Some(stat) => stat,
        };

        let amount = stat.deviation_amount(value);

        if polarity.is_favourable(value, stat.mean) {
            return Assessment::WithinRange { amount };
        }

        let assessment = match self.thresholds.grade(amount) {
            Severity::None => Assessment::WithinRange { amount },
            severity => Assessment::Deviation { severity, amount },
        };

        trace!(
            metric = %metric,
            value,
            mean = stat.mean,
            std_dev = stat.std_dev,
            amount,
            severity = assessment.severity().level(),
            "Assessed metric deviation"
        );

        assessment
    }

    /// Severity-only view of [`assess`](Self::assess)
    pub fn classify(
        &self,
        metric: MetricKind,
        current: Option<f64>,
        baseline: Option<BaselineStat>,
    ) -> Severity {
        self.assess(metric, current, baseline).severity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGHER_IS_BETTER: [MetricKind; 8] = [
        MetricKind::RecoveryScore,
        MetricKind::Hrv,
        MetricKind::SleepPerformance,
        MetricKind::SleepConsistency,
        MetricKind::SleepEfficiency,
        MetricKind::SleepDuration,
        MetricKind::RestorativeSleepDuration,
        MetricKind::RestorativeSleepPercentage,
    ];

    fn baseline() -> Option<BaselineStat> {
        Some(BaselineStat::new(60.0, 10.0))
    }

    #[test]
    fn test_polarity_table_covers_every_metric() {
        for metric in MetricKind::ALL {
            assert!(POLARITY_TABLE.iter().any(|(m, _)| *m == metric), "{metric} missing");
        }
        assert_eq!(Polarity::of(MetricKind::Strain), Polarity::NotMonitored);
        assert_eq!(Polarity::of(MetricKind::RestingHeartRate), Polarity::LowerIsBetter);
        for metric in HIGHER_IS_BETTER {
            assert_eq!(Polarity::of(metric), Polarity::HigherIsBetter);
        }
    }

    #[test]
    fn test_severity_thresholds() {
        let classifier = DeviationClassifier::new();
        let metric = MetricKind::RecoveryScore;

        assert_eq!(classifier.classify(metric, Some(50.0), baseline()), Severity::Moderate);
        assert_eq!(classifier.classify(metric, Some(40.0), baseline()), Severity::Severe);
        assert_eq!(classifier.classify(metric, Some(55.0), baseline()), Severity::None);
        assert_eq!(classifier.classify(metric, Some(10.0), baseline()), Severity::Severe);
    }

    #[test]
    fn test_higher_is_better_metrics_ignore_rises() {
        let classifier = DeviationClassifier::new();

        for metric in HIGHER_IS_BETTER {
            assert_eq!(classifier.classify(metric, Some(95.0), baseline()), Severity::None);
            assert_eq!(classifier.classify(metric, Some(1_000.0), baseline()), Severity::None);
            assert_eq!(classifier.classify(metric, Some(40.0), baseline()), Severity::Severe);
        }
    }

    #[test]
    fn test_resting_heart_rate_ignores_drops() {
        let classifier = DeviationClassifier::new();
        let rhr = MetricKind::RestingHeartRate;

        assert_eq!(classifier.classify(rhr, Some(30.0), baseline()), Severity::None);
        assert_eq!(classifier.classify(rhr, Some(70.0), baseline()), Severity::Moderate);
        assert_eq!(classifier.classify(rhr, Some(80.0), baseline()), Severity::Severe);
    }

    #[test]
    fn test_strain_never_flagged() {
        let classifier = DeviationClassifier::new();
        for value in [0.0, 1.0, 40.0, 60.0, 200.0] {
            assert_eq!(
                classifier.assess(MetricKind::Strain, Some(value), baseline()),
                Assessment::NotEvaluated {
                    reason: SkipReason::NotMonitored
                }
            );
        }
    }

    #[test]
    fn test_zero_value_is_missing_sentinel() {
        let classifier = DeviationClassifier::new();
        for metric in MetricKind::ALL {
            assert_eq!(classifier.classify(metric, Some(0.0), baseline()), Severity::None);
        }
        assert_eq!(
            classifier.assess(MetricKind::Hrv, Some(0.0), baseline()),
            Assessment::NotEvaluated {
                reason: SkipReason::ZeroValue
            }
        );
    }

    #[test]
    fn test_unusable_baselines() {
        let classifier = DeviationClassifier::new();
        let metric = MetricKind::Hrv;

        assert_eq!(
            classifier.assess(metric, Some(10.0), None),
            Assessment::NotEvaluated {
                reason: SkipReason::MissingBaseline
            }
        );
        for stat in [
            BaselineStat::new(60.0, 0.0),
            BaselineStat::new(60.0, -5.0),
            BaselineStat::new(60.0, f64::NAN),
            BaselineStat::new(f64::NAN, 10.0),
        ] {
            assert_eq!(
                classifier.assess(metric, Some(10.0), Some(stat)),
                Assessment::NotEvaluated {
                    reason: SkipReason::DegenerateBaseline
                }
            );
        }
    }

    #[test]
    fn test_malformed_values_degrade_to_no_alert() {
        let classifier = DeviationClassifier::new();
        let metric = MetricKind::RecoveryScore;

        assert_eq!(classifier.classify(metric, None, baseline()), Severity::None);
        assert_eq!(classifier.classify(metric, Some(f64::NAN), baseline()), Severity::None);
        assert_eq!(
            classifier.assess(metric, Some(f64::NEG_INFINITY), baseline()),
            Assessment::NotEvaluated {
                reason: SkipReason::NonFiniteValue
            }
        );
    }

    #[test]
    fn test_within_range_reports_amount() {
        let classifier = DeviationClassifier::new();
        match classifier.assess(MetricKind::SleepDuration, Some(55.0), baseline()) {
            Assessment::WithinRange { amount } => assert!((amount - 0.5).abs() < 1e-12),
            other => panic!("unexpected assessment: {:?}", other),
        }
    }

    #[test]
    fn test_default_horizon_policy() {
        let classifier = DeviationClassifier::new();
        assert_eq!(classifier.horizon_for(Period::Today), BaselineHorizon::ThreeMonth);
        assert_eq!(classifier.horizon_for(Period::Last7Days), BaselineHorizon::ThreeMonth);
        assert_eq!(classifier.horizon_for(Period::Last30Days), BaselineHorizon::AllTime);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = DeviationThresholds {
            moderate: 0.5,
            severe: 1.5,
        };
        let classifier = DeviationClassifier::with_config(thresholds, HorizonPolicy::default()).unwrap();

        assert_eq!(classifier.classify(MetricKind::Hrv, Some(55.0), baseline()), Severity::Moderate);
        assert_eq!(classifier.classify(MetricKind::Hrv, Some(45.0), baseline()), Severity::Severe);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let inverted = DeviationThresholds {
            moderate: 2.0,
            severe: 1.0,
        };
        assert!(DeviationClassifier::with_config(inverted, HorizonPolicy::default()).is_err());

        let zero = DeviationThresholds {
            moderate: 0.0,
            severe: 1.0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_severity_serializes_as_level() {
        assert_eq!(serde_json::to_string(&Severity::Severe).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Severity>("1").unwrap(), Severity::Moderate);
        assert!(serde_json::from_str::<Severity>("3").is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_favourable_direction_never_alerts(
            mean in 1.0f64..200.0,
            std_dev in 0.1f64..50.0,
            delta in 0.0f64..500.0,
        ) {
            let classifier = DeviationClassifier::new();
            let stat = Some(BaselineStat::new(mean, std_dev));

            for metric in HIGHER_IS_BETTER {
                prop_assert_eq!(classifier.classify(metric, Some(mean + delta + 0.001), stat), Severity::None);
            }
            prop_assert_eq!(
                classifier.classify(MetricKind::RestingHeartRate, Some(mean - delta.min(mean - 0.5)), stat),
                Severity::None
            );
        }

        #[test]
        fn test_strain_and_zero_never_alert(
            value in -1000.0f64..1000.0,
            mean in -100.0f64..100.0,
            std_dev in -10.0f64..10.0,
        ) {
            let classifier = DeviationClassifier::new();
            let stat = Some(BaselineStat::new(mean, std_dev));

            prop_assert_eq!(classifier.classify(MetricKind::Strain, Some(value), stat), Severity::None);
            for metric in MetricKind::ALL {
                prop_assert_eq!(classifier.classify(metric, Some(0.0), stat), Severity::None);
            }
        }

        #[test]
        fn test_unfavourable_grade_matches_amount(
            mean in 10.0f64..200.0,
            std_dev in 0.5f64..20.0,
            sds in 0.0f64..5.0,
        ) {
            let classifier = DeviationClassifier::new();
            let stat = Some(BaselineStat::new(mean, std_dev));
            let value = mean + sds * std_dev;

            let assessment = classifier.assess(MetricKind::RestingHeartRate, Some(value), stat);
            let expected = classifier.thresholds().grade((value - mean).abs() / std_dev);
            prop_assert_eq!(assessment.severity(), expected);
            prop_assert_eq!(
                classifier.assess(MetricKind::RestingHeartRate, Some(value), stat),
                assessment
            );
        }
    }
}
