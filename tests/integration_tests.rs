use chrono::{Days, NaiveDate};
use std::fs;
use tempfile::tempdir;

use recoveryrs::export::{self, ExportFormat};
use recoveryrs::import::ImportManager;
use recoveryrs::{
    AlertAggregator, BaselineCalculator, BaselineHorizon, BaselineTable, DeviationClassifier,
    DeviationThresholds, HorizonPolicy, MetricKind, MetricSample, Period, Severity,
};

/// End-to-end workflows: files in, alert report out

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

fn day(n: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(n)).unwrap()
}

const SAMPLES_CSV: &str = "\
athlete_id,date,recovery_score,resting_heart_rate,hrv,strain
1,2024-06-30,30,62,40,18.0
1,2024-06-27,35,60,45,17.5
2,2024-06-30,70,50,90,9.0
2,2024-06-10,72,51,88,8.0
3,2024-06-30,0,,,
";

const BASELINES_CSV: &str = "\
athlete_id,recovery_score_three_month_avg,recovery_score_three_month_std_dev,resting_heart_rate_three_month_avg,resting_heart_rate_three_month_std_dev,hrv_three_month_avg,hrv_three_month_std_dev,recovery_score_all_time_avg,recovery_score_all_time_std_dev
1,60,10,52,4,70,10,55,10
2,65,10,52,4,80,10,60,10
";

fn write_inputs(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let samples = dir.join("samples.csv");
    let baselines = dir.join("baselines.csv");
    fs::write(&samples, SAMPLES_CSV).unwrap();
    fs::write(&baselines, BASELINES_CSV).unwrap();
    (samples, baselines)
}

fn load(dir: &std::path::Path) -> (Vec<MetricSample>, BaselineTable) {
    let (samples_path, baselines_path) = write_inputs(dir);
    let manager = ImportManager::new();

    let rows = manager.import_samples(&samples_path).unwrap();
    let samples = rows.iter().flat_map(|row| row.samples()).collect();
    let baselines = BaselineTable::from_rows(&manager.import_baselines(&baselines_path).unwrap());
    (samples, baselines)
}

#[test]
fn test_csv_to_report_workflow() {
    let dir = tempdir().unwrap();
    let (samples, baselines) = load(dir.path());

    let report = AlertAggregator::new().evaluate_report(&samples, &baselines, today());
    assert_eq!(report.periods.len(), 3);

    let today_alerts = report.period(Period::Today).unwrap();
    assert_eq!(today_alerts.horizon, BaselineHorizon::ThreeMonth);

    // Recovery 30 vs 60±10, RHR 62 vs 52±4, HRV 40 vs 70±10: all severe
    let athlete_one = today_alerts.get(1).unwrap();
    assert_eq!(athlete_one.alert, Severity::Severe);
    let flagged: Vec<MetricKind> = athlete_one
        .deviating_metrics
        .iter()
        .map(|m| m.metric)
        .collect();
    assert_eq!(
        flagged,
        vec![MetricKind::RecoveryScore, MetricKind::RestingHeartRate, MetricKind::Hrv]
    );

    // Athlete 2 is above baseline on every higher-is-better metric
    let athlete_two = today_alerts.get(2).unwrap();
    assert_eq!(athlete_two.alert, Severity::None);
    assert!(athlete_two.deviating_metrics.is_empty());

    // Athlete 3 only has a zero recovery score and no baselines at all
    let athlete_three = today_alerts.get(3).unwrap();
    assert_eq!(athlete_three.alert, Severity::None);
    assert!(athlete_three.deviating_metrics.is_empty());
}

#[test]
fn test_thirty_day_window_uses_all_time_baseline() {
    let dir = tempdir().unwrap();
    let (samples, baselines) = load(dir.path());

    let report = AlertAggregator::new().evaluate_report(&samples, &baselines, today());
    let month = report.period(Period::Last30Days).unwrap();
    assert_eq!(month.horizon, BaselineHorizon::AllTime);

    // Recovery (30+35)/2 = 32.5 vs 55±10 → 2.25 SD below
    let record = month.get(1).unwrap();
    assert_eq!(record.alert, Severity::Severe);
    let recovery = &record.deviating_metrics[0];
    assert_eq!(recovery.metric, MetricKind::RecoveryScore);
    assert_eq!(recovery.value, 32.5);
    assert_eq!(recovery.avg_value, 55.0);
    assert!((recovery.deviation_amount - 2.25).abs() < 1e-9);

    // No all-time baselines for RHR or HRV
    assert!(record.unevaluated.contains(&MetricKind::Hrv));
    assert!(record.unevaluated.contains(&MetricKind::RestingHeartRate));
}

#[test]
fn test_week_window_excludes_older_rows() {
    let dir = tempdir().unwrap();
    let (samples, baselines) = load(dir.path());

    let report = AlertAggregator::new().evaluate_report(&samples, &baselines, today());
    let week = report.period(Period::Last7Days).unwrap();

    // Athlete 2's 2024-06-10 row is outside the week
    let averages = recoveryrs::MetricAggregator::aggregate(&samples, Period::Last7Days, today());
    assert_eq!(averages.value(2, MetricKind::RecoveryScore), Some(70.0));
    assert_eq!(week.get(2).unwrap().alert, Severity::None);
    assert_eq!(week.get(1).unwrap().alert, Severity::Severe);
}

#[test]
fn test_custom_policy_changes_outcome() {
    let dir = tempdir().unwrap();
    let (samples, baselines) = load(dir.path());

    let lenient = DeviationClassifier::with_config(
        DeviationThresholds {
            moderate: 3.0,
            severe: 4.0,
        },
        HorizonPolicy {
            last_30_days: BaselineHorizon::ThreeMonth,
            ..HorizonPolicy::default()
        },
    )
    .unwrap();
    let report = AlertAggregator::with_classifier(lenient).evaluate_report(&samples, &baselines, today());

    // HRV 40 vs 70±10 is 3 SD: moderate under the lenient thresholds
    let record = report.period(Period::Today).unwrap().get(1).unwrap();
    assert_eq!(record.alert, Severity::Moderate);
    assert_eq!(
        report.period(Period::Last30Days).unwrap().horizon,
        BaselineHorizon::ThreeMonth
    );
}

#[test]
fn test_report_json_export() {
    let dir = tempdir().unwrap();
    let (samples, baselines) = load(dir.path());
    let report = AlertAggregator::new().evaluate_report(&samples, &baselines, today());

    let output = dir.path().join("alerts.json");
    export::export_report(&report, ExportFormat::Json, &output).unwrap();

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let record = &document["periods"]["today"]["1"];
    assert_eq!(record["athlete_id"], 1);
    assert_eq!(record["alert"], 2);
    assert_eq!(record["deviatingMetrics"][0]["metric"], "recovery_score");
    assert_eq!(record["deviatingMetrics"][0]["avgValue"], 60.0);
    assert_eq!(record["deviatingMetrics"][0]["deviation"], 2);
}

#[test]
fn test_computed_baselines_feed_alerts() {
    let mut samples = Vec::new();
    // Stable history: HRV alternating 70/80 for sixty days
    for n in 1..=60u64 {
        let value = if n % 2 == 0 { 70.0 } else { 80.0 };
        samples.push(MetricSample::new(5, MetricKind::Hrv, Some(value), day(n)));
    }
    samples.push(MetricSample::new(5, MetricKind::Hrv, Some(55.0), today()));

    let baselines = BaselineCalculator::new().calculate(&samples, today());
    let report = AlertAggregator::new().evaluate_report(&samples, &baselines, today());

    let record = report.period(Period::Today).unwrap().get(5).unwrap();
    assert_eq!(record.alert, Severity::Severe);
}
