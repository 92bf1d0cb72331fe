use chrono::{DateTime, Days, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Athlete identifier as issued by the team roster backend
pub type AthleteId = i64;

/// Daily wearable metrics tracked for every athlete
///
/// Declaration order is the canonical metric order used for evaluation and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Composite daily readiness score (0-100)
    RecoveryScore,
    /// Daily training/physiological load (0-21)
    Strain,
    /// Resting heart rate in beats per minute
    RestingHeartRate,
    /// Heart rate variability (RMSSD, milliseconds)
    Hrv,
    SleepPerformance,
    SleepConsistency,
    SleepEfficiency,
    /// Total sleep duration in hours
    SleepDuration,
    /// Deep + REM sleep duration in hours
    RestorativeSleepDuration,
    /// Deep + REM sleep as a percentage of total sleep
    RestorativeSleepPercentage,
}

impl MetricKind {
    /// Every tracked metric in canonical order
    pub const ALL: [MetricKind; 10] = [
        MetricKind::RecoveryScore,
        MetricKind::Strain,
        MetricKind::RestingHeartRate,
        MetricKind::Hrv,
        MetricKind::SleepPerformance,
        MetricKind::SleepConsistency,
        MetricKind::SleepEfficiency,
        MetricKind::SleepDuration,
        MetricKind::RestorativeSleepDuration,
        MetricKind::RestorativeSleepPercentage,
    ];

    /// Metrics evaluated for deviation alerts, in evaluation order (strain excluded)
    pub const MONITORED: [MetricKind; 9] = [
        MetricKind::RecoveryScore,
        MetricKind::RestingHeartRate,
        MetricKind::Hrv,
        MetricKind::SleepPerformance,
        MetricKind::SleepConsistency,
        MetricKind::SleepEfficiency,
        MetricKind::SleepDuration,
        MetricKind::RestorativeSleepDuration,
        MetricKind::RestorativeSleepPercentage,
    ];

    /// Column name used by ingestion rows and the metric store
    pub fn column_name(&self) -> &'static str {
        match self {
            MetricKind::RecoveryScore => "recovery_score",
            MetricKind::Strain => "strain",
            MetricKind::RestingHeartRate => "resting_heart_rate",
            MetricKind::Hrv => "hrv",
            MetricKind::SleepPerformance => "sleep_performance",
            MetricKind::SleepConsistency => "sleep_consistency",
            MetricKind::SleepEfficiency => "sleep_efficiency",
            MetricKind::SleepDuration => "sleep_duration",
            MetricKind::RestorativeSleepDuration => "restorative_sleep_duration",
            MetricKind::RestorativeSleepPercentage => "restorative_sleep_percentage",
        }
    }

    /// Human-readable label for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::RecoveryScore => "Recovery",
            MetricKind::Strain => "Strain",
            MetricKind::RestingHeartRate => "Resting HR",
            MetricKind::Hrv => "HRV",
            MetricKind::SleepPerformance => "Sleep Performance",
            MetricKind::SleepConsistency => "Sleep Consistency",
            MetricKind::SleepEfficiency => "Sleep Efficiency",
            MetricKind::SleepDuration => "Sleep Duration",
            MetricKind::RestorativeSleepDuration => "Restorative Sleep",
            MetricKind::RestorativeSleepPercentage => "Restorative Sleep %",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "recovery_score" | "recovery" => Ok(MetricKind::RecoveryScore),
            "strain" | "day_strain" => Ok(MetricKind::Strain),
            "resting_heart_rate" | "rhr" | "resting_hr" => Ok(MetricKind::RestingHeartRate),
            "hrv" | "hrv_rmssd" | "hrv_rmssd_milli" | "heart_rate_variability" => {
                Ok(MetricKind::Hrv)
            }
            "sleep_performance" | "sleep_performance_percentage" => {
                Ok(MetricKind::SleepPerformance)
            }
            "sleep_consistency" | "sleep_consistency_percentage" => {
                Ok(MetricKind::SleepConsistency)
            }
            "sleep_efficiency" | "sleep_efficiency_percentage" => Ok(MetricKind::SleepEfficiency),
            "sleep_duration" | "total_sleep" => Ok(MetricKind::SleepDuration),
            "restorative_sleep_duration" | "restorative_sleep" => {
                Ok(MetricKind::RestorativeSleepDuration)
            }
            "restorative_sleep_percentage" | "restorative_sleep_pct" => {
                Ok(MetricKind::RestorativeSleepPercentage)
            }
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Averaging window for current metric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Today, Period::Last7Days, Period::Last30Days];

    /// Number of calendar days covered, including the reference day
    pub fn days(&self) -> u64 {
        match self {
            Period::Today => 1,
            Period::Last7Days => 7,
            Period::Last30Days => 30,
        }
    }

    /// First calendar day of the window ending on `today`
    pub fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(self.days() - 1))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Whether `date` falls inside the window ending on `today` (both ends inclusive)
    pub fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        date <= today && date >= self.window_start(today)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Today => write!(f, "Today"),
            Period::Last7Days => write!(f, "Last 7 Days"),
            Period::Last30Days => write!(f, "Last 30 Days"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "today" | "1d" => Ok(Period::Today),
            "last7days" | "7d" | "week" => Ok(Period::Last7Days),
            "last30days" | "30d" | "month" => Ok(Period::Last30Days),
            _ => Err(format!("Invalid period: {} (expected today, 7d or 30d)", s)),
        }
    }
}

/// Historical horizon a baseline was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineHorizon {
    ThreeMonth,
    AllTime,
}

impl BaselineHorizon {
    pub const ALL: [BaselineHorizon; 2] = [BaselineHorizon::ThreeMonth, BaselineHorizon::AllTime];

    /// Column prefix used in wide baseline rows (`<metric>_<prefix>_avg`)
    pub fn column_prefix(&self) -> &'static str {
        match self {
            BaselineHorizon::ThreeMonth => "three_month",
            BaselineHorizon::AllTime => "all_time",
        }
    }
}

impl fmt::Display for BaselineHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaselineHorizon::ThreeMonth => write!(f, "3-month"),
            BaselineHorizon::AllTime => write!(f, "all-time"),
        }
    }
}

impl FromStr for BaselineHorizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "three_month" | "3_month" | "3m" => Ok(BaselineHorizon::ThreeMonth),
            "all_time" | "all" => Ok(BaselineHorizon::AllTime),
            _ => Err(format!("Invalid baseline horizon: {}", s)),
        }
    }
}

/// Single daily measurement of one metric for one athlete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub athlete_id: AthleteId,
    pub metric: MetricKind,
    /// `None` when the wearable reported nothing for that day
    pub value: Option<f64>,
    pub date: NaiveDate,
}

impl MetricSample {
    pub fn new(athlete_id: AthleteId, metric: MetricKind, value: Option<f64>, date: NaiveDate) -> Self {
        Self {
            athlete_id,
            metric,
            value,
            date,
        }
    }

    /// Value usable for averaging; non-finite readings count as missing
    pub fn usable_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Wide per-athlete per-day row as delivered by the data backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyMetricRow {
    pub athlete_id: AthleteId,

    /// Calendar day of the cycle; accepts `label` and RFC 3339 timestamps on input
    #[serde(alias = "label", deserialize_with = "deserialize_sample_date")]
    pub date: NaiveDate,

    #[serde(default)]
    pub recovery_score: Option<f64>,
    #[serde(default)]
    pub strain: Option<f64>,
    #[serde(default)]
    pub resting_heart_rate: Option<f64>,
    #[serde(default)]
    pub hrv: Option<f64>,
    #[serde(default)]
    pub sleep_performance: Option<f64>,
    #[serde(default)]
    pub sleep_consistency: Option<f64>,
    #[serde(default)]
    pub sleep_efficiency: Option<f64>,
    #[serde(default)]
    pub sleep_duration: Option<f64>,
    #[serde(default)]
    pub restorative_sleep_duration: Option<f64>,
    #[serde(default)]
    pub restorative_sleep_percentage: Option<f64>,
}

impl DailyMetricRow {
    pub fn new(athlete_id: AthleteId, date: NaiveDate) -> Self {
        Self {
            athlete_id,
            date,
            ..Self::default()
        }
    }

    pub fn value(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::RecoveryScore => self.recovery_score,
            MetricKind::Strain => self.strain,
            MetricKind::RestingHeartRate => self.resting_heart_rate,
            MetricKind::Hrv => self.hrv,
            MetricKind::SleepPerformance => self.sleep_performance,
            MetricKind::SleepConsistency => self.sleep_consistency,
            MetricKind::SleepEfficiency => self.sleep_efficiency,
            MetricKind::SleepDuration => self.sleep_duration,
            MetricKind::RestorativeSleepDuration => self.restorative_sleep_duration,
            MetricKind::RestorativeSleepPercentage => self.restorative_sleep_percentage,
        }
    }

    pub fn set_value(&mut self, metric: MetricKind, value: Option<f64>) {
        let slot = match metric {
            MetricKind::RecoveryScore => &mut self.recovery_score,
            MetricKind::Strain => &mut self.strain,
            MetricKind::RestingHeartRate => &mut self.resting_heart_rate,
            MetricKind::Hrv => &mut self.hrv,
            MetricKind::SleepPerformance => &mut self.sleep_performance,
            MetricKind::SleepConsistency => &mut self.sleep_consistency,
            MetricKind::SleepEfficiency => &mut self.sleep_efficiency,
            MetricKind::SleepDuration => &mut self.sleep_duration,
            MetricKind::RestorativeSleepDuration => &mut self.restorative_sleep_duration,
            MetricKind::RestorativeSleepPercentage => &mut self.restorative_sleep_percentage,
        };
        *slot = value;
    }

    /// Builder-style setter, mostly for fixtures
    pub fn with(mut self, metric: MetricKind, value: f64) -> Self {
        self.set_value(metric, Some(value));
        self
    }

    /// Explode the row into one sample per tracked metric
    pub fn samples(&self) -> impl Iterator<Item = MetricSample> + '_ {
        MetricKind::ALL
            .into_iter()
            .map(move |metric| MetricSample::new(self.athlete_id, metric, self.value(metric), self.date))
    }
}

/// Parse a sample date from either `YYYY-MM-DD` or an RFC 3339 timestamp.
///
/// Timestamps are mapped onto the calendar day of the local process clock.
pub fn parse_sample_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Local).date_naive());
    }

    // Backends sometimes emit `YYYY-MM-DD HH:MM:SS+00` style timestamps
    if let Ok(timestamp) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%#z") {
        return Ok(timestamp.with_timezone(&Local).date_naive());
    }

    Err(format!("Unable to parse sample date: {}", raw))
}

fn deserialize_sample_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_sample_date(&raw).map_err(serde::de::Error::custom)
}

/// Mean and standard deviation of one metric over one historical horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineStat {
    pub mean: f64,
    pub std_dev: f64,
}

impl BaselineStat {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    /// A baseline is usable only with finite values and a strictly positive spread
    pub fn is_usable(&self) -> bool {
        self.mean.is_finite() && self.std_dev.is_finite() && self.std_dev > 0.0
    }

    /// Distance of `value` from the mean in standard deviations
    pub fn deviation_amount(&self, value: f64) -> f64 {
        (value - self.mean).abs() / self.std_dev
    }
}

/// Wide per-athlete baseline row (`<metric>_<horizon>_avg` / `<metric>_<horizon>_std_dev`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaselineRow {
    pub athlete_id: AthleteId,

    /// `*_avg` / `*_std_dev` columns only; other backend columns are dropped on input
    #[serde(flatten, deserialize_with = "deserialize_stat_columns")]
    pub columns: BTreeMap<String, Option<f64>>,
}

fn deserialize_stat_columns<'de, D>(deserializer: D) -> Result<BTreeMap<String, Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;

    Ok(raw
        .into_iter()
        .filter(|(column, _)| BaselineRow::is_stat_column(column))
        .filter_map(|(column, value)| match value {
            serde_json::Value::Null => Some((column, None)),
            serde_json::Value::Number(number) => Some((column, number.as_f64())),
            _ => None,
        })
        .collect())
}

impl BaselineRow {
    pub fn new(athlete_id: AthleteId) -> Self {
        Self {
            athlete_id,
            columns: BTreeMap::new(),
        }
    }

    /// Whether a column name carries a baseline mean or standard deviation
    pub fn is_stat_column(column: &str) -> bool {
        column.ends_with("_avg") || column.ends_with("_std_dev")
    }

    pub fn mean_column(metric: MetricKind, horizon: BaselineHorizon) -> String {
        format!("{}_{}_avg", metric.column_name(), horizon.column_prefix())
    }

    pub fn std_dev_column(metric: MetricKind, horizon: BaselineHorizon) -> String {
        format!("{}_{}_std_dev", metric.column_name(), horizon.column_prefix())
    }

    /// Baseline for one metric and horizon; absent when either column is missing or null
    pub fn stat(&self, metric: MetricKind, horizon: BaselineHorizon) -> Option<BaselineStat> {
        let mean = self.columns.get(&Self::mean_column(metric, horizon)).copied().flatten()?;
        let std_dev = self
            .columns
            .get(&Self::std_dev_column(metric, horizon))
            .copied()
            .flatten()?;
        Some(BaselineStat::new(mean, std_dev))
    }

    pub fn set_stat(&mut self, metric: MetricKind, horizon: BaselineHorizon, stat: BaselineStat) {
        self.columns
            .insert(Self::mean_column(metric, horizon), Some(stat.mean));
        self.columns
            .insert(Self::std_dev_column(metric, horizon), Some(stat.std_dev));
    }

    /// Builder-style setter, mostly for fixtures
    pub fn with(mut self, metric: MetricKind, horizon: BaselineHorizon, mean: f64, std_dev: f64) -> Self {
        self.set_stat(metric, horizon, BaselineStat::new(mean, std_dev));
        self
    }
}
