//! Athlete baselines
//!
//! A baseline is the athlete's historical mean and standard deviation for a metric
//! over a fixed horizon. Baselines normally arrive precomputed from the data backend
//! as wide rows; [`BaselineCalculator`] can also derive them from sample history.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::models::{AthleteId, BaselineHorizon, BaselineRow, BaselineStat, MetricKind, MetricSample};

/// Source of baselines consulted by the deviation classifier
pub trait BaselineProvider {
    /// Baseline for one athlete, metric and horizon, if one exists
    fn baseline(
        &self,
        athlete_id: AthleteId,
        metric: MetricKind,
        horizon: BaselineHorizon,
    ) -> Option<BaselineStat>;
}

/// In-memory baseline lookup keyed by athlete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineTable {
    athletes: HashMap<AthleteId, BTreeMap<(BaselineHorizon, MetricKind), BaselineStat>>,
}

impl BaselineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from wide backend rows; later rows for the same athlete win
    pub fn from_rows(rows: &[BaselineRow]) -> Self {
        let mut table = Self::new();

        for row in rows {
            for horizon in BaselineHorizon::ALL {
                for metric in MetricKind::ALL {
                    if let Some(stat) = row.stat(metric, horizon) {
                        table.insert(row.athlete_id, metric, horizon, stat);
                    }
                }
            }
        }

        debug!(rows = rows.len(), athletes = table.len(), "Loaded baselines from rows");
        table
    }

    pub fn insert(
        &mut self,
        athlete_id: AthleteId,
        metric: MetricKind,
        horizon: BaselineHorizon,
        stat: BaselineStat,
    ) {
        if stat.std_dev < 0.0 {
            warn!(
                athlete_id,
                metric = %metric,
                horizon = %horizon,
                std_dev = stat.std_dev,
                "Negative baseline standard deviation"
            );
        }

        self.athletes
            .entry(athlete_id)
            .or_default()
            .insert((horizon, metric), stat);
    }

    /// Convert back into wide rows, ordered by athlete id
    pub fn to_rows(&self) -> Vec<BaselineRow> {
        let mut rows: Vec<BaselineRow> = self
            .athletes
            .iter()
            .map(|(athlete_id, stats)| {
                let mut row = BaselineRow::new(*athlete_id);
                for ((horizon, metric), stat) in stats {
                    row.set_stat(*metric, *horizon, *stat);
                }
                row
            })
            .collect();
        rows.sort_by_key(|row| row.athlete_id);
        rows
    }

    /// Every stored entry as (athlete, metric, horizon, stat)
    pub fn entries(&self) -> impl Iterator<Item = (AthleteId, MetricKind, BaselineHorizon, BaselineStat)> + '_ {
        self.athletes.iter().flat_map(|(athlete_id, stats)| {
            stats
                .iter()
                .map(move |((horizon, metric), stat)| (*athlete_id, *metric, *horizon, *stat))
        })
    }

    /// Athlete ids with at least one baseline, sorted
    pub fn athletes(&self) -> Vec<AthleteId> {
        let mut ids: Vec<_> = self.athletes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }
}

impl BaselineProvider for BaselineTable {
    fn baseline(
        &self,
        athlete_id: AthleteId,
        metric: MetricKind,
        horizon: BaselineHorizon,
    ) -> Option<BaselineStat> {
        self.athletes
            .get(&athlete_id)
            .and_then(|stats| stats.get(&(horizon, metric)))
            .copied()
    }
}

/// Derives baselines from sample history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineCalculator {
    /// Length of the short horizon in days, ending on the reference day
    pub three_month_days: u64,

    /// Fewest usable values needed before a baseline is produced
    pub min_samples: usize,
}

impl Default for BaselineCalculator {
    fn default() -> Self {
        Self {
            three_month_days: 90,
            min_samples: 2,
        }
    }
}

impl BaselineCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(2);
        self
    }

    /// Whether a sample dated `date` belongs to `horizon` for reference day `today`
    pub fn in_horizon(&self, horizon: BaselineHorizon, date: NaiveDate, today: NaiveDate) -> bool {
        if date > today {
            return false;
        }

        match horizon {
            BaselineHorizon::AllTime => true,
            BaselineHorizon::ThreeMonth => {
                let start = today
                    .checked_sub_days(Days::new(self.three_month_days.saturating_sub(1)))
                    .unwrap_or(NaiveDate::MIN);
                date >= start
            }
        }
    }

    /// Sample mean and sample standard deviation, or `None` with too few values
    pub fn summarize(&self, values: &[f64]) -> Option<BaselineStat> {
        if values.len() < self.min_samples.max(2) {
            return None;
        }

        let mean = values.iter().mean();
        let std_dev = values.iter().std_dev();

        let stat = BaselineStat::new(mean, std_dev);
        (stat.mean.is_finite() && stat.std_dev.is_finite()).then_some(stat)
    }

    /// Compute baselines for every athlete, metric and horizon present in `samples`
    pub fn calculate(&self, samples: &[MetricSample], today: NaiveDate) -> BaselineTable {
        let mut grouped: BTreeMap<(AthleteId, MetricKind, BaselineHorizon), Vec<f64>> = BTreeMap::new();

        for sample in samples {
            let Some(value) = sample.usable_value() else {
                continue;
            };

            for horizon in BaselineHorizon::ALL {
                if self.in_horizon(horizon, sample.date, today) {
                    grouped
                        .entry((sample.athlete_id, sample.metric, horizon))
                        .or_default()
                        .push(value);
                }
            }
        }

        let mut table = BaselineTable::new();
        let mut skipped = 0usize;

        for ((athlete_id, metric, horizon), values) in grouped {
            match self.summarize(&values) {
                Some(stat) => table.insert(athlete_id, metric, horizon, stat),
                None => skipped += 1,
            }
        }

        debug!(
            as_of = %today,
            athletes = table.len(),
            skipped,
            "Calculated baselines from sample history"
        );

        table
    }
}
