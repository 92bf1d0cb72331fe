// Library interface for RecoveryRS
// Integration tests and benches use the core through these re-exports

pub mod aggregation;
pub mod alerts;
pub mod baseline;
pub mod config;
pub mod database;
pub mod deviation;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod models;

pub use models::*;
pub use aggregation::{MetricAggregator, MetricAverages, PeriodAverages};
pub use alerts::{AlertAggregator, AlertRecord, AlertReport, DeviatingMetric, PeriodAlerts};
pub use baseline::{BaselineCalculator, BaselineProvider, BaselineTable};
pub use deviation::{
    Assessment, DeviationClassifier, DeviationThresholds, HorizonPolicy, Polarity, Severity,
    SkipReason,
};
pub use error::{RecoveryRsError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
