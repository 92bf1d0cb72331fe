use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use recoveryrs::config::AppConfig;
use recoveryrs::database::MetricStore;
use recoveryrs::export::{self, ExportFormat};
use recoveryrs::import::ImportManager;
use recoveryrs::{
    AlertAggregator, BaselineTable, DailyMetricRow, MetricAggregator, MetricSample, Period,
    RecoveryRsError, Severity,
};

/// RecoveryRS - Athlete deviation alerting CLI
///
/// Compares recent recovery, sleep and heart-rate metrics against each athlete's
/// own baseline and flags unfavourable deviations.
#[derive(Parser)]
#[command(name = "recoveryrs")]
#[command(version = "0.1.0")]
#[command(about = "Athlete deviation alerting CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import daily metric rows (or baseline rows) into the local store
    Import {
        /// Input file path (CSV or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Treat the file as wide baseline rows
        #[arg(long)]
        baselines: bool,
    },

    /// Manage stored baselines
    Baselines {
        #[command(subcommand)]
        action: BaselineAction,
    },

    /// Show per-athlete period averages
    Averages {
        /// Period (today, 7d, 30d)
        #[arg(short, long, default_value = "7d")]
        period: Period,

        /// Reference day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Read samples from a file instead of the store
        #[arg(long, value_name = "FILE")]
        samples: Option<PathBuf>,
    },

    /// Evaluate deviation alerts
    Alerts {
        /// Restrict the report to one period (today, 7d, 30d)
        #[arg(short, long)]
        period: Option<Period>,

        /// Reference day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Read samples from a file instead of the store
        #[arg(long, value_name = "FILE")]
        samples: Option<PathBuf>,

        /// Read baselines from a file instead of the store
        #[arg(long, value_name = "FILE")]
        baselines: Option<PathBuf>,

        /// Output format (table, json, text)
        #[arg(short = 'f', long, default_value = "table")]
        format: ExportFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only list athletes with an alert
        #[arg(long)]
        flagged_only: bool,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Write a default config file
        #[arg(long)]
        init: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

#[derive(Subcommand)]
enum BaselineAction {
    /// Recompute baselines from stored history
    Refresh {
        /// Reference day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Show stored baselines
    Show {
        /// Only this athlete
        #[arg(short, long)]
        athlete: Option<i64>,
    },
}

#[derive(Tabled)]
struct AverageRow {
    #[tabled(rename = "Athlete")]
    athlete: i64,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Average")]
    average: String,
}

#[derive(Tabled)]
struct BaselineDisplayRow {
    #[tabled(rename = "Athlete")]
    athlete: i64,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Horizon")]
    horizon: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        match err.downcast_ref::<RecoveryRsError>() {
            Some(error) => {
                tracing::error!(error = %error, severity = ?error.severity(), "Command failed");
                eprintln!("{} {}", "Error:".red().bold(), error.user_message());
            }
            None => eprintln!("{} {:#}", "Error:".red().bold(), err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_default(&config_path)?;

    recoveryrs::logging::init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Import { file, baselines } => {
            let manager = ImportManager::new();
            let mut store = open_store(&config)?;
            eprintln!("{}", "Importing metric data...".green().bold());

            if baselines {
                let rows = manager.import_baselines(&file)?;
                let table = BaselineTable::from_rows(&rows);
                let written = store
                    .store_baselines(&table)
                    .map_err(RecoveryRsError::from)?;
                eprintln!(
                    "{}",
                    format!("✓ Stored {} baseline values for {} athletes", written, table.athletes().len())
                        .green()
                );
            } else {
                let rows = manager.import_samples(&file)?;
                let written = store.upsert_rows(&rows).map_err(RecoveryRsError::from)?;
                eprintln!("{}", format!("✓ Imported {} daily rows", written).green());
            }
        }

        Commands::Baselines { action } => match action {
            BaselineAction::Refresh { as_of } => {
                let mut store = open_store(&config)?;
                let today = as_of.unwrap_or_else(|| Local::now().date_naive());
                let written = store
                    .refresh_baselines(today, &config.baseline)
                    .map_err(RecoveryRsError::from)?;
                eprintln!(
                    "{}",
                    format!("✓ Recomputed {} baseline values as of {}", written, today).blue()
                );
            }
            BaselineAction::Show { athlete } => {
                let store = open_store(&config)?;
                let rows: Vec<BaselineDisplayRow> = store
                    .load_baselines()
                    .map_err(RecoveryRsError::from)?
                    .entries()
                    .filter(|(athlete_id, ..)| athlete.map_or(true, |id| id == *athlete_id))
                    .map(|(athlete_id, metric, horizon, stat)| BaselineDisplayRow {
                        athlete: athlete_id,
                        metric: metric.display_name().to_string(),
                        horizon: horizon.to_string(),
                        mean: format!("{:.2}", stat.mean),
                        std_dev: format!("{:.2}", stat.std_dev),
                    })
                    .collect();

                if rows.is_empty() {
                    println!("{}", "No baselines stored".yellow());
                } else {
                    println!("{}", Table::new(rows).with(Style::rounded()));
                }
            }
        },

        Commands::Averages {
            period,
            as_of,
            samples,
        } => {
            let today = as_of.unwrap_or_else(|| Local::now().date_naive());
            let samples = load_samples(&config, samples.as_deref())?;
            let averages = MetricAggregator::aggregate(&samples, period, today);

            println!(
                "{}",
                format!("{} averages as of {}", period, today).cyan().bold()
            );
            let rows: Vec<AverageRow> = averages
                .iter()
                .flat_map(|(athlete_id, metrics)| {
                    metrics.iter().map(move |(metric, value)| AverageRow {
                        athlete: athlete_id,
                        metric: metric.display_name().to_string(),
                        average: format!("{:.2}", value),
                    })
                })
                .collect();

            if rows.is_empty() {
                println!("{}", "No samples in this period".yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        Commands::Alerts {
            period,
            as_of,
            samples,
            baselines,
            format,
            output,
            flagged_only,
        } => {
            let today = as_of.unwrap_or_else(|| Local::now().date_naive());
            let samples = load_samples(&config, samples.as_deref())?;
            let provider = load_baselines(&config, baselines.as_deref())?;

            let aggregator = AlertAggregator::with_classifier(config.classifier()?);
            let mut report = aggregator.evaluate_report(&samples, &provider, today);

            if let Some(period) = period {
                report.periods.retain(|alerts| alerts.period == period);
            }
            if flagged_only {
                for alerts in &mut report.periods {
                    alerts.records.retain(|_, record| record.is_alert());
                }
            }

            match output {
                Some(path) => {
                    export::export_report(&report, format, &path)
                        .map_err(RecoveryRsError::from)?;
                    eprintln!(
                        "{}",
                        format!("✓ Report written to {}", path.display()).green()
                    );
                }
                None => println!(
                    "{}",
                    export::render_report(&report, format).map_err(RecoveryRsError::from)?
                ),
            }

            let severe: usize = report
                .periods
                .iter()
                .map(|alerts| alerts.count_at(Severity::Severe))
                .sum();
            if severe > 0 {
                eprintln!(
                    "{}",
                    format!("{} severe alerts across reported periods", severe).red().bold()
                );
            }
        }

        Commands::Config {
            list,
            init,
            set,
            get,
        } => {
            if init {
                if config_path.exists() {
                    bail!("Config file already exists: {}", config_path.display());
                }
                let mut fresh = AppConfig::default();
                fresh.save_to_file(&config_path)?;
                println!(
                    "{}",
                    format!("✓ Wrote default config to {}", config_path.display()).green()
                );
            } else if list {
                println!("{}", format!("Config: {}", config_path.display()).dimmed());
                for (key, value) in config.list() {
                    println!("  {} = {}", key.bold(), value);
                }
            } else if let Some(key_value) = set {
                let (key, value) = key_value
                    .split_once('=')
                    .with_context(|| format!("Expected key=value, got '{}'", key_value))?;
                config.set(key.trim(), value.trim())?;
                config.save_to_file(&config_path)?;
                println!("{}", format!("✓ {} = {}", key.trim(), value.trim()).green());
            } else if let Some(key) = get {
                match config.get(&key) {
                    Some(value) => println!("{}", value),
                    None => bail!("Unknown configuration key: {}", key),
                }
            } else {
                println!("Use --list, --get, --set or --init");
            }
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<MetricStore> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    MetricStore::open(&path)
        .map_err(RecoveryRsError::from)
        .with_context(|| format!("Failed to open metric store: {}", path.display()))
}

fn load_samples(config: &AppConfig, file: Option<&Path>) -> Result<Vec<MetricSample>> {
    let rows: Vec<DailyMetricRow> = match file {
        Some(path) => ImportManager::new().import_samples(path)?,
        None => open_store(config)?
            .load_rows(None)
            .map_err(RecoveryRsError::from)?,
    };
    info!(rows = rows.len(), "Loaded daily metric rows");

    Ok(rows.iter().flat_map(|row| row.samples()).collect())
}

fn load_baselines(config: &AppConfig, file: Option<&Path>) -> Result<BaselineTable> {
    match file {
        Some(path) => {
            let rows = ImportManager::new().import_baselines(path)?;
            Ok(BaselineTable::from_rows(&rows))
        }
        None => Ok(open_store(config)?
            .load_baselines()
            .map_err(RecoveryRsError::from)?),
    }
}
