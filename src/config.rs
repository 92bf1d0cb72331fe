use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::baseline::BaselineCalculator;
use crate::deviation::{DeviationClassifier, DeviationThresholds, HorizonPolicy};
use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::models::BaselineHorizon;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    #[serde(default)]
    pub metadata: ConfigMetadata,

    /// Storage locations
    #[serde(default)]
    pub settings: AppSettings,

    /// Deviation thresholds and baseline horizons
    #[serde(default)]
    pub alerts: AlertSettings,

    /// Baseline computation for locally stored history
    #[serde(default)]
    pub baseline: BaselineCalculator,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Directory holding the metric store
    pub data_dir: PathBuf,

    /// Metric store file name inside `data_dir`
    pub database_file: String,
}

/// Alerting rules
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub thresholds: DeviationThresholds,

    /// Which baseline each period is compared against
    #[serde(default)]
    pub horizons: HorizonPolicy,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        let now = Utc::now();

        ConfigMetadata {
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            metadata: ConfigMetadata::default(),
            settings: AppSettings::default(),
            alerts: AlertSettings::default(),
            baseline: BaselineCalculator::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: AppConfig::default_config_dir().join("data"),
            database_file: "metrics.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".recoveryrs")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Load `path` if it exists, otherwise defaults. An existing but invalid file is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from_file(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.alerts.thresholds.validate()?;

        if self.baseline.min_samples < 2 {
            bail!(
                "baseline.min_samples must be at least 2 to estimate a standard deviation, got {}",
                self.baseline.min_samples
            );
        }
        if self.baseline.three_month_days == 0 {
            bail!("baseline.three_month_days must be positive");
        }
        if self.settings.database_file.trim().is_empty() {
            bail!("settings.database_file must not be empty");
        }

        Ok(())
    }

    /// Full path of the metric store
    pub fn database_path(&self) -> PathBuf {
        self.settings.data_dir.join(&self.settings.database_file)
    }

    /// Build a classifier from the alert settings
    pub fn classifier(&self) -> Result<DeviationClassifier> {
        let classifier =
            DeviationClassifier::with_config(self.alerts.thresholds, self.alerts.horizons)?;
        Ok(classifier)
    }

    /// Every settable key with its current value
    pub fn list(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    pub const KEYS: [&'static str; 11] = [
        "settings.data_dir",
        "settings.database_file",
        "alerts.thresholds.moderate",
        "alerts.thresholds.severe",
        "alerts.horizons.today",
        "alerts.horizons.last_7_days",
        "alerts.horizons.last_30_days",
        "baseline.three_month_days",
        "baseline.min_samples",
        "logging.level",
        "logging.format",
    ];

    /// Read a value by dotted key
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "settings.data_dir" => self.settings.data_dir.display().to_string(),
            "settings.database_file" => self.settings.database_file.clone(),
            "alerts.thresholds.moderate" => self.alerts.thresholds.moderate.to_string(),
            "alerts.thresholds.severe" => self.alerts.thresholds.severe.to_string(),
            "alerts.horizons.today" => self.alerts.horizons.today.column_prefix().to_string(),
            "alerts.horizons.last_7_days" => {
                self.alerts.horizons.last_7_days.column_prefix().to_string()
            }
            "alerts.horizons.last_30_days" => {
                self.alerts.horizons.last_30_days.column_prefix().to_string()
            }
            "baseline.three_month_days" => self.baseline.three_month_days.to_string(),
            "baseline.min_samples" => self.baseline.min_samples.to_string(),
            "logging.level" => self.logging.level.to_filter(),
            "logging.format" => format!("{:?}", self.logging.format).to_lowercase(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a value by dotted key; the result is validated before it is kept
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();

        match key {
            "settings.data_dir" => updated.settings.data_dir = PathBuf::from(value),
            "settings.database_file" => updated.settings.database_file = value.to_string(),
            "alerts.thresholds.moderate" => {
                updated.alerts.thresholds.moderate = parse_number(key, value)?
            }
            "alerts.thresholds.severe" => {
                updated.alerts.thresholds.severe = parse_number(key, value)?
            }
            "alerts.horizons.today" => updated.alerts.horizons.today = parse_horizon(value)?,
            "alerts.horizons.last_7_days" => {
                updated.alerts.horizons.last_7_days = parse_horizon(value)?
            }
            "alerts.horizons.last_30_days" => {
                updated.alerts.horizons.last_30_days = parse_horizon(value)?
            }
            "baseline.three_month_days" => {
                updated.baseline.three_month_days = parse_number(key, value)?
            }
            "baseline.min_samples" => updated.baseline.min_samples = parse_number(key, value)?,
            "logging.level" => {
                updated.logging.level = value.parse::<LogLevel>().map_err(anyhow::Error::msg)?
            }
            "logging.format" => {
                updated.logging.format = value.parse::<LogFormat>().map_err(anyhow::Error::msg)?
            }
            _ => bail!("Unknown configuration key: {}", key),
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid number for {}: {}", key, value))
}

fn parse_horizon(value: &str) -> Result<BaselineHorizon> {
    value.parse::<BaselineHorizon>().map_err(anyhow::Error::msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Period;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.metadata.version, "1.0");
        assert_eq!(config.alerts.thresholds, DeviationThresholds::default());
        assert_eq!(config.baseline.min_samples, 2);
        assert!(config.database_path().ends_with("metrics.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.alerts.thresholds.severe = 2.5;
        config.alerts.horizons.last_7_days = BaselineHorizon::AllTime;
        config.save_to_file(&config_path).unwrap();

        let loaded = AppConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.alerts.thresholds.severe, 2.5);
        assert_eq!(loaded.alerts.horizons.last_7_days, BaselineHorizon::AllTime);
        assert_eq!(loaded.settings, config.settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[metadata]
version = "1.0"
created_at = "2024-01-01T00:00:00Z"
updated_at = "2024-01-01T00:00:00Z"

[settings]
data_dir = "/tmp/recoveryrs"
database_file = "store.db"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.alerts.horizons, HorizonPolicy::default());
        assert_eq!(config.database_path(), PathBuf::from("/tmp/recoveryrs/store.db"));
    }

    #[test]
    fn test_thresholds_only_file_loads() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[alerts.thresholds]\nmoderate = 1.5\nsevere = 2.5\n").unwrap();

        let config = AppConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.alerts.thresholds.moderate, 1.5);
        assert_eq!(config.alerts.thresholds.severe, 2.5);
        assert_eq!(config.metadata.version, "1.0");
        assert_eq!(config.settings, AppSettings::default());
        assert_eq!(config.alerts.horizons, HorizonPolicy::default());
    }

    #[test]
    fn test_load_or_default() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        let config = AppConfig::load_or_default(&missing).unwrap();
        assert_eq!(config.alerts, AlertSettings::default());

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "[alerts.thresholds]\nmoderate = \"high\"\n").unwrap();
        assert!(AppConfig::load_or_default(&broken).is_err());
    }

    #[test]
    fn test_invalid_thresholds_rejected_on_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.alerts.thresholds = DeviationThresholds {
            moderate: 3.0,
            severe: 1.0,
        };
        config.save_to_file(&config_path).unwrap();

        assert!(AppConfig::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_get_and_set_keys() {
        let mut config = AppConfig::default();

        config.set("alerts.thresholds.moderate", "1.5").unwrap();
        assert_eq!(config.get("alerts.thresholds.moderate").as_deref(), Some("1.5"));

        config.set("alerts.horizons.today", "all-time").unwrap();
        assert_eq!(config.get("alerts.horizons.today").as_deref(), Some("all_time"));

        config.set("logging.level", "debug").unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);

        assert!(config.set("no.such.key", "1").is_err());
        assert!(config.set("baseline.min_samples", "many").is_err());
        assert_eq!(config.list().len(), AppConfig::KEYS.len());
    }

    #[test]
    fn test_rejected_set_leaves_config_unchanged() {
        let mut config = AppConfig::default();
        assert!(config.set("alerts.thresholds.severe", "0.5").is_err());
        assert_eq!(config.alerts.thresholds.severe, 2.0);
    }

    #[test]
    fn test_classifier_from_config() {
        let mut config = AppConfig::default();
        config.alerts.horizons.last_30_days = BaselineHorizon::ThreeMonth;

        let classifier = config.classifier().unwrap();
        assert_eq!(classifier.horizon_for(Period::Last30Days), BaselineHorizon::ThreeMonth);
    }
}
