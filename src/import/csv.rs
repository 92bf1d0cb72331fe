use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ImportFormat};
use crate::models::{parse_sample_date, AthleteId, BaselineRow, DailyMetricRow, MetricKind};

const FORMAT: &str = "CSV";

/// Where each recognised column lives in a header row
struct ColumnLayout {
    athlete_id: usize,
    date: Option<usize>,
    metrics: Vec<(usize, MetricKind)>,
}

/// Header-driven CSV importer with flexible column naming
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        // Common column name variations
        Self::add_mapping(
            &mut column_mapping,
            "athlete_id",
            &["athlete_id", "athlete", "player_id", "user_id"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "date",
            &["date", "label", "day", "cycle_date", "cycle_start"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    fn layout(&self, headers: &StringRecord, require_date: bool) -> Result<ColumnLayout> {
        let mut athlete_id = None;
        let mut date = None;
        let mut metrics = Vec::new();

        for (index, header) in headers.iter().enumerate() {
            let column = self.normalize_column_name(header);
            match column.as_str() {
                "athlete_id" => athlete_id = Some(index),
                "date" => date = Some(index),
                other => {
                    if let Ok(metric) = other.parse::<MetricKind>() {
                        metrics.push((index, metric));
                    }
                }
            }
        }

        let athlete_id = athlete_id.ok_or_else(|| ImportError::MissingColumn {
            column: "athlete_id".to_string(),
        })?;

        if require_date && date.is_none() {
            return Err(ImportError::MissingColumn {
                column: "date".to_string(),
            }
            .into());
        }

        Ok(ColumnLayout {
            athlete_id,
            date,
            metrics,
        })
    }

    fn parse_athlete_id(raw: &str, row: usize) -> Result<AthleteId> {
        raw.trim().parse::<AthleteId>().map_err(|_| {
            ImportError::InvalidValue {
                row,
                field: "athlete_id".to_string(),
                value: raw.to_string(),
            }
            .into()
        })
    }

    /// Parse an optional numeric cell; blanks and null markers are missing values
    fn parse_optional_number(raw: &str, row: usize, field: &str) -> Result<Option<f64>> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("null")
            || trimmed.eq_ignore_ascii_case("na")
            || trimmed.eq_ignore_ascii_case("nan")
        {
            return Ok(None);
        }

        trimmed.parse::<f64>().map(Some).map_err(|_| {
            ImportError::InvalidValue {
                row,
                field: field.to_string(),
                value: raw.to_string(),
            }
            .into()
        })
    }

    fn reader<R: Read>(input: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input)
    }

    fn parse_error(err: csv::Error) -> ImportError {
        ImportError::Parse {
            format: FORMAT.to_string(),
            reason: err.to_string(),
        }
    }

    /// Parse daily metric rows from any CSV reader
    pub fn parse_samples<R: Read>(&self, input: R) -> Result<Vec<DailyMetricRow>> {
        let mut reader = Self::reader(input);
        let headers = reader.headers().map_err(Self::parse_error)?.clone();
        let layout = self.layout(&headers, true)?;
        let date_index = layout.date.unwrap_or_default();

        let mut rows = Vec::new();
        for (offset, record) in reader.records().enumerate() {
            let record = record.map_err(Self::parse_error)?;
            // Header is line 1
            let line = offset + 2;

            let athlete_id = Self::parse_athlete_id(record.get(layout.athlete_id).unwrap_or(""), line)?;
            let raw_date = record.get(date_index).unwrap_or("");
            let date = parse_sample_date(raw_date).map_err(|_| ImportError::InvalidValue {
                row: line,
                field: "date".to_string(),
                value: raw_date.to_string(),
            })?;

            let mut row = DailyMetricRow::new(athlete_id, date);
            for (index, metric) in &layout.metrics {
                let value = Self::parse_optional_number(
                    record.get(*index).unwrap_or(""),
                    line,
                    metric.column_name(),
                )?;
                row.set_value(*metric, value);
            }
            rows.push(row);
        }

        debug!(rows = rows.len(), metric_columns = layout.metrics.len(), "Parsed CSV metric rows");
        Ok(rows)
    }

    /// Parse wide baseline rows from any CSV reader
    pub fn parse_baselines<R: Read>(&self, input: R) -> Result<Vec<BaselineRow>> {
        let mut reader = Self::reader(input);
        let headers = reader.headers().map_err(Self::parse_error)?.clone();
        let layout = self.layout(&headers, false)?;

        let stat_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .map(|(index, header)| (index, header.trim().to_lowercase().replace([' ', '-'], "_")))
            .filter(|(_, column)| BaselineRow::is_stat_column(column))
            .collect();

        let mut rows = Vec::new();
        for (offset, record) in reader.records().enumerate() {
            let record = record.map_err(Self::parse_error)?;
            let line = offset + 2;

            let mut row = BaselineRow::new(Self::parse_athlete_id(
                record.get(layout.athlete_id).unwrap_or(""),
                line,
            )?);
            for (index, column) in &stat_columns {
                let value = Self::parse_optional_number(record.get(*index).unwrap_or(""), line, column)?;
                row.columns.insert(column.clone(), value);
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "csv")
    }

    fn import_samples(&self, file_path: &Path) -> Result<Vec<DailyMetricRow>> {
        let file = std::fs::File::open(file_path)?;
        self.parse_samples(file)
    }

    fn import_baselines(&self, file_path: &Path) -> Result<Vec<BaselineRow>> {
        let file = std::fs::File::open(file_path)?;
        self.parse_baselines(file)
    }

    fn format_name(&self) -> &'static str {
        FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecoveryRsError;
    use crate::models::{BaselineHorizon, BaselineStat};
    use chrono::NaiveDate;

    #[test]
    fn test_parse_samples_with_aliases() {
        let data = "\
Player ID,Label,Recovery Score,RHR,HRV RMSSD,Strain,Notes
1,2024-05-01,64,52,,14.2,felt fine
1,2024-05-02,null,55,71.5,,
";
        let rows = CsvImporter::new().parse_samples(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].athlete_id, 1);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(rows[0].recovery_score, Some(64.0));
        assert_eq!(rows[0].resting_heart_rate, Some(52.0));
        assert_eq!(rows[0].hrv, None);
        assert_eq!(rows[0].strain, Some(14.2));
        assert_eq!(rows[1].recovery_score, None);
        assert_eq!(rows[1].hrv, Some(71.5));
        assert_eq!(rows[1].sleep_duration, None);
    }

    #[test]
    fn test_missing_athlete_column() {
        let data = "date,recovery_score\n2024-05-01,50\n";
        let err = CsvImporter::new().parse_samples(data.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            RecoveryRsError::Import(ImportError::MissingColumn { ref column }) if column == "athlete_id"
        ));
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let data = "athlete_id,date,hrv\n1,2024-05-01,60\n1,2024-05-02,abc\n";
        let err = CsvImporter::new().parse_samples(data.as_bytes()).unwrap_err();
        match err {
            RecoveryRsError::Import(ImportError::InvalidValue { row, field, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(field, "hrv");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date_rejected() {
        let data = "athlete_id,date,hrv\n1,yesterday,60\n";
        assert!(CsvImporter::new().parse_samples(data.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_baselines() {
        let data = "\
athlete_id,hrv_three_month_avg,hrv_three_month_std_dev,hrv_all_time_avg,hrv_all_time_std_dev
4,80,10,,
";
        let rows = CsvImporter::new().parse_baselines(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].stat(MetricKind::Hrv, BaselineHorizon::ThreeMonth),
            Some(BaselineStat::new(80.0, 10.0))
        );
        assert_eq!(rows[0].stat(MetricKind::Hrv, BaselineHorizon::AllTime), None);
    }
}
