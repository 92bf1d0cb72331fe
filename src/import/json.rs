use serde::de::DeserializeOwned;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ImportFormat};
use crate::models::{BaselineRow, DailyMetricRow};

const FORMAT: &str = "JSON";

/// Importer for JSON arrays of row objects, as returned by the data backend
pub struct JsonImporter;

impl JsonImporter {
    pub fn new() -> Self {
        Self
    }

    fn parse<T: DeserializeOwned, R: Read>(input: R) -> Result<Vec<T>> {
        serde_json::from_reader(BufReader::new(input)).map_err(|e| {
            ImportError::Parse {
                format: FORMAT.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn parse_samples<R: Read>(&self, input: R) -> Result<Vec<DailyMetricRow>> {
        Self::parse(input)
    }

    pub fn parse_baselines<R: Read>(&self, input: R) -> Result<Vec<BaselineRow>> {
        Self::parse(input)
    }
}

impl Default for JsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for JsonImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "json")
    }

    fn import_samples(&self, file_path: &Path) -> Result<Vec<DailyMetricRow>> {
        self.parse_samples(std::fs::File::open(file_path)?)
    }

    fn import_baselines(&self, file_path: &Path) -> Result<Vec<BaselineRow>> {
        self.parse_baselines(std::fs::File::open(file_path)?)
    }

    fn format_name(&self) -> &'static str {
        FORMAT
    }
}
