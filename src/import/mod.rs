use std::path::Path;
use tracing::{info, warn};

use crate::error::{ImportError, Result};
use crate::models::{BaselineRow, DailyMetricRow};

pub mod csv;
pub mod json;

/// Trait for importing metric and baseline rows from different file formats
pub trait ImportFormat {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Import daily metric rows from the file
    fn import_samples(&self, file_path: &Path) -> Result<Vec<DailyMetricRow>>;

    /// Import baseline rows from the file
    fn import_baselines(&self, file_path: &Path) -> Result<Vec<BaselineRow>>;

    /// Get the format name for this importer
    fn format_name(&self) -> &'static str;
}

/// Case-insensitive extension check shared by importers
pub(crate) fn has_extension(file_path: &Path, expected: &str) -> bool {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

/// Manager for coordinating different import formats
pub struct ImportManager {
    importers: Vec<Box<dyn ImportFormat>>,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn ImportFormat>> = vec![
            Box::new(csv::CsvImporter::new()),
            Box::new(json::JsonImporter::new()),
        ];

        Self { importers }
    }

    fn importer_for(&self, file_path: &Path) -> Result<&dyn ImportFormat> {
        self.importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .map(|importer| importer.as_ref())
            .ok_or_else(|| {
                ImportError::UnsupportedFormat {
                    path: file_path.to_path_buf(),
                }
                .into()
            })
    }

    /// Import daily metric rows, auto-detecting the format
    pub fn import_samples(&self, file_path: &Path) -> Result<Vec<DailyMetricRow>> {
        let importer = self.importer_for(file_path)?;
        let rows = importer.import_samples(file_path)?;

        if rows.is_empty() {
            warn!(path = %file_path.display(), "No metric rows found");
        }
        info!(
            path = %file_path.display(),
            format = importer.format_name(),
            rows = rows.len(),
            "Imported daily metric rows"
        );
        Ok(rows)
    }

    /// Import baseline rows, auto-detecting the format
    pub fn import_baselines(&self, file_path: &Path) -> Result<Vec<BaselineRow>> {
        let importer = self.importer_for(file_path)?;
        let rows = importer.import_baselines(file_path)?;

        info!(
            path = %file_path.display(),
            format = importer.format_name(),
            rows = rows.len(),
            "Imported baseline rows"
        );
        Ok(rows)
    }

    /// Check if this manager can import a given file
    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.importers.iter().any(|importer| importer.can_import(file_path))
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
