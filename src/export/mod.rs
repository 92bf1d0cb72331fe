//! Alert report export
//!
//! Reports can be written as JSON (the dashboard's alert shape), as a plain-text
//! summary, or rendered as a terminal table.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::alerts::AlertReport;

pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
    Table,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            "table" => Ok(ExportFormat::Table),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Export error types
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Render a report in the requested format
pub fn render_report(report: &AlertReport, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => json::alerts_to_json(report),
        ExportFormat::Text => text::render_text(report),
        ExportFormat::Table => Ok(report
            .periods
            .iter()
            .map(text::alert_table)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Write a report to `output_path` in the requested format
pub fn export_report<P: AsRef<Path>>(
    report: &AlertReport,
    format: ExportFormat,
    output_path: P,
) -> Result<(), ExportError> {
    let rendered = render_report(report, format)?;
    std::fs::write(output_path.as_ref(), rendered)?;

    info!(path = %output_path.as_ref().display(), format = ?format, "Exported alert report");
    Ok(())
}
