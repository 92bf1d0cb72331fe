//! Unified error hierarchy for RecoveryRS
//!
//! The deviation core never fails; these errors cover the surfaces around it
//! (row import, the local metric store, report export and configuration).

use std::path::PathBuf;
use thiserror::Error;

pub use crate::database::DatabaseError;
pub use crate::export::ExportError;

/// Top-level error type for all RecoveryRS operations
#[derive(Debug, Error)]
pub enum RecoveryRsError {
    /// Row import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Metric store errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Report export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading metric or baseline rows
#[derive(Debug, Error)]
pub enum ImportError {
    /// No importer handles this file
    #[error("Unsupported format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// File could not be parsed at all
    #[error("Parse error in {format}: {reason}")]
    Parse { format: String, reason: String },

    /// A required column is missing from the header
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// A field could not be converted
    #[error("Invalid value in row {row}, field {field}: {value}")]
    InvalidValue { row: usize, field: String, value: String },
}

/// Result type alias for RecoveryRS operations
pub type Result<T> = std::result::Result<T, RecoveryRsError>;

impl RecoveryRsError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecoveryRsError::Database(DatabaseError::Busy(_)) | RecoveryRsError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RecoveryRsError::Import(ImportError::InvalidValue { .. }) => ErrorSeverity::Warning,
            RecoveryRsError::Validation(_) => ErrorSeverity::Warning,
            RecoveryRsError::Database(DatabaseError::Sqlite(_)) => ErrorSeverity::Critical,
            RecoveryRsError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RecoveryRsError::Import(ImportError::UnsupportedFormat { path }) => {
                format!(
                    "Cannot read {}: expected a .csv or .json file",
                    path.display()
                )
            }
            RecoveryRsError::Import(ImportError::MissingColumn { column }) => {
                format!("The input file has no '{}' column", column)
            }
            RecoveryRsError::Database(DatabaseError::Busy(_)) => {
                "The metric store is locked by another process. Please retry.".to_string()
            }
            RecoveryRsError::Configuration(reason) => {
                format!("Invalid configuration: {}. Run `recoveryrs config --list` to inspect it.", reason)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
