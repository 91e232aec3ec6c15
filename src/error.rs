//! Error types for the export engine.
//!
//! This module defines all error types using `thiserror`. Errors fall into two
//! groups: fatal errors that abort an export (request validation, data fetch,
//! configuration, rendering) and item-level errors that are collected as
//! warnings while the export keeps running (filter, calculation, style).

use serde::Serialize;
use thiserror::Error;

/// A single request validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("Invalid export request: {}", join_violations(.violations))]
    RequestValidation { violations: Vec<Violation> },

    #[error("No export factory found for '{export}'")]
    NotFound { export: String },

    #[error("Data fetch failed: {message}")]
    DataFetch { message: String, suggestion: String },

    #[error("Configuration error: {message} (object: {object})")]
    Configuration { message: String, object: String },

    #[error("Filter '{filter}' failed: {message}")]
    Filter { filter: String, message: String },

    #[error("Calculation failed for field '{field}': {message}")]
    Calculation { field: String, message: String },

    #[error("Style configuration error for '{key}' (value: '{value}'): {message}")]
    StyleConfig {
        key: String,
        value: String,
        message: String,
    },

    #[error("Render error ({format}): {message}")]
    Render { format: String, message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ExportError {
    /// Create a request validation error from collected violations.
    pub fn request_validation(violations: Vec<Violation>) -> Self {
        Self::RequestValidation { violations }
    }

    /// Create a not found error for an export name.
    pub fn not_found(export: impl Into<String>) -> Self {
        Self::NotFound {
            export: export.into(),
        }
    }

    /// Create a data fetch error with a helpful suggestion.
    pub fn data_fetch(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::DataFetch {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error for a catalog object.
    pub fn configuration(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    pub fn calculation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Calculation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn style_config(
        key: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StyleConfig {
            key: key.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn render(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::DataFetch { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Fatal errors abort the export. Item-level errors are collected as warnings.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Filter { .. } | Self::Calculation { .. } | Self::StyleConfig { .. }
        )
    }

    /// Violations carried by a request validation error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::RequestValidation { violations } => violations,
            _ => &[],
        }
    }
}

/// Convert sqlx errors to data fetch errors.
impl From<sqlx::Error> for ExportError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ExportError::data_fetch(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let message = match db_err.code() {
                    Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                    None => db_err.message().to_string(),
                };
                ExportError::data_fetch(message, "Check the export SQL and referenced objects")
            }
            sqlx::Error::PoolTimedOut => ExportError::data_fetch(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                ExportError::data_fetch("Connection pool is closed", "Restart the export host")
            }
            sqlx::Error::Io(io_err) => ExportError::data_fetch(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ExportError::data_fetch(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ExportError::data_fetch(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => ExportError::data_fetch(
                format!("Failed to decode column {}: {}", index, source),
                "Cast the column to a plain type in the export SQL",
            ),
            other => ExportError::data_fetch(
                format!("Database error: {}", other),
                "Check the export SQL and database availability",
            ),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::io(err.to_string())
    }
}

/// Result type alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Receiver for item-level errors that do not abort an export.
pub trait ErrorSink {
    fn report(&mut self, error: ExportError);
}

impl ErrorSink for Vec<ExportError> {
    fn report(&mut self, error: ExportError) {
        tracing::warn!(error = %error, "Export warning");
        self.push(error);
    }
}
