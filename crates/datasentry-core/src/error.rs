//! Error types for the anomaly detection library.
//!
//! Errors fall into two groups. Input errors (unreadable files, empty
//! uploads, unknown tables, bad parameters) are returned to the caller.
//! Detector errors are caught by the ensemble and turned into diagnostics,
//! so a single failing check never aborts a run.
//!
//! Errors serialize as `{code, message}` so the HTTP layer and the CLI can
//! emit them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for anomaly detection.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// The dataset has no rows.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A detector could not run on this data.
    #[error("{detector} skipped: {reason}")]
    InsufficientData { detector: String, reason: String },

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Synthetic labels produced a single class or too few members per class.
    #[error("Degenerate training labels: {0}")]
    DegenerateLabels(String),

    /// File extension is not a supported tabular format.
    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    /// File content could not be parsed.
    #[error("Failed to parse '{file}': {reason}")]
    Parse { file: String, reason: String },

    /// Table is not present in the registry.
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// No join key could be inferred between two tables.
    #[error("No join key found between '{left}' and '{right}'")]
    NoJoinKey { left: String, right: String },

    /// Cardinality string was not one of 1:1, 1:M, M:1.
    #[error("Invalid cardinality '{0}' (expected 1:1, 1:M or M:1)")]
    InvalidCardinality(String),

    /// Detection mode string was not recognised.
    #[error("Invalid mode '{0}' (expected 'sql' or 'ml')")]
    InvalidMode(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DetectionError>,
    },
}

impl DetectionError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DetectionError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`DetectionError::InsufficientData`].
    pub fn insufficient(detector: impl Into<String>, reason: impl Into<String>) -> Self {
        DetectionError::InsufficientData {
            detector: detector.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyDataset => "EMPTY_DATASET",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::DegenerateLabels(_) => "DEGENERATE_LABELS",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::TableNotFound(_) => "TABLE_NOT_FOUND",
            Self::NoJoinKey { .. } => "NO_JOIN_KEY",
            Self::InvalidCardinality(_) => "INVALID_CARDINALITY",
            Self::InvalidMode(_) => "INVALID_MODE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error was caused by caller input rather than a failure
    /// inside the library.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::EmptyDataset
            | Self::UnsupportedFormat(_)
            | Self::Parse { .. }
            | Self::TableNotFound(_)
            | Self::NoJoinKey { .. }
            | Self::InvalidCardinality(_)
            | Self::InvalidMode(_)
            | Self::InvalidConfig(_)
            | Self::ColumnNotFound(_) => true,
            Self::WithContext { source, .. } => source.is_input_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for DetectionError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DetectionError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DetectionError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(DetectionError::EmptyDataset.error_code(), "EMPTY_DATASET");
        assert_eq!(
            DetectionError::TableNotFound("orders".to_string()).error_code(),
            "TABLE_NOT_FOUND"
        );
        assert_eq!(
            DetectionError::insufficient("numeric", "too few values").error_code(),
            "INSUFFICIENT_DATA"
        );
    }

    #[test]
    fn test_is_input_error() {
        assert!(DetectionError::EmptyDataset.is_input_error());
        assert!(DetectionError::InvalidMode("fast".to_string()).is_input_error());
        assert!(!DetectionError::DegenerateLabels("one class".to_string()).is_input_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = DetectionError::UnsupportedFormat("report.pdf".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("UNSUPPORTED_FORMAT"));
        assert!(json.contains("report.pdf"));
    }

    #[test]
    fn test_with_context() {
        let error =
            DetectionError::TableNotFound("users".to_string()).with_context("During upload");
        assert!(error.to_string().contains("During upload"));
        assert_eq!(error.error_code(), "TABLE_NOT_FOUND");
        assert!(error.is_input_error());
    }
}
