//! Error types for export sessions

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Boxed cause carried by [`ExportError::Conflict`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for all export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Operation invoked before `open()` or after the session finished writing
    #[error("Exporter not open: {0}")]
    NotOpen(String),

    /// Records submitted after end-of-data or after writing completed
    #[error("Attempting to add data after exporter was closed")]
    ClosedForWrites,

    /// No data arrived within the configured wait window
    #[error("Timed out after {waited_ms} ms and no data provided")]
    Timeout { waited_ms: u64 },

    /// A named field is missing or unreadable on a record
    #[error("Error reading property '{field}': {reason}")]
    PropertyAccess { field: String, reason: String },

    /// Catch-all for failures that leave the report in an unexpected state
    #[error("{message}")]
    Conflict {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Column layout rejected at construction
    #[error("Invalid column layout: {0}")]
    InvalidLayout(String),

    /// Configuration value rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Conflict without an underlying cause
    pub fn conflict(message: impl Into<String>) -> Self {
        ExportError::Conflict {
            message: message.into(),
            source: None,
        }
    }

    /// Conflict wrapping the error that caused it
    pub fn conflict_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ExportError::Conflict {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this is a [`ExportError::Conflict`]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ExportError::Conflict { .. })
    }

    /// Whether this is a [`ExportError::Timeout`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExportError::Timeout { .. })
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => ExportError::Io(io),
            other => ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
        }
    }
}
