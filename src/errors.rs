//! Centralized error handling for nc_subset
//!
//! Every failure in the crate is a [`SubsetError`]. Variants wrap the library errors
//! they came from, and [`SubsetError::kind`] folds them onto the five error kinds
//! callers reason about: missing inputs, malformed containers, bad configuration,
//! out-of-order calls and failed writes.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for nc_subset operations
#[derive(Debug, Error)]
pub enum SubsetError {
    /// Input file does not exist
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Variable path does not resolve inside the container
    #[error("Variable '{path}' not found in container")]
    VariableNotFound { path: String },

    /// Container exists but could not be parsed
    #[error("Malformed container {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    /// Variable uses a storage type the extractor cannot carry over
    #[error("Variable '{path}' has unsupported storage type {vartype}")]
    UnsupportedType { path: String, vartype: String },

    /// Unsupported compression, chunking or request configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Write attempted before the dataset was extracted
    #[error("Runtime order error: {0}")]
    RuntimeOrder(String),

    /// A group write against the output container failed
    #[error("Failed to write group '{group}' to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        group: String,
        #[source]
        source: Box<SubsetError>,
    },

    /// NetCDF library errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Malformed JSON in a variable spec file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// The error taxonomy every [`SubsetError`] maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Format,
    Configuration,
    RuntimeOrder,
    Write,
}

impl SubsetError {
    /// Create a Configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a VariableNotFound error.
    pub fn variable_not_found(path: impl Into<String>) -> Self {
        Self::VariableNotFound { path: path.into() }
    }

    /// Wrap a failure that happened while writing `group` into `path`.
    pub fn write(path: impl Into<PathBuf>, group: impl Into<String>, source: SubsetError) -> Self {
        Self::Write {
            path: path.into(),
            group: group.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } | Self::VariableNotFound { .. } => ErrorKind::NotFound,
            Self::Format { .. } | Self::UnsupportedType { .. } | Self::NetCDF(_) => ErrorKind::Format,
            Self::Configuration(_) | Self::Json(_) | Self::ThreadPool(_) => ErrorKind::Configuration,
            Self::RuntimeOrder(_) => ErrorKind::RuntimeOrder,
            Self::Write { .. } | Self::Io(_) | Self::Array(_) => ErrorKind::Write,
        }
    }

    /// Whether extraction may skip the offending variable and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VariableNotFound { .. } | Self::UnsupportedType { .. }
        )
    }
}

/// Result type alias for nc_subset operations
pub type Result<T> = std::result::Result<T, SubsetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SubsetError::variable_not_found("a/b").kind(), ErrorKind::NotFound);
        assert_eq!(SubsetError::config("bad").kind(), ErrorKind::Configuration);
        let wrapped = SubsetError::write("out.nc", "PRODUCT", SubsetError::config("x"));
        assert_eq!(wrapped.kind(), ErrorKind::Write);
        assert!(wrapped.to_string().contains("PRODUCT"));
    }

    #[test]
    fn only_per_variable_errors_are_recoverable() {
        assert!(SubsetError::variable_not_found("x").is_recoverable());
        assert!(!SubsetError::RuntimeOrder("early".into()).is_recoverable());
    }
}
