use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the adapters, the index and the corpus loaders.
///
/// Every adapter failure is tagged with the operation that produced it so the
/// presentation layer can tell the user what went wrong without guessing.
#[derive(Error, Debug)]
pub enum AppError {
    /// Network, authentication or service-side failure (including timeouts)
    #[error("{operation} failed: {message}")]
    Service { operation: String, message: String },

    /// The service answered successfully but the body had an unexpected shape
    #[error("{operation} returned an unexpected response: {message}")]
    MalformedResponse { operation: String, message: String },

    /// Retrieval attempted against an index that holds no vectors
    #[error("Vector index is empty: {reason}")]
    EmptyIndex { reason: String },

    /// Caller supplied parameters outside their documented range
    #[error("Invalid value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Empty queries, unreadable images, missing corpus directories
    #[error("Invalid input: {message}")]
    InputValidation { message: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn service(operation: &str, message: impl Into<String>) -> Self {
        AppError::Service {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(operation: &str, message: impl Into<String>) -> Self {
        AppError::MalformedResponse {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_config(field: &str, message: impl Into<String>) -> Self {
        AppError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        AppError::InputValidation {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label used when rendering the error to the user
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Service { .. } => "service error",
            AppError::MalformedResponse { .. } => "malformed response",
            AppError::EmptyIndex { .. } => "empty index",
            AppError::InvalidConfig { .. } => "invalid configuration",
            AppError::InputValidation { .. } => "invalid input",
            AppError::DimensionMismatch { .. } => "dimension mismatch",
            AppError::Io { .. } => "i/o error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_names_operation() {
        let err = AppError::service("embed", "HTTP 403 Forbidden");
        assert_eq!(err.to_string(), "embed failed: HTTP 403 Forbidden");
        assert_eq!(err.kind(), "service error");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = AppError::io(
            "./images",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        assert!(err.to_string().contains("./images"));
    }
}
