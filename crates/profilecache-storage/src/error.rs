//! Store error types for the persistent profile tier.

use std::fmt;

/// Errors that can occur during persistent store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to reach the store backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// The backend answered with a non-success status.
    #[error("Store returned status {status}: {message}")]
    BackendStatus {
        /// HTTP status (or backend-specific code) returned.
        status: u16,
        /// Body or reason reported by the backend.
        message: String,
    },

    /// A stored record could not be decoded.
    #[error("Invalid record for {key}: {message}")]
    InvalidRecord {
        /// Key of the offending record.
        key: String,
        /// Description of why the record is invalid.
        message: String,
    },

    /// A record could not be encoded for writing.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal store error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `BackendStatus` error.
    #[must_use]
    pub fn backend_status(status: u16, message: impl Into<String>) -> Self {
        Self::BackendStatus {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the backend could not be reached or refused service.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::BackendStatus { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionError { .. } | Self::BackendStatus { .. } => {
                ErrorCategory::Infrastructure
            }
            Self::InvalidRecord { .. } | Self::Serialization(_) => ErrorCategory::Data,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of store errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/connection error.
    Infrastructure,
    /// Record encoding or decoding error.
    Data,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Data => write!(f, "data"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::connection_error("refused");
        assert_eq!(err.to_string(), "Connection error: refused");

        let err = StoreError::backend_status(401, "Permission denied");
        assert_eq!(err.to_string(), "Store returned status 401: Permission denied");

        let err = StoreError::invalid_record("users/42", "missing field `id`");
        assert_eq!(err.to_string(), "Invalid record for users/42: missing field `id`");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StoreError::connection_error("x").is_unavailable());
        assert!(StoreError::backend_status(500, "x").is_unavailable());
        assert!(!StoreError::invalid_record("k", "x").is_unavailable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StoreError::connection_error("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            StoreError::invalid_record("k", "x").category(),
            ErrorCategory::Data
        );
        assert_eq!(StoreError::internal("x").category(), ErrorCategory::Internal);
        assert_eq!(ErrorCategory::Data.to_string(), "data");
    }
}
