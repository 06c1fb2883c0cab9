use thiserror::Error;

/// Core error types for profile decoding.
///
/// Decoding failures only degrade individual fields; callers null out the
/// affected field and carry on.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl CoreError {
    /// Create a new MalformedIdentifier error
    pub fn malformed_identifier(id: impl Into<String>) -> Self {
        Self::MalformedIdentifier(id.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(message: impl Into<String>) -> Self {
        Self::InvalidTimestamp(message.into())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::malformed_identifier("abc");
        assert_eq!(err.to_string(), "Malformed identifier: abc");

        let err = CoreError::invalid_timestamp("out of range");
        assert_eq!(err.to_string(), "Invalid timestamp: out of range");
    }
}
