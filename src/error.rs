//! Error types for LooFinder.
//!
//! The cache manager itself never surfaces these to its callers: storage
//! failures are logged and the in-memory index stays authoritative. They are
//! returned by the storage adapters, configuration loading and construction.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum LooError {
    /// A durable store could not read, write or remove a record.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be read or contains invalid values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The async runtime required by a component is not available.
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias using [`LooError`].
pub type Result<T> = std::result::Result<T, LooError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LooError::Storage("disk full".into());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let err = LooError::Config("max_entries must be a number".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_entries must be a number"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LooError = io.into();
        assert!(matches!(err, LooError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: LooError = parse.into();
        assert!(matches!(err, LooError::Serialization(_)));
    }
}
