use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call guard errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallGuardError {
    /// The backing store could not be reached or failed mid-operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Every termination strategy failed for a call
    #[error("Termination failed: {0}")]
    TerminationFailed(String),

    /// Malformed number, unknown record id, inconsistent record fields
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serializable error classification used across the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    StoreUnavailable,
    TerminationFailed,
    InvalidArgument,
    NotFound,
    Timeout,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorKind::TerminationFailed => "TERMINATION_FAILED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallGuardError {
    /// Create a new StoreUnavailable error
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new TerminationFailed error
    pub fn termination_failed<S: Into<String>>(msg: S) -> Self {
        Self::TerminationFailed(msg.into())
    }

    /// Create a new InvalidArgument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::TerminationFailed(_) => ErrorKind::TerminationFailed,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for CallGuardError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for CallGuardError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for call guard operations
pub type Result<T> = std::result::Result<T, CallGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_errors_map_to_store_unavailable() {
        let err: CallGuardError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let err: CallGuardError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::InvalidArgument).unwrap();
        assert_eq!(json, "\"INVALID_ARGUMENT\"");
        assert_eq!(ErrorKind::StoreUnavailable.to_string(), "STORE_UNAVAILABLE");
    }
}
