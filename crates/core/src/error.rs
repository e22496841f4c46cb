//! Unified error types for the presence engine.
//!
//! Error codes:
//! - STORE_001: store operation failed
//! - STORE_002: store operation timed out
//! - VALID_001: invalid input

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: backing store rejected or failed the operation
    Failed,
    /// STORE_002: operation exceeded its deadline
    TimedOut,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed => "STORE_001",
            Self::TimedOut => "STORE_002",
        }
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: invalid input
    InvalidInput,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "VALID_001",
        }
    }
}

/// Unified error type for the presence engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A backing store failed the named operation.
    #[error("[{code}] {op}: {message}")]
    Store {
        code: &'static str,
        op: &'static str,
        message: String,
    },

    /// The named operation did not complete before its deadline.
    #[error("[{code}] {op} timed out after {after_ms}ms")]
    Timeout {
        code: &'static str,
        op: &'static str,
        after_ms: u64,
    },

    #[error("[{code}] {message}")]
    Validation { code: &'static str, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a store failure for `op`.
    pub fn store(op: &'static str, msg: impl Into<String>) -> Self {
        Self::Store {
            code: StoreErrorCode::Failed.code(),
            op,
            message: msg.into(),
        }
    }

    /// Create a timeout for `op`.
    pub fn timeout(op: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            code: StoreErrorCode::TimedOut.code(),
            op,
            after_ms: after.as_millis() as u64,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            code: ValidationErrorCode::InvalidInput.code(),
            message: msg.into(),
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Store { code, .. } => Some(code),
            Self::Timeout { code, .. } => Some(code),
            Self::Validation { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for timeouts, which callers may want to count separately.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::validation(e.to_string())
    }
}
