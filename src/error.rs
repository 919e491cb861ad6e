//! Unified error handling for tileforge
//!
//! Every kernel entry point returns [`ForgeResult`]. Errors are grouped into
//! categories so the host dispatch layer can map them to status codes:
//! - User errors (bad shapes, layouts, data types, buffer sizes)
//! - Internal errors (violated invariants, bugs)
//!
//! All validation happens before a destination buffer is written, so an
//! `Err` always leaves the caller's output untouched.

use std::fmt;

use crate::tensor::DType;

/// Unified error type for tileforge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileForgeError {
    // ========== Argument Errors ==========
    /// Zero channel count, non-dividing group count, bad attribute value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Source rank below the minimum the relayout understands
    #[error("Tensor rank too low: got {rank}, need at least {min}")]
    RankTooLow { rank: usize, min: usize },

    // ========== Type/Layout Errors ==========
    /// Element type outside {int8, float16, float32}
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(DType),

    /// Unknown layout tag or unsupported source/destination pairing
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Typed entry point handed a tensor of another element type
    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    // ========== Buffer Errors ==========
    /// Buffer length does not match what the shape requires
    #[error("{what} buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TileForgeError {
    /// Categorize the error for handling decisions
    ///
    /// # Examples
    /// ```ignore
    /// match error.category() {
    ///     ErrorCategory::User => println!("fix the input tensor"),
    ///     ErrorCategory::Internal => println!("report this bug"),
    /// }
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match self {
            TileForgeError::InvalidArgument(_)
            | TileForgeError::RankTooLow { .. }
            | TileForgeError::UnsupportedDataType(_)
            | TileForgeError::UnsupportedLayout(_)
            | TileForgeError::DTypeMismatch { .. }
            | TileForgeError::BufferSizeMismatch { .. } => ErrorCategory::User,

            TileForgeError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this is a user-facing error (actionable by the caller)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid input tensor, attribute or buffer
    User,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

// Helper type alias for Results using TileForgeError
pub type ForgeResult<T> = std::result::Result<T, TileForgeError>;

// ========== Helper Functions ==========

/// Create an invalid-argument error with context
///
/// # Examples
/// ```ignore
/// return Err(invalid_arg!("group count {} must be >= 1", groups));
/// ```
#[macro_export]
macro_rules! invalid_arg {
    ($msg:expr) => {
        $crate::error::TileForgeError::InvalidArgument($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TileForgeError::InvalidArgument(format!($fmt, $($arg)*))
    };
}

/// Create an internal error with context
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::TileForgeError::InternalError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TileForgeError::InternalError(format!($fmt, $($arg)*))
    };
}

/// Check a buffer length against the length a shape requires
pub fn check_len(what: &'static str, expected: usize, actual: usize) -> ForgeResult<()> {
    if expected != actual {
        return Err(TileForgeError::BufferSizeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
