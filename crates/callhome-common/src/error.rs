// ============================================
// File: crates/callhome-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for identifier parsing
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include credentials in error messages

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across call-home crates.
///
/// # Example
/// ```
/// use callhome_common::error::{CommonError, Result};
///
/// fn validate_port(port: u16) -> Result<()> {
///     if port == 0 {
///         return Err(CommonError::invalid_input("port", "must be non-zero"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================
