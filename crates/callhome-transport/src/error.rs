// ============================================
// File: crates/callhome-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Main Functionality
//! - `TransportError`: failures surfaced by channel activation and by the
//!   session lifecycle callbacks
//! - `Result<T>`: Type alias using `TransportError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `NotAdmitted` means "no live call-home session for that address"; the
//!   topology layer treats it as a retryable connect failure

use thiserror::Error;

use callhome_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No admitted call-home session exists for the requested address.
    #[error("No call-home session for {address}")]
    NotAdmitted {
        /// Requested remote address
        address: String,
    },

    /// Channel activation failed in the transport.
    #[error("Channel activation failed: {reason}")]
    ActivationFailed {
        /// Why activation failed
        reason: String,
    },

    /// Established session went down.
    #[error("Session down: {reason}")]
    SessionDown {
        /// Why the session dropped
        reason: String,
    },

    /// Operation on a session that is already closed.
    #[error("Session already closed")]
    SessionClosed,

    /// Connection attempt was cancelled.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    /// Creates a `NotAdmitted` error.
    pub fn not_admitted(address: impl ToString) -> Self {
        Self::NotAdmitted {
            address: address.to_string(),
        }
    }

    /// Creates an `ActivationFailed` error.
    pub fn activation_failed(reason: impl Into<String>) -> Self {
        Self::ActivationFailed {
            reason: reason.into(),
        }
    }

    /// Creates a `SessionDown` error.
    pub fn session_down(reason: impl Into<String>) -> Self {
        Self::SessionDown {
            reason: reason.into(),
        }
    }

    /// Returns `true` if a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotAdmitted { .. } | Self::ActivationFailed { .. } | Self::SessionDown { .. }
        )
    }
}
