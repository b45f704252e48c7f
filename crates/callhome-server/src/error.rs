// ============================================
// File: crates/callhome-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Main Functionality
//! - `ServerError`: configuration, topology and status-store failures
//! - Wraps `CommonError`, `CoreError` and `TransportError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Authorization denial and duplicate admission are NOT errors; they are
//!   returned as `CallHomeAuthorization::Rejected` and `None`
//! - Collaborator failures (topology, status store) are logged and
//!   swallowed by callers; they never unwind admission
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use callhome_common::error::CommonError;
use callhome_core::error::CoreError;
use callhome_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the file
        path: String,
        /// Parse or I/O failure
        reason: String,
    },

    /// Configuration value failed validation.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Topology service rejected a node operation.
    #[error("Topology operation on node '{node_id}' failed: {reason}")]
    Topology {
        /// Node the operation targeted
        node_id: String,
        /// Failure reported by the topology service
        reason: String,
    },

    /// Device status store read or write failed.
    #[error("Status store failure: {reason}")]
    StatusStore {
        /// Failure reported by the store
        reason: String,
    },

    /// Server failed to start.
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of what went wrong
        message: String,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Error from core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from transport crate.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Topology` error.
    pub fn topology(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Topology {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `StatusStore` error.
    pub fn status_store(reason: impl Into<String>) -> Self {
        Self::StatusStore {
            reason: reason.into(),
        }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` if the process cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::StartupFailed { .. }
        )
    }

    /// Returns `true` if a later attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Topology { .. } | Self::StatusStore { .. } => true,
            _ => false,
        }
    }
}
