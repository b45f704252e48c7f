// ============================================
// File: crates/callhome-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for host-key decoding and credential sealing.
//!
//! ## Error Categories
//! 1. **Key Errors**: Malformed `authorized_keys` text or wire blobs
//! 2. **Vault Errors**: Encryption, decryption and key loading failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include passwords or vault key material in error messages
//! - Decryption failures carry no detail on purpose; AEAD tag mismatch and
//!   "this was never sealed" look the same to callers

use thiserror::Error;

use callhome_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for host keys and the credential vault.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Host Key Errors
    // ========================================

    /// Host key text or blob could not be parsed.
    #[error("Malformed host key: {reason}")]
    HostKeyDecode {
        /// What was wrong with the input
        reason: String,
    },

    /// Key algorithm is not one we understand.
    #[error("Unsupported host key algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// Algorithm name as found in the input
        algorithm: String,
    },

    /// Declared algorithm differs from the one embedded in the blob.
    #[error("Host key algorithm mismatch: declared {declared}, blob carries {embedded}")]
    AlgorithmMismatch {
        /// Algorithm named in the text form
        declared: String,
        /// Algorithm named inside the wire blob
        embedded: String,
    },

    /// Key material is structurally invalid for its algorithm.
    #[error("Invalid {algorithm} key material: {reason}")]
    InvalidKeyMaterial {
        /// Key algorithm
        algorithm: String,
        /// Why the material was rejected
        reason: String,
    },

    // ========================================
    // Vault Errors
    // ========================================

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    /// Decryption failed (wrong key, tampering, or not sealed text).
    #[error("Decryption failed: authentication error")]
    Decryption,

    /// Vault key could not be loaded.
    #[error("Invalid vault key: {reason}")]
    InvalidVaultKey {
        /// Why the key was rejected
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `HostKeyDecode` error.
    pub fn host_key_decode(reason: impl Into<String>) -> Self {
        Self::HostKeyDecode {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidKeyMaterial` error.
    pub fn invalid_key_material(algorithm: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKeyMaterial {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Encryption` error.
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the error came from host key parsing.
    #[must_use]
    pub const fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::HostKeyDecode { .. }
                | Self::UnsupportedAlgorithm { .. }
                | Self::AlgorithmMismatch { .. }
                | Self::InvalidKeyMaterial { .. }
        )
    }

    /// Returns `true` if the error came from the credential vault.
    #[must_use]
    pub const fn is_vault_error(&self) -> bool {
        matches!(
            self,
            Self::Encryption { .. } | Self::Decryption | Self::InvalidVaultKey { .. }
        )
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        Self::HostKeyDecode {
            reason: format!("invalid base64: {err}"),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CoreError::host_key_decode("empty").is_key_error());
        assert!(!CoreError::host_key_decode("empty").is_vault_error());
        assert!(CoreError::Decryption.is_vault_error());
        assert!(!CoreError::Decryption.is_key_error());
    }

    #[test]
    fn test_decryption_error_has_no_detail() {
        assert_eq!(
            CoreError::Decryption.to_string(),
            "Decryption failed: authentication error"
        );
    }
}
