// ============================================
// File: crates/callhome-core/src/vault.rs
// ============================================
//! # Credential Vault
//!
//! ## Creation Reason
//! Passwords used to log back into call-home devices are stored in the
//! configuration in sealed form and only opened at authorization time.
//!
//! ## Main Functionality
//! - `VaultKey`: 32-byte symmetric key, zeroized on drop
//! - `CredentialVault`: trait for sealing/opening stored passwords
//! - `AeadVault`: ChaCha20-Poly1305 implementation
//! - `seal_passwords`: seals whichever entries are still plaintext
//!
//! ## Sealed Format
//! ```text
//! base64( nonce (12 bytes) || ciphertext || Poly1305 tag (16 bytes) )
//! AAD = "callhome-credential-v1"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nonces are random per seal; never derive them from the plaintext
//! - A value that fails to open is treated as plaintext by `seal_passwords`
//! - Never log plaintext or sealed passwords
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Size of a vault key in bytes.
pub const VAULT_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size.
const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
const TAG_SIZE: usize = 16;

/// Associated data bound into every sealed credential.
const VAULT_AAD: &[u8] = b"callhome-credential-v1";

// ============================================
// VaultKey
// ============================================

/// Symmetric key for the credential vault.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; VAULT_KEY_SIZE]);

impl VaultKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VAULT_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; VAULT_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a base64-encoded key.
    ///
    /// # Errors
    /// Returns `InvalidVaultKey` on bad base64 or wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| CoreError::InvalidVaultKey {
                reason: format!("invalid base64: {e}"),
            })?;
        let result = <[u8; VAULT_KEY_SIZE]>::try_from(decoded.as_slice())
            .map(Self)
            .map_err(|_| CoreError::InvalidVaultKey {
                reason: format!("expected {VAULT_KEY_SIZE} bytes, got {}", decoded.len()),
            });
        decoded.zeroize();
        result
    }

    /// Encodes the key as base64.
    ///
    /// # Security Warning
    /// Only for writing the key file. Never log the result.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CoreError::encryption("failed to create cipher"))
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}

// ============================================
// CredentialVault Trait
// ============================================

/// Seals and opens stored credentials.
///
/// # Purpose
/// Abstracts the cipher so the authorization path can be tested with any
/// implementation and keys can be rotated without touching callers.
pub trait CredentialVault: Send + Sync {
    /// Seals a plaintext value.
    ///
    /// # Errors
    /// Returns `Encryption` if the cipher fails.
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Opens a sealed value.
    ///
    /// # Errors
    /// Returns `Decryption` if the value is not sealed under this vault.
    fn decrypt(&self, sealed: &str) -> Result<String>;

    /// Returns `true` if `value` opens under this vault.
    fn is_sealed(&self, value: &str) -> bool {
        self.decrypt(value).is_ok()
    }
}

// ============================================
// AeadVault
// ============================================

/// ChaCha20-Poly1305 credential vault.
///
/// # Example
/// ```
/// use callhome_core::vault::{AeadVault, CredentialVault, VaultKey};
///
/// let vault = AeadVault::new(VaultKey::generate());
/// let sealed = vault.encrypt("admin-password").unwrap();
///
/// assert!(vault.is_sealed(&sealed));
/// assert_eq!(vault.decrypt(&sealed).unwrap(), "admin-password");
/// ```
#[derive(Debug, Clone)]
pub struct AeadVault {
    key: VaultKey,
}

impl AeadVault {
    /// Creates a vault with the given key.
    #[must_use]
    pub const fn new(key: VaultKey) -> Self {
        Self { key }
    }
}

impl CredentialVault for AeadVault {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = self.key.cipher()?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: VAULT_AAD,
                },
            )
            .map_err(|_| CoreError::encryption("ChaCha20-Poly1305 encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    fn decrypt(&self, sealed: &str) -> Result<String> {
        let raw = BASE64.decode(sealed).map_err(|_| CoreError::Decryption)?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::Decryption);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);

        let plaintext = self
            .key
            .cipher()?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: VAULT_AAD,
                },
            )
            .map_err(|_| CoreError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CoreError::Decryption)
    }
}

// ============================================
// Sealing Helper
// ============================================

/// Seals every entry of `passwords` that is still plaintext.
///
/// Returns `None` when all entries were already sealed, so callers can skip
/// rewriting the stored record.
///
/// # Errors
/// Returns `Encryption` if sealing any entry fails.
pub fn seal_passwords(
    vault: &dyn CredentialVault,
    passwords: &[String],
) -> Result<Option<Vec<String>>> {
    if passwords.iter().all(|p| vault.is_sealed(p)) {
        return Ok(None);
    }

    passwords
        .iter()
        .map(|p| {
            if vault.is_sealed(p) {
                Ok(p.clone())
            } else {
                vault.encrypt(p)
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

// ============================================
// Tests
// ============================================
