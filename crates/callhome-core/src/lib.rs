// ============================================
// File: crates/callhome-core/src/lib.rs
// ============================================
//! # Call-Home Core - Host Identity & Credential Sealing
//!
//! ## Creation Reason
//! Devices that dial in are identified by their SSH host public key, and the
//! credentials used to log back into them are stored sealed. Both concerns
//! are pure data transforms with no I/O, so they live below the server.
//!
//! ## Main Functionality
//!
//! ### Host Keys ([`hostkey`])
//! - `HostKey`: SSH public key (algorithm + canonical wire blob)
//! - OpenSSH `authorized_keys` text codec
//! - `SHA256:` fingerprints for logging
//!
//! ### Vault ([`vault`])
//! - `CredentialVault`: encrypt/decrypt trait for stored passwords
//! - `AeadVault`: ChaCha20-Poly1305 implementation
//! - `seal_passwords`: re-seal any plaintext entries
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              callhome-server                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   callhome-core  ◄──   callhome-transport          │
//! │   You are here        │                            │
//! │         │             │                            │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             callhome-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto / dalek implementations
//! - Vault keys MUST be zeroized on drop
//! - `HostKey` equality and hashing must stay consistent: both cover the
//!   algorithm and the wire blob, nothing else
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod hostkey;
pub mod vault;

pub use error::{CoreError, Result};
pub use hostkey::{HostKey, KeyAlgorithm};
pub use vault::{seal_passwords, AeadVault, CredentialVault, VaultKey};
