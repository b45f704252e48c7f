// ============================================
// File: crates/callhome-core/src/hostkey.rs
// ============================================
//! # SSH Host Identity Keys
//!
//! ## Creation Reason
//! A call-home device is recognised by the public key it presents during the
//! SSH handshake. Operators configure that key as OpenSSH `authorized_keys`
//! text; the transport hands us the raw wire blob. This module is the single
//! place where the two meet.
//!
//! ## Main Functionality
//! - `KeyAlgorithm`: supported SSH public key algorithms
//! - `HostKey`: algorithm + canonical wire blob, hashable and comparable
//! - `HostKey::decode` / `HostKey::encode`: `authorized_keys` text codec
//! - `HostKey::fingerprint`: OpenSSH-style `SHA256:` fingerprint
//!
//! ## Wire Format (RFC 4253 §6.6)
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ string  algorithm name ("ssh-ed25519")     │
//! ├────────────────────────────────────────────┤
//! │ ssh-ed25519:  string  public key (32)      │
//! │ ssh-rsa:      mpint e, mpint n             │
//! │ ecdsa-*:      string curve, string Q       │
//! └────────────────────────────────────────────┘
//! string = u32 big-endian length || bytes
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Equality is algorithm + blob. Two textual forms that differ only in
//!   comment or options decode to equal keys.
//! - `encode()` output is the canonical text used by the operational device
//!   index. Changing its format orphans stored records.
//! - Only ed25519 points are cryptographically validated; RSA and ECDSA are
//!   checked structurally.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::hash::{Hash, Hasher};

use base64::{
    engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD},
    Engine,
};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Size of an Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Smallest RSA modulus we accept, in bits.
const MIN_RSA_MODULUS_BITS: usize = 1024;

// ============================================
// KeyAlgorithm
// ============================================

/// SSH public key algorithms accepted for device identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// `ssh-ed25519`
    Ed25519,
    /// `ssh-rsa`
    Rsa,
    /// `ecdsa-sha2-nistp256`
    EcdsaNistp256,
    /// `ecdsa-sha2-nistp384`
    EcdsaNistp384,
    /// `ecdsa-sha2-nistp521`
    EcdsaNistp521,
}

impl KeyAlgorithm {
    /// Returns the SSH algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ssh-ed25519",
            Self::Rsa => "ssh-rsa",
            Self::EcdsaNistp256 => "ecdsa-sha2-nistp256",
            Self::EcdsaNistp384 => "ecdsa-sha2-nistp384",
            Self::EcdsaNistp521 => "ecdsa-sha2-nistp521",
        }
    }

    /// Parses an SSH algorithm name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ssh-ed25519" => Some(Self::Ed25519),
            "ssh-rsa" => Some(Self::Rsa),
            "ecdsa-sha2-nistp256" => Some(Self::EcdsaNistp256),
            "ecdsa-sha2-nistp384" => Some(Self::EcdsaNistp384),
            "ecdsa-sha2-nistp521" => Some(Self::EcdsaNistp521),
            _ => None,
        }
    }

    /// Curve identifier and uncompressed point length for ECDSA algorithms.
    const fn ecdsa_curve(self) -> Option<(&'static str, usize)> {
        match self {
            Self::EcdsaNistp256 => Some(("nistp256", 65)),
            Self::EcdsaNistp384 => Some(("nistp384", 97)),
            Self::EcdsaNistp521 => Some(("nistp521", 133)),
            Self::Ed25519 | Self::Rsa => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================
// Wire Reader
// ============================================

/// Cursor over an SSH wire-encoded buffer.
struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_string(&mut self) -> Result<&'a [u8]> {
        if self.buf.len() < 4 {
            return Err(CoreError::host_key_decode("truncated length prefix"));
        }
        let (len_bytes, rest) = self.buf.split_at(4);
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if rest.len() < len {
            return Err(CoreError::host_key_decode(format!(
                "field declares {len} bytes, {} available",
                rest.len()
            )));
        }
        let (value, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(value)
    }

    fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CoreError::host_key_decode(format!(
                "{} trailing bytes after key",
                self.buf.len()
            )))
        }
    }
}

fn write_string(out: &mut Vec<u8>, value: &[u8]) {
    // Host key fields are always far below u32::MAX.
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
}

// ============================================
// HostKey
// ============================================

/// SSH public key identifying a call-home device.
///
/// # Example
/// ```
/// use callhome_core::hostkey::{HostKey, KeyAlgorithm};
/// use ed25519_dalek::SigningKey;
///
/// let public = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
/// let key = HostKey::from_ed25519(&public);
///
/// let text = key.encode();
/// assert!(text.starts_with("ssh-ed25519 AAAA"));
///
/// let parsed = HostKey::decode(&format!("{text} admin@router")).unwrap();
/// assert_eq!(parsed, key);
/// assert_eq!(parsed.algorithm(), KeyAlgorithm::Ed25519);
/// ```
#[derive(Clone)]
pub struct HostKey {
    algorithm: KeyAlgorithm,
    blob: Vec<u8>,
}

impl HostKey {
    /// Creates a host key from an Ed25519 verifying key.
    #[must_use]
    pub fn from_ed25519(key: &VerifyingKey) -> Self {
        let mut blob = Vec::with_capacity(4 + 11 + 4 + ED25519_PUBLIC_KEY_SIZE);
        write_string(&mut blob, KeyAlgorithm::Ed25519.name().as_bytes());
        write_string(&mut blob, key.as_bytes());
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            blob,
        }
    }

    /// Creates a host key from raw Ed25519 public key bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyMaterial` if the bytes are not a valid point.
    pub fn from_ed25519_bytes(bytes: &[u8]) -> Result<Self> {
        let key = parse_ed25519(bytes)?;
        Ok(Self::from_ed25519(&key))
    }

    /// Parses a key from its SSH wire blob.
    ///
    /// # Errors
    /// - `UnsupportedAlgorithm`: unknown algorithm name in the blob
    /// - `HostKeyDecode` / `InvalidKeyMaterial`: malformed blob
    pub fn from_wire(blob: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(blob);
        let name = reader.read_string()?;
        let name = std::str::from_utf8(name)
            .map_err(|_| CoreError::host_key_decode("algorithm name is not UTF-8"))?;
        let algorithm =
            KeyAlgorithm::from_name(name).ok_or_else(|| CoreError::UnsupportedAlgorithm {
                algorithm: name.to_owned(),
            })?;

        match algorithm {
            KeyAlgorithm::Ed25519 => {
                parse_ed25519(reader.read_string()?)?;
            }
            KeyAlgorithm::Rsa => {
                let exponent = reader.read_string()?;
                let modulus = reader.read_string()?;
                validate_rsa(exponent, modulus)?;
            }
            KeyAlgorithm::EcdsaNistp256
            | KeyAlgorithm::EcdsaNistp384
            | KeyAlgorithm::EcdsaNistp521 => {
                let curve = reader.read_string()?;
                let point = reader.read_string()?;
                validate_ecdsa(algorithm, curve, point)?;
            }
        }
        reader.finish()?;

        Ok(Self {
            algorithm,
            blob: blob.to_vec(),
        })
    }

    /// Parses a key from `authorized_keys` text.
    ///
    /// Accepts `[options] algorithm base64 [comment]` or a bare base64 blob.
    ///
    /// # Errors
    /// - `HostKeyDecode`: empty text or invalid base64
    /// - `AlgorithmMismatch`: declared algorithm differs from the blob's
    /// - `UnsupportedAlgorithm`: unknown algorithm
    pub fn decode(text: &str) -> Result<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Err(CoreError::host_key_decode("empty key text"));
        };

        let declared = tokens
            .iter()
            .position(|token| KeyAlgorithm::from_name(token).is_some());

        match declared {
            Some(index) => {
                let declared = tokens[index];
                let encoded = tokens.get(index + 1).ok_or_else(|| {
                    CoreError::host_key_decode(format!("{declared} key has no key data"))
                })?;
                let key = Self::from_wire(&BASE64.decode(encoded)?)?;
                if key.algorithm.name() != declared {
                    return Err(CoreError::AlgorithmMismatch {
                        declared: declared.to_owned(),
                        embedded: key.algorithm.name().to_owned(),
                    });
                }
                Ok(key)
            }
            None if tokens.len() == 1 => Self::from_wire(&BASE64.decode(first)?),
            None => Err(CoreError::UnsupportedAlgorithm {
                algorithm: (*first).to_owned(),
            }),
        }
    }

    /// Encodes the key as canonical `algorithm base64` text.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{} {}", self.algorithm.name(), BASE64.encode(&self.blob))
    }

    /// Returns the OpenSSH-style fingerprint (`SHA256:...`).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.blob);
        format!("SHA256:{}", BASE64_NO_PAD.encode(digest))
    }

    /// Returns the key algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Returns the SSH wire blob.
    #[must_use]
    pub fn as_wire(&self) -> &[u8] {
        &self.blob
    }
}

fn parse_ed25519(bytes: &[u8]) -> Result<VerifyingKey> {
    let raw: [u8; ED25519_PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
        CoreError::invalid_key_material(
            KeyAlgorithm::Ed25519.name(),
            format!("expected {ED25519_PUBLIC_KEY_SIZE} bytes, got {}", bytes.len()),
        )
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|_| {
        CoreError::invalid_key_material(KeyAlgorithm::Ed25519.name(), "not a curve point")
    })
}

fn validate_rsa(exponent: &[u8], modulus: &[u8]) -> Result<()> {
    let significant = |mpint: &[u8]| mpint.iter().skip_while(|b| **b == 0).count();
    if significant(exponent) == 0 {
        return Err(CoreError::invalid_key_material(
            KeyAlgorithm::Rsa.name(),
            "zero public exponent",
        ));
    }
    let modulus_bits = significant(modulus) * 8;
    if modulus_bits < MIN_RSA_MODULUS_BITS {
        return Err(CoreError::invalid_key_material(
            KeyAlgorithm::Rsa.name(),
            format!("modulus of {modulus_bits} bits is below {MIN_RSA_MODULUS_BITS}"),
        ));
    }
    Ok(())
}

fn validate_ecdsa(algorithm: KeyAlgorithm, curve: &[u8], point: &[u8]) -> Result<()> {
    let Some((expected_curve, point_len)) = algorithm.ecdsa_curve() else {
        return Err(CoreError::invalid_key_material(
            algorithm.name(),
            "not an ECDSA algorithm",
        ));
    };
    if curve != expected_curve.as_bytes() {
        return Err(CoreError::invalid_key_material(
            algorithm.name(),
            format!("curve {} does not match", String::from_utf8_lossy(curve)),
        ));
    }
    if point.len() != point_len || point.first() != Some(&0x04) {
        return Err(CoreError::invalid_key_material(
            algorithm.name(),
            "expected an uncompressed curve point",
        ));
    }
    Ok(())
}

// ============================================
// Trait Implementations
// ============================================

impl PartialEq for HostKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && bool::from(self.blob.ct_eq(&other.blob))
    }
}

impl Eq for HostKey {}

impl Hash for HostKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.algorithm.hash(state);
        self.blob.hash(state);
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKey({} {})", self.algorithm, self.fingerprint())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for HostKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl Serialize for HostKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for HostKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================
