// ============================================
// File: crates/callhome-server/src/management/models.rs
// ============================================
//! # Device Records
//!
//! ## Main Functionality
//! Records exchanged with the configuration and status stores:
//! - `DeviceStatus`: operational state of a call-home device
//! - `Credentials`: username + stored (sealed) passwords
//! - `DeviceRecord`: one allowlist / operational entry
//! - `NamingStrategy`: how unknown devices are named
//! - `GlobalPolicy`: global admission policy snapshot
//!
//! ## ⚠️ Important Note for Next Developer
//! - Serialized enum spellings (FAILEDNOTALLOWED, IP_PORT, ...) are shared
//!   with external stores; do not rename variants without a migration
//! - Credentials Debug output redacts passwords; keep it that way
//!
//! ## Last Modified
//! v0.1.0 - Initial record definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use callhome_common::IdentityKey;
use callhome_core::error::Result as CoreResult;
use callhome_core::HostKey;

/// Operational status of a call-home device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    /// Management session is up
    Connected,
    /// Known device, no session
    Disconnected,
    /// Session attempt failed
    Failed,
    /// Device presented a key that is not allowlisted
    FailedNotAllowed,
    /// Device was allowlisted but login with the stored credentials failed
    FailedAuthFailure,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Failed => "FAILED",
            Self::FailedNotAllowed => "FAILEDNOTALLOWED",
            Self::FailedAuthFailure => "FAILEDAUTHFAILURE",
        };
        f.write_str(text)
    }
}

/// Login credentials for a device.
///
/// Passwords are stored sealed; they are only opened by the authorization
/// decider right before being handed to the transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Candidate passwords, tried in order
    #[serde(default)]
    pub passwords: Vec<String>,
}

impl Credentials {
    /// Creates a credential set.
    pub fn new(username: impl Into<String>, passwords: Vec<String>) -> Self {
        Self {
            username: username.into(),
            passwords,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("passwords", &format_args!("[{} redacted]", self.passwords.len()))
            .finish()
    }
}

/// One device entry, in the allowlist or in operational memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Logical id, also used as the topology node id
    pub unique_id: String,
    /// Host key in `authorized_keys` text form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,
    /// Last reported status (operational memory only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    /// Per-device credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl DeviceRecord {
    /// Creates a record with only an id.
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            host_key: None,
            status: None,
            credentials: None,
        }
    }

    /// Sets the host key text.
    #[must_use]
    pub fn with_host_key(mut self, host_key: impl Into<String>) -> Self {
        self.host_key = Some(host_key.into());
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Decodes the host key, if one is present.
    pub fn decoded_host_key(&self) -> Option<CoreResult<HostKey>> {
        self.host_key.as_deref().map(HostKey::decode)
    }
}

/// How devices admitted through the accept-all policy are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamingStrategy {
    /// Textual IP address only
    #[serde(rename = "IP_ONLY")]
    IpOnly,
    /// `address:port`
    #[default]
    #[serde(rename = "IP_PORT")]
    IpPort,
}

impl NamingStrategy {
    /// Derives the node name for a remote endpoint.
    #[must_use]
    pub fn node_name(self, remote: &IdentityKey) -> String {
        match self {
            Self::IpOnly => remote.address().to_string(),
            Self::IpPort => format!("{}:{}", remote.address(), remote.port()),
        }
    }
}

/// Global admission policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPolicy {
    /// Admit devices whose key is not allowlisted
    #[serde(default)]
    pub accept_all_unknown_keys: bool,
    /// Naming of devices admitted through `accept_all_unknown_keys`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming_strategy: Option<NamingStrategy>,
    /// Fallback credentials for devices without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&DeviceStatus::FailedNotAllowed).unwrap(),
            "\"FAILEDNOTALLOWED\""
        );
        assert_eq!(DeviceStatus::FailedAuthFailure.to_string(), "FAILEDAUTHFAILURE");
    }

    #[test]
    fn test_naming_strategy() {
        let v4 = IdentityKey::from_host_port("192.168.1.10", 4334).unwrap();
        assert_eq!(NamingStrategy::IpOnly.node_name(&v4), "192.168.1.10");
        assert_eq!(NamingStrategy::IpPort.node_name(&v4), "192.168.1.10:4334");

        let v6 = IdentityKey::from_host_port("fe80::1", 830).unwrap();
        assert_eq!(NamingStrategy::IpPort.node_name(&v6), "fe80::1:830");
        assert_eq!(NamingStrategy::default(), NamingStrategy::IpPort);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::new("admin", vec!["hunter2".into()]);
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: GlobalPolicy =
            serde_json::from_str(r#"{"accept_all_unknown_keys":true,"naming_strategy":"IP_ONLY"}"#)
                .unwrap();
        assert!(policy.accept_all_unknown_keys);
        assert_eq!(policy.naming_strategy, Some(NamingStrategy::IpOnly));
        assert!(policy.credentials.is_none());
    }
}
