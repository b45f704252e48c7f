// ============================================
// File: crates/callhome-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration for the call-home gateway: listener parameters,
//! defaults stamped into synthesized topology nodes, the credential vault
//! key, and the initial admission policy and allowlist.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading, validation and saving
//! - `initial_events`: seeds the policy watch from the file
//! - `seal_credentials`: seals plaintext passwords in place
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! host = "0.0.0.0"
//! ssh_port = 4334
//! tls_port = 4335
//!
//! [node]
//! max_connection_attempts = 0
//! keepalive_delay_secs = 120
//!
//! [vault]
//! key_file = "/etc/callhome/vault.key"
//!
//! [global]
//! accept_all_unknown_keys = false
//! naming_strategy = "IP_PORT"
//!
//! [[allowed_devices]]
//! unique_id = "core-router-1"
//! host_key = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA... admin@core-router-1"
//! credentials = { username = "netconf", passwords = ["<sealed>"] }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Absent `[global]` means fail closed: unknown keys are rejected
//! - Run `callhome-server seal` after adding plaintext passwords
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use callhome_core::vault::{seal_passwords, CredentialVault};

use crate::error::{Result, ServerError};
use crate::management::models::{Credentials, DeviceRecord, GlobalPolicy};
use crate::services::policy::{ConfigEvent, DeviceChange};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Defaults for synthesized topology nodes.
    #[serde(default)]
    pub node: NodeDefaults,

    /// Credential vault configuration.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Initial global admission policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalPolicy>,

    /// Initial device allowlist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_devices: Vec<DeviceRecord>,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!(
            allowed_devices = config.allowed_devices.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration back to a TOML file.
    ///
    /// # Errors
    /// Returns error if serialization or the write fails.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = self.to_toml()?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.node.validate()?;
        self.validate_devices()
    }

    fn validate_devices(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.allowed_devices {
            if device.unique_id.trim().is_empty() {
                return Err(ServerError::config_invalid(
                    "allowed_devices.unique_id",
                    "must not be empty",
                ));
            }
            if !seen.insert(device.unique_id.as_str()) {
                return Err(ServerError::config_invalid(
                    format!("allowed_devices[{}]", device.unique_id),
                    "duplicate unique_id",
                ));
            }
            if let Some(Err(e)) = device.decoded_host_key() {
                return Err(ServerError::config_invalid(
                    format!("allowed_devices[{}].host_key", device.unique_id),
                    e.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    ///
    /// # Errors
    /// Returns `Internal` if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::internal(e.to_string()))
    }

    /// Notifications that seed a fresh policy watch from this file.
    #[must_use]
    pub fn initial_events(&self) -> Vec<ConfigEvent> {
        vec![
            ConfigEvent::Global(vec![self.global.clone()]),
            ConfigEvent::Devices(
                self.allowed_devices
                    .iter()
                    .cloned()
                    .map(|device| DeviceChange::written(None, device))
                    .collect(),
            ),
        ]
    }

    /// Seals every plaintext password in place.
    ///
    /// Returns the number of credential sets that changed.
    ///
    /// # Errors
    /// Returns `Core` if sealing fails.
    pub fn seal_credentials(&mut self, vault: &dyn CredentialVault) -> Result<usize> {
        let global = self.global.as_mut().and_then(|g| g.credentials.as_mut());
        let devices = self
            .allowed_devices
            .iter_mut()
            .filter_map(|d| d.credentials.as_mut());

        let mut changed = 0;
        for credentials in global.into_iter().chain(devices) {
            if seal_in_place(vault, credentials)? {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

fn seal_in_place(vault: &dyn CredentialVault, credentials: &mut Credentials) -> Result<bool> {
    match seal_passwords(vault, &credentials.passwords)? {
        Some(sealed) => {
            credentials.passwords = sealed;
            Ok(true)
        }
        None => Ok(false),
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Listener configuration section.
///
/// `host` and the ports are read by the embedding transport layer when it
/// binds its listeners; this crate only validates them and logs them at
/// start. `connection_timeout_millis` feeds the mount dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the call-home listeners bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// NETCONF-over-SSH call-home port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// NETCONF-over-TLS call-home port.
    #[serde(default = "default_tls_port")]
    pub tls_port: u16,

    /// Connection establishment timeout.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_millis: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_ssh_port() -> u16 {
    4334
}

fn default_tls_port() -> u16 {
    4335
}

fn default_connection_timeout() -> u64 {
    10_000
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.ssh_port == 0 {
            return Err(ServerError::config_invalid("network.ssh_port", "must be greater than 0"));
        }
        if self.tls_port == 0 {
            return Err(ServerError::config_invalid("network.tls_port", "must be greater than 0"));
        }
        if self.ssh_port == self.tls_port {
            return Err(ServerError::config_invalid(
                "network.tls_port",
                "must differ from network.ssh_port",
            ));
        }
        if self.connection_timeout_millis == 0 {
            return Err(ServerError::config_invalid(
                "network.connection_timeout_millis",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            ssh_port: default_ssh_port(),
            tls_port: default_tls_port(),
            connection_timeout_millis: default_connection_timeout(),
        }
    }
}

// ============================================
// NodeDefaults
// ============================================

/// Connection options stamped into every synthesized topology node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefaults {
    /// RPC timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_millis: u64,

    /// Reconnect attempts before giving up (0 = unlimited).
    #[serde(default)]
    pub max_connection_attempts: u32,

    /// First reconnect delay.
    #[serde(default = "default_min_backoff")]
    pub min_backoff_millis: u64,

    /// Reconnect delay ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_millis: u64,

    /// Reconnect delay growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter applied to reconnect delays, in [0, 0.5].
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Keepalive interval.
    #[serde(default = "default_keepalive_delay")]
    pub keepalive_delay_secs: u64,

    /// Maximum in-flight RPCs (0 = unlimited).
    #[serde(default)]
    pub concurrent_rpc_limit: u16,

    /// Skip schema download.
    #[serde(default)]
    pub schemaless: bool,

    /// Reconnect when the device announces a schema change.
    #[serde(default)]
    pub reconnect_on_changed_schema: bool,

    /// Lock the datastore around edits.
    #[serde(default = "default_lock_datastore")]
    pub lock_datastore: bool,
}

fn default_request_timeout() -> u64 {
    60_000
}

fn default_min_backoff() -> u64 {
    2_000
}

fn default_max_backoff() -> u64 {
    1_800_000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_backoff_jitter() -> f64 {
    0.1
}

fn default_keepalive_delay() -> u64 {
    120
}

fn default_lock_datastore() -> bool {
    true
}

impl NodeDefaults {
    fn validate(&self) -> Result<()> {
        if self.request_timeout_millis == 0 {
            return Err(ServerError::config_invalid(
                "node.request_timeout_millis",
                "must be greater than 0",
            ));
        }
        if self.min_backoff_millis > self.max_backoff_millis {
            return Err(ServerError::config_invalid(
                "node.min_backoff_millis",
                "must not exceed node.max_backoff_millis",
            ));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(ServerError::config_invalid(
                "node.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if !(0.0..=0.5).contains(&self.backoff_jitter) {
            return Err(ServerError::config_invalid(
                "node.backoff_jitter",
                "must be within [0, 0.5]",
            ));
        }
        Ok(())
    }
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            request_timeout_millis: default_request_timeout(),
            max_connection_attempts: 0,
            min_backoff_millis: default_min_backoff(),
            max_backoff_millis: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_jitter: default_backoff_jitter(),
            keepalive_delay_secs: default_keepalive_delay(),
            concurrent_rpc_limit: 0,
            schemaless: false,
            reconnect_on_changed_schema: false,
            lock_datastore: default_lock_datastore(),
        }
    }
}

// ============================================
// VaultConfig
// ============================================

/// Credential vault configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Path to the base64 vault key file.
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_key_file() -> String {
    "/etc/callhome/vault.key".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use callhome_core::vault::{AeadVault, VaultKey};
    use callhome_core::HostKey;
    use ed25519_dalek::SigningKey;

    fn key_text(seed: u8) -> String {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key()).encode()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.ssh_port, 4334);
        assert_eq!(config.network.tls_port, 4335);
        assert_eq!(config.node.max_backoff_millis, 1_800_000);
        assert!(config.node.lock_datastore);
        assert!(config.global.is_none());
    }

    #[test]
    fn test_full_config_format() {
        let toml = format!(
            r#"
            [network]
            host = "10.0.0.1"
            ssh_port = 14334

            [node]
            max_connection_attempts = 5
            backoff_jitter = 0.2

            [global]
            accept_all_unknown_keys = true
            naming_strategy = "IP_ONLY"
            credentials = {{ username = "admin", passwords = ["a", "b"] }}

            [[allowed_devices]]
            unique_id = "router-1"
            host_key = "{} admin@router-1"
            "#,
            key_text(1)
        );

        let config = ServerConfig::from_str(&toml).unwrap();
        assert_eq!(config.network.ssh_port, 14334);
        assert_eq!(config.network.tls_port, 4335);
        assert_eq!(config.node.max_connection_attempts, 5);
        let global = config.global.as_ref().unwrap();
        assert!(global.accept_all_unknown_keys);
        assert_eq!(global.credentials.as_ref().unwrap().passwords.len(), 2);
        assert_eq!(config.allowed_devices[0].unique_id, "router-1");
        assert_eq!(config.initial_events().len(), 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ServerConfig::from_str("[network]\nssh_port = 4335").is_err());
        assert!(ServerConfig::from_str("[node]\nbackoff_jitter = 0.9").is_err());
        assert!(ServerConfig::from_str(
            "[node]\nmin_backoff_millis = 10\nmax_backoff_millis = 5"
        )
        .is_err());

        let duplicate = r#"
            [[allowed_devices]]
            unique_id = "r1"
            [[allowed_devices]]
            unique_id = "r1"
        "#;
        assert!(ServerConfig::from_str(duplicate)
            .unwrap_err()
            .is_config_error());

        let bad_key = r#"
            [[allowed_devices]]
            unique_id = "r1"
            host_key = "ssh-ed25519 not-a-key"
        "#;
        assert!(ServerConfig::from_str(bad_key).is_err());
    }

    #[test]
    fn test_network_section_round_trips_listener_settings() {
        let toml = r#"
            [network]
            host = "192.168.1.1"
            ssh_port = 6666
            tls_port = 6667
            connection_timeout_millis = 2500
            max_connections = 128
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.network.host.to_string(), "192.168.1.1");
        assert_eq!(config.network.ssh_port, 6666);
        assert_eq!(config.network.tls_port, 6667);
        assert_eq!(config.network.connection_timeout_millis, 2500);

        let written = toml::to_string_pretty(&config).unwrap();
        assert!(written.contains("ssh_port = 6666"));
        assert!(!written.contains("max_connections"));
    }

    #[test]
    fn test_seal_credentials() {
        let vault = AeadVault::new(VaultKey::generate());
        let mut config = ServerConfig {
            global: Some(GlobalPolicy {
                credentials: Some(Credentials::new("admin", vec!["plain".into()])),
                ..GlobalPolicy::default()
            }),
            allowed_devices: vec![DeviceRecord::new("r1")
                .with_credentials(Credentials::new("ops", vec!["secret".into()]))],
            ..ServerConfig::default()
        };

        assert_eq!(config.seal_credentials(&vault).unwrap(), 2);
        let sealed = &config.allowed_devices[0].credentials.as_ref().unwrap().passwords[0];
        assert_eq!(vault.decrypt(sealed).unwrap(), "secret");

        assert_eq!(config.seal_credentials(&vault).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callhome.toml");

        let config = ServerConfig {
            allowed_devices: vec![DeviceRecord::new("r1").with_host_key(key_text(2))],
            ..ServerConfig::default()
        };
        config.save(&path).await.unwrap();

        let loaded = ServerConfig::load(&path).await.unwrap();
        assert_eq!(loaded.allowed_devices, config.allowed_devices);
    }
}
