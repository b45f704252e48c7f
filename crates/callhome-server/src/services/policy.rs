// ============================================
// File: crates/callhome-server/src/services/policy.rs
// ============================================
//! # Policy Watch
//!
//! ## Creation Reason
//! Admission decisions read the allowlist, the global policy and the memory
//! of previously rejected devices on every handshake. Those live in external
//! stores that push change notifications; this module folds the
//! notifications into lookup indices that can be read without blocking.
//!
//! ## Main Functionality
//! - `DeviceChange`: before/after snapshot of one device record
//! - `ConfigEvent`: one notification batch from a config feed
//! - `PolicyWatch`: derived indices + current global policy snapshot
//!
//! ## Indices
//! ```text
//! ConfigEvent::Global             ──► global      (last snapshot wins)
//! ConfigEvent::Devices            ──► allowlist   unique_id      → record
//!                                     by_host_key HostKey        → record
//! ConfigEvent::OperationalDevices ──► operational canonical text → record
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No notification received yet means no policy and no devices: unknown
//!   keys are rejected until a global policy explicitly allows them
//! - Device changes are applied as "remove before, then insert after"; a
//!   record whose key changed must not linger under its old key
//! - The global snapshot is swapped whole; readers never see a half-updated
//!   policy
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use callhome_core::HostKey;

use crate::management::models::{Credentials, DeviceRecord, GlobalPolicy, NamingStrategy};

// ============================================
// Change Notifications
// ============================================

/// Before/after snapshot of a single device record.
///
/// `after == None` is a deletion; `before == None` is a fresh write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    /// Record before the change
    pub before: Option<DeviceRecord>,
    /// Record after the change
    pub after: Option<DeviceRecord>,
}

impl DeviceChange {
    /// A write (creation or replacement).
    #[must_use]
    pub const fn written(before: Option<DeviceRecord>, after: DeviceRecord) -> Self {
        Self {
            before,
            after: Some(after),
        }
    }

    /// A deletion.
    #[must_use]
    pub const fn deleted(before: DeviceRecord) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }
}

/// One notification batch from an external config feed.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Global policy replaced; `None` entries mean the policy was deleted.
    Global(Vec<Option<GlobalPolicy>>),
    /// Device allowlist changed.
    Devices(Vec<DeviceChange>),
    /// Operational memory of seen devices changed.
    OperationalDevices(Vec<DeviceChange>),
}

// ============================================
// PolicyWatch
// ============================================

/// Lookup indices derived from the config feeds.
///
/// # Thread Safety
/// All reads are lock-free map lookups or a short read lock on the global
/// snapshot pointer. Safe to share across handshake threads.
#[derive(Default)]
pub struct PolicyWatch {
    global: RwLock<Option<Arc<GlobalPolicy>>>,
    allowlist: DashMap<String, DeviceRecord>,
    by_host_key: DashMap<HostKey, DeviceRecord>,
    operational: DashMap<String, DeviceRecord>,
}

impl PolicyWatch {
    /// Creates an empty watch (no policy, no devices).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one notification batch.
    pub fn on_change(&self, event: &ConfigEvent) {
        match event {
            ConfigEvent::Global(snapshots) => self.on_global_changed(snapshots),
            ConfigEvent::Devices(changes) => {
                for change in changes {
                    self.on_device_changed(change);
                }
            }
            ConfigEvent::OperationalDevices(changes) => {
                for change in changes {
                    self.on_operational_changed(change);
                }
            }
        }
    }

    fn on_global_changed(&self, snapshots: &[Option<GlobalPolicy>]) {
        let Some(latest) = snapshots.last() else {
            return;
        };
        let latest = latest.clone().map(Arc::new);
        match &latest {
            Some(policy) => info!(
                accept_all_unknown_keys = policy.accept_all_unknown_keys,
                naming_strategy = ?policy.naming_strategy,
                has_credentials = policy.credentials.is_some(),
                "Global call-home policy updated"
            ),
            None => info!("Global call-home policy removed"),
        }
        *self.global.write() = latest;
    }

    fn on_device_changed(&self, change: &DeviceChange) {
        if let Some(before) = &change.before {
            self.allowlist.remove(&before.unique_id);
            if let Some(Ok(key)) = before.decoded_host_key() {
                self.by_host_key.remove(&key);
            }
        }

        let Some(after) = &change.after else {
            return;
        };
        self.allowlist.insert(after.unique_id.clone(), after.clone());
        match after.decoded_host_key() {
            None => debug!(
                unique_id = %after.unique_id,
                "Allowed device has no host key, not indexed"
            ),
            Some(Err(e)) => error!(
                unique_id = %after.unique_id,
                error = %e,
                "Unable to decode host key of allowed device"
            ),
            Some(Ok(key)) => {
                debug!(
                    unique_id = %after.unique_id,
                    host_key = %key.fingerprint(),
                    "Allowed device indexed"
                );
                self.by_host_key.insert(key, after.clone());
            }
        }
    }

    fn on_operational_changed(&self, change: &DeviceChange) {
        if let Some(text) = change.before.as_ref().and_then(|b| b.host_key.as_deref()) {
            self.operational.remove(&canonical_key_text(text));
        }
        if let Some(after) = &change.after {
            match after.host_key.as_deref() {
                Some(text) => {
                    self.operational
                        .insert(canonical_key_text(text), after.clone());
                }
                None => debug!(
                    unique_id = %after.unique_id,
                    "Operational device has no host key, not indexed"
                ),
            }
        }
    }

    // ========================================
    // Queries
    // ========================================

    /// Current global policy snapshot.
    #[must_use]
    pub fn global(&self) -> Option<Arc<GlobalPolicy>> {
        self.global.read().clone()
    }

    /// Whether unknown keys are admitted. `false` when no policy is known.
    #[must_use]
    pub fn allows_unknown_keys(&self) -> bool {
        self.global().is_some_and(|p| p.accept_all_unknown_keys)
    }

    /// Naming strategy for unknown devices, `IP_PORT` when unset.
    #[must_use]
    pub fn naming_strategy(&self) -> NamingStrategy {
        self.global()
            .and_then(|p| p.naming_strategy)
            .unwrap_or_default()
    }

    /// Global fallback credentials.
    #[must_use]
    pub fn global_credentials(&self) -> Option<Credentials> {
        self.global().and_then(|p| p.credentials.clone())
    }

    /// Allowlisted device registered for `key`.
    #[must_use]
    pub fn configured_device(&self, key: &HostKey) -> Option<DeviceRecord> {
        self.by_host_key.get(key).map(|r| r.value().clone())
    }

    /// Previously recorded device for `key`, by canonical key text.
    #[must_use]
    pub fn operational_device(&self, key: &HostKey) -> Option<DeviceRecord> {
        self.operational.get(&key.encode()).map(|r| r.value().clone())
    }

    /// Snapshot of the configured allowlist, ordered by unique id.
    #[must_use]
    pub fn allowed_devices(&self) -> Vec<DeviceRecord> {
        let mut devices: Vec<DeviceRecord> =
            self.allowlist.iter().map(|r| r.value().clone()).collect();
        devices.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        devices
    }
}

impl std::fmt::Debug for PolicyWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyWatch")
            .field("has_global", &self.global.read().is_some())
            .field("allowed_devices", &self.allowlist.len())
            .field("indexed_keys", &self.by_host_key.len())
            .field("operational_devices", &self.operational.len())
            .finish()
    }
}

/// Canonical form of stored key text; undecodable text is kept verbatim.
fn canonical_key_text(text: &str) -> String {
    HostKey::decode(text).map_or_else(|_| text.trim().to_owned(), |key| key.encode())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn device(id: &str, seed: u8) -> DeviceRecord {
        DeviceRecord::new(id).with_host_key(format!("{} {id}@lab", key(seed).encode()))
    }

    #[test]
    fn test_empty_watch_fails_closed() {
        let watch = PolicyWatch::new();
        assert!(!watch.allows_unknown_keys());
        assert_eq!(watch.naming_strategy(), NamingStrategy::IpPort);
        assert!(watch.global_credentials().is_none());
        assert!(watch.configured_device(&key(1)).is_none());
    }

    #[test]
    fn test_last_global_snapshot_wins() {
        let watch = PolicyWatch::new();
        let allow = GlobalPolicy {
            accept_all_unknown_keys: true,
            naming_strategy: Some(NamingStrategy::IpOnly),
            credentials: None,
        };
        watch.on_change(&ConfigEvent::Global(vec![None, Some(allow)]));
        assert!(watch.allows_unknown_keys());
        assert_eq!(watch.naming_strategy(), NamingStrategy::IpOnly);

        watch.on_change(&ConfigEvent::Global(vec![]));
        assert!(watch.allows_unknown_keys());

        watch.on_change(&ConfigEvent::Global(vec![None]));
        assert!(!watch.allows_unknown_keys());
    }

    #[test]
    fn test_device_rekey_drops_old_key() {
        let watch = PolicyWatch::new();
        let original = device("router-1", 1);
        watch.on_change(&ConfigEvent::Devices(vec![DeviceChange::written(
            None,
            original.clone(),
        )]));
        assert_eq!(
            watch.configured_device(&key(1)).map(|d| d.unique_id),
            Some("router-1".into())
        );

        let rekeyed = device("router-1", 2);
        watch.on_change(&ConfigEvent::Devices(vec![DeviceChange::written(
            Some(original),
            rekeyed.clone(),
        )]));
        assert!(watch.configured_device(&key(1)).is_none());
        assert!(watch.configured_device(&key(2)).is_some());

        watch.on_change(&ConfigEvent::Devices(vec![DeviceChange::deleted(rekeyed)]));
        assert!(watch.configured_device(&key(2)).is_none());
        assert!(watch.allowed_devices().is_empty());
    }

    #[test]
    fn test_devices_without_or_with_bad_keys_are_not_indexed() {
        let watch = PolicyWatch::new();
        watch.on_change(&ConfigEvent::Devices(vec![
            DeviceChange::written(None, DeviceRecord::new("no-key")),
            DeviceChange::written(None, DeviceRecord::new("bad-key").with_host_key("garbage")),
        ]));
        assert_eq!(watch.allowed_devices().len(), 2);
        assert!(watch.configured_device(&key(1)).is_none());
    }

    #[test]
    fn test_operational_lookup_ignores_comment() {
        let watch = PolicyWatch::new();
        watch.on_change(&ConfigEvent::OperationalDevices(vec![DeviceChange::written(
            None,
            device("10.0.0.5:830", 3),
        )]));
        assert_eq!(
            watch.operational_device(&key(3)).map(|d| d.unique_id),
            Some("10.0.0.5:830".into())
        );
        assert!(watch.operational_device(&key(4)).is_none());
    }
}
