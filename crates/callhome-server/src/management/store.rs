// ============================================
// File: crates/callhome-server/src/management/store.rs
// ============================================
//! # Device Status Store
//!
//! ## Main Functionality
//! - `DeviceStatusStore`: async read/merge/list of device records
//! - `InMemoryStatusStore`: DashMap-backed implementation
//!
//! ## ⚠️ Important Note for Next Developer
//! - `merge_device` is an upsert: fields that are `None` in the incoming
//!   record keep their stored value
//! - Writes are best-effort from the reporter's point of view; a failing
//!   store must never block admission
//!
//! ## Last Modified
//! v0.1.0 - Initial store seam

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Result, ServerError};
use crate::management::models::DeviceRecord;

/// Operational device-status store.
#[async_trait]
pub trait DeviceStatusStore: Send + Sync {
    /// Reads one device by unique id.
    async fn read_device(&self, unique_id: &str) -> Result<Option<DeviceRecord>>;

    /// Merges `record` into the stored entry with the same unique id.
    async fn merge_device(&self, record: DeviceRecord) -> Result<()>;

    /// Lists every stored device.
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>>;
}

/// In-memory status store.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    devices: DashMap<String, DeviceRecord>,
    unavailable: AtomicBool,
}

impl InMemoryStatusStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a stored record without going through the async trait.
    #[must_use]
    pub fn get(&self, unique_id: &str) -> Option<DeviceRecord> {
        self.devices.get(unique_id).map(|r| r.value().clone())
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServerError::status_store("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceStatusStore for InMemoryStatusStore {
    async fn read_device(&self, unique_id: &str) -> Result<Option<DeviceRecord>> {
        self.check_available()?;
        Ok(self.get(unique_id))
    }

    async fn merge_device(&self, record: DeviceRecord) -> Result<()> {
        self.check_available()?;
        self.devices
            .entry(record.unique_id.clone())
            .and_modify(|stored| {
                if record.host_key.is_some() {
                    stored.host_key.clone_from(&record.host_key);
                }
                if record.credentials.is_some() {
                    stored.credentials.clone_from(&record.credentials);
                }
                if record.status.is_some() {
                    stored.status = record.status;
                }
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        self.check_available()?;
        let mut devices: Vec<DeviceRecord> =
            self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::models::DeviceStatus;

    #[tokio::test]
    async fn test_merge_keeps_unset_fields() {
        let store = InMemoryStatusStore::new();
        store
            .merge_device(DeviceRecord::new("dev-1").with_host_key("ssh-ed25519 AAAA"))
            .await
            .unwrap();
        store
            .merge_device(DeviceRecord::new("dev-1").with_status(DeviceStatus::Connected))
            .await
            .unwrap();

        let stored = store.read_device("dev-1").await.unwrap().unwrap();
        assert_eq!(stored.host_key.as_deref(), Some("ssh-ed25519 AAAA"));
        assert_eq!(stored.status, Some(DeviceStatus::Connected));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryStatusStore::new();
        store.set_unavailable(true);
        assert!(store.list_devices().await.is_err());
        assert!(store.merge_device(DeviceRecord::new("x")).await.is_err());
        store.set_unavailable(false);
        assert!(store.list_devices().await.unwrap().is_empty());
    }
}
