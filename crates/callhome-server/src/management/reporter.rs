// ============================================
// File: crates/callhome-server/src/management/reporter.rs
// ============================================
//! # Status Reporter
//!
//! ## Creation Reason
//! Background writer of call-home device status, kept off the handshake
//! path.
//!
//! ## Main Functionality
//! - `StatusEvent`: a status change to be persisted
//! - `StatusReporter`: drains the event channel into the status store
//! - `StatusRecorder`: clonable, non-blocking sender used on the hot path
//!
//! ## ⚠️ Important Note for Next Developer
//! - The recorder is called from the SSH handshake path; it must never
//!   block, so it uses `try_send` and drops events when the channel is full
//! - Store failures are logged and swallowed; they never affect admission
//! - Topology events for nodes that were not created by call-home are
//!   ignored
//! - Successful writes are mirrored into the policy watch's operational
//!   memory so repeat rejections are recognized
//!
//! ## Last Modified
//! v0.1.0 - Initial status reporter

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use callhome_core::HostKey;

use super::models::{DeviceRecord, DeviceStatus};
use super::store::DeviceStatusStore;
use crate::services::policy::{ConfigEvent, DeviceChange, PolicyWatch};
use crate::services::topology::{ConnectionStatus, TopologyEvent};

/// Capacity of the status event channel.
const STATUS_CHANNEL_CAPACITY: usize = 1000;

/// Status change to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Unknown device admitted through the accept-all policy.
    ForceListed {
        /// Synthesized logical id
        unique_id: String,
        /// Presented host key
        host_key: HostKey,
    },
    /// Unknown device rejected.
    Unlisted {
        /// Synthesized logical id
        unique_id: String,
        /// Presented host key
        host_key: HostKey,
    },
    /// Allowlisted device failed to log in.
    FailedAuth {
        /// Presented host key
        host_key: HostKey,
    },
    /// Topology node changed.
    Topology(TopologyEvent),
}

/// Background task persisting device status.
pub struct StatusReporter {
    store: Arc<dyn DeviceStatusStore>,
    policy: Arc<PolicyWatch>,
    event_rx: mpsc::Receiver<StatusEvent>,
}

impl StatusReporter {
    /// Creates a reporter and the recorder feeding it.
    pub fn new(
        store: Arc<dyn DeviceStatusStore>,
        policy: Arc<PolicyWatch>,
    ) -> (Self, StatusRecorder) {
        let (tx, rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        (
            Self {
                store,
                policy,
                event_rx: rx,
            },
            StatusRecorder::new(tx),
        )
    }

    /// Runs until shutdown or until every recorder is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Status reporter started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => { info!("Status reporter stopping"); break; }
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => { debug!("Status channel closed"); break; }
                },
            }
        }
    }

    /// Persists one event.
    pub async fn handle(&self, event: StatusEvent) {
        match event {
            StatusEvent::ForceListed {
                unique_id,
                host_key,
            } => {
                self.write(
                    DeviceRecord::new(unique_id)
                        .with_host_key(host_key.encode())
                        .with_status(DeviceStatus::Disconnected),
                )
                .await;
            }
            StatusEvent::Unlisted {
                unique_id,
                host_key,
            } => {
                self.write(
                    DeviceRecord::new(unique_id)
                        .with_host_key(host_key.encode())
                        .with_status(DeviceStatus::FailedNotAllowed),
                )
                .await;
            }
            StatusEvent::FailedAuth { host_key } => self.record_failed_auth(&host_key).await,
            StatusEvent::Topology(event) => self.record_topology(event).await,
        }
    }

    async fn record_failed_auth(&self, host_key: &HostKey) {
        for device in self.policy.allowed_devices() {
            let Some(decoded) = device.decoded_host_key() else {
                info!(unique_id = %device.unique_id, "Allowed device has no host key, skipping");
                continue;
            };
            match decoded {
                Ok(key) if key == *host_key => {
                    self.write(
                        DeviceRecord::new(device.unique_id)
                            .with_host_key(key.encode())
                            .with_status(DeviceStatus::FailedAuthFailure),
                    )
                    .await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(unique_id = %device.unique_id, error = %e, "Unable to decode allowed host key");
                }
            }
        }
        error!(
            host_key = %host_key.fingerprint(),
            "No match found for failed-auth host key; it should have been filtered by allowlist"
        );
    }

    async fn record_topology(&self, event: TopologyEvent) {
        let (node_id, status) = match event {
            TopologyEvent::Updated { callhome: false, .. }
            | TopologyEvent::Removed { callhome: false, .. } => return,
            TopologyEvent::Updated {
                node_id, status, ..
            } => match status {
                ConnectionStatus::Connected => (node_id, DeviceStatus::Connected),
                ConnectionStatus::UnableToConnect => (node_id, DeviceStatus::Failed),
                ConnectionStatus::Connecting => {
                    debug!(node_id = %node_id, "Ignoring connecting status");
                    return;
                }
            },
            TopologyEvent::Removed { node_id, .. } => (node_id, DeviceStatus::Disconnected),
        };

        let existing = match self.store.read_device(node_id.as_str()).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Status read failed");
                return;
            }
        };
        let Some(existing) = existing else {
            warn!(node_id = %node_id, "No corresponding callhome device found");
            return;
        };

        let mut record = DeviceRecord::new(existing.unique_id).with_status(status);
        record.host_key = existing.host_key;
        self.write(record).await;
    }

    async fn write(&self, record: DeviceRecord) {
        match self.store.merge_device(record.clone()).await {
            Ok(()) => {
                debug!(unique_id = %record.unique_id, status = ?record.status, "Device status written");
                self.policy
                    .on_change(&ConfigEvent::OperationalDevices(vec![DeviceChange::written(
                        None, record,
                    )]));
            }
            Err(e) => warn!(unique_id = %record.unique_id, error = %e, "Device status write failed"),
        }
    }
}

/// Non-blocking sender of status events.
///
/// Can be cloned and shared across threads.
#[derive(Debug, Clone)]
pub struct StatusRecorder {
    tx: Option<mpsc::Sender<StatusEvent>>,
}

impl StatusRecorder {
    /// Creates an enabled recorder over `tx`.
    pub const fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a recorder that discards every event.
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Records an unknown device admitted by policy (DISCONNECTED).
    pub fn as_force_listed_device(&self, unique_id: &str, host_key: &HostKey) {
        self.send(StatusEvent::ForceListed {
            unique_id: unique_id.to_owned(),
            host_key: host_key.clone(),
        });
    }

    /// Records a rejected unknown device (FAILEDNOTALLOWED).
    pub fn as_unlisted_device(&self, unique_id: &str, host_key: &HostKey) {
        self.send(StatusEvent::Unlisted {
            unique_id: unique_id.to_owned(),
            host_key: host_key.clone(),
        });
    }

    /// Records a login failure for an allowlisted device (FAILEDAUTHFAILURE).
    pub fn report_failed_auth(&self, host_key: &HostKey) {
        self.send(StatusEvent::FailedAuth {
            host_key: host_key.clone(),
        });
    }

    /// Forwards a topology change.
    pub fn on_topology_change(&self, event: TopologyEvent) {
        self.send(StatusEvent::Topology(event));
    }

    fn send(&self, event: StatusEvent) {
        if let Some(ref tx) = self.tx {
            if let Err(e) = tx.try_send(event) {
                warn!("Status event dropped: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callhome_common::NodeId;
    use ed25519_dalek::SigningKey;

    use crate::management::store::InMemoryStatusStore;

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn reporter() -> (StatusReporter, Arc<InMemoryStatusStore>, Arc<PolicyWatch>) {
        let store = Arc::new(InMemoryStatusStore::new());
        let policy = Arc::new(PolicyWatch::new());
        let (reporter, _recorder) = StatusReporter::new(store.clone(), Arc::clone(&policy));
        (reporter, store, policy)
    }

    #[tokio::test]
    async fn test_force_listed_and_unlisted_statuses() {
        let (reporter, store, policy) = reporter();
        reporter
            .handle(StatusEvent::ForceListed {
                unique_id: "10.0.0.1:4334".into(),
                host_key: key(1),
            })
            .await;
        reporter
            .handle(StatusEvent::Unlisted {
                unique_id: "10.0.0.2:4334".into(),
                host_key: key(2),
            })
            .await;

        assert!(policy.operational_device(&key(2)).is_some());

        let forced = store.get("10.0.0.1:4334").unwrap();
        assert_eq!(forced.status, Some(DeviceStatus::Disconnected));
        assert_eq!(forced.host_key, Some(key(1).encode()));
        assert_eq!(
            store.get("10.0.0.2:4334").unwrap().status,
            Some(DeviceStatus::FailedNotAllowed)
        );
    }

    #[tokio::test]
    async fn test_failed_auth_matches_allowlist_entry() {
        let (reporter, store, policy) = reporter();
        policy.on_change(&ConfigEvent::Devices(vec![
            DeviceChange::written(None, DeviceRecord::new("no-key")),
            DeviceChange::written(None, DeviceRecord::new("router-2").with_host_key(key(2).encode())),
        ]));

        reporter
            .handle(StatusEvent::FailedAuth { host_key: key(2) })
            .await;
        assert_eq!(
            store.get("router-2").unwrap().status,
            Some(DeviceStatus::FailedAuthFailure)
        );

        reporter
            .handle(StatusEvent::FailedAuth { host_key: key(9) })
            .await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_topology_status_mapping_preserves_host_key() {
        let (reporter, store, _) = reporter();
        store
            .merge_device(
                DeviceRecord::new("router-1")
                    .with_host_key(key(1).encode())
                    .with_status(DeviceStatus::Disconnected),
            )
            .await
            .unwrap();

        let updated = |status| {
            StatusEvent::Topology(TopologyEvent::Updated {
                node_id: NodeId::from("router-1"),
                status,
                callhome: true,
            })
        };

        reporter.handle(updated(ConnectionStatus::Connected)).await;
        assert_eq!(store.get("router-1").unwrap().status, Some(DeviceStatus::Connected));

        reporter.handle(updated(ConnectionStatus::Connecting)).await;
        assert_eq!(store.get("router-1").unwrap().status, Some(DeviceStatus::Connected));

        reporter.handle(updated(ConnectionStatus::UnableToConnect)).await;
        assert_eq!(store.get("router-1").unwrap().status, Some(DeviceStatus::Failed));

        reporter
            .handle(StatusEvent::Topology(TopologyEvent::Removed {
                node_id: NodeId::from("router-1"),
                callhome: true,
            }))
            .await;
        let record = store.get("router-1").unwrap();
        assert_eq!(record.status, Some(DeviceStatus::Disconnected));
        assert_eq!(record.host_key, Some(key(1).encode()));
    }

    #[tokio::test]
    async fn test_topology_event_ignored_for_unknown_or_foreign_nodes() {
        let (reporter, store, _) = reporter();
        reporter
            .handle(StatusEvent::Topology(TopologyEvent::Updated {
                node_id: NodeId::from("ghost"),
                status: ConnectionStatus::Connected,
                callhome: true,
            }))
            .await;
        reporter
            .handle(StatusEvent::Topology(TopologyEvent::Removed {
                node_id: NodeId::from("static-node"),
                callhome: false,
            }))
            .await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let (reporter, store, _) = reporter();
        store.set_unavailable(true);
        reporter
            .handle(StatusEvent::ForceListed {
                unique_id: "x".into(),
                host_key: key(1),
            })
            .await;
        store.set_unavailable(false);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_until_shutdown() {
        let store = Arc::new(InMemoryStatusStore::new());
        let (reporter, recorder) =
            StatusReporter::new(store.clone(), Arc::new(PolicyWatch::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        recorder.as_unlisted_device("10.0.0.3:4334", &key(3));
        drop(recorder);
        let task = tokio::spawn(reporter.run(shutdown_rx));
        task.await.unwrap();
        drop(shutdown_tx);

        assert_eq!(
            store.get("10.0.0.3:4334").unwrap().status,
            Some(DeviceStatus::FailedNotAllowed)
        );
    }

    #[test]
    fn test_disabled_recorder_discards() {
        StatusRecorder::disabled().report_failed_auth(&key(1));
    }
}
