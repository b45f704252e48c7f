// ============================================
// File: crates/callhome-server/src/server.rs
// ============================================
//! # Call-Home Server Assembly
//!
//! ## Creation Reason
//! Wires the control plane together and hands the transport and topology
//! layers the entry points they call into.
//!
//! ## Main Functionality
//! - `CallHomeServer`: component construction and lifecycle
//! - `auth_provider()`: handshake-time decision for the transport
//! - `dispatcher()`: channel-opened and activation entry points
//! - `on_config_change()`: config feed fan-out
//! - `status_recorder()`: topology status feed
//!
//! ## Server Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CallHomeServer                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  transport ──► auth_provider ──► DuplicateRejectingDecider  │
//! │                                        └► AuthorizationDecider
//! │  transport ──► dispatcher ──► SessionRegistry               │
//! │                    │                                        │
//! │                    └──► TopologyService                     │
//! │                                                             │
//! │  config feed ──► on_config_change ──► PolicyWatch           │
//! │                                   └──► MountDispatcher      │
//! │                                                             │
//! │  ┌──────────────────────── tasks ────────────────────────┐  │
//! │  │ StatusReporter ◄── StatusRecorder (decider, topology) │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `start` must be called inside a tokio runtime; status events recorded
//!   before `start` are buffered in the reporter channel
//! - `shutdown` terminates every live session before stopping the reporter
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use callhome_core::CredentialVault;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::management::reporter::{StatusRecorder, StatusReporter};
use crate::management::store::DeviceStatusStore;
use crate::services::{
    AuthorizationDecider, AuthorizationProvider, ConfigEvent, DuplicateRejectingDecider,
    MountDispatcher, PolicyWatch, SessionRegistry, TopologyService,
};

/// Time allowed for the reporter to drain on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// CallHomeServer
// ============================================

/// Assembled call-home control plane.
///
/// # Lifecycle
/// 1. Create with `CallHomeServer::new(...)`
/// 2. Spawn background tasks with `start()`
/// 3. Hand `auth_provider()` and `dispatcher()` to the transport
/// 4. Stop with `shutdown().await`
pub struct CallHomeServer {
    config: ServerConfig,
    policy: Arc<PolicyWatch>,
    registry: Arc<SessionRegistry>,
    auth: Arc<dyn AuthorizationProvider>,
    dispatcher: Arc<MountDispatcher>,
    status: StatusRecorder,
    reporter: Mutex<Option<StatusReporter>>,
    reporter_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CallHomeServer {
    /// Builds every component and seeds the policy from `config`.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the configuration does not validate.
    pub fn new(
        config: ServerConfig,
        vault: Arc<dyn CredentialVault>,
        topology: Arc<dyn TopologyService>,
        store: Arc<dyn DeviceStatusStore>,
    ) -> Result<Self> {
        config.validate()?;

        let policy = Arc::new(PolicyWatch::new());
        for event in config.initial_events() {
            policy.on_change(&event);
        }

        let registry = Arc::new(SessionRegistry::new());
        let (reporter, status) = StatusReporter::new(store, Arc::clone(&policy));

        let decider = AuthorizationDecider::new(Arc::clone(&policy), vault, status.clone());
        let auth: Arc<dyn AuthorizationProvider> = Arc::new(DuplicateRejectingDecider::new(
            Arc::clone(&registry),
            decider,
        ));

        let dispatcher = Arc::new(MountDispatcher::new(
            Arc::clone(&registry),
            topology,
            config.network.connection_timeout_millis,
            config.node.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            allowed_devices = config.allowed_devices.len(),
            accept_unknown = policy.allows_unknown_keys(),
            "Call-home server assembled"
        );

        Ok(Self {
            config,
            policy,
            registry,
            auth,
            dispatcher,
            status,
            reporter: Mutex::new(Some(reporter)),
            reporter_task: Mutex::new(None),
            shutdown_tx,
        })
    }

    /// Spawns the status reporter.
    ///
    /// # Errors
    /// Returns `StartupFailed` if already started.
    pub fn start(&self) -> Result<()> {
        let reporter = self
            .reporter
            .lock()
            .take()
            .ok_or_else(|| ServerError::startup_failed("server already started"))?;

        let handle = tokio::spawn(reporter.run(self.shutdown_tx.subscribe()));
        *self.reporter_task.lock() = Some(handle);

        info!(
            ssh_port = self.config.network.ssh_port,
            tls_port = self.config.network.tls_port,
            "Call-home server started"
        );
        Ok(())
    }

    /// Applies a config feed notification.
    pub fn on_config_change(&self, event: &ConfigEvent) {
        self.policy.on_change(event);
        if let ConfigEvent::Devices(changes) = event {
            self.dispatcher.on_allowed_devices_changed(changes);
        }
    }

    /// Handshake-time authorization entry point.
    #[must_use]
    pub fn auth_provider(&self) -> Arc<dyn AuthorizationProvider> {
        Arc::clone(&self.auth)
    }

    /// Channel and activation entry points.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<MountDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Live session registry.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Current policy indices.
    #[must_use]
    pub fn policy(&self) -> Arc<PolicyWatch> {
        Arc::clone(&self.policy)
    }

    /// Recorder for topology status events.
    #[must_use]
    pub fn status_recorder(&self) -> StatusRecorder {
        self.status.clone()
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Terminates every session and stops background tasks.
    pub async fn shutdown(&self) {
        info!(sessions = self.registry.count(), "Shutting down call-home server");
        self.dispatcher.close();
        let _ = self.shutdown_tx.send(());

        let task = self.reporter_task.lock().take();
        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Status reporter task failed: {}", e),
                Err(_) => warn!("Status reporter timed out during shutdown"),
            }
        }
        info!("Call-home server shutdown complete");
    }
}

impl std::fmt::Debug for CallHomeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHomeServer")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use callhome_common::{IdentityKey, NodeId};
    use callhome_core::vault::{AeadVault, VaultKey};
    use callhome_core::HostKey;
    use callhome_transport::mock::{ListenerEvent, MockActivator, MockSession, RecordingListener};
    use ed25519_dalek::SigningKey;

    use crate::management::models::{Credentials, DeviceRecord, DeviceStatus, GlobalPolicy};
    use crate::management::store::InMemoryStatusStore;
    use crate::services::{CallHomeAuthorization, DeviceChange, InMemoryTopology};

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    struct Harness {
        server: CallHomeServer,
        topology: Arc<InMemoryTopology>,
        store: Arc<InMemoryStatusStore>,
    }

    fn harness(accept_all: bool) -> Harness {
        let vault = Arc::new(AeadVault::new(VaultKey::from_bytes([4u8; 32])));
        let sealed = vault.encrypt("secret").unwrap();
        let config = ServerConfig {
            global: Some(GlobalPolicy {
                accept_all_unknown_keys: accept_all,
                naming_strategy: None,
                credentials: Some(Credentials::new("admin", vec![sealed])),
            }),
            allowed_devices: vec![DeviceRecord::new("router-9").with_host_key(key(9).encode())],
            ..ServerConfig::default()
        };

        let topology = Arc::new(InMemoryTopology::new());
        let store = Arc::new(InMemoryStatusStore::new());
        let server = CallHomeServer::new(config, vault, topology.clone(), store.clone()).unwrap();
        Harness {
            server,
            topology,
            store,
        }
    }

    async fn wait_for_status(store: &InMemoryStatusStore, id: &str) -> Option<DeviceRecord> {
        for _ in 0..100 {
            if let Some(record) = store.get(id) {
                return Some(record);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// Authorizes, opens and activates a session the way the transport would.
    async fn connect(
        server: &CallHomeServer,
        remote: &str,
        host_key: HostKey,
        listener: Arc<RecordingListener>,
    ) -> Arc<MockActivator> {
        let remote: SocketAddr = remote.parse().unwrap();
        let auth = server.auth_provider().provide_auth(remote, &host_key);
        let logical_id = auth.logical_id().unwrap().to_owned();

        let activator = Arc::new(MockActivator::new());
        let session = Arc::new(MockSession::new(logical_id, remote, host_key));
        assert!(server.dispatcher().on_channel_opened(session, activator.clone()));

        server
            .dispatcher()
            .activate_channel(&IdentityKey::from(remote), listener)
            .await
            .unwrap();
        activator
    }

    #[tokio::test]
    async fn test_unknown_device_end_to_end() {
        let h = harness(true);
        h.server.start().unwrap();

        let listener = Arc::new(RecordingListener::new());
        let activator = connect(&h.server, "192.168.1.10:4334", key(1), listener.clone()).await;
        let node_id = NodeId::from("192.168.1.10:4334");

        let record = wait_for_status(&h.store, "192.168.1.10:4334").await.unwrap();
        assert_eq!(record.status, Some(DeviceStatus::Disconnected));
        assert_eq!(record.host_key, Some(key(1).encode()));

        let node = h.topology.node(&node_id).unwrap();
        assert_eq!(node.identity_key().to_string(), "192.168.1.10:4334");

        activator.fire_up();
        activator.fire_terminated("device closed");

        assert!(h.topology.node(&node_id).is_none());
        assert!(h.server.registry().get_by_host_key(&key(1)).is_none());
        assert!(h
            .server
            .registry()
            .get_by_address(&IdentityKey::from_host_port("192.168.1.10", 4334).unwrap())
            .is_none());
        assert_eq!(listener.events().len(), 2);

        h.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_connection_with_live_key_is_rejected() {
        let h = harness(true);
        let _activator = connect(
            &h.server,
            "10.0.0.1:4334",
            key(1),
            Arc::new(RecordingListener::new()),
        )
        .await;

        let auth = h
            .server
            .auth_provider()
            .provide_auth("10.0.0.2:4334".parse().unwrap(), &key(1));
        assert_eq!(auth, CallHomeAuthorization::Rejected);
    }

    #[tokio::test]
    async fn test_unknown_device_rejected_without_policy() {
        let h = harness(false);
        h.server.start().unwrap();

        let auth = h
            .server
            .auth_provider()
            .provide_auth("10.0.0.7:4334".parse().unwrap(), &key(7));
        assert_eq!(auth, CallHomeAuthorization::Rejected);

        let record = wait_for_status(&h.store, "10.0.0.7:4334").await.unwrap();
        assert_eq!(record.status, Some(DeviceStatus::FailedNotAllowed));
        h.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_sees_registry_in_terminal_order() {
        let h = harness(true);
        let registry = h.server.registry();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let probe = |registry: Arc<SessionRegistry>, seen: Arc<Mutex<Vec<(bool, usize)>>>| {
            move |event: &ListenerEvent| {
                let terminal = match event {
                    ListenerEvent::Terminated(..) => true,
                    ListenerEvent::Down(..) => false,
                    _ => return,
                };
                seen.lock().push((terminal, registry.count()));
            }
        };

        let terminated = connect(
            &h.server,
            "10.0.0.1:4334",
            key(1),
            Arc::new(RecordingListener::with_probe(probe(
                Arc::clone(&registry),
                Arc::clone(&seen),
            ))),
        )
        .await;
        terminated.fire_terminated("bye");

        let downed = connect(
            &h.server,
            "10.0.0.2:4334",
            key(2),
            Arc::new(RecordingListener::with_probe(probe(
                Arc::clone(&registry),
                Arc::clone(&seen),
            ))),
        )
        .await;
        downed.fire_down("link lost");

        // Terminated notifies before deregistering; down deregisters first.
        assert_eq!(*seen.lock(), vec![(true, 1), (false, 0)]);
    }

    #[tokio::test]
    async fn test_allowlist_edit_disconnects_device() {
        let h = harness(false);
        let _activator = connect(
            &h.server,
            "10.0.0.9:4334",
            key(9),
            Arc::new(RecordingListener::new()),
        )
        .await;
        assert!(h.topology.node(&NodeId::from("router-9")).is_some());

        h.server.on_config_change(&ConfigEvent::Devices(vec![DeviceChange::deleted(
            DeviceRecord::new("router-9").with_host_key(key(9).encode()),
        )]));

        assert!(h.topology.node(&NodeId::from("router-9")).is_none());
        assert!(h.server.policy().configured_device(&key(9)).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions_and_start_is_single_shot() {
        let h = harness(true);
        h.server.start().unwrap();
        assert!(h.server.start().is_err());

        let _activator = connect(
            &h.server,
            "10.0.0.3:4334",
            key(3),
            Arc::new(RecordingListener::new()),
        )
        .await;

        h.server.shutdown().await;
        assert!(h.server.registry().is_empty());
        assert_eq!(h.topology.node_count(), 0);
    }
}
