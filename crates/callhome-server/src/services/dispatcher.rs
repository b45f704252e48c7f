// ============================================
// File: crates/callhome-server/src/services/dispatcher.rs
// ============================================
//! # Mount Dispatcher
//!
//! ## Creation Reason
//! Bridges the transport's "channel opened" event into registry admission
//! and topology attach, and gives the topology layer a way to start
//! protocol traffic over the channel the device already opened.
//!
//! ## Main Functionality
//! - `on_channel_opened`: admit, then connect a synthesized topology node
//! - `activate_channel`: find the admitted context by address and activate
//! - `connect`: `activate_channel` as a cancellable single-attempt future
//! - `on_allowed_devices_changed`: force re-authentication on allowlist edits
//! - `close`: tear down every live session
//!
//! ## Lifecycle
//! ```text
//! channel opened ──► registry.create_session ──► topology.connect_node
//!                                                      │
//!             topology.activate_channel(addr) ◄────────┘
//!                         │
//!                 context.activate(listener)
//!                         │
//!   down / terminated ──► context.close ──► registry.on_closed
//!                                       └─► topology.disconnect_node
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `activate_channel` before admission for that address is an ordering
//!   violation; it fails immediately and is logged as an error
//! - Topology failures are logged, never rolled back; the admitted session
//!   stays admitted
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use callhome_common::{IdentityKey, NodeId};
use callhome_transport::{
    ChannelActivator, ManagedSessionHandle, SessionHandle, SessionListener, TransportError,
};

use super::attempt::SingleAttemptFuture;
use super::context::SessionContext;
use super::policy::DeviceChange;
use super::registry::SessionRegistry;
use super::topology::{NodeDescriptor, TopologyService};
use crate::config::NodeDefaults;

// ============================================
// MountDispatcher
// ============================================

/// Wires admitted call-home sessions into the topology.
pub struct MountDispatcher {
    registry: Arc<SessionRegistry>,
    topology: Arc<dyn TopologyService>,
    connection_timeout_millis: u64,
    node_defaults: NodeDefaults,
}

impl MountDispatcher {
    /// Creates a dispatcher.
    pub fn new(
        registry: Arc<SessionRegistry>,
        topology: Arc<dyn TopologyService>,
        connection_timeout_millis: u64,
        node_defaults: NodeDefaults,
    ) -> Self {
        Self {
            registry,
            topology,
            connection_timeout_millis,
            node_defaults,
        }
    }

    /// Handles a newly opened call-home channel.
    ///
    /// Returns `true` if the session was admitted.
    pub fn on_channel_opened(
        &self,
        session: SessionHandle,
        activator: Arc<dyn ChannelActivator>,
    ) -> bool {
        let topology = Arc::clone(&self.topology);
        let on_close = Box::new(move |ctx: &Arc<SessionContext>| {
            let node_id = NodeId::from(ctx.logical_id());
            match topology.disconnect_node(&node_id) {
                Ok(()) => debug!(node_id = %node_id, "Call-home node disconnected"),
                Err(e) => error!(node_id = %node_id, error = %e, "Unable to disconnect call-home node"),
            }
        });

        let Some(context) = self.registry.create_session(session, activator, on_close) else {
            return false;
        };

        let node = self.describe(&context);
        let node_id = node.node_id.clone();
        match self.topology.connect_node(node) {
            Ok(()) => info!(
                node_id = %node_id,
                remote = %context.remote_address(),
                "Call-home node connecting"
            ),
            Err(e) => error!(node_id = %node_id, error = %e, "Unable to connect call-home node"),
        }
        true
    }

    /// Activates the channel admitted from `target`.
    ///
    /// # Errors
    /// `NotAdmitted` if no session was admitted from `target`; otherwise
    /// whatever the activator returns.
    pub async fn activate_channel(
        &self,
        target: &IdentityKey,
        listener: Arc<dyn SessionListener>,
    ) -> callhome_transport::Result<ManagedSessionHandle> {
        let Some(context) = self.registry.get_by_address(target) else {
            error!(remote = %target, "No call-home session admitted for address, cannot activate");
            return Err(TransportError::not_admitted(target));
        };

        debug!(logical_id = %context.logical_id(), remote = %target, "Activating call-home channel");
        context.activate(listener).await
    }

    /// Starts `activate_channel` as a cancellable single attempt.
    pub fn connect(
        self: &Arc<Self>,
        target: IdentityKey,
        listener: Arc<dyn SessionListener>,
    ) -> SingleAttemptFuture<ManagedSessionHandle> {
        let dispatcher = Arc::clone(self);
        SingleAttemptFuture::spawn(async move {
            dispatcher.activate_channel(&target, listener).await
        })
    }

    /// Disconnects the node of every changed or removed allowlist entry.
    pub fn on_allowed_devices_changed(&self, changes: &[DeviceChange]) {
        for change in changes {
            let Some(before) = &change.before else {
                continue;
            };
            let node_id = NodeId::from(before.unique_id.as_str());
            info!(node_id = %node_id, "Allowed device changed, forcing re-authentication");
            if let Err(e) = self.topology.disconnect_node(&node_id) {
                warn!(node_id = %node_id, error = %e, "Unable to disconnect changed device");
            }
        }
    }

    /// Terminates every live session and runs its close callback.
    pub fn close(&self) {
        let contexts = self.registry.contexts();
        info!(sessions = contexts.len(), "Closing call-home sessions");
        for context in contexts {
            context.terminate();
            context.close();
        }
    }

    fn describe(&self, context: &SessionContext) -> NodeDescriptor {
        let remote = context.remote_address();
        NodeDescriptor {
            node_id: NodeId::from(context.logical_id()),
            host: remote.address(),
            port: remote.port(),
            protocol: context.protocol(),
            connection_timeout_millis: self.connection_timeout_millis,
            defaults: self.node_defaults.clone(),
        }
    }
}

impl std::fmt::Debug for MountDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountDispatcher")
            .field("registry", &self.registry)
            .field("connection_timeout_millis", &self.connection_timeout_millis)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use callhome_core::HostKey;
    use callhome_transport::mock::{MockActivator, MockSession, RecordingListener};
    use callhome_transport::TransportProtocol;
    use ed25519_dalek::SigningKey;

    use crate::management::models::DeviceRecord;
    use crate::services::attempt::AttemptError;
    use crate::services::topology::{InMemoryTopology, TopologyCall};

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn target(text: &str) -> IdentityKey {
        IdentityKey::from(text.parse::<std::net::SocketAddr>().unwrap())
    }

    fn dispatcher() -> (Arc<MountDispatcher>, Arc<SessionRegistry>, Arc<InMemoryTopology>) {
        let registry = Arc::new(SessionRegistry::new());
        let topology = Arc::new(InMemoryTopology::new());
        let dispatcher = Arc::new(MountDispatcher::new(
            Arc::clone(&registry),
            topology.clone(),
            5_000,
            NodeDefaults::default(),
        ));
        (dispatcher, registry, topology)
    }

    #[test]
    fn test_opened_channel_connects_node() {
        let (dispatcher, _, topology) = dispatcher();
        let session = Arc::new(
            MockSession::new("router-1", "10.0.0.1:4334".parse().unwrap(), key(1))
                .with_protocol(TransportProtocol::Tls),
        );
        assert!(dispatcher.on_channel_opened(session, Arc::new(MockActivator::new())));

        let node = topology.node(&NodeId::from("router-1")).unwrap();
        assert_eq!(node.identity_key(), target("10.0.0.1:4334"));
        assert_eq!(node.protocol, TransportProtocol::Tls);
        assert_eq!(node.connection_timeout_millis, 5_000);
    }

    #[test]
    fn test_duplicate_channel_does_not_touch_topology() {
        let (dispatcher, _, topology) = dispatcher();
        let first = Arc::new(MockSession::new("r", "10.0.0.1:4334".parse().unwrap(), key(1)));
        let second = Arc::new(MockSession::new("r", "10.0.0.2:4334".parse().unwrap(), key(1)));

        assert!(dispatcher.on_channel_opened(first, Arc::new(MockActivator::new())));
        assert!(!dispatcher.on_channel_opened(second.clone(), Arc::new(MockActivator::new())));
        assert!(second.is_terminated());
        assert_eq!(topology.calls(), vec![TopologyCall::Connect(NodeId::from("r"))]);
    }

    #[test]
    fn test_topology_failure_keeps_session_admitted() {
        let (dispatcher, registry, topology) = dispatcher();
        topology.set_failing(true);
        let session = Arc::new(MockSession::new("r", "10.0.0.1:4334".parse().unwrap(), key(1)));
        assert!(dispatcher.on_channel_opened(session, Arc::new(MockActivator::new())));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_activate_before_open_fails() {
        let (dispatcher, _, _) = dispatcher();
        let result = dispatcher
            .activate_channel(&target("10.0.0.1:4334"), Arc::new(RecordingListener::new()))
            .await;
        assert!(matches!(result, Err(TransportError::NotAdmitted { .. })));
    }

    #[tokio::test]
    async fn test_activate_after_open_delegates() {
        let (dispatcher, _, _) = dispatcher();
        let activator = Arc::new(MockActivator::new());
        let session = Arc::new(MockSession::new("r", "10.0.0.1:4334".parse().unwrap(), key(1)));
        dispatcher.on_channel_opened(session, activator.clone());

        dispatcher
            .activate_channel(&target("10.0.0.1:4334"), Arc::new(RecordingListener::new()))
            .await
            .unwrap();
        assert_eq!(activator.activation_count(), 1);
    }

    #[tokio::test]
    async fn test_down_and_terminated_disconnect_once() {
        let (dispatcher, registry, topology) = dispatcher();
        let activator = Arc::new(MockActivator::new());
        let session = Arc::new(MockSession::new("r", "10.0.0.1:4334".parse().unwrap(), key(1)));
        dispatcher.on_channel_opened(session, activator.clone());
        dispatcher
            .activate_channel(&target("10.0.0.1:4334"), Arc::new(RecordingListener::new()))
            .await
            .unwrap();

        activator.fire_down("link lost");
        activator.fire_terminated("closed");

        let disconnects = topology
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TopologyCall::Disconnect(_)))
            .count();
        assert_eq!(disconnects, 1);
        assert!(registry.is_empty());
        assert!(registry.get_by_address(&target("10.0.0.1:4334")).is_none());
    }

    #[tokio::test]
    async fn test_connect_future_cancel_and_failure() {
        let (dispatcher, _, _) = dispatcher();
        let missing = dispatcher.connect(target("10.9.9.9:4334"), Arc::new(RecordingListener::new()));
        assert!(matches!(missing.wait().await, Err(AttemptError::Failed { .. })));

        let session = Arc::new(MockSession::new("r", "10.0.0.1:4334".parse().unwrap(), key(1)));
        dispatcher.on_channel_opened(session, Arc::new(MockActivator::hanging()));
        let pending = dispatcher.connect(target("10.0.0.1:4334"), Arc::new(RecordingListener::new()));
        assert!(pending.cancel());
        assert_eq!(pending.wait().await.err(), Some(AttemptError::Cancelled));
    }

    #[test]
    fn test_allowlist_change_disconnects_previous_node() {
        let (dispatcher, _, topology) = dispatcher();
        dispatcher.on_allowed_devices_changed(&[
            DeviceChange::written(None, DeviceRecord::new("new")),
            DeviceChange::deleted(DeviceRecord::new("gone")),
        ]);
        assert_eq!(
            topology.calls(),
            vec![TopologyCall::Disconnect(NodeId::from("gone"))]
        );
    }

    #[test]
    fn test_close_terminates_everything() {
        let (dispatcher, registry, _) = dispatcher();
        let a = Arc::new(MockSession::new("a", "10.0.0.1:4334".parse().unwrap(), key(1)));
        let b = Arc::new(MockSession::new("b", "10.0.0.2:4334".parse().unwrap(), key(2)));
        dispatcher.on_channel_opened(a.clone(), Arc::new(MockActivator::new()));
        dispatcher.on_channel_opened(b.clone(), Arc::new(MockActivator::new()));

        dispatcher.close();
        dispatcher.close();
        assert!(a.is_terminated() && b.is_terminated());
        assert!(registry.is_empty());
    }
}
