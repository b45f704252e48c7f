// ============================================
// File: crates/callhome-server/src/services/topology.rs
// ============================================
//! # Topology Seam
//!
//! ## Creation Reason
//! Once a device is admitted, the rest of the controller sees it as a
//! topology node that it "connects" like any other. The node descriptor is
//! synthesized here; the topology layer later asks `MountDispatcher` to
//! activate the already-open channel instead of dialing out.
//!
//! ## Main Functionality
//! - `NodeDescriptor`: id, target and connection parameters of a node
//! - `TopologyService`: connect/disconnect nodes
//! - `ConnectionStatus` / `TopologyEvent`: status feed for the reporter
//! - `InMemoryTopology`: recording implementation
//!
//! ## ⚠️ Important Note for Next Developer
//! - `NodeDescriptor` never carries credentials. The topology layer reuses
//!   the open transport; decrypted secrets must not leak through here.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use callhome_common::{IdentityKey, NodeId};
use callhome_transport::TransportProtocol;

use crate::config::NodeDefaults;
use crate::error::{Result, ServerError};

// ============================================
// Node Descriptor
// ============================================

/// Topology node synthesized for an admitted call-home session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node id (the session's logical id)
    pub node_id: NodeId,
    /// Remote host the device called from
    pub host: IpAddr,
    /// Remote port the device called from
    pub port: u16,
    /// Transport the device used
    pub protocol: TransportProtocol,
    /// Connection establishment timeout
    pub connection_timeout_millis: u64,
    /// Reconnect, keepalive and datastore options
    pub defaults: NodeDefaults,
}

impl NodeDescriptor {
    /// Identity key the topology layer passes back to `activate_channel`.
    #[must_use]
    pub const fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.host, self.port)
    }
}

// ============================================
// Status Feed
// ============================================

/// Connection status of a topology node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Attempt in progress
    Connecting,
    /// Management session up
    Connected,
    /// Reconnect budget exhausted
    UnableToConnect,
}

/// Change notification from the topology layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// Node written with a new connection status.
    Updated {
        /// Node id
        node_id: NodeId,
        /// New status
        status: ConnectionStatus,
        /// Node was created by the call-home dispatcher
        callhome: bool,
    },
    /// Node deleted.
    Removed {
        /// Node id
        node_id: NodeId,
        /// Node was created by the call-home dispatcher
        callhome: bool,
    },
}

// ============================================
// TopologyService
// ============================================

/// Topology / mount service.
pub trait TopologyService: Send + Sync {
    /// Creates or replaces the node and starts connecting it.
    ///
    /// # Errors
    /// Returns `Topology` if the node cannot be written.
    fn connect_node(&self, node: NodeDescriptor) -> Result<()>;

    /// Disconnects and removes the node.
    ///
    /// # Errors
    /// Returns `Topology` if the node cannot be removed.
    fn disconnect_node(&self, node_id: &NodeId) -> Result<()>;
}

// ============================================
// InMemoryTopology
// ============================================

/// Recorded call on `InMemoryTopology`.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyCall {
    /// `connect_node`
    Connect(NodeId),
    /// `disconnect_node`
    Disconnect(NodeId),
}

/// Topology service that keeps nodes in memory and records every call.
#[derive(Debug, Default)]
pub struct InMemoryTopology {
    nodes: DashMap<NodeId, NodeDescriptor>,
    calls: Mutex<Vec<TopologyCall>>,
    failing: AtomicBool,
}

impl InMemoryTopology {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the node with `node_id`.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<NodeDescriptor> {
        self.nodes.get(node_id).map(|r| r.value().clone())
    }

    /// Number of connected nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TopologyCall> {
        self.calls.lock().clone()
    }
}

impl TopologyService for InMemoryTopology {
    fn connect_node(&self, node: NodeDescriptor) -> Result<()> {
        self.calls.lock().push(TopologyCall::Connect(node.node_id.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::topology(node.node_id.as_str(), "topology unavailable"));
        }
        self.nodes.insert(node.node_id.clone(), node);
        Ok(())
    }

    fn disconnect_node(&self, node_id: &NodeId) -> Result<()> {
        self.calls.lock().push(TopologyCall::Disconnect(node_id.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServerError::topology(node_id.as_str(), "topology unavailable"));
        }
        self.nodes.remove(node_id);
        Ok(())
    }
}
