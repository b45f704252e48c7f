// ============================================
// File: crates/callhome-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the abstract interfaces the control plane uses to talk to the
//! transport, so admission and dispatch logic can be exercised without a
//! real SSH/TLS stack.
//!
//! ## Main Functionality
//! - `TransportProtocol`: which listener accepted the device
//! - `CallHomeSession`: an authenticated inbound connection awaiting use
//! - `ChannelActivator`: opens the management protocol on that connection
//! - `ManagedSession`: the established management session
//! - `SessionListener`: lifecycle callbacks of a managed session
//!
//! ## ⚠️ Important Note for Next Developer
//! - Trait changes affect every transport implementation
//! - `activate` is called at most once per `CallHomeSession` in practice,
//!   but implementations must not assume it
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use callhome_core::hostkey::HostKey;

use crate::error::{Result, TransportError};

// ============================================
// TransportProtocol
// ============================================

/// Transport a call-home device connected over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    /// NETCONF over SSH
    Ssh,
    /// NETCONF over TLS
    Tls,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => f.write_str("SSH"),
            Self::Tls => f.write_str("TLS"),
        }
    }
}

// ============================================
// CallHomeSession
// ============================================

/// Shared handle to an inbound call-home session.
pub type SessionHandle = Arc<dyn CallHomeSession>;

/// An authenticated inbound connection from a call-home device.
pub trait CallHomeSession: Send + Sync + fmt::Debug {
    /// Logical node name assigned during authorization.
    fn logical_id(&self) -> &str;

    /// Remote socket address of the device.
    fn remote_address(&self) -> SocketAddr;

    /// Host key the device presented.
    fn remote_host_key(&self) -> &HostKey;

    /// Transport the device connected over.
    fn protocol(&self) -> TransportProtocol {
        TransportProtocol::Ssh
    }

    /// Closes the underlying connection. Idempotent.
    fn terminate(&self);
}

// ============================================
// ManagedSession
// ============================================

/// Shared handle to an established management session.
pub type ManagedSessionHandle = Arc<dyn ManagedSession>;

/// Management protocol session running on an activated channel.
pub trait ManagedSession: Send + Sync + fmt::Debug {
    /// Transport-assigned session number.
    fn session_id(&self) -> u64;
}

// ============================================
// SessionListener
// ============================================

/// Lifecycle callbacks of a managed session.
///
/// # Event Order
/// `on_session_up` first, any number of `on_message`, then exactly one of
/// `on_session_down` or `on_session_terminated`.
pub trait SessionListener: Send + Sync {
    /// Session established.
    fn on_session_up(&self, session: &ManagedSessionHandle);

    /// Session failed or the connection dropped.
    fn on_session_down(&self, session: &ManagedSessionHandle, error: &TransportError);

    /// Session closed in an orderly fashion.
    fn on_session_terminated(&self, session: &ManagedSessionHandle, reason: &str);

    /// Message received on the session.
    fn on_message(&self, session: &ManagedSessionHandle, message: &[u8]);
}

// ============================================
// ChannelActivator
// ============================================

/// Opens the management protocol over an inbound call-home connection.
#[async_trait]
pub trait ChannelActivator: Send + Sync {
    /// Activates the channel, delivering lifecycle events to `listener`.
    ///
    /// # Errors
    /// Returns `ActivationFailed` if the management session cannot be set up.
    async fn activate(&self, listener: Arc<dyn SessionListener>) -> Result<ManagedSessionHandle>;
}
