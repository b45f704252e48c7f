// ============================================
// File: crates/callhome-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! The registry indexes live sessions by the remote endpoint they came from,
//! and the topology layer later asks for a session by the host/port it has
//! configured for a node. Both sides need one value type with the same
//! equality and hashing.
//!
//! ## Main Functionality
//! - `IdentityKey`: remote IP address + port, usable as a map key
//! - `NodeId`: logical topology node name assigned at authorization
//!
//! ## ⚠️ Important Note for Next Developer
//! - `IdentityKey` equality is address + port only. Flow info and scope id of
//!   IPv6 socket addresses are deliberately dropped.
//! - Keep `NodeId` serialization a bare string, the status store keys on it.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

// ============================================
// IdentityKey
// ============================================

/// Remote endpoint identity of a call-home session.
///
/// Built either from the peer address of an inbound connection or from the
/// host/port pair configured on a topology node.
///
/// # Example
/// ```
/// use std::net::SocketAddr;
/// use callhome_common::types::IdentityKey;
///
/// let peer: SocketAddr = "192.168.1.10:4334".parse().unwrap();
/// let from_socket = IdentityKey::from(peer);
/// let from_node = IdentityKey::from_host_port("192.168.1.10", 4334).unwrap();
///
/// assert_eq!(from_socket, from_node);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    address: IpAddr,
    port: u16,
}

impl IdentityKey {
    /// Creates a new identity key.
    #[must_use]
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Creates an identity key from a textual host and a port.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `host` is not a literal IP address.
    pub fn from_host_port(host: &str, port: u16) -> Result<Self> {
        let address = IpAddr::from_str(host.trim())
            .map_err(|e| CommonError::invalid_input("host", e.to_string()))?;
        Ok(Self::new(address, port))
    }

    /// Returns the IP address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Converts back to a socket address.
    #[must_use]
    pub const fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for IdentityKey {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<&SocketAddr> for IdentityKey {
    fn from(addr: &SocketAddr) -> Self {
        Self::from(*addr)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_socket_addr(), f)
    }
}

// ============================================
// NodeId
// ============================================

/// Logical identifier of a topology node.
///
/// This is the name chosen during authorization: the allowlisted device's
/// unique id, or a name derived from the remote address for unknown keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    #[test]
    fn test_identity_key_from_socket_and_host_port_agree() {
        let peer: SocketAddr = "10.0.0.7:4335".parse().unwrap();
        let a = IdentityKey::from(peer);
        let b = IdentityKey::from_host_port("10.0.0.7", 4335).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.address(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(a.port(), 4335);
    }

    #[test]
    fn test_identity_key_port_distinguishes() {
        let a = IdentityKey::from_host_port("10.0.0.7", 4334).unwrap();
        let b = IdentityKey::from_host_port("10.0.0.7", 4335).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_key_ignores_ipv6_scope() {
        let scoped = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 830, 7, 3));
        let plain = IdentityKey::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 830);
        assert_eq!(IdentityKey::from(scoped), plain);
    }

    #[test]
    fn test_identity_key_rejects_hostname() {
        let err = IdentityKey::from_host_port("router.example.com", 22).unwrap_err();
        assert!(matches!(err, CommonError::InvalidInput { ref field, .. } if field == "host"));
    }

    #[test]
    fn test_identity_key_display() {
        let key = IdentityKey::from_host_port("192.168.1.10", 4334).unwrap();
        assert_eq!(key.to_string(), "192.168.1.10:4334");
    }

    #[test]
    fn test_node_id_serializes_as_string() {
        let id = NodeId::from("router-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"router-1\"");
        assert_eq!(id.as_str(), "router-1");
    }
}
