// ============================================
// File: crates/callhome-server/src/services/registry.rs
// ============================================
//! # Session Registry
//!
//! ## Creation Reason
//! A device must never hold two management sessions at once. The registry
//! is the single admission point: at most one live context per host key,
//! findable by remote address when the topology layer comes back to
//! activate the channel.
//!
//! ## Main Functionality
//! - `create_session`: atomic test-and-insert by host key, then index by
//!   address
//! - `on_closed`: unconditional address removal, compare-and-remove by key
//! - `get_by_address` / `get_by_host_key`: non-blocking lookups
//!
//! ## Index Layout
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ by_host_key: HostKey     → Arc<SessionContext> │  uniqueness
//! │ by_address:  IdentityKey → Arc<SessionContext> │  activation lookup
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The address entry is written while the host-key shard is still held,
//!   so a concurrent lookup never sees a key entry without its address entry
//! - Never remove by host key without the `Arc::ptr_eq` guard; a newer
//!   session for the same device may already own the slot
//! - `by_address` is last-writer-wins; overwrites by a different key are
//!   logged, not refused
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use callhome_common::IdentityKey;
use callhome_core::HostKey;
use callhome_transport::{ChannelActivator, SessionHandle};

use super::context::{CloseCallback, SessionContext};

// ============================================
// SessionRegistry
// ============================================

/// Registry of admitted call-home sessions.
///
/// # Thread Safety
/// Both indices are `DashMap`s; all mutation goes through `create_session`
/// and `on_closed`.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use callhome_core::HostKey;
/// use callhome_server::services::SessionRegistry;
/// use callhome_transport::mock::{MockActivator, MockSession};
/// use ed25519_dalek::SigningKey;
///
/// let registry = Arc::new(SessionRegistry::new());
/// let key = HostKey::from_ed25519(&SigningKey::from_bytes(&[1u8; 32]).verifying_key());
/// let session = Arc::new(MockSession::new("r1", "10.0.0.1:4334".parse().unwrap(), key.clone()));
///
/// let ctx = registry
///     .create_session(session, Arc::new(MockActivator::new()), Box::new(|_| {}))
///     .unwrap();
/// assert!(registry.get_by_host_key(&key).is_some());
///
/// ctx.close();
/// assert!(registry.get_by_host_key(&key).is_none());
/// ```
#[derive(Default)]
pub struct SessionRegistry {
    by_address: DashMap<IdentityKey, Arc<SessionContext>>,
    by_host_key: DashMap<HostKey, Arc<SessionContext>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `session` unless its host key already has a live context.
    ///
    /// On success the returned context's close callback first removes it
    /// from this registry, then runs `on_close`. On denial the incoming
    /// session is terminated and `None` is returned; `on_close` never runs.
    #[must_use]
    pub fn create_session(
        self: &Arc<Self>,
        session: SessionHandle,
        activator: Arc<dyn ChannelActivator>,
        on_close: CloseCallback,
    ) -> Option<Arc<SessionContext>> {
        let registry = Arc::downgrade(self);
        let cleanup: CloseCallback = Box::new(move |ctx| {
            if let Some(registry) = registry.upgrade() {
                registry.on_closed(ctx);
            }
            on_close(ctx);
        });
        let context = Arc::new(SessionContext::new(session, activator, cleanup));

        let admitted = match self.by_host_key.entry(context.host_key().clone()) {
            Entry::Occupied(existing) => {
                warn!(
                    host_key = %context.host_key().fingerprint(),
                    remote = %context.remote_address(),
                    existing_remote = %existing.get().remote_address(),
                    existing_id = %existing.get().logical_id(),
                    "Duplicate call-home session for host key, rejecting incoming"
                );
                false
            }
            Entry::Vacant(slot) => {
                let _key_guard = slot.insert(Arc::clone(&context));
                if let Some(previous) = self
                    .by_address
                    .insert(context.remote_address(), Arc::clone(&context))
                {
                    if previous.host_key() != context.host_key() {
                        warn!(
                            remote = %context.remote_address(),
                            previous_id = %previous.logical_id(),
                            logical_id = %context.logical_id(),
                            "Address entry overwritten by a session with a different host key"
                        );
                    }
                }
                true
            }
        };

        if admitted {
            info!(
                logical_id = %context.logical_id(),
                remote = %context.remote_address(),
                host_key = %context.host_key().fingerprint(),
                "Call-home session admitted"
            );
            Some(context)
        } else {
            context.terminate();
            None
        }
    }

    /// Removes `context` from both indices.
    ///
    /// Invoked by the context's close callback. The address entry is removed
    /// unconditionally; the host-key entry only while it still refers to
    /// this exact context.
    pub fn on_closed(&self, context: &Arc<SessionContext>) {
        self.by_address.remove(&context.remote_address());
        let removed = self
            .by_host_key
            .remove_if(context.host_key(), |_, current| Arc::ptr_eq(current, context))
            .is_some();

        debug!(
            logical_id = %context.logical_id(),
            remote = %context.remote_address(),
            host_key_released = removed,
            "Call-home session deregistered"
        );
    }

    /// Looks up the context admitted from `address`.
    #[must_use]
    pub fn get_by_address(&self, address: &IdentityKey) -> Option<Arc<SessionContext>> {
        self.by_address.get(address).map(|r| Arc::clone(r.value()))
    }

    /// Looks up the context holding `host_key`.
    #[must_use]
    pub fn get_by_host_key(&self, host_key: &HostKey) -> Option<Arc<SessionContext>> {
        self.by_host_key.get(host_key).map(|r| Arc::clone(r.value()))
    }

    /// Number of live contexts (by host key).
    #[must_use]
    pub fn count(&self) -> usize {
        self.by_host_key.len()
    }

    /// Returns `true` if no context is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_host_key.is_empty()
    }

    /// Snapshot of every live context.
    #[must_use]
    pub fn contexts(&self) -> Vec<Arc<SessionContext>> {
        self.by_host_key
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("by_host_key", &self.by_host_key.len())
            .field("by_address", &self.by_address.len())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use callhome_transport::mock::{MockActivator, MockSession};
    use ed25519_dalek::SigningKey;

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn mock(id: &str, addr: &str, seed: u8) -> Arc<MockSession> {
        Arc::new(MockSession::new(id, addr.parse().unwrap(), key(seed)))
    }

    fn admit(
        registry: &Arc<SessionRegistry>,
        session: &Arc<MockSession>,
    ) -> Option<Arc<SessionContext>> {
        registry.create_session(
            session.clone(),
            Arc::new(MockActivator::new()),
            Box::new(|_| {}),
        )
    }

    fn addr(text: &str) -> IdentityKey {
        IdentityKey::from(text.parse::<std::net::SocketAddr>().unwrap())
    }

    #[test]
    fn test_admission_indexes_both_ways() {
        let registry = Arc::new(SessionRegistry::new());
        let session = mock("r1", "10.0.0.1:4334", 1);
        let ctx = admit(&registry, &session).unwrap();

        let by_addr = registry.get_by_address(&addr("10.0.0.1:4334")).unwrap();
        let by_key = registry.get_by_host_key(&key(1)).unwrap();
        assert!(Arc::ptr_eq(&by_addr, &ctx));
        assert!(Arc::ptr_eq(&by_key, &ctx));
        assert!(!session.is_terminated());
    }

    #[test]
    fn test_duplicate_key_terminates_incoming_only() {
        let registry = Arc::new(SessionRegistry::new());
        let first = mock("r1", "10.0.0.1:4334", 1);
        let second = mock("r1", "10.0.0.2:4334", 1);
        let ctx = admit(&registry, &first).unwrap();

        assert!(admit(&registry, &second).is_none());
        assert!(second.is_terminated());
        assert!(!first.is_terminated());
        assert!(registry.get_by_address(&addr("10.0.0.2:4334")).is_none());
        assert!(Arc::ptr_eq(&registry.get_by_host_key(&key(1)).unwrap(), &ctx));
    }

    #[test]
    fn test_concurrent_admission_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let sessions: Vec<_> = (0..16)
            .map(|i| mock("r1", &format!("10.0.1.{}:4334", i + 1), 7))
            .collect();

        let handles: Vec<_> = sessions
            .iter()
            .cloned()
            .map(|session| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || admit(&registry, &session).is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(registry.count(), 1);
        let terminated = sessions.iter().filter(|s| s.is_terminated()).count();
        assert_eq!(terminated, 15);
    }

    #[test]
    fn test_close_removes_both_entries_and_runs_callback() {
        let registry = Arc::new(SessionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let ctx = registry
            .create_session(
                mock("r1", "10.0.0.1:4334", 1),
                Arc::new(MockActivator::new()),
                Box::new(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(ctx.close());
        assert!(!ctx.close());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.get_by_address(&addr("10.0.0.1:4334")).is_none());
        assert!(registry.get_by_host_key(&key(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_close_does_not_evict_successor() {
        let registry = Arc::new(SessionRegistry::new());
        let old = admit(&registry, &mock("r1", "10.0.0.1:4334", 1)).unwrap();

        // Release the key slot but keep `old` around, as a late close would.
        registry.on_closed(&old);
        let newer = admit(&registry, &mock("r1", "10.0.0.3:4334", 1)).unwrap();

        registry.on_closed(&old);
        assert!(Arc::ptr_eq(&registry.get_by_host_key(&key(1)).unwrap(), &newer));
        assert!(registry.get_by_address(&addr("10.0.0.3:4334")).is_some());
    }

    #[test]
    fn test_address_is_last_writer_wins() {
        let registry = Arc::new(SessionRegistry::new());
        let a = admit(&registry, &mock("a", "10.0.0.1:4334", 1)).unwrap();
        let b = admit(&registry, &mock("b", "10.0.0.1:4334", 2)).unwrap();

        assert!(Arc::ptr_eq(&registry.get_by_address(&addr("10.0.0.1:4334")).unwrap(), &b));
        assert_eq!(registry.count(), 2);

        // Unconditional address removal: closing `a` drops the shared slot.
        a.close();
        assert!(registry.get_by_address(&addr("10.0.0.1:4334")).is_none());
        assert!(registry.get_by_host_key(&key(2)).is_some());
    }
}
