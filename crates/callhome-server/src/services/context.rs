// ============================================
// File: crates/callhome-server/src/services/context.rs
// ============================================
//! # Session Context
//!
//! ## Creation Reason
//! An admitted call-home connection has to carry everything the topology
//! layer needs later (the activator, the logical id) plus a way to
//! deregister itself exactly once, whichever lifecycle event ends it.
//!
//! ## Main Functionality
//! - `SessionContext`: per-admission state with a single-shot close callback
//! - `ClosingListener`: wraps the topology listener so terminal events close
//!   the context
//!
//! ## Terminal Event Ordering
//! ```text
//! on_session_terminated:  delegate ──► close     (close guaranteed, even on panic)
//! on_session_down:        close    ──► delegate
//! on_session_up / on_message: pass through
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The close callback runs at most once; it is taken out of its slot
//!   under the lock and invoked after the lock is released, so it may call
//!   back into the registry freely
//! - A context dropped without being closed never runs its callback
//! - `ClosingListener` holds the context weakly; activators may keep the
//!   listener long after the session ends
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use callhome_common::IdentityKey;
use callhome_core::HostKey;
use callhome_transport::{
    ChannelActivator, ManagedSessionHandle, SessionHandle, SessionListener, TransportError,
    TransportProtocol,
};

// ============================================
// Close Callback
// ============================================

/// Single-shot callback fired when a context closes.
pub type CloseCallback = Box<dyn FnOnce(&Arc<SessionContext>) + Send>;

// ============================================
// SessionContext
// ============================================

/// State of one admitted call-home connection.
pub struct SessionContext {
    logical_id: String,
    remote_address: IdentityKey,
    host_key: HostKey,
    protocol: TransportProtocol,
    session: SessionHandle,
    activator: Arc<dyn ChannelActivator>,
    on_close: Mutex<Option<CloseCallback>>,
    created_at: Instant,
}

impl SessionContext {
    /// Builds a context from an inbound session.
    pub(crate) fn new(
        session: SessionHandle,
        activator: Arc<dyn ChannelActivator>,
        on_close: CloseCallback,
    ) -> Self {
        Self {
            logical_id: session.logical_id().to_owned(),
            remote_address: IdentityKey::from(session.remote_address()),
            host_key: session.remote_host_key().clone(),
            protocol: session.protocol(),
            session,
            activator,
            on_close: Mutex::new(Some(on_close)),
            created_at: Instant::now(),
        }
    }

    /// Logical node id assigned at authorization.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Remote endpoint of the device.
    #[must_use]
    pub const fn remote_address(&self) -> IdentityKey {
        self.remote_address
    }

    /// Host key the device presented.
    #[must_use]
    pub const fn host_key(&self) -> &HostKey {
        &self.host_key
    }

    /// Transport the device used.
    #[must_use]
    pub const fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Underlying inbound session.
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Time since admission.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Returns `true` once the close callback has fired.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.on_close.lock().is_none()
    }

    /// Fires the close callback if it has not fired yet.
    ///
    /// Returns `true` if this call fired it.
    pub fn close(self: &Arc<Self>) -> bool {
        let callback = self.on_close.lock().take();
        match callback {
            Some(callback) => {
                debug!(
                    logical_id = %self.logical_id,
                    remote = %self.remote_address,
                    "Closing call-home session context"
                );
                callback(self);
                true
            }
            None => false,
        }
    }

    /// Terminates the underlying inbound session.
    pub fn terminate(&self) {
        self.session.terminate();
    }

    /// Activates the channel, wrapping `listener` so that terminal events
    /// close this context.
    ///
    /// # Errors
    /// Propagates the activator's failure.
    pub async fn activate(
        self: &Arc<Self>,
        listener: Arc<dyn SessionListener>,
    ) -> callhome_transport::Result<ManagedSessionHandle> {
        let wrapped: Arc<dyn SessionListener> = Arc::new(ClosingListener {
            delegate: listener,
            context: Arc::downgrade(self),
        });
        self.activator.activate(wrapped).await
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("logical_id", &self.logical_id)
            .field("remote_address", &self.remote_address)
            .field("host_key", &self.host_key)
            .field("protocol", &self.protocol)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================
// ClosingListener
// ============================================

/// Closes the context when dropped.
struct CloseGuard(Option<Arc<SessionContext>>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(context) = &self.0 {
            context.close();
        }
    }
}

/// Listener wrapper that ties terminal session events to context close.
pub struct ClosingListener {
    delegate: Arc<dyn SessionListener>,
    context: Weak<SessionContext>,
}

impl SessionListener for ClosingListener {
    fn on_session_up(&self, session: &ManagedSessionHandle) {
        self.delegate.on_session_up(session);
    }

    fn on_session_down(&self, session: &ManagedSessionHandle, error: &TransportError) {
        if let Some(context) = self.context.upgrade() {
            context.close();
        }
        self.delegate.on_session_down(session, error);
    }

    fn on_session_terminated(&self, session: &ManagedSessionHandle, reason: &str) {
        let _close = CloseGuard(self.context.upgrade());
        self.delegate.on_session_terminated(session, reason);
    }

    fn on_message(&self, session: &ManagedSessionHandle, message: &[u8]) {
        self.delegate.on_message(session, message);
    }
}

// ============================================
// Tests
// ============================================
