// ============================================
// File: crates/callhome-transport/src/mock.rs
// ============================================
//! # Mock Transport Implementation
//!
//! ## Creation Reason
//! Lets the control plane be tested without an SSH/TLS listener: sessions
//! are plain structs, activation is immediate (or never completes), and
//! lifecycle callbacks are fired by hand.
//!
//! ## Main Functionality
//! - `MockSession`: `CallHomeSession` with an observable terminate flag
//! - `MockActivator`: `ChannelActivator` that captures the listener
//! - `RecordingListener`: `SessionListener` that records every callback
//!
//! ## Usage in Tests
//! ```
//! use std::sync::Arc;
//! use callhome_transport::mock::{MockActivator, RecordingListener, ListenerEvent};
//! use callhome_transport::traits::ChannelActivator;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let activator = MockActivator::new();
//! let listener = Arc::new(RecordingListener::new());
//!
//! activator.activate(listener.clone()).await.unwrap();
//! activator.fire_up();
//!
//! assert!(matches!(listener.events()[0], ListenerEvent::Up(_)));
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - `fire_*` helpers are no-ops until `activate` has been called
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use callhome_core::hostkey::HostKey;

use crate::error::{Result, TransportError};
use crate::traits::{
    CallHomeSession, ChannelActivator, ManagedSession, ManagedSessionHandle, SessionListener,
    TransportProtocol,
};

// ============================================
// MockSession
// ============================================

/// In-memory call-home session.
#[derive(Debug)]
pub struct MockSession {
    logical_id: String,
    remote: SocketAddr,
    host_key: HostKey,
    protocol: TransportProtocol,
    terminated: AtomicBool,
    terminate_calls: AtomicUsize,
}

impl MockSession {
    /// Creates a new SSH session.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, remote: SocketAddr, host_key: HostKey) -> Self {
        Self {
            logical_id: logical_id.into(),
            remote,
            host_key,
            protocol: TransportProtocol::Ssh,
            terminated: AtomicBool::new(false),
            terminate_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the transport protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: TransportProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Returns `true` once `terminate` has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Number of `terminate` calls.
    #[must_use]
    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }
}

impl CallHomeSession for MockSession {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    fn remote_host_key(&self) -> &HostKey {
        &self.host_key
    }

    fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    fn terminate(&self) {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
    }
}

// ============================================
// MockManagedSession
// ============================================

/// Managed session handed out by `MockActivator`.
#[derive(Debug, Default)]
pub struct MockManagedSession {
    id: u64,
}

impl MockManagedSession {
    /// Creates a managed session with the given id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }
}

impl ManagedSession for MockManagedSession {
    fn session_id(&self) -> u64 {
        self.id
    }
}

// ============================================
// MockActivator
// ============================================

enum ActivationMode {
    Succeed,
    Fail(String),
    Hang,
}

/// Channel activator that captures the listener it is given.
pub struct MockActivator {
    mode: ActivationMode,
    listener: Mutex<Option<Arc<dyn SessionListener>>>,
    session: Mutex<Option<ManagedSessionHandle>>,
    activations: AtomicUsize,
    next_id: AtomicU64,
}

impl MockActivator {
    fn with_mode(mode: ActivationMode) -> Self {
        Self {
            mode,
            listener: Mutex::new(None),
            session: Mutex::new(None),
            activations: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates an activator whose activations succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(ActivationMode::Succeed)
    }

    /// Creates an activator whose activations fail with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_mode(ActivationMode::Fail(reason.into()))
    }

    /// Creates an activator whose activations never complete.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_mode(ActivationMode::Hang)
    }

    /// Number of `activate` calls.
    #[must_use]
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Listener passed to the most recent `activate`.
    #[must_use]
    pub fn listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.listener.lock().clone()
    }

    fn current(&self) -> Option<(Arc<dyn SessionListener>, ManagedSessionHandle)> {
        let listener = self.listener.lock().clone()?;
        let session = self.session.lock().clone()?;
        Some((listener, session))
    }

    /// Delivers `on_session_up` to the captured listener.
    pub fn fire_up(&self) {
        if let Some((listener, session)) = self.current() {
            listener.on_session_up(&session);
        }
    }

    /// Delivers `on_message` to the captured listener.
    pub fn fire_message(&self, message: &[u8]) {
        if let Some((listener, session)) = self.current() {
            listener.on_message(&session, message);
        }
    }

    /// Delivers `on_session_down` to the captured listener.
    pub fn fire_down(&self, reason: &str) {
        if let Some((listener, session)) = self.current() {
            listener.on_session_down(&session, &TransportError::session_down(reason));
        }
    }

    /// Delivers `on_session_terminated` to the captured listener.
    pub fn fire_terminated(&self, reason: &str) {
        if let Some((listener, session)) = self.current() {
            listener.on_session_terminated(&session, reason);
        }
    }
}

impl Default for MockActivator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockActivator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockActivator")
            .field("activations", &self.activation_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelActivator for MockActivator {
    async fn activate(&self, listener: Arc<dyn SessionListener>) -> Result<ManagedSessionHandle> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            ActivationMode::Fail(reason) => Err(TransportError::activation_failed(reason.clone())),
            ActivationMode::Hang => {
                *self.listener.lock() = Some(listener);
                std::future::pending().await
            }
            ActivationMode::Succeed => {
                let session: ManagedSessionHandle = Arc::new(MockManagedSession::new(
                    self.next_id.fetch_add(1, Ordering::SeqCst),
                ));
                *self.listener.lock() = Some(listener);
                *self.session.lock() = Some(Arc::clone(&session));
                Ok(session)
            }
        }
    }
}

// ============================================
// RecordingListener
// ============================================

/// One recorded listener callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// `on_session_up` with the session id
    Up(u64),
    /// `on_session_down` with the session id and error text
    Down(u64, String),
    /// `on_session_terminated` with the session id and reason
    Terminated(u64, String),
    /// `on_message` with the session id and payload
    Message(u64, Vec<u8>),
}

type Probe = Box<dyn Fn(&ListenerEvent) + Send + Sync>;

/// Listener that records every callback, optionally running a probe first.
///
/// The probe runs inside the callback, so tests can observe shared state
/// at the exact moment the event is delivered.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    probe: Option<Probe>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder that calls `probe` on every event.
    #[must_use]
    pub fn with_probe(probe: impl Fn(&ListenerEvent) + Send + Sync + 'static) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            probe: Some(Box::new(probe)),
        }
    }

    /// Snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: ListenerEvent) {
        if let Some(probe) = &self.probe {
            probe(&event);
        }
        self.events.lock().push(event);
    }
}

impl SessionListener for RecordingListener {
    fn on_session_up(&self, session: &ManagedSessionHandle) {
        self.record(ListenerEvent::Up(session.session_id()));
    }

    fn on_session_down(&self, session: &ManagedSessionHandle, error: &TransportError) {
        self.record(ListenerEvent::Down(session.session_id(), error.to_string()));
    }

    fn on_session_terminated(&self, session: &ManagedSessionHandle, reason: &str) {
        self.record(ListenerEvent::Terminated(session.session_id(), reason.to_owned()));
    }

    fn on_message(&self, session: &ManagedSessionHandle, message: &[u8]) {
        self.record(ListenerEvent::Message(session.session_id(), message.to_vec()));
    }
}

// ============================================
// Tests
// ============================================
