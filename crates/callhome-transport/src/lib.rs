// ============================================
// File: crates/callhome-transport/src/lib.rs
// ============================================
//! # Call-Home Transport - Session Seams
//!
//! ## Creation Reason
//! The SSH/TLS listener, the handshake and the management protocol are owned
//! by the transport layer. The control plane only needs a narrow view of
//! them: who connected, with which key, how to activate the channel and how
//! to hear about the session's lifecycle. This crate defines that view.
//!
//! ## Main Functionality
//! - [`traits`]: `CallHomeSession`, `ChannelActivator`, `SessionListener`,
//!   `ManagedSession`, `TransportProtocol`
//! - [`mock`]: in-memory implementations for tests
//! - [`error`]: `TransportError`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              callhome-server                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   callhome-core        callhome-transport ◄── here │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             callhome-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session Lifecycle
//! ```text
//!  device dials in ──► handshake ──► CallHomeSession
//!                                          │
//!                           ChannelActivator::activate(listener)
//!                                          │
//!                                          ▼
//!                                   ManagedSession
//!                 on_session_up / on_message / on_session_down
//!                              / on_session_terminated
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Listener callbacks may arrive on any thread; implementations must be
//!   `Send + Sync` and must not block
//! - `CallHomeSession::terminate` must be idempotent
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod mock;
pub mod traits;

pub use error::{Result, TransportError};
pub use traits::{
    CallHomeSession, ChannelActivator, ManagedSession, ManagedSessionHandle, SessionHandle,
    SessionListener, TransportProtocol,
};
