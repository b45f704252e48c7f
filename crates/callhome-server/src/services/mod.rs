// ============================================
// File: crates/callhome-server/src/services/mod.rs
// ============================================
//! # Call-Home Services
//!
//! ## Creation Reason
//! Holds the admission and lifecycle control plane, separated from the
//! configuration, status store and transport concerns.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`policy`]: allowlist / global policy indices fed by config events
//! - [`auth`]: handshake-time authorization and duplicate fast-reject
//! - [`registry`]: dual-indexed session registry
//! - [`context`]: per-session state and listener wrapping
//! - [`dispatcher`]: channel-opened to topology bridge
//! - [`attempt`]: single-attempt reconnecting future
//! - [`topology`]: topology seam and node descriptors
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────────┐     ┌──────────────────────────┐ │
//! │  │ DuplicateRejecting   │────►│   SessionRegistry        │ │
//! │  │   └ Authorization    │     │  - by host key (unique)  │ │
//! │  │       Decider        │     │  - by address            │ │
//! │  └──────────┬───────────┘     └────────────▲─────────────┘ │
//! │             │                               │               │
//! │  ┌──────────▼───────────┐     ┌────────────┴─────────────┐ │
//! │  │    PolicyWatch       │     │    MountDispatcher       │ │
//! │  │  - allowlist         │     │  - admit + connect node  │ │
//! │  │  - global policy     │     │  - activate channel      │ │
//! │  └──────────────────────┘     └────────────┬─────────────┘ │
//! │                                             ▼               │
//! │                                     TopologyService         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every entry point here may be called from any transport thread
//! - Nothing in this layer blocks on I/O; status writes go through the
//!   reporter channel
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod attempt;
pub mod auth;
pub mod context;
pub mod dispatcher;
pub mod policy;
pub mod registry;
pub mod topology;

// Re-export primary types
pub use attempt::{AttemptError, ReconnectingFuture, SingleAttemptFuture};
pub use auth::{
    AuthorizationDecider, AuthorizationProvider, CallHomeAuthorization, DuplicateRejectingDecider,
};
pub use context::{CloseCallback, SessionContext};
pub use dispatcher::MountDispatcher;
pub use policy::{ConfigEvent, DeviceChange, PolicyWatch};
pub use registry::SessionRegistry;
pub use topology::{
    ConnectionStatus, InMemoryTopology, NodeDescriptor, TopologyEvent, TopologyService,
};
