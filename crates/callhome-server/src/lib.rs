// ============================================
// File: crates/callhome-server/src/lib.rs
// ============================================
//! # Call-Home Server Library
//!
//! ## Creation Reason
//! Provides the admission and lifecycle control plane for call-home
//! devices: devices dial in, present a host key, and must be authorized,
//! de-duplicated, named and exposed as topology nodes before any management
//! traffic flows.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Component assembly and lifecycle
//! - [`services`]: Admission control plane
//!   - [`services::auth`]: Authorization decisions
//!   - [`services::registry`]: Session registry
//!   - [`services::dispatcher`]: Topology bridge
//!   - [`services::policy`]: Allowlist and global policy indices
//! - [`management`]: Device records and status reporting
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Call-Home Server                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐  │
//! │  │   Config    │────►│ PolicyWatch │◄────│ Authorization   │  │
//! │  │  (TOML)     │     │             │     │   Decider       │  │
//! │  └─────────────┘     └─────────────┘     └────────┬────────┘  │
//! │                                                    │           │
//! │  ┌─────────────┐     ┌─────────────┐     ┌────────▼────────┐  │
//! │  │  Topology   │◄────│   Mount     │────►│    Session      │  │
//! │  │  Service    │     │ Dispatcher  │     │    Registry     │  │
//! │  └─────────────┘     └─────────────┘     └─────────────────┘  │
//! │                                                                 │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │      StatusReporter ──► DeviceStatusStore                │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                     Transport Layer (external)                  │
//! │        SSH / TLS listener, handshake, management protocol       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Admission Flow
//! ```text
//! handshake → provide_auth → channel opened → create_session
//!           → connect_node → activate_channel → traffic
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Rejection is always a value (`CallHomeAuthorization::Rejected`,
//!   `None` from admission), never an error
//! - Collaborator failures are logged and swallowed; they never roll back
//!   an admitted session
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod services;

// Re-export primary types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::CallHomeServer;
