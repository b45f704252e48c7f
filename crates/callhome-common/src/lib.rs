// ============================================
// File: crates/callhome-common/src/lib.rs
// ============================================
//! # Call-Home Common - Shared Identifiers
//!
//! ## Creation Reason
//! Holds the identifier types every other call-home crate keys its maps on,
//! so the registry, the dispatcher and the status reporter agree on what an
//! address or a node name is.
//!
//! ## Main Functionality
//! - [`types`]: `IdentityKey` (remote address + port), `NodeId`
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              callhome-server                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   callhome-core        callhome-transport          │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             callhome-common  ◄── You are here     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

pub use error::{CommonError, Result};
pub use types::{IdentityKey, NodeId};
