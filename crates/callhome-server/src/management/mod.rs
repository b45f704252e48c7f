// ============================================
// File: crates/callhome-server/src/management/mod.rs
// ============================================
//! # Device Management Module
//!
//! ## Creation Reason
//! Keeps operators informed about call-home devices: which are connected,
//! which were rejected and why.
//!
//! ## Main Functionality
//! - `DeviceRecord` / `GlobalPolicy`: records shared with the config and
//!   status stores
//! - `DeviceStatusStore`: operational status store seam
//! - `StatusReporter`: background writer fed by `StatusRecorder`
//!
//! ## Architecture
//! ```text
//! AuthorizationDecider ──┐
//!                        ├──► StatusRecorder ──mpsc──► StatusReporter
//! topology events ───────┘                                  │
//!                                                           ▼
//!                                                  DeviceStatusStore
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial management module

pub mod models;
pub mod reporter;
pub mod store;

pub use models::{Credentials, DeviceRecord, DeviceStatus, GlobalPolicy, NamingStrategy};
pub use reporter::{StatusEvent, StatusRecorder, StatusReporter};
pub use store::{DeviceStatusStore, InMemoryStatusStore};
