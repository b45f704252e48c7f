// ============================================
// File: crates/callhome-server/src/services/auth.rs
// ============================================
//! # Authorization
//!
//! ## Creation Reason
//! During the SSH handshake the transport asks whether the presented host
//! key may call home and, if so, with which identity and credentials the
//! gateway should log into it.
//!
//! ## Main Functionality
//! - `CallHomeAuthorization`: Accepted{logical id, username, passwords} or
//!   Rejected
//! - `AuthorizationProvider`: the handshake-time decision seam
//! - `AuthorizationDecider`: allowlist / global-policy decision
//! - `DuplicateRejectingDecider`: short-circuits keys that already hold a
//!   live session
//!
//! ## Decision Flow
//! ```text
//! host key ──► allowlist hit? ──yes──► id = device.unique_id
//!                   │ no                creds = device.credentials
//!                   ▼
//!          accept unknown keys? ──yes──► id = naming(remote), force-listed
//!                   │ no
//!                   ▼
//!          seen before? ──no──► record FAILEDNOTALLOWED ──► Rejected
//!                   │ yes
//!                   └──────────► log repeat ───────────► Rejected
//!
//! creds = creds or global creds ──none──► Rejected
//!       ──► decrypt passwords ──► Accepted
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Rejection is a value, never an error
//! - Status writes are fire-and-forget; they never change the outcome
//! - `Accepted` carries plaintext passwords: its Debug impl redacts them
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info};

use callhome_common::IdentityKey;
use callhome_core::{CredentialVault, HostKey};

use crate::management::models::Credentials;
use crate::management::reporter::StatusRecorder;
use crate::services::policy::PolicyWatch;
use crate::services::registry::SessionRegistry;

// ============================================
// CallHomeAuthorization
// ============================================

/// Outcome of a handshake-time authorization.
#[derive(Clone, PartialEq, Eq)]
pub enum CallHomeAuthorization {
    /// Device may proceed.
    Accepted {
        /// Logical node id
        logical_id: String,
        /// Login name
        username: String,
        /// Decrypted candidate passwords, in order
        passwords: Vec<String>,
    },
    /// Device must be disconnected.
    Rejected,
}

impl CallHomeAuthorization {
    /// Returns `true` for `Accepted`.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Logical id of an accepted device.
    #[must_use]
    pub fn logical_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { logical_id, .. } => Some(logical_id),
            Self::Rejected => None,
        }
    }
}

impl fmt::Debug for CallHomeAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted {
                logical_id,
                username,
                passwords,
            } => f
                .debug_struct("Accepted")
                .field("logical_id", logical_id)
                .field("username", username)
                .field("passwords", &format_args!("[{} redacted]", passwords.len()))
                .finish(),
            Self::Rejected => f.write_str("Rejected"),
        }
    }
}

// ============================================
// AuthorizationProvider
// ============================================

/// Handshake-time authorization seam.
pub trait AuthorizationProvider: Send + Sync {
    /// Decides whether `host_key` calling from `remote` may proceed.
    fn provide_auth(&self, remote: SocketAddr, host_key: &HostKey) -> CallHomeAuthorization;
}

// ============================================
// AuthorizationDecider
// ============================================

/// Allowlist / global-policy authorization.
pub struct AuthorizationDecider {
    policy: Arc<PolicyWatch>,
    vault: Arc<dyn CredentialVault>,
    status: StatusRecorder,
}

impl AuthorizationDecider {
    /// Creates a decider.
    pub fn new(
        policy: Arc<PolicyWatch>,
        vault: Arc<dyn CredentialVault>,
        status: StatusRecorder,
    ) -> Self {
        Self {
            policy,
            vault,
            status,
        }
    }

    fn open_credentials(
        &self,
        logical_id: &str,
        credentials: Credentials,
    ) -> CallHomeAuthorization {
        let passwords: Result<Vec<String>, _> = credentials
            .passwords
            .iter()
            .map(|sealed| self.vault.decrypt(sealed))
            .collect();

        match passwords {
            Ok(passwords) => CallHomeAuthorization::Accepted {
                logical_id: logical_id.to_owned(),
                username: credentials.username,
                passwords,
            },
            Err(e) => {
                error!(
                    logical_id = %logical_id,
                    error = %e,
                    "Unable to decrypt stored credentials, rejecting"
                );
                CallHomeAuthorization::Rejected
            }
        }
    }
}

impl AuthorizationProvider for AuthorizationDecider {
    fn provide_auth(&self, remote: SocketAddr, host_key: &HostKey) -> CallHomeAuthorization {
        let (logical_id, device_credentials) = match self.policy.configured_device(host_key) {
            Some(device) => {
                debug!(
                    unique_id = %device.unique_id,
                    remote = %remote,
                    "Host key matches allowed device"
                );
                (device.unique_id, device.credentials)
            }
            None => {
                let synthetic_id = self
                    .policy
                    .naming_strategy()
                    .node_name(&IdentityKey::from(remote));

                if self.policy.allows_unknown_keys() {
                    info!(
                        logical_id = %synthetic_id,
                        host_key = %host_key.fingerprint(),
                        "Accepting unknown host key per global policy"
                    );
                    self.status.as_force_listed_device(&synthetic_id, host_key);
                    (synthetic_id, None)
                } else {
                    match self.policy.operational_device(host_key) {
                        Some(known) => info!(
                            unique_id = %known.unique_id,
                            "Repeating rejection of unlisted device with id of {}",
                            known.unique_id
                        ),
                        None => {
                            info!(
                                logical_id = %synthetic_id,
                                host_key = %host_key.fingerprint(),
                                "Rejecting unlisted device"
                            );
                            self.status.as_unlisted_device(&synthetic_id, host_key);
                        }
                    }
                    return CallHomeAuthorization::Rejected;
                }
            }
        };

        let Some(credentials) = device_credentials.or_else(|| self.policy.global_credentials())
        else {
            info!("No credentials found for {}, rejecting.", logical_id);
            return CallHomeAuthorization::Rejected;
        };

        self.open_credentials(&logical_id, credentials)
    }
}

impl fmt::Debug for AuthorizationDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationDecider")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================
// DuplicateRejectingDecider
// ============================================

/// Rejects keys that already hold a live session before consulting the
/// wrapped provider.
pub struct DuplicateRejectingDecider<A> {
    registry: Arc<SessionRegistry>,
    delegate: A,
}

impl<A: AuthorizationProvider> DuplicateRejectingDecider<A> {
    /// Wraps `delegate`.
    pub const fn new(registry: Arc<SessionRegistry>, delegate: A) -> Self {
        Self { registry, delegate }
    }
}

impl<A: AuthorizationProvider> AuthorizationProvider for DuplicateRejectingDecider<A> {
    fn provide_auth(&self, remote: SocketAddr, host_key: &HostKey) -> CallHomeAuthorization {
        if let Some(existing) = self.registry.get_by_host_key(host_key) {
            info!(
                remote = %remote,
                existing_id = %existing.logical_id(),
                existing_remote = %existing.remote_address(),
                "Host key already has a live call-home session, rejecting"
            );
            return CallHomeAuthorization::Rejected;
        }
        self.delegate.provide_auth(remote, host_key)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use callhome_core::vault::{AeadVault, VaultKey};
    use callhome_transport::mock::{MockActivator, MockSession};
    use ed25519_dalek::SigningKey;
    use tokio::sync::mpsc;

    use crate::management::models::{DeviceRecord, GlobalPolicy, NamingStrategy};
    use crate::management::reporter::StatusEvent;
    use crate::services::policy::{ConfigEvent, DeviceChange};

    fn key(seed: u8) -> HostKey {
        HostKey::from_ed25519(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn vault() -> Arc<AeadVault> {
        Arc::new(AeadVault::new(VaultKey::from_bytes([9u8; 32])))
    }

    struct Fixture {
        policy: Arc<PolicyWatch>,
        vault: Arc<AeadVault>,
        events: mpsc::Receiver<StatusEvent>,
        decider: AuthorizationDecider,
    }

    fn fixture() -> Fixture {
        let policy = Arc::new(PolicyWatch::new());
        let vault = vault();
        let (tx, events) = mpsc::channel(16);
        let decider = AuthorizationDecider::new(
            Arc::clone(&policy),
            vault.clone(),
            StatusRecorder::new(tx),
        );
        Fixture {
            policy,
            vault,
            events,
            decider,
        }
    }

    fn set_global(policy: &PolicyWatch, global: GlobalPolicy) {
        policy.on_change(&ConfigEvent::Global(vec![Some(global)]));
    }

    fn drain(events: &mut mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_allowlisted_device_uses_own_credentials() {
        let mut fx = fixture();
        let sealed = fx.vault.encrypt("p1").unwrap();
        let device = DeviceRecord::new("router-1")
            .with_host_key(key(1).encode())
            .with_credentials(Credentials::new("netconf", vec![sealed]));
        fx.policy
            .on_change(&ConfigEvent::Devices(vec![DeviceChange::written(None, device)]));

        let auth = fx
            .decider
            .provide_auth("10.0.0.1:4334".parse().unwrap(), &key(1));
        assert_eq!(
            auth,
            CallHomeAuthorization::Accepted {
                logical_id: "router-1".into(),
                username: "netconf".into(),
                passwords: vec!["p1".into()],
            }
        );
        assert!(drain(&mut fx.events).is_empty());
    }

    #[test]
    fn test_allowlisted_device_falls_back_to_global_credentials() {
        let mut fx = fixture();
        let sealed = fx.vault.encrypt("p1").unwrap();
        set_global(
            &fx.policy,
            GlobalPolicy {
                credentials: Some(Credentials::new("u", vec![sealed])),
                ..GlobalPolicy::default()
            },
        );
        fx.policy.on_change(&ConfigEvent::Devices(vec![DeviceChange::written(
            None,
            DeviceRecord::new("router-2").with_host_key(key(2).encode()),
        )]));

        let auth = fx
            .decider
            .provide_auth("10.0.0.2:4334".parse().unwrap(), &key(2));
        assert_eq!(
            auth,
            CallHomeAuthorization::Accepted {
                logical_id: "router-2".into(),
                username: "u".into(),
                passwords: vec!["p1".into()],
            }
        );
        assert!(drain(&mut fx.events).is_empty());
    }

    #[test]
    fn test_unknown_key_named_by_address_when_allowed() {
        let mut fx = fixture();
        let sealed = fx.vault.encrypt("pw").unwrap();
        set_global(
            &fx.policy,
            GlobalPolicy {
                accept_all_unknown_keys: true,
                naming_strategy: Some(NamingStrategy::IpPort),
                credentials: Some(Credentials::new("admin", vec![sealed])),
            },
        );

        let auth = fx
            .decider
            .provide_auth("10.0.0.5:830".parse().unwrap(), &key(5));
        assert_eq!(auth.logical_id(), Some("10.0.0.5:830"));

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StatusEvent::ForceListed { unique_id, .. } if unique_id == "10.0.0.5:830"
        ));
    }

    #[test]
    fn test_unknown_key_rejected_and_recorded_once() {
        let mut fx = fixture();
        set_global(&fx.policy, GlobalPolicy::default());

        let auth = fx
            .decider
            .provide_auth("10.0.0.6:4334".parse().unwrap(), &key(6));
        assert_eq!(auth, CallHomeAuthorization::Rejected);

        let events = drain(&mut fx.events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StatusEvent::Unlisted { unique_id, .. } if unique_id == "10.0.0.6:4334"
        ));
    }

    #[test]
    fn test_repeat_rejection_is_not_recorded_again() {
        let mut fx = fixture();
        fx.policy
            .on_change(&ConfigEvent::OperationalDevices(vec![DeviceChange::written(
                None,
                DeviceRecord::new("10.0.0.6:4334").with_host_key(key(6).encode()),
            )]));

        let auth = fx
            .decider
            .provide_auth("10.0.0.6:4334".parse().unwrap(), &key(6));
        assert_eq!(auth, CallHomeAuthorization::Rejected);
        assert!(drain(&mut fx.events).is_empty());
    }

    #[test]
    fn test_no_credentials_rejects() {
        let fx = fixture();
        fx.policy.on_change(&ConfigEvent::Devices(vec![DeviceChange::written(
            None,
            DeviceRecord::new("router-3").with_host_key(key(3).encode()),
        )]));
        let auth = fx
            .decider
            .provide_auth("10.0.0.3:4334".parse().unwrap(), &key(3));
        assert_eq!(auth, CallHomeAuthorization::Rejected);
    }

    #[test]
    fn test_undecryptable_password_rejects() {
        let fx = fixture();
        fx.policy.on_change(&ConfigEvent::Devices(vec![DeviceChange::written(
            None,
            DeviceRecord::new("router-4")
                .with_host_key(key(4).encode())
                .with_credentials(Credentials::new("netconf", vec!["plaintext".into()])),
        )]));
        let auth = fx
            .decider
            .provide_auth("10.0.0.4:4334".parse().unwrap(), &key(4));
        assert_eq!(auth, CallHomeAuthorization::Rejected);
    }

    #[test]
    fn test_accepted_debug_redacts_passwords() {
        let auth = CallHomeAuthorization::Accepted {
            logical_id: "r".into(),
            username: "u".into(),
            passwords: vec!["hunter2".into()],
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    struct CountingProvider(AtomicUsize);

    impl AuthorizationProvider for CountingProvider {
        fn provide_auth(&self, _: SocketAddr, _: &HostKey) -> CallHomeAuthorization {
            self.0.fetch_add(1, Ordering::SeqCst);
            CallHomeAuthorization::Accepted {
                logical_id: "x".into(),
                username: "u".into(),
                passwords: vec![],
            }
        }
    }

    #[test]
    fn test_duplicate_rejecting_decider_short_circuits() {
        let registry = Arc::new(SessionRegistry::new());
        let decider =
            DuplicateRejectingDecider::new(Arc::clone(&registry), CountingProvider(AtomicUsize::new(0)));
        let remote: SocketAddr = "10.0.0.7:4334".parse().unwrap();

        assert!(decider.provide_auth(remote, &key(7)).is_accepted());
        assert_eq!(decider.delegate.0.load(Ordering::SeqCst), 1);

        let _ctx = registry
            .create_session(
                Arc::new(MockSession::new("x", remote, key(7))),
                Arc::new(MockActivator::new()),
                Box::new(|_| {}),
            )
            .unwrap();

        assert_eq!(
            decider.provide_auth(remote, &key(7)),
            CallHomeAuthorization::Rejected
        );
        assert_eq!(decider.delegate.0.load(Ordering::SeqCst), 1);
    }
}
