// ============================================
// File: crates/callhome-server/src/services/attempt.rs
// ============================================
//! # Single-Attempt Connection Future
//!
//! ## Creation Reason
//! The topology layer expects a cancellable "reconnecting" future from a
//! connect call. A call-home device cannot be redialed, so the future wraps
//! exactly one activation attempt and never retries.
//!
//! ## Main Functionality
//! - `SingleAttemptFuture::spawn`: runs one attempt on the runtime
//! - `cancel` / `is_done` / `wait`
//!
//! ## State Machine
//! ```text
//!            ┌──► Succeeded(T)
//! Pending ───┼──► Failed(reason)
//!            └──► Cancelled      (cancel() while pending)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The first transition out of `Pending` wins; later ones are discarded
//! - `spawn` must be called inside a tokio runtime
//! - A panicking attempt settles as `Failed`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinError};

// ============================================
// AttemptError
// ============================================

/// Failure outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The attempt completed with an error.
    #[error("Connection attempt failed: {reason}")]
    Failed {
        /// Failure description
        reason: String,
    },

    /// The attempt was cancelled before completing.
    #[error("Connection attempt cancelled")]
    Cancelled,
}

// ============================================
// ReconnectingFuture
// ============================================

/// Cancellable connection future handed to the topology layer.
#[async_trait]
pub trait ReconnectingFuture<T>: Send + Sync {
    /// Cancels a pending attempt. Returns `true` if this call cancelled it.
    fn cancel(&self) -> bool;

    /// Returns `true` once the attempt has settled.
    fn is_done(&self) -> bool;

    /// Waits for the outcome.
    async fn wait(&self) -> Result<T, AttemptError>;
}

// ============================================
// SingleAttemptFuture
// ============================================

#[derive(Debug)]
enum AttemptState<T> {
    Pending,
    Succeeded(T),
    Failed(String),
    Cancelled,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<AttemptState<T>>,
    settled: Notify,
}

impl<T> Shared<T> {
    /// Moves out of `Pending`. Returns `false` if already settled.
    fn settle(&self, outcome: AttemptState<T>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, AttemptState::Pending) {
            return false;
        }
        *state = outcome;
        drop(state);
        self.settled.notify_waiters();
        true
    }
}

/// One activation attempt exposed as a reconnecting future.
#[derive(Debug)]
pub struct SingleAttemptFuture<T> {
    shared: Arc<Shared<T>>,
    attempt: AbortHandle,
}

impl<T: Clone + Send + 'static> SingleAttemptFuture<T> {
    /// Spawns `attempt` on the current runtime.
    pub fn spawn<F, E>(attempt: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(AttemptState::Pending),
            settled: Notify::new(),
        });

        let inner = tokio::spawn(async move { attempt.await.map_err(|e| e.to_string()) });
        let abort = inner.abort_handle();

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let outcome = match inner.await {
                Ok(Ok(value)) => AttemptState::Succeeded(value),
                Ok(Err(reason)) => AttemptState::Failed(reason),
                Err(e) if e.is_panic() => AttemptState::Failed(panic_reason(e)),
                Err(_) => AttemptState::Cancelled,
            };
            task_shared.settle(outcome);
        });

        Self {
            shared,
            attempt: abort,
        }
    }

    /// Cancels the attempt if it is still pending.
    ///
    /// Returns `false` if the attempt already completed.
    pub fn cancel(&self) -> bool {
        if self.attempt.is_finished() {
            return false;
        }
        let cancelled = self.shared.settle(AttemptState::Cancelled);
        self.attempt.abort();
        cancelled
    }

    /// Returns `true` once the attempt has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(*self.shared.state.lock(), AttemptState::Pending)
    }

    /// Returns `true` if the attempt was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.shared.state.lock(), AttemptState::Cancelled)
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    /// `Failed` if the attempt failed, `Cancelled` if it was cancelled.
    pub async fn wait(&self) -> Result<T, AttemptError> {
        loop {
            let notified = self.shared.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn outcome(&self) -> Option<Result<T, AttemptError>> {
        match &*self.shared.state.lock() {
            AttemptState::Pending => None,
            AttemptState::Succeeded(value) => Some(Ok(value.clone())),
            AttemptState::Failed(reason) => Some(Err(AttemptError::Failed {
                reason: reason.clone(),
            })),
            AttemptState::Cancelled => Some(Err(AttemptError::Cancelled)),
        }
    }
}

fn panic_reason(err: JoinError) -> String {
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("attempt panicked: {message}")
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ReconnectingFuture<T> for SingleAttemptFuture<T> {
    fn cancel(&self) -> bool {
        Self::cancel(self)
    }

    fn is_done(&self) -> bool {
        Self::is_done(self)
    }

    async fn wait(&self) -> Result<T, AttemptError> {
        Self::wait(self).await
    }
}

// ============================================
// Tests
// ============================================
