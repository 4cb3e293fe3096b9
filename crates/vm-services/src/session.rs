//! # Session State
//!
//! Caches the current identity and follows the auth provider's change events.
//! Every event carries a sequence number; the highest one seen wins, so a
//! sign-in response that arrives after a newer notification is discarded.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use vm_core::error::{AppError, SignInError};
use vm_core::session::{Session, SessionChange, SessionContext, SessionEventKind};
use vm_core::traits::AuthProvider;

pub struct SessionState {
    auth: Arc<dyn AuthProvider>,
    tx: watch::Sender<SessionChange>,
}

impl SessionState {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Arc<Self> {
        let (tx, _) = watch::channel(SessionChange::initial());
        Arc::new(Self { auth, tx })
    }

    /// Resolves the startup session once. A notification that already
    /// arrived takes precedence over this answer.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> Result<Option<Session>, AppError> {
        match self.auth.get_session().await {
            Ok(change) => {
                self.apply(change);
                Ok(self.current())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to resolve the current session");
                Err(AppError::StoreError(e))
            }
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    pub fn snapshot(&self) -> SessionChange {
        self.tx.borrow().clone()
    }

    /// Snapshot to pass into repository calls.
    pub fn context(&self) -> SessionContext {
        SessionContext::from(self.current())
    }

    /// Stores `change` if it is newer than what is held. Returns whether it
    /// was applied.
    pub fn apply(&self, change: SessionChange) -> bool {
        self.tx.send_if_modified(|held| {
            if change.seq <= held.seq {
                tracing::debug!(seq = change.seq, held = held.seq, "discarding stale session change");
                return false;
            }
            *held = change;
            true
        })
    }

    /// Starts following provider notifications. Dropping or cancelling the
    /// returned handle stops the subscription.
    pub fn subscribe(self: &Arc<Self>) -> SessionSubscription {
        let mut events = self.auth.subscribe();
        let rx = self.tx.subscribe();
        let state = Arc::clone(self);

        let pump = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => {
                        tracing::info!(seq = change.seq, kind = ?change.kind, "auth state changed");
                        state.apply(change);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Only the newest event matters; keep reading.
                        tracing::warn!(missed, "session subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SessionSubscription { rx, pump }
    }

    /// Attempts authentication once. On success the resulting change goes
    /// through the same newest-wins rule as notifications.
    #[tracing::instrument(skip(self, secret))]
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, SignInError> {
        match self.auth.sign_in(identifier, secret).await {
            Ok(change) => {
                let session = change.session.clone();
                self.apply(change);
                tracing::info!(identifier, "signed in");
                session.ok_or_else(|| SignInError::Unavailable("provider returned no session".into()))
            }
            Err(e) => {
                tracing::warn!(identifier, error = %e, "sign in failed");
                Err(e)
            }
        }
    }

    /// Best effort: the local identity is cleared even if the provider call
    /// fails.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) {
        let ctx = self.context();
        match self.auth.sign_out(&ctx).await {
            Ok(change) => {
                self.apply(change);
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote sign out failed; clearing local session anyway");
            }
        }
        self.tx.send_if_modified(|held| {
            if held.session.is_none() {
                return false;
            }
            held.kind = SessionEventKind::SignedOut;
            held.session = None;
            true
        });
    }
}

/// Cancellable handle on the session change stream.
pub struct SessionSubscription {
    rx: watch::Receiver<SessionChange>,
    pump: JoinHandle<()>,
}

impl SessionSubscription {
    /// Waits for the next stored change. Intermediate changes that were
    /// superseded before this call woke up are skipped.
    pub async fn next(&mut self) -> Option<SessionChange> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn latest(&self) -> SessionChange {
        self.rx.borrow().clone()
    }

    pub fn cancel(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
