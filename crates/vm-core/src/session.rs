//! # Sessions
//!
//! Who is signed in, and the sequence-numbered change events auth providers
//! publish. `SessionHub` is the shared publisher plugins embed.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Login identifier, usually an e-mail address.
    pub identifier: String,
}

/// A signed-in session. The access token never appears in `Debug` output.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub identity: Identity,
    access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        identity: Identity,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identity,
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session snapshot threaded explicitly into every repository call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    session: Option<Session>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// The identity, or `Unauthenticated` for an anonymous context.
    pub fn require_identity(&self) -> Result<&Identity> {
        self.identity()
            .ok_or_else(|| AppError::Unauthenticated("no active session".to_string()))
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.session.as_ref().map(Session::access_token)
    }
}

impl From<Option<Session>> for SessionContext {
    fn from(session: Option<Session>) -> Self {
        Self { session }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One session notification. `seq` increases monotonically per provider;
/// consumers keep the highest one they have seen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    pub seq: u64,
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionChange {
    pub fn initial() -> Self {
        Self {
            seq: 0,
            kind: SessionEventKind::InitialSession,
            session: None,
        }
    }
}

/// Holds a provider's current session and fans changes out to subscribers.
pub struct SessionHub {
    state: Mutex<SessionChange>,
    tx: broadcast::Sender<SessionChange>,
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            state: Mutex::new(SessionChange::initial()),
            tx,
        }
    }

    /// Latest published change (seq 0 with no session before any event).
    pub fn snapshot(&self) -> SessionChange {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records a new current session under the next sequence number and
    /// notifies subscribers.
    pub fn publish(&self, kind: SessionEventKind, session: Option<Session>) -> SessionChange {
        let change = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = SessionChange {
                seq: state.seq + 1,
                kind,
                session,
            };
            state.clone()
        };
        // No receivers is fine: nobody is listening yet.
        let _ = self.tx.send(change.clone());
        tracing::debug!(seq = change.seq, kind = ?change.kind, "session change published");
        change
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.tx.subscribe()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            Identity {
                id: Uuid::now_v7(),
                identifier: "agent@example.com".into(),
            },
            "secret-token",
            None,
        )
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn anonymous_context_is_unauthenticated() {
        let ctx = SessionContext::anonymous();
        assert!(matches!(ctx.require_identity(), Err(AppError::Unauthenticated(_))));
        assert!(ctx.bearer_token().is_none());

        let ctx = SessionContext::authenticated(session());
        assert_eq!(ctx.bearer_token(), Some("secret-token"));
        assert!(ctx.require_identity().is_ok());
    }

    #[tokio::test]
    async fn hub_numbers_changes_and_broadcasts() {
        let hub = SessionHub::default();
        let mut rx = hub.subscribe();
        assert_eq!(hub.snapshot().seq, 0);

        let first = hub.publish(SessionEventKind::SignedIn, Some(session()));
        let second = hub.publish(SessionEventKind::SignedOut, None);
        assert_eq!((first.seq, second.seq), (1, 2));

        assert_eq!(rx.recv().await.unwrap().seq, 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, SessionEventKind::SignedOut);
        assert!(hub.snapshot().session.is_none());
    }
}
