//! # vm-auth-simple
//!
//! Argon2-based implementation of `AuthProvider` for local use.
//! Accounts live in memory (seeded from configuration as PHC hashes); the
//! current session is published through a `SessionHub`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;
use vm_core::error::SignInError;
use vm_core::session::{Identity, Session, SessionChange, SessionContext, SessionEventKind, SessionHub};
use vm_core::traits::AuthProvider;

/// Account ids are derived from the identifier, so they survive restarts and
/// rows written in an earlier run stay visible to their owner.
const ACCOUNT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a0e_93d4_4b8a_a5e1_0c7d_52b9_e318);

struct Account {
    id: Uuid,
    identifier: String,
    password_hash: String,
}

pub struct SimpleAuthProvider {
    accounts: DashMap<String, Account>,
    hub: SessionHub,
    session_ttl: Duration,
}

impl SimpleAuthProvider {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            hub: SessionHub::default(),
            session_ttl: Duration::hours(1),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Adds an account from an existing Argon2 PHC string.
    pub fn add_account(&self, identifier: &str, password_hash: &str) -> anyhow::Result<Uuid> {
        PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("invalid password hash for {identifier}: {e}"))?;

        let identifier = normalize(identifier);
        let id = Uuid::new_v5(&ACCOUNT_NAMESPACE, identifier.as_bytes());
        self.accounts.insert(
            identifier.clone(),
            Account {
                id,
                identifier,
                password_hash: password_hash.to_string(),
            },
        );
        Ok(id)
    }

    /// Hashes `password` and adds the account.
    pub fn register(&self, identifier: &str, password: &str) -> anyhow::Result<Uuid> {
        let hash = hash_password(password)?;
        self.add_account(identifier, &hash)
    }
}

impl Default for SimpleAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Produces an Argon2 PHC string, e.g. for seeding configuration.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?
        .to_string())
}

/// Verifies if a provided password matches a stored Argon2 hash.
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// 32 random bytes, URL-safe base64.
fn generate_access_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).map_err(|e| anyhow::anyhow!("entropy unavailable: {e}"))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    async fn get_session(&self) -> anyhow::Result<SessionChange> {
        let snapshot = self.hub.snapshot();
        match &snapshot.session {
            Some(session) if session.is_expired(Utc::now()) => {
                tracing::info!(identifier = %session.identity.identifier, "session expired");
                Ok(self.hub.publish(SessionEventKind::SignedOut, None))
            }
            _ => Ok(snapshot),
        }
    }

    #[tracing::instrument(skip(self, secret))]
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<SessionChange, SignInError> {
        let identity = {
            let account = self
                .accounts
                .get(&normalize(identifier))
                .ok_or(SignInError::InvalidCredentials)?;
            if !verify_password(secret, &account.password_hash) {
                return Err(SignInError::InvalidCredentials);
            }
            Identity {
                id: account.id,
                identifier: account.identifier.clone(),
            }
        };

        let token = generate_access_token().map_err(|e| SignInError::Unavailable(e.to_string()))?;
        let session = Session::new(identity, token, Some(Utc::now() + self.session_ttl));
        Ok(self.hub.publish(SessionEventKind::SignedIn, Some(session)))
    }

    async fn sign_out(&self, ctx: &SessionContext) -> anyhow::Result<SessionChange> {
        if let Some(identity) = ctx.identity() {
            tracing::info!(identifier = %identity.identifier, "signing out");
        }
        Ok(self.hub.publish(SessionEventKind::SignedOut, None))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_with_valid_credentials_publishes_session() {
        let auth = SimpleAuthProvider::new();
        let id = auth.register("Agent@Villa.test", "s3cret").unwrap();
        let mut events = auth.subscribe();

        let change = auth.sign_in("agent@villa.test ", "s3cret").await.unwrap();
        assert_eq!(change.kind, SessionEventKind::SignedIn);
        let session = change.session.clone().unwrap();
        assert_eq!(session.identity.id, id);
        assert_eq!(session.identity.identifier, "agent@villa.test");
        assert!(!session.access_token().is_empty());

        assert_eq!(events.recv().await.unwrap(), change);
        assert_eq!(auth.get_session().await.unwrap(), change);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_invalid_credentials() {
        let auth = SimpleAuthProvider::new();
        auth.register("agent@villa.test", "s3cret").unwrap();

        assert_eq!(
            auth.sign_in("agent@villa.test", "nope").await.unwrap_err(),
            SignInError::InvalidCredentials
        );
        assert_eq!(
            auth.sign_in("ghost@villa.test", "s3cret").await.unwrap_err(),
            SignInError::InvalidCredentials
        );
        assert!(auth.get_session().await.unwrap().session.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_resolve_to_signed_out() {
        let auth = SimpleAuthProvider::new().with_session_ttl(Duration::seconds(-1));
        auth.register("agent@villa.test", "s3cret").unwrap();
        let signed_in = auth.sign_in("agent@villa.test", "s3cret").await.unwrap();

        let current = auth.get_session().await.unwrap();
        assert!(current.session.is_none());
        assert!(current.seq > signed_in.seq);
    }

    #[test]
    fn account_ids_are_stable_and_hashes_are_checked() {
        let a = SimpleAuthProvider::new();
        let b = SimpleAuthProvider::new();
        let hash = hash_password("pw").unwrap();
        assert_eq!(
            a.add_account("agent@villa.test", &hash).unwrap(),
            b.add_account("AGENT@villa.test", &hash).unwrap()
        );
        assert!(a.add_account("x@villa.test", "not-a-phc-string").is_err());
    }
}
