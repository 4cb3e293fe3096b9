//! # Core Traits (Ports)
//!
//! The remote backend seen from this side: a row store for villas and an
//! authentication provider. Any plugin must implement these traits to be
//! used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SignInError;
use crate::models::{NewVilla, Villa, VillaFields};
use crate::query::{Filter, Order};
use crate::session::{SessionChange, SessionContext};

/// Data persistence contract for villas. Each call is one round trip; the
/// caller's session decides which rows are visible.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VillaStore: Send + Sync {
    async fn select(
        &self,
        ctx: &SessionContext,
        filter: &Filter,
        order: Option<Order>,
    ) -> anyhow::Result<Vec<Villa>>;

    async fn select_one(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<Option<Villa>>;

    /// Stores the row and returns it with server-assigned id and timestamps.
    async fn insert(&self, ctx: &SessionContext, villa: NewVilla) -> anyhow::Result<Villa>;

    /// Replaces the editable fields. `None` when no row matched.
    async fn update(
        &self,
        ctx: &SessionContext,
        id: Uuid,
        fields: VillaFields,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Villa>>;

    /// Returns the number of rows removed.
    async fn delete(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<u64>;
}

/// Identity contract: credentials in, sessions and session events out.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The provider's current session and the sequence number it was
    /// published under.
    async fn get_session(&self) -> anyhow::Result<SessionChange>;

    /// Authenticates and publishes a `SignedIn` change, which is also returned.
    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<SessionChange, SignInError>;

    /// Ends the session remotely and publishes a `SignedOut` change.
    async fn sign_out(&self, ctx: &SessionContext) -> anyhow::Result<SessionChange>;

    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}
