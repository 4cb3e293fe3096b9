//! # Villa Repository
//!
//! Stateless façade over a `VillaStore`: one store round trip per call, no
//! retries, no caching. Drafts are validated before anything is written.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use vm_core::error::{AppError, Result};
use vm_core::models::{NewVilla, Villa, VillaDraft, VillaStatus};
use vm_core::query::{Filter, Order};
use vm_core::session::SessionContext;
use vm_core::traits::VillaStore;

use crate::stats::{summarize, VillaStats};

/// How many villas the dashboard lists under "recent".
pub const DASHBOARD_RECENT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: VillaStats,
    pub top_location: Option<String>,
    pub recent: Vec<Villa>,
}

#[derive(Clone)]
pub struct VillaRepository {
    store: Arc<dyn VillaStore>,
}

impl VillaRepository {
    pub fn new(store: Arc<dyn VillaStore>) -> Self {
        Self { store }
    }

    /// All visible villas, newest first.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &SessionContext) -> Result<Vec<Villa>> {
        let villas = self
            .store
            .select(ctx, &Filter::All, Some(Order::newest_first()))
            .await?;
        tracing::debug!(count = villas.len(), "listed villas");
        Ok(villas)
    }

    /// Visible villas in one status, newest first.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_by_status(&self, ctx: &SessionContext, status: VillaStatus) -> Result<Vec<Villa>> {
        let villas = self
            .store
            .select(ctx, &Filter::Status(status), Some(Order::newest_first()))
            .await?;
        Ok(villas)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn get(&self, ctx: &SessionContext, id: Uuid) -> Result<Villa> {
        self.store
            .select_one(ctx, id)
            .await?
            .ok_or_else(|| AppError::villa_not_found(id))
    }

    /// Stamps the owner from `ctx`, validates the draft and writes it.
    #[tracing::instrument(skip(self, ctx, draft))]
    pub async fn create(&self, ctx: &SessionContext, draft: VillaDraft) -> Result<Villa> {
        let owner = ctx.require_identity()?.id;
        let fields = draft.validate()?;

        let villa = self.store.insert(ctx, NewVilla { owner, fields }).await?;
        tracing::info!(villa_id = %villa.id, %owner, "villa created");
        Ok(villa)
    }

    /// Replaces the editable fields and refreshes `updated_at`.
    #[tracing::instrument(skip(self, ctx, draft))]
    pub async fn update(&self, ctx: &SessionContext, id: Uuid, draft: VillaDraft) -> Result<Villa> {
        let fields = draft.validate()?;

        let villa = self
            .store
            .update(ctx, id, fields, Utc::now())
            .await?
            .ok_or_else(|| AppError::villa_not_found(id))?;
        tracing::info!(villa_id = %villa.id, "villa updated");
        Ok(villa)
    }

    /// Fails with `NotFound` when no row was removed.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &SessionContext, id: Uuid) -> Result<()> {
        let removed = self.store.delete(ctx, id).await?;
        if removed == 0 {
            return Err(AppError::villa_not_found(id));
        }
        tracing::info!(villa_id = %id, "villa deleted");
        Ok(())
    }

    /// Case-insensitive substring search over name, location and description.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn search(&self, ctx: &SessionContext, query: &str) -> Result<Vec<Villa>> {
        let villas = self
            .store
            .select(ctx, &Filter::search(query.trim()), Some(Order::newest_first()))
            .await?;
        Ok(villas)
    }

    /// Fetches every visible villa and summarizes it.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn statistics(&self, ctx: &SessionContext) -> Result<VillaStats> {
        let villas = self.store.select(ctx, &Filter::All, None).await?;
        Ok(summarize(&villas))
    }

    /// Statistics plus the `recent` newest villas.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn dashboard(&self, ctx: &SessionContext, recent: usize) -> Result<Dashboard> {
        let (villas, stats) = tokio::try_join!(self.list(ctx), self.statistics(ctx))?;
        Ok(Dashboard {
            top_location: stats.top_location().map(str::to_string),
            stats,
            recent: villas.into_iter().take(recent).collect(),
        })
    }
}
