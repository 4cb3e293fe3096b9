use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use vm_core::models::{NewVilla, Villa, VillaFields};
use vm_core::query::{Filter, Order};
use vm_core::session::SessionContext;
use vm_core::traits::VillaStore;

use crate::{ensure_success, with_auth, RestClient};

const PREFER_REPRESENTATION: (&str, &str) = ("Prefer", "return=representation");

/// `VillaStore` over the backend's row API.
pub struct RestVillaStore {
    client: RestClient,
    table: String,
}

#[derive(Serialize)]
struct UpdateBody {
    #[serde(flatten)]
    fields: VillaFields,
    updated_at: DateTime<Utc>,
}

impl RestVillaStore {
    pub fn new(client: RestClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn table_url(&self) -> anyhow::Result<reqwest::Url> {
        self.client.url(&format!("/rest/v1/{}", self.table))
    }
}

/// Quotes a filter value so commas, parentheses and dots survive.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// LIKE pattern with the needle's own `%`/`_` made literal; `*` is the
/// API's wildcard.
fn ilike_pattern(needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    quote(&format!("*{escaped}*"))
}

fn id_param(id: Uuid) -> (String, String) {
    ("id".to_string(), format!("eq.{id}"))
}

fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    match filter {
        Filter::All => Vec::new(),
        Filter::Id(id) => vec![id_param(*id)],
        Filter::Status(status) => vec![("status".to_string(), format!("eq.{}", status.as_str()))],
        Filter::Matches { columns, needle } if !columns.is_empty() => {
            let pattern = ilike_pattern(needle);
            let clauses = columns
                .iter()
                .map(|c| format!("{}.ilike.{pattern}", c.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            vec![("or".to_string(), format!("({clauses})"))]
        }
        Filter::Matches { .. } => Vec::new(),
    }
}

fn order_param(order: Order) -> (String, String) {
    let direction = if order.ascending { "asc" } else { "desc" };
    ("order".to_string(), format!("{}.{direction}", order.column.as_str()))
}

#[async_trait]
impl VillaStore for RestVillaStore {
    #[tracing::instrument(skip(self, ctx))]
    async fn select(
        &self,
        ctx: &SessionContext,
        filter: &Filter,
        order: Option<Order>,
    ) -> anyhow::Result<Vec<Villa>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filter));
        params.extend(order.map(order_param));

        let request = self.client.client.get(self.table_url()?).query(&params);
        let response = with_auth(request, &self.client, ctx)?.send().await?;
        let villas = ensure_success(response).await?.json::<Vec<Villa>>().await?;
        Ok(villas)
    }

    async fn select_one(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<Option<Villa>> {
        Ok(self.select(ctx, &Filter::Id(id), None).await?.into_iter().next())
    }

    #[tracing::instrument(skip(self, ctx, villa))]
    async fn insert(&self, ctx: &SessionContext, villa: NewVilla) -> anyhow::Result<Villa> {
        let request = self
            .client
            .client
            .post(self.table_url()?)
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1)
            .json(&villa);
        let response = with_auth(request, &self.client, ctx)?.send().await?;
        ensure_success(response)
            .await?
            .json::<Vec<Villa>>()
            .await?
            .into_iter()
            .next()
            .context("insert returned no row")
    }

    #[tracing::instrument(skip(self, ctx, fields))]
    async fn update(
        &self,
        ctx: &SessionContext,
        id: Uuid,
        fields: VillaFields,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Villa>> {
        let request = self
            .client
            .client
            .patch(self.table_url()?)
            .query(&[id_param(id)])
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1)
            .json(&UpdateBody { fields, updated_at });
        let response = with_auth(request, &self.client, ctx)?.send().await?;
        let rows = ensure_success(response).await?.json::<Vec<Villa>>().await?;
        Ok(rows.into_iter().next())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn delete(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<u64> {
        let request = self
            .client
            .client
            .delete(self.table_url()?)
            .query(&[id_param(id)])
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1);
        let response = with_auth(request, &self.client, ctx)?.send().await?;
        let removed = ensure_success(response)
            .await?
            .json::<Vec<serde_json::Value>>()
            .await?;
        Ok(removed.len() as u64)
    }
}
