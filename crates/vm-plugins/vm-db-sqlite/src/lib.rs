//! # vm-db-sqlite Implementation
//!
//! Embedded `VillaStore` mapping the SQLite relational model to the
//! `vm-core` domain models. Emulates the hosted backend's row policy: a
//! session only sees and changes the rows it owns, anonymous callers see
//! nothing and cannot insert.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;
use vm_core::models::{NewVilla, Villa, VillaFields};
use vm_core::query::{Filter, Order};
use vm_core::session::SessionContext;
use vm_core::traits::VillaStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS villas (
    id            BLOB PRIMARY KEY NOT NULL,
    owner         BLOB NOT NULL,
    name          TEXT NOT NULL,
    location      TEXT NOT NULL,
    photo_url     TEXT,
    description   TEXT,
    monthly_price REAL,
    yearly_price  REAL,
    agent_fee     REAL,
    status        TEXT,
    amenities     TEXT NOT NULL DEFAULT '[]',
    room_count    INTEGER NOT NULL DEFAULT 1,
    capacity      INTEGER NOT NULL DEFAULT 2,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS villas_owner_created ON villas (owner, created_at);
"#;

pub struct SqliteVillaStore {
    pool: SqlitePool,
}

impl SqliteVillaStore {
    /// Opens (or creates) the database at `url` and ensures the schema exists.
    /// In-memory databases are pinned to a single long-lived connection.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        tracing::info!(url, "sqlite villa store ready");
        Ok(Self { pool })
    }
}

// Helpers for UUID and timestamp conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Uuid::from_slice(blob).context("malformed uuid column")
}

/// Fixed-width text so lexical order equals time order.
fn ts_to_text(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn text_to_ts(text: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("malformed timestamp {text}"))?
        .with_timezone(&Utc))
}

/// `%needle%` with LIKE wildcards in the needle escaped by `\`. Case is left
/// alone: `LIKE` folds ASCII itself and compares other letters exactly.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn owner_blob(ctx: &SessionContext) -> Option<Vec<u8>> {
    ctx.identity().map(|identity| uuid_to_blob(identity.id))
}

fn row_to_villa(row: &SqliteRow) -> anyhow::Result<Villa> {
    Ok(Villa {
        id: blob_to_uuid(row.try_get::<Vec<u8>, _>("id")?.as_slice())?,
        owner: blob_to_uuid(row.try_get::<Vec<u8>, _>("owner")?.as_slice())?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        photo_url: row.try_get("photo_url")?,
        description: row.try_get("description")?,
        monthly_price: row.try_get("monthly_price")?,
        yearly_price: row.try_get("yearly_price")?,
        agent_fee: row.try_get("agent_fee")?,
        // Unknown status text reads as "no status" rather than failing the row.
        status: row
            .try_get::<Option<String>, _>("status")?
            .and_then(|s| s.parse().ok()),
        amenities: serde_json::from_str(&row.try_get::<String, _>("amenities")?)
            .context("malformed amenities column")?,
        room_count: u32::try_from(row.try_get::<i64, _>("room_count")?)?,
        capacity: u32::try_from(row.try_get::<i64, _>("capacity")?)?,
        created_at: text_to_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: text_to_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

#[async_trait]
impl VillaStore for SqliteVillaStore {
    #[tracing::instrument(skip(self, ctx))]
    async fn select(
        &self,
        ctx: &SessionContext,
        filter: &Filter,
        order: Option<Order>,
    ) -> anyhow::Result<Vec<Villa>> {
        let Some(owner) = owner_blob(ctx) else {
            return Ok(Vec::new());
        };

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM villas WHERE owner = ");
        qb.push_bind(owner);

        match filter {
            Filter::All => {}
            Filter::Id(id) => {
                qb.push(" AND id = ").push_bind(uuid_to_blob(*id));
            }
            Filter::Status(status) => {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
            Filter::Matches { columns, needle } if !columns.is_empty() => {
                let pattern = like_pattern(needle);
                qb.push(" AND (");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    qb.push(format!("coalesce({}, '') LIKE ", column.as_str()))
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\'");
                }
                qb.push(")");
            }
            Filter::Matches { .. } => {}
        }

        if let Some(order) = order {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            // rowid breaks ties between rows written in the same microsecond.
            qb.push(format!(
                " ORDER BY {} {direction}, rowid {direction}",
                order.column.as_str()
            ));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_villa).collect()
    }

    async fn select_one(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<Option<Villa>> {
        Ok(self.select(ctx, &Filter::Id(id), None).await?.into_iter().next())
    }

    #[tracing::instrument(skip(self, ctx, villa))]
    async fn insert(&self, ctx: &SessionContext, villa: NewVilla) -> anyhow::Result<Villa> {
        match ctx.identity() {
            None => anyhow::bail!("row policy violation: anonymous sessions cannot insert villas"),
            Some(identity) if identity.id != villa.owner => {
                anyhow::bail!("row policy violation: owner does not match the session identity")
            }
            Some(_) => {}
        }

        let now = ts_to_text(Utc::now());
        let fields = villa.fields;
        let row = sqlx::query(
            "INSERT INTO villas (id, owner, name, location, photo_url, description, monthly_price, \
             yearly_price, agent_fee, status, amenities, room_count, capacity, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(uuid_to_blob(Uuid::now_v7()))
        .bind(uuid_to_blob(villa.owner))
        .bind(fields.name)
        .bind(fields.location)
        .bind(fields.photo_url)
        .bind(fields.description)
        .bind(fields.monthly_price)
        .bind(fields.yearly_price)
        .bind(fields.agent_fee)
        .bind(fields.status.as_str())
        .bind(serde_json::to_string(&fields.amenities)?)
        .bind(i64::from(fields.room_count))
        .bind(i64::from(fields.capacity))
        .bind(now.clone())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_villa(&row)
    }

    #[tracing::instrument(skip(self, ctx, fields))]
    async fn update(
        &self,
        ctx: &SessionContext,
        id: Uuid,
        fields: VillaFields,
        updated_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Villa>> {
        let Some(owner) = owner_blob(ctx) else {
            return Ok(None);
        };

        let row = sqlx::query(
            "UPDATE villas SET name = ?, location = ?, photo_url = ?, description = ?, \
             monthly_price = ?, yearly_price = ?, agent_fee = ?, status = ?, amenities = ?, \
             room_count = ?, capacity = ?, updated_at = ? \
             WHERE id = ? AND owner = ? RETURNING *",
        )
        .bind(fields.name)
        .bind(fields.location)
        .bind(fields.photo_url)
        .bind(fields.description)
        .bind(fields.monthly_price)
        .bind(fields.yearly_price)
        .bind(fields.agent_fee)
        .bind(fields.status.as_str())
        .bind(serde_json::to_string(&fields.amenities)?)
        .bind(i64::from(fields.room_count))
        .bind(i64::from(fields.capacity))
        .bind(ts_to_text(updated_at))
        .bind(uuid_to_blob(id))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_villa).transpose()
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn delete(&self, ctx: &SessionContext, id: Uuid) -> anyhow::Result<u64> {
        let Some(owner) = owner_blob(ctx) else {
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM villas WHERE id = ? AND owner = ?")
            .bind(uuid_to_blob(id))
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
