//! # Villa Manager Binary
//!
//! Assembles the repository from compile-time plugin features and the
//! configured backend, signs in with configured credentials and prints the
//! requested view as JSON.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vm_configs::{AppConfig, Backend};
use vm_core::models::VillaStatus;
use vm_core::session::SessionContext;
use vm_core::traits::{AuthProvider, VillaStore};
use vm_services::{SessionState, VillaRepository, DASHBOARD_RECENT};

#[cfg(feature = "remote-rest")]
use vm_remote_rest::{RestAuthProvider, RestClient, RestVillaStore};

#[cfg(feature = "db-sqlite")]
use vm_db_sqlite::SqliteVillaStore;

#[cfg(feature = "auth-simple")]
use vm_auth_simple::SimpleAuthProvider;

#[derive(Parser)]
#[command(name = "villa-manager")]
#[command(about = "Inspect and maintain villa listings")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Totals, fee revenue and counts by location and status
    Summary,
    /// Summary plus the most recent villas
    Dashboard {
        #[arg(long, default_value_t = DASHBOARD_RECENT)]
        recent: usize,
    },
    /// All villas, newest first
    List {
        /// Only villas in this status (available, booked, maintenance)
        #[arg(long)]
        status: Option<VillaStatus>,
    },
    /// Villas whose name, location or description contains the query
    Search { query: String },
    /// One villa by id
    Show { id: Uuid },
    /// Remove a villa by id
    Delete { id: Uuid },
}

fn init_logger(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter).context("invalid log filter")?,
    };

    // stdout carries the JSON result, so logs go to stderr.
    let (json, plain) = if config.log_json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .try_init()?;
    Ok(())
}

async fn build_backend(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn VillaStore>, Arc<dyn AuthProvider>)> {
    match config.backend {
        #[cfg(feature = "remote-rest")]
        Backend::Remote => {
            let remote = config.remote()?;
            let client = RestClient::new(remote.endpoint_url, remote.access_key)?;
            let store = RestVillaStore::new(client.clone(), config.table.clone());
            Ok((Arc::new(store), Arc::new(RestAuthProvider::new(client))))
        }

        #[cfg(all(feature = "db-sqlite", feature = "auth-simple"))]
        Backend::Sqlite => {
            let store = SqliteVillaStore::new(&config.database_url)
                .await
                .context("failed to open the sqlite store")?;
            let auth = SimpleAuthProvider::new();
            for account in &config.local_accounts {
                auth.add_account(&account.identifier, &account.password_hash)?;
            }
            tracing::info!(accounts = config.local_accounts.len(), "local accounts loaded");
            Ok((Arc::new(store), Arc::new(auth)))
        }

        #[allow(unreachable_patterns)]
        other => anyhow::bail!("backend {other:?} is not compiled into this binary"),
    }
}

async fn run(
    command: Command,
    repo: &VillaRepository,
    ctx: &SessionContext,
) -> anyhow::Result<serde_json::Value> {
    let output = match command {
        Command::Summary => serde_json::to_value(repo.statistics(ctx).await?)?,
        Command::Dashboard { recent } => serde_json::to_value(repo.dashboard(ctx, recent).await?)?,
        Command::List { status: None } => serde_json::to_value(repo.list(ctx).await?)?,
        Command::List { status: Some(status) } => {
            serde_json::to_value(repo.list_by_status(ctx, status).await?)?
        }
        Command::Search { query } => serde_json::to_value(repo.search(ctx, &query).await?)?,
        Command::Show { id } => serde_json::to_value(repo.get(ctx, id).await?)?,
        Command::Delete { id } => {
            repo.delete(ctx, id).await?;
            json!({ "deleted": id })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load().context("configuration is incomplete")?;
    init_logger(&config)?;

    let (store, auth) = build_backend(&config).await?;
    let repo = VillaRepository::new(store);

    let session = SessionState::new(auth);
    let _subscription = session.subscribe();
    session.initialize().await?;

    if let Some((identifier, secret)) = config.sign_in() {
        session.sign_in(identifier, secret.expose_secret()).await?;
    }

    let outcome = run(args.command, &repo, &session.context()).await;
    if session.current().is_some() {
        session.sign_out().await;
    }

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_accepts_a_status_filter() {
        let args = Args::try_parse_from(["villa-manager", "list", "--status", "Booked"]).unwrap();
        assert!(matches!(
            args.command,
            Command::List { status: Some(VillaStatus::Booked) }
        ));

        let args = Args::try_parse_from(["villa-manager", "list"]).unwrap();
        assert!(matches!(args.command, Command::List { status: None }));

        assert!(Args::try_parse_from(["villa-manager", "list", "--status", "sold"]).is_err());
    }
}
