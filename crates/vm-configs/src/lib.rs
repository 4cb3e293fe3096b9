//! # vm-configs
//!
//! Layered configuration: built-in defaults, an optional `villa-manager.toml`
//! next to the binary, then `VILLA_*` environment variables (a `.env` file is
//! honoured). The remote backend's endpoint URL and access key are required;
//! their absence is fatal at start.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use vm_core::error::AppError;

pub const ENV_PREFIX: &str = "VILLA";
pub const CONFIG_FILE: &str = "villa-manager";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::StoreError(anyhow::Error::new(err))
    }
}

/// Which plugin pair backs the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The hosted backend over HTTPS.
    #[default]
    Remote,
    /// Embedded SQLite store with local Argon2 accounts.
    Sqlite,
}

/// A local account seeded into the simple auth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalAccount {
    pub identifier: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Backend,
    pub endpoint_url: Option<String>,
    pub access_key: Option<SecretString>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_json: bool,
    pub sign_in_identifier: Option<String>,
    pub sign_in_secret: Option<SecretString>,
    #[serde(default)]
    pub local_accounts: Vec<LocalAccount>,
}

/// Validated credentials for the hosted backend.
pub struct RemoteSettings<'a> {
    pub endpoint_url: &'a str,
    pub access_key: &'a SecretString,
}

fn default_table() -> String {
    "villas".to_string()
}

fn default_database_url() -> String {
    "sqlite:villa-manager.db".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Loads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == Backend::Remote {
            self.remote()?;
        }
        if self.sign_in_identifier.is_some() && self.sign_in_secret.is_none() {
            return Err(ConfigError::Missing("VILLA_SIGN_IN_SECRET"));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".into()));
        }
        Ok(())
    }

    pub fn remote(&self) -> Result<RemoteSettings<'_>, ConfigError> {
        let endpoint_url = self
            .endpoint_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("VILLA_ENDPOINT_URL"))?;
        if !(endpoint_url.starts_with("https://") || endpoint_url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint_url must be an http(s) URL, got '{endpoint_url}'"
            )));
        }
        let access_key = self
            .access_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or(ConfigError::Missing("VILLA_ACCESS_KEY"))?;

        Ok(RemoteSettings {
            endpoint_url: endpoint_url.trim_end_matches('/'),
            access_key,
        })
    }

    /// Configured sign-in credentials, if any.
    pub fn sign_in(&self) -> Option<(&str, &SecretString)> {
        Some((self.sign_in_identifier.as_deref()?, self.sign_in_secret.as_ref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn remote_backend_requires_endpoint_and_key() {
        let err = from_toml("").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VILLA_ENDPOINT_URL")));

        let err = from_toml(r#"endpoint_url = "https://demo.supabase.co""#).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VILLA_ACCESS_KEY")));

        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::StoreError(_)));
    }

    #[test]
    fn remote_settings_are_trimmed() {
        let cfg = from_toml(
            r#"
            endpoint_url = "https://demo.supabase.co/"
            access_key = "anon-key"
            "#,
        )
        .unwrap();
        let remote = cfg.remote().unwrap();
        assert_eq!(remote.endpoint_url, "https://demo.supabase.co");
        assert_eq!(remote.access_key.expose_secret(), "anon-key");
        assert_eq!(cfg.table, "villas");
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = from_toml(
            r#"
            endpoint_url = "demo.supabase.co"
            access_key = "anon-key"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn sqlite_backend_needs_no_remote_credentials() {
        let cfg = from_toml(
            r#"
            backend = "sqlite"
            database_url = "sqlite::memory:"
            sign_in_identifier = "agent@villa.test"
            sign_in_secret = "s3cret"

            [[local_accounts]]
            identifier = "agent@villa.test"
            password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$aGFzaA"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend, Backend::Sqlite);
        assert_eq!(cfg.local_accounts.len(), 1);
        let (identifier, secret) = cfg.sign_in().unwrap();
        assert_eq!(identifier, "agent@villa.test");
        assert_eq!(secret.expose_secret(), "s3cret");
    }

    #[test]
    fn sign_in_identifier_without_secret_is_rejected() {
        let err = from_toml(
            r#"
            backend = "sqlite"
            sign_in_identifier = "agent@villa.test"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VILLA_SIGN_IN_SECRET")));
    }
}
