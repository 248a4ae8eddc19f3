//! Environment-driven configuration.
//!
//! Every setting has a local-development default, so the reconciliation
//! command runs without any flags. A `.env` file in the working directory is
//! loaded by the binary before these values are read.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::reconciliation::{ReconcileMode, ReconcileOptions};
use crate::types::*;

/// Full connection URL; overrides the individual `DB_*` parts.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
/// MySQL host.
pub const DB_HOST_ENV_VAR: &str = "DB_HOST";
/// MySQL port.
pub const DB_PORT_ENV_VAR: &str = "DB_PORT";
/// MySQL user.
pub const DB_USER_ENV_VAR: &str = "DB_USER";
/// MySQL password.
pub const DB_PASSWORD_ENV_VAR: &str = "DB_PASSWORD";
/// MySQL database name.
pub const DB_NAME_ENV_VAR: &str = "DB_NAME";
/// Maximum pooled connections.
pub const DB_CONNECTION_LIMIT_ENV_VAR: &str = "DB_CONNECTION_LIMIT";
/// `apply` or `audit`.
pub const RECONCILE_MODE_ENV_VAR: &str = "RECONCILE_MODE";
/// Restrict reconciliation to one campaign.
pub const RECONCILE_CAMPAIGN_ID_ENV_VAR: &str = "RECONCILE_CAMPAIGN_ID";
/// Logging filter directives.
pub const LOG_ENV_VAR: &str = "LEDGER_LOG";

/// Store implementation selected by the connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    MySql,
    Sqlite,
}

/// Relational store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connection_limit: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "donation_platform".to_string(),
            connection_limit: 10,
        }
    }
}

impl DatabaseConfig {
    /// Which backend the settings point at
    pub fn backend(&self) -> LedgerResult<DatabaseBackend> {
        let Some(url) = &self.url else {
            return Ok(DatabaseBackend::MySql);
        };

        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            "mysql" | "mariadb" => Ok(DatabaseBackend::MySql),
            other => Err(LedgerError::Config(format!(
                "unsupported database scheme '{}' in {}",
                other, DATABASE_URL_ENV_VAR
            ))),
        }
    }

    /// Connection target safe to log (no password)
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(url) if url.starts_with("sqlite:") => url.clone(),
            Some(url) => match url.rsplit_once('@') {
                Some((_, host)) => format!("mysql://***@{}", host),
                None => url.clone(),
            },
            None => format!(
                "mysql://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

/// Reconciliation run settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub mode: ReconcileMode,
    pub campaign_id: Option<String>,
}

impl ReconcileConfig {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            scope: match &self.campaign_id {
                Some(id) => ReconcileScope::Campaign(id.clone()),
                None => ReconcileScope::All,
            },
            mode: self.mode,
        }
    }
}

/// Complete configuration of the reconciliation command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database: DatabaseConfig,
    pub reconcile: ReconcileConfig,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            reconcile: ReconcileConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        let db = &mut config.database;
        db.url = get(DATABASE_URL_ENV_VAR);
        if let Some(host) = get(DB_HOST_ENV_VAR) {
            db.host = host;
        }
        if let Some(port) = get(DB_PORT_ENV_VAR) {
            db.port = parse_number(DB_PORT_ENV_VAR, &port)?;
        }
        if let Some(user) = get(DB_USER_ENV_VAR) {
            db.user = user;
        }
        if let Some(password) = lookup(DB_PASSWORD_ENV_VAR) {
            db.password = password;
        }
        if let Some(database) = get(DB_NAME_ENV_VAR) {
            db.database = database;
        }
        if let Some(limit) = get(DB_CONNECTION_LIMIT_ENV_VAR) {
            db.connection_limit = parse_number(DB_CONNECTION_LIMIT_ENV_VAR, &limit)?;
            if db.connection_limit == 0 {
                return Err(LedgerError::Config(format!(
                    "{} must be at least 1",
                    DB_CONNECTION_LIMIT_ENV_VAR
                )));
            }
        }
        db.backend()?;

        if let Some(mode) = get(RECONCILE_MODE_ENV_VAR) {
            config.reconcile.mode = mode.parse()?;
        }
        config.reconcile.campaign_id =
            get(RECONCILE_CAMPAIGN_ID_ENV_VAR).map(|id| id.trim().to_string());

        if let Some(filter) = get(LOG_ENV_VAR) {
            config.log_filter = filter;
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> LedgerResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LedgerError::Config(format!("invalid {} '{}': {}", key, value, e)))
}
