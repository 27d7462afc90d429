//! Engine configuration
//!
//! Assembled from environment variables (optionally loaded from `.env`) and
//! overridable from the command line.

use crate::error::{EngineError, Result};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub schema_path: PathBuf,
    pub rules_path: PathBuf,
    pub business_context_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl EngineConfig {
    /// Read configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("DB_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| EngineError::Config(format!("DB_PORT is not a valid port: {}", p)))?,
            None => 5432,
        };
        let timeout_secs = match get("DB_CONNECT_TIMEOUT_SECS") {
            Some(t) => t.parse().map_err(|_| {
                EngineError::Config(format!("DB_CONNECT_TIMEOUT_SECS is not a number: {}", t))
            })?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            database: DatabaseConfig {
                url: get("DATABASE_URL"),
                host: get("DB_HOST"),
                port,
                database: get("DB_NAME"),
                user: get("DB_USER"),
                password: get("DB_PASSWORD"),
                connect_timeout: Duration::from_secs(timeout_secs),
            },
            llm: LlmConfig {
                api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")).unwrap_or_default(),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            schema_path: get("SCHEMA_PATH")
                .unwrap_or_else(|| "supabase_schema.json".to_string())
                .into(),
            rules_path: get("RULES_PATH").unwrap_or_else(|| "rules.json".to_string()).into(),
            business_context_path: get("BUSINESS_CONTEXT_PATH")
                .unwrap_or_else(|| "business_context.json".to_string())
                .into(),
        })
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| EngineError::Config(format!("Invalid DATABASE_URL: {}", e)));
        }

        let host = self.host.as_deref().ok_or_else(|| {
            EngineError::Config("Set DATABASE_URL or DB_HOST/DB_NAME/DB_USER".to_string())
        })?;
        let mut options = PgConnectOptions::new().host(host).port(self.port);
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Connection target with credentials removed, safe to log.
    pub fn redacted(&self) -> String {
        if let Some(url) = &self.url {
            return url.rsplit('@').next().unwrap_or("database").to_string();
        }
        format!(
            "{}:{}/{}",
            self.host.as_deref().unwrap_or("?"),
            self.port,
            self.database.as_deref().unwrap_or("")
        )
    }
}
