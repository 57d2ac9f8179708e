//! Service configuration, read from the environment once at startup.

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PHOTO_BUCKET: &str = "lead-photos";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{present} is set but {missing} is not")]
    IncompletePair {
        present: &'static str,
        missing: &'static str,
    },
}

/// Where conversations, leads and photos are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Hosted tables under `/rest/v1` plus the object store.
    Hosted { url: String, service_key: String },
    /// Direct PostgreSQL; photos stay in memory.
    Postgres { database_url: String },
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub bind_address: String,
    pub backend: Backend,
    pub photo_bucket: String,
    /// Optional YAML file replacing the built-in step table.
    pub step_table_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            backend: Backend::InMemory,
            photo_bucket: DEFAULT_PHOTO_BUCKET.to_string(),
            step_table_path: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PORT",
                    value,
                })?,
            None => DEFAULT_PORT,
        };

        let backend = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => Backend::Hosted { url, service_key },
            (Some(_), None) => {
                return Err(ConfigError::IncompletePair {
                    present: "SUPABASE_URL",
                    missing: "SUPABASE_SERVICE_ROLE_KEY",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompletePair {
                    present: "SUPABASE_SERVICE_ROLE_KEY",
                    missing: "SUPABASE_URL",
                });
            }
            (None, None) => match var("DATABASE_URL") {
                Some(database_url) => Backend::Postgres { database_url },
                None => Backend::InMemory,
            },
        };

        Ok(Self {
            port,
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            backend,
            photo_bucket: var("PHOTO_BUCKET").unwrap_or_else(|| DEFAULT_PHOTO_BUCKET.to_string()),
            step_table_path: var("STEP_TABLE_PATH"),
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
