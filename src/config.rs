/// Configuration management for the moderation ledger
use crate::db::DatabaseOptions;
use crate::entry::DEFAULT_PAGE_SIZE;
use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub ledger_db: PathBuf,
    pub max_connections: u32,
    pub enable_wal: bool,
    pub busy_timeout_secs: u64,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Rows fetched per page by `EntryStore::get_many`
    pub page_size: usize,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> LedgerResult<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LedgerError::Validation(format!("Invalid log format: {}", s))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl LedgerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment, test maps)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LedgerResult<Self> {
        let data_directory: PathBuf = lookup("LEDGER_DATA_DIRECTORY")
            .unwrap_or_else(|| "./data".to_string())
            .into();
        let ledger_db = lookup("LEDGER_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_directory.join("ledger.sqlite"));

        let max_connections = lookup("LEDGER_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| LedgerError::Validation("Invalid max connection count".to_string()))?;
        let enable_wal = lookup("LEDGER_DB_ENABLE_WAL")
            .unwrap_or_else(|| "true".to_string())
            .parse()
            .unwrap_or(true);
        let busy_timeout_secs = lookup("LEDGER_DB_BUSY_TIMEOUT_SECS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .unwrap_or(5);

        let page_size = lookup("LEDGER_PAGE_SIZE")
            .map(|s| {
                s.parse()
                    .map_err(|_| LedgerError::Validation(format!("Invalid page size: {}", s)))
            })
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let format = lookup("LEDGER_LOG_FORMAT")
            .map(|s| LogFormat::from_str(&s))
            .transpose()?
            .unwrap_or(LogFormat::Text);

        Ok(LedgerConfig {
            storage: StorageConfig {
                data_directory,
                ledger_db,
                max_connections,
                enable_wal,
                busy_timeout_secs,
            },
            query: QueryConfig { page_size },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if self.storage.ledger_db.as_os_str().is_empty() {
            return Err(LedgerError::Validation(
                "Ledger database location cannot be empty".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(LedgerError::Validation(
                "At least one database connection is required".to_string(),
            ));
        }

        if self.query.page_size == 0 {
            return Err(LedgerError::Validation(
                "Page size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.storage.max_connections,
            enable_wal: self.storage.enable_wal,
            busy_timeout: Duration::from_secs(self.storage.busy_timeout_secs),
        }
    }
}
