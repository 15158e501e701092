//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{ReferencedByOptions, SchemaScope, ShallowTable, TableConfiguration};
use crate::error::Result;
use crate::orchestrator::DEFAULT_BATCH_BYTES;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database.
    pub source: ServerConfig,

    /// Target database. Absent means clone within the source database.
    #[serde(default)]
    pub target: Option<ServerConfig>,

    /// Schemas that catalog queries and traversal may enter (empty = all).
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Seed tables.
    #[serde(default)]
    pub tables: Vec<TableEntry>,

    /// Clone behavior.
    #[serde(default)]
    pub clone: CloneConfig,
}

impl Config {
    /// Schema scope built from `schemas`.
    pub fn scope(&self) -> SchemaScope {
        SchemaScope::new(&self.schemas)
    }

    /// Configured seeds. Names must be `schema.table`; the schema may be `*`.
    pub fn table_configurations(&self) -> Result<Vec<TableConfiguration>> {
        self.tables
            .iter()
            .map(|entry| {
                Ok(TableConfiguration::new(
                    ShallowTable::parse(&entry.name, None)?,
                    entry.referenced,
                ))
            })
            .collect()
    }
}

/// SQL Server connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl ServerConfig {
    /// Identity of the database this config points at.
    pub fn connection_id(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host.to_lowercase(),
            self.port,
            self.database.to_lowercase()
        )
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// One configured seed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    /// `schema.table`, or `*.table` for every schema in scope.
    pub name: String,

    /// Traversal flags, e.g. `descending`, `ascending,schema`.
    #[serde(default)]
    pub referenced: ReferencedByOptions,
}

/// Clone behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Schema whose tables are renamed on the target.
    #[serde(default)]
    pub source_schema: Option<String>,

    /// Schema the source schema is renamed to.
    #[serde(default)]
    pub target_schema: Option<String>,

    /// Create schemas missing on the target (default: false).
    #[serde(default)]
    pub create_missing_schemas: bool,

    /// Leave tables outside the source schema alone in same-database clones (default: true).
    #[serde(default = "default_true")]
    pub skip_shared_tables: bool,

    /// Refuse to drop a table that is still referenced (default: false).
    #[serde(default)]
    pub check_referenced_tables: bool,

    /// Fail on dependency cycles instead of ordering best effort (default: false).
    #[serde(default)]
    pub fail_on_cycle: bool,

    /// INSERT text per batch sent to the target or written to a backup (default: 256 KiB).
    #[serde(default = "default_batch_bytes")]
    pub batch_bytes: usize,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            source_schema: None,
            target_schema: None,
            create_missing_schemas: false,
            skip_shared_tables: true,
            check_referenced_tables: false,
            fail_on_cycle: false,
            batch_bytes: default_batch_bytes(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    4
}

fn default_batch_bytes() -> usize {
    DEFAULT_BATCH_BYTES
}
