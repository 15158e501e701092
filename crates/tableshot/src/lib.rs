//! # tableshot
//!
//! Clone SQL Server tables, structure and data, along their foreign-key graph.
//!
//! Starting from configured seed tables the library:
//!
//! - **Resolves** every table linked by foreign keys, in either direction,
//!   optionally bounded to a schema scope
//! - **Orders** them so each table is created after the tables it references
//! - **Renders** T-SQL for structure and data, optionally renaming a schema
//! - **Clones** into another database or another schema of the same database,
//!   leaving shared tables in place
//! - **Backs up** tables to SQL files and replays such backups
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tableshot::{CloneOptions, Cloner, Config, MssqlCatalog};
//!
//! #[tokio::main]
//! async fn main() -> tableshot::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(MssqlCatalog::connect(&config.source).await?);
//!     let cloner = Cloner::new(source.clone(), source, CloneOptions::from_config(&config)?);
//!     let report = cloner.run().await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod sqlgen;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{CloneConfig, Config, ServerConfig, TableEntry};
pub use core::{
    Catalog, Column, Key, ReferencedByOptions, SchemaScope, ShallowTable, SqlValue, Table,
    TableConfiguration,
};
pub use drivers::MssqlCatalog;
pub use error::{CloneError, Result};
pub use graph::{resolve_referenced_tables, CyclePolicy, DependencyResolver};
pub use orchestrator::{find_columns, CloneOptions, CloneReport, Cloner, ColumnMatch, Exporter};
pub use sqlgen::{SchemaRename, SqlGenerator};
