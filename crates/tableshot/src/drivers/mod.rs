//! Database drivers implementing [`Catalog`](crate::core::Catalog).
//!
//! Only SQL Server is supported. Tests use the in-memory catalog.

pub mod mssql;

pub use mssql::MssqlCatalog;
