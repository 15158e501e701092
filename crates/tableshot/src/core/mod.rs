//! Core abstractions shared by every operation.
//!
//! - [`schema`]: table, column and key metadata types
//! - [`scope`]: schema allow-sets bounding catalog queries
//! - [`value`]: row values streamed from the source
//! - [`traits`]: the [`Catalog`] trait implemented by drivers
//! - [`identifier`]: quoting and case-insensitive name handling

pub mod identifier;
pub mod schema;
pub mod scope;
pub mod traits;
pub mod value;

pub use schema::{
    Column, FkDirection, Key, KeyKind, ReferencedByOptions, Schema, ShallowTable, Table,
    TableConfiguration,
};
pub use scope::SchemaScope;
pub use traits::{row_channel, Catalog, OwnedRow, RowSender, RowVisitor};
pub use value::SqlValue;
