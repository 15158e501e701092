//! The catalog abstraction every operation runs against.
//!
//! A [`Catalog`] answers metadata questions about one database connection and
//! executes statements on it. The SQL Server implementation lives in
//! `drivers::mssql`; tests use an in-memory implementation.

use std::ops::ControlFlow;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CloneError, Result};

use super::schema::{Column, FkDirection, Key, Schema, ShallowTable, Table};
use super::scope::SchemaScope;
use super::value::SqlValue;

/// Callback receiving one row at a time; `Break` stops the visit.
///
/// Values may borrow from the driver's current row and are only valid for
/// the duration of the call.
pub type RowVisitor<'a> =
    dyn FnMut(&[SqlValue<'_>]) -> Result<ControlFlow<()>> + Send + 'a;

/// A source row detached from the driver.
pub type OwnedRow = Vec<SqlValue<'static>>;

/// Sending half of a row stream.
pub type RowSender = mpsc::Sender<OwnedRow>;

/// Rows in flight between a producing query and its consumer.
pub const ROW_CHANNEL_CAPACITY: usize = 1;

/// Bounded channel connecting [`Catalog::stream_rows`] to a consumer.
pub fn row_channel() -> (RowSender, mpsc::Receiver<OwnedRow>) {
    mpsc::channel(ROW_CHANNEL_CAPACITY)
}

/// Metadata queries and statement execution on one database connection.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Identity of the underlying connection (server + database).
    ///
    /// Two catalogs with equal ids operate on the same database, which
    /// makes a clone between them a same-connection clone.
    fn connection_id(&self) -> &str;

    /// Schema used for unqualified table names.
    async fn default_schema(&self) -> Result<String>;

    async fn list_schemas(&self) -> Result<Vec<Schema>>;

    /// User tables in the scope, sorted by schema then name.
    async fn list_tables(&self, scope: &SchemaScope) -> Result<Vec<ShallowTable>>;

    /// Columns of a table ordered by position. Empty when the table is missing.
    async fn list_columns(&self, table: &ShallowTable) -> Result<Vec<Column>>;

    async fn primary_key(&self, table: &ShallowTable) -> Result<Option<Key>>;

    /// Foreign keys touching `table`.
    ///
    /// `Descending` returns the keys declared on `table` whose referenced
    /// table is in scope; `Ascending` returns keys declared on in-scope tables
    /// that reference `table`.
    async fn list_foreign_keys(
        &self,
        table: &ShallowTable,
        direction: FkDirection,
        scope: &SchemaScope,
    ) -> Result<Vec<Key>>;

    async fn table_exists(&self, table: &ShallowTable) -> Result<bool>;

    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    /// Execute a statement batch, returning the affected row count.
    ///
    /// A rejected statement fails with [`CloneError::Execution`].
    async fn execute(&self, statement: &str) -> Result<u64>;

    /// Run a query and send its rows to `sink` one at a time.
    ///
    /// Waits while the sink is full. When the receiver is dropped the rest of
    /// the result is discarded and the call returns `Ok`. `columns` describes
    /// the selected columns in order and lets the driver convert each value
    /// to the matching [`SqlValue`] variant.
    async fn stream_rows(&self, statement: &str, columns: &[Column], sink: RowSender)
        -> Result<()>;

    /// Run a query and hand its rows to `visitor` until it breaks.
    async fn query(
        &self,
        statement: &str,
        columns: &[Column],
        visitor: &mut RowVisitor<'_>,
    ) -> Result<()> {
        let (sink, mut rows) = row_channel();
        let visit = async move {
            while let Some(row) = rows.recv().await {
                if let ControlFlow::Break(()) = visitor(row.as_slice())? {
                    break;
                }
            }
            Ok(())
        };
        tokio::try_join!(self.stream_rows(statement, columns, sink), visit)?;
        Ok(())
    }

    /// Fill `schema.tables` with the names of its tables, once.
    async fn populate_schema(&self, schema: &mut Schema) -> Result<()> {
        if schema.tables.is_none() {
            let tables = self.list_tables(&SchemaScope::single(&schema.name)).await?;
            schema.tables = Some(tables.into_iter().map(|t| t.name).collect());
        }
        Ok(())
    }

    /// Foreign keys in both directions, fetched concurrently.
    async fn list_all_foreign_keys(
        &self,
        table: &ShallowTable,
        scope: &SchemaScope,
    ) -> Result<(Vec<Key>, Vec<Key>)> {
        tokio::try_join!(
            self.list_foreign_keys(table, FkDirection::Descending, scope),
            self.list_foreign_keys(table, FkDirection::Ascending, scope),
        )
    }

    /// Full definition of a table: columns, primary key and outward foreign keys.
    async fn load_table(&self, table: &ShallowTable) -> Result<Table> {
        let all = SchemaScope::All;
        let (exists, columns, primary_key, foreign_keys) = tokio::try_join!(
            self.table_exists(table),
            self.list_columns(table),
            self.primary_key(table),
            self.list_foreign_keys(table, FkDirection::Descending, &all),
        )?;

        if !exists {
            return Err(CloneError::table_not_found(table));
        }

        let mut keys: Vec<Key> = primary_key.into_iter().collect();
        keys.extend(foreign_keys);
        Table::new(table.clone(), columns, keys)
    }
}
