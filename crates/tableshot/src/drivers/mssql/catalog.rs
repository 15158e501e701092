//! [`Catalog`] implementation for SQL Server.

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use futures::TryStreamExt;
use tiberius::Query;
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::core::identifier::qualify_mssql;
use crate::core::{
    Catalog, Column, FkDirection, Key, RowSender, Schema, SchemaScope, ShallowTable, SqlValue,
};
use crate::error::{CloneError, Result};

use super::convert::convert_row_value;
use super::pool::{connect_pool, TiberiusConnectionManager};

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        OBJECT_SCHEMA_NAME(f.parent_object_id),
        OBJECT_NAME(f.parent_object_id),
        COL_NAME(fc.parent_object_id, fc.parent_column_id),
        f.name,
        OBJECT_SCHEMA_NAME(f.referenced_object_id),
        OBJECT_NAME(f.referenced_object_id),
        COL_NAME(fc.referenced_object_id, fc.referenced_column_id)
    FROM sys.foreign_keys AS f
    INNER JOIN sys.foreign_key_columns AS fc
        ON f.object_id = fc.constraint_object_id
"#;

/// SQL Server catalog over a bb8 pool of Tiberius clients.
pub struct MssqlCatalog {
    pool: Pool<TiberiusConnectionManager>,
    connection_id: String,
}

impl MssqlCatalog {
    /// Connect to the database described by `config`.
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        Ok(Self {
            pool: connect_pool(config).await?,
            connection_id: config.connection_id(),
        })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CloneError::pool(e, "getting MSSQL connection"))
    }

    async fn count(&self, sql: &str, params: &[&str]) -> Result<i32> {
        let mut conn = self.get_conn().await?;
        let mut query = Query::new(sql);
        for p in params {
            query.bind(*p);
        }
        let row = query.query(&mut *conn).await?.into_row().await?;
        match row {
            Some(row) => Ok(row.try_get::<i32, _>(0)?.unwrap_or(0)),
            None => Ok(0),
        }
    }
}

fn text(row: &tiberius::Row, idx: usize) -> Result<String> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

#[async_trait]
impl Catalog for MssqlCatalog {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn default_schema(&self) -> Result<String> {
        let mut conn = self.get_conn().await?;
        let row = conn.simple_query("SELECT SCHEMA_NAME()").await?.into_row().await?;
        match row {
            Some(row) => text(&row, 0),
            None => Ok("dbo".to_string()),
        }
    }

    async fn list_schemas(&self) -> Result<Vec<Schema>> {
        let mut conn = self.get_conn().await?;
        // dbo plus user schemas; skips guest, sys, INFORMATION_SCHEMA and the db_* role schemas
        let rows = conn
            .simple_query(
                "SELECT name FROM sys.schemas \
                 WHERE schema_id = 1 OR (schema_id > 4 AND schema_id < 16384) \
                 ORDER BY name",
            )
            .await?
            .into_first_result()
            .await?;

        rows.iter()
            .map(|row| Ok(Schema::new(text(row, 0)?)))
            .collect()
    }

    async fn list_tables(&self, scope: &SchemaScope) -> Result<Vec<ShallowTable>> {
        let mut conn = self.get_conn().await?;
        let rows = conn
            .simple_query(
                "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_SCHEMA, TABLE_NAME",
            )
            .await?
            .into_first_result()
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let table = ShallowTable::new(text(row, 0)?, text(row, 1)?);
            if scope.contains(&table.schema) {
                tables.push(table);
            }
        }
        debug!("Listed {} table(s) in scope {}", tables.len(), scope);
        Ok(tables)
    }

    async fn list_columns(&self, table: &ShallowTable) -> Result<Vec<Column>> {
        let mut conn = self.get_conn().await?;
        let sql = r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CHARACTER_MAXIMUM_LENGTH,
                CAST(NUMERIC_PRECISION AS INT),
                CAST(NUMERIC_SCALE AS INT),
                CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
                ISNULL(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(TABLE_SCHEMA) + '.' + QUOTENAME(TABLE_NAME)), COLUMN_NAME, 'IsIdentity'), 0),
                ORDINAL_POSITION,
                COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
        "#;

        let mut query = Query::new(sql);
        query.bind(table.schema.as_str());
        query.bind(table.name.as_str());
        let rows = query.query(&mut *conn).await?.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(Column {
                name: text(row, 0)?,
                data_type: text(row, 1)?,
                max_length: row.try_get::<i32, _>(2)?,
                precision: row.try_get::<i32, _>(3)?,
                scale: row.try_get::<i32, _>(4)?,
                is_nullable: row.try_get::<i32, _>(5)?.unwrap_or(0) == 1,
                is_identity: row.try_get::<i32, _>(6)?.unwrap_or(0) == 1,
                ordinal_pos: row.try_get::<i32, _>(7)?.unwrap_or(0),
                default_value: row.try_get::<&str, _>(8)?.map(str::to_string),
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn primary_key(&self, table: &ShallowTable) -> Result<Option<Key>> {
        let mut conn = self.get_conn().await?;
        let sql = r#"
            SELECT c.COLUMN_NAME, tc.CONSTRAINT_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE c
                ON c.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND c.TABLE_SCHEMA = tc.TABLE_SCHEMA
                AND c.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
              AND tc.TABLE_SCHEMA = @P1
              AND tc.TABLE_NAME = @P2
            ORDER BY c.ORDINAL_POSITION
        "#;

        let mut query = Query::new(sql);
        query.bind(table.schema.as_str());
        query.bind(table.name.as_str());
        let rows = query.query(&mut *conn).await?.into_first_result().await?;

        match rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(Key::primary(table.clone(), text(row, 0)?, text(row, 1)?))),
            _ => Err(CloneError::invalid_definition(
                table,
                format!(
                    "composite primary key over {} columns is not supported",
                    rows.len()
                ),
            )),
        }
    }

    async fn list_foreign_keys(
        &self,
        table: &ShallowTable,
        direction: FkDirection,
        scope: &SchemaScope,
    ) -> Result<Vec<Key>> {
        let mut conn = self.get_conn().await?;
        let filter = match direction {
            FkDirection::Descending => "WHERE f.parent_object_id = OBJECT_ID(@P1)",
            FkDirection::Ascending => "WHERE f.referenced_object_id = OBJECT_ID(@P1)",
        };
        let sql = format!(
            "{} {} ORDER BY f.name, fc.constraint_column_id",
            FOREIGN_KEYS_QUERY, filter
        );

        let qualified = qualify_mssql(&table.schema, &table.name)?;
        let mut query = Query::new(sql);
        query.bind(qualified.as_str());
        let rows = query.query(&mut *conn).await?.into_first_result().await?;

        let mut keys: Vec<Key> = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = Key::foreign(
                ShallowTable::new(text(row, 0)?, text(row, 1)?),
                text(row, 2)?,
                text(row, 3)?,
                ShallowTable::new(text(row, 4)?, text(row, 5)?),
                text(row, 6)?,
            );

            let other_side = match direction {
                FkDirection::Descending => key.foreign_table().unwrap_or(&key.table),
                FkDirection::Ascending => &key.table,
            };
            if !scope.contains(&other_side.schema) {
                trace!("Skipping key {} outside scope {}", key.name, scope);
                continue;
            }

            if keys.last().is_some_and(|k| k.name == key.name) {
                warn!(
                    "Foreign key {} on {} spans several columns; each column is treated as its own key",
                    key.name, key.table
                );
            }
            keys.push(key);
        }

        trace!("{:?} foreign keys of {}: {}", direction, table, keys.len());
        Ok(keys)
    }

    async fn table_exists(&self, table: &ShallowTable) -> Result<bool> {
        let count = self
            .count(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 AND TABLE_TYPE = 'BASE TABLE'",
                &[table.schema.as_str(), table.name.as_str()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        let count = self
            .count("SELECT COUNT(*) FROM sys.schemas WHERE name = @P1", &[schema])
            .await?;
        Ok(count > 0)
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        trace!("Executing: {}", statement);
        let result = conn
            .execute(statement, &[])
            .await
            .map_err(|e| CloneError::execution(statement, e))?;
        Ok(result.total())
    }

    async fn stream_rows(
        &self,
        statement: &str,
        columns: &[Column],
        sink: RowSender,
    ) -> Result<()> {
        let mut conn = self.get_conn().await?;
        trace!("Querying: {}", statement);
        let stream = conn
            .simple_query(statement)
            .await
            .map_err(|e| CloneError::execution(statement, e))?;
        let mut rows = stream.into_row_stream();

        let mut closed = false;
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| CloneError::execution(statement, e))?
        {
            // keep draining so the connection goes back to the pool clean
            if closed {
                continue;
            }
            if row.len() != columns.len() {
                return Err(CloneError::execution(
                    statement,
                    format!("expected {} columns, got {}", columns.len(), row.len()),
                ));
            }

            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    convert_row_value(&row, idx, &column.data_type).map(SqlValue::into_owned)
                })
                .collect::<Result<Vec<_>>>()?;
            if sink.send(values).await.is_err() {
                debug!("Row consumer went away, discarding the rest of the result");
                closed = true;
            }
        }
        Ok(())
    }
}
