//! T-SQL rendering of table definitions and row data.
//!
//! [`SqlGenerator`] renders CREATE TABLE, DROP TABLE and SELECT statements for
//! a [`Table`], and hands out [`InsertWriter`]s that turn a forward-only row
//! stream into INSERT statements one row at a time.
//!
//! A generator may carry a [`SchemaRename`]. For tables living in the rename's
//! source schema every schema identifier equal to it is rendered as the target
//! schema, including `REFERENCES` targets. Tables in other schemas render
//! unchanged.

pub mod literal;

use std::fmt::Write;

use tracing::trace;

use crate::core::identifier::{eq_ignore_case, qualify_mssql, quote_mssql};
use crate::core::{Column, KeyKind, ShallowTable, SqlValue, Table};
use crate::error::{CloneError, Result};

/// Types whose catalog length must not be rendered as a length clause.
const LENGTHLESS_TYPES: &[&str] = &["text", "ntext", "image", "xml"];

/// Source schema to target schema mapping applied at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRename {
    pub from: String,
    pub to: String,
}

impl SchemaRename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Renders statements for the target of a clone or backup.
#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    rename: Option<SchemaRename>,
}

impl SqlGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rename(rename: Option<SchemaRename>) -> Self {
        Self { rename }
    }

    /// Schema to render for `schema` in statements about `owner`.
    fn map_schema<'a>(&'a self, owner: &ShallowTable, schema: &'a str) -> &'a str {
        match &self.rename {
            Some(r) if owner.in_schema(&r.from) && eq_ignore_case(schema, &r.from) => &r.to,
            _ => schema,
        }
    }

    /// Identity of `table` on the target.
    pub fn target_table(&self, table: &ShallowTable) -> ShallowTable {
        ShallowTable::new(self.map_schema(table, &table.schema), table.name.clone())
    }

    fn qualified_target(&self, table: &ShallowTable) -> Result<String> {
        qualify_mssql(self.map_schema(table, &table.schema), &table.name)
    }

    pub fn create_schema(&self, schema: &str) -> Result<String> {
        Ok(format!("CREATE SCHEMA {}", quote_mssql(schema)?))
    }

    pub fn drop_table(&self, table: &ShallowTable) -> Result<String> {
        Ok(format!("DROP TABLE IF EXISTS {}", self.qualified_target(table)?))
    }

    /// SELECT of the insertable columns from the source table.
    pub fn select_rows(&self, table: &Table) -> Result<String> {
        let columns = insertable_columns(table)
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(CloneError::invalid_definition(
                &table.table,
                "no insertable columns",
            ));
        }
        Ok(format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            qualify_mssql(&table.table.schema, &table.table.name)?
        ))
    }

    /// CREATE TABLE with inline primary and foreign key constraints.
    pub fn create_table(&self, table: &Table) -> Result<String> {
        if table.columns.is_empty() {
            return Err(CloneError::invalid_definition(&table.table, "no columns"));
        }

        let owner = &table.table;
        let primary_key = table.primary_key();
        let mut sql = format!("CREATE TABLE {} (\n", self.qualified_target(owner)?);

        for (i, column) in table.columns.iter().enumerate() {
            sql.push_str("    ");
            self.push_column(&mut sql, table, column)?;

            if primary_key.is_some_and(|pk| eq_ignore_case(&pk.column, &column.name)) {
                sql.push_str(" PRIMARY KEY");
            }

            for key in table
                .foreign_keys()
                .filter(|k| eq_ignore_case(&k.column, &column.name))
            {
                if let KeyKind::Foreign {
                    table: foreign,
                    column: foreign_column,
                } = &key.kind
                {
                    let _ = write!(
                        sql,
                        " REFERENCES {}({})",
                        qualify_mssql(self.map_schema(owner, &foreign.schema), &foreign.name)?,
                        quote_mssql(foreign_column)?
                    );
                }
            }

            sql.push_str(if i + 1 < table.columns.len() { ",\n" } else { "\n" });
        }
        sql.push_str(");");

        trace!("Rendered structure of {}", owner);
        Ok(sql)
    }

    fn push_column(&self, sql: &mut String, table: &Table, column: &Column) -> Result<()> {
        let data_type = column.data_type.to_lowercase();
        let _ = write!(sql, "{} {}", quote_mssql(&column.name)?, column.data_type);

        if let Some(length) = column.max_length {
            if !LENGTHLESS_TYPES.contains(&data_type.as_str()) {
                if length == -1 {
                    sql.push_str("(max)");
                } else {
                    let _ = write!(sql, "({})", length);
                }
            }
        }

        if column.is_decimal() {
            match (column.precision, column.scale) {
                (Some(p), Some(s)) => {
                    let _ = write!(sql, "({}, {})", p, s);
                }
                (Some(p), None) => {
                    let _ = write!(sql, "({})", p);
                }
                (None, Some(_)) => {
                    return Err(CloneError::invalid_definition(
                        &table.table,
                        format!("column '{}' has a scale but no precision", column.name),
                    ))
                }
                (None, None) => {}
            }
        }

        if column.is_identity {
            sql.push_str(" IDENTITY");
        }
        if !column.is_nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default_value {
            let _ = write!(sql, " DEFAULT({})", strip_parens(default));
        }
        Ok(())
    }

    /// Start rendering INSERT statements for `table`.
    pub fn insert_writer<'t>(&self, table: &'t Table) -> Result<InsertWriter<'t>> {
        InsertWriter::new(self, table)
    }

    /// Render INSERT statements for every row of `rows`.
    pub fn render_insert_rows<'v, I>(&self, table: &Table, rows: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: AsRef<[SqlValue<'v>]>,
    {
        let mut writer = self.insert_writer(table)?;
        for row in rows {
            writer.write_row(row.as_ref())?;
        }
        Ok(writer.take_batch().unwrap_or_default())
    }
}

/// Columns that take explicit values on insert.
pub fn insertable_columns(table: &Table) -> impl Iterator<Item = &Column> {
    table.columns.iter().filter(|c| !is_row_version(c))
}

fn is_row_version(column: &Column) -> bool {
    matches!(
        column.data_type.to_lowercase().as_str(),
        "timestamp" | "rowversion"
    )
}

/// Catalog defaults come wrapped in parentheses, e.g. `((0))`; DEFAULT adds its own.
fn strip_parens(default: &str) -> &str {
    let mut inner = default.trim();
    while inner.starts_with('(') && inner.ends_with(')') && balanced(&inner[1..inner.len() - 1]) {
        inner = inner[1..inner.len() - 1].trim();
    }
    inner
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    for c in s.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Renders INSERT statements for a table one row at a time.
///
/// Holds only the text rendered since the last [`drain`](Self::drain) or
/// [`take_batch`](Self::take_batch); rows are not retained after
/// [`write_row`](Self::write_row) returns.
pub struct InsertWriter<'t> {
    table: &'t Table,
    columns: Vec<&'t Column>,
    prefix: String,
    qualified: String,
    identity: bool,
    out: String,
    rows: u64,
}

impl<'t> InsertWriter<'t> {
    fn new(generator: &SqlGenerator, table: &'t Table) -> Result<Self> {
        let columns: Vec<&Column> = insertable_columns(table).collect();
        let names = columns
            .iter()
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?;
        let qualified = generator.qualified_target(&table.table)?;

        Ok(Self {
            table,
            prefix: format!("INSERT {} ({}) VALUES (", qualified, names.join(", ")),
            columns,
            qualified,
            identity: table.has_identity(),
            out: String::new(),
            rows: 0,
        })
    }

    /// Render one row; values are in insertable column order.
    pub fn write_row(&mut self, row: &[SqlValue<'_>]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(CloneError::invalid_definition(
                &self.table.table,
                format!(
                    "row has {} values but {} columns are selected",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }

        self.out.push_str(&self.prefix);
        for (i, (value, column)) in row.iter().zip(&self.columns).enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            literal::push_literal(&mut self.out, value, column);
        }
        self.out.push_str(")\n");
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Bytes of INSERT text waiting to be taken.
    pub fn pending_len(&self) -> usize {
        self.out.len()
    }

    /// `SET IDENTITY_INSERT` toggle for the target table, when it has an
    /// identity column.
    pub fn identity_insert(&self, on: bool) -> Option<String> {
        self.identity.then(|| {
            format!(
                "SET IDENTITY_INSERT {} {}\n",
                self.qualified,
                if on { "ON" } else { "OFF" }
            )
        })
    }

    /// Take the INSERT statements rendered so far, leaving the writer open.
    pub fn drain(&mut self) -> String {
        std::mem::take(&mut self.out)
    }

    /// Take the pending INSERT statements as a batch that can run on its own.
    ///
    /// IDENTITY_INSERT only lasts for the session that set it, so each batch
    /// switches it on and off itself. `None` when nothing is pending.
    pub fn take_batch(&mut self) -> Option<String> {
        if self.out.is_empty() {
            return None;
        }
        let inserts = self.drain();
        Some(match (self.identity_insert(true), self.identity_insert(false)) {
            (Some(on), Some(off)) => format!("{}{}{}", on, inserts, off),
            _ => inserts,
        })
    }
}
