//! In-memory catalog and table builders for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::identifier::eq_ignore_case;
use crate::core::{
    Catalog, Column, FkDirection, Key, RowSender, Schema, SchemaScope, ShallowTable, SqlValue,
    Table,
};
use crate::error::{CloneError, Result};

/// Builder for test table definitions.
pub struct TableBuilder {
    table: ShallowTable,
    columns: Vec<Column>,
    keys: Vec<Key>,
}

pub fn table(schema: &str, name: &str) -> TableBuilder {
    TableBuilder {
        table: ShallowTable::new(schema, name),
        columns: Vec::new(),
        keys: Vec::new(),
    }
}

impl TableBuilder {
    /// Nullable column.
    pub fn column(mut self, name: &str, data_type: &str, max_length: Option<i32>) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            ordinal_pos: self.columns.len() as i32 + 1,
            default_value: None,
            is_nullable: true,
            data_type: data_type.to_string(),
            max_length,
            precision: None,
            scale: None,
            is_identity: false,
        });
        self
    }

    /// `int IDENTITY NOT NULL` primary key column.
    pub fn identity_pk(mut self, name: &str) -> Self {
        self = self.column(name, "int", None);
        if let Some(column) = self.columns.last_mut() {
            column.is_identity = true;
            column.is_nullable = false;
        }
        let key_name = format!("PK_{}", self.table.name);
        self.keys
            .push(Key::primary(self.table.clone(), name, key_name));
        self
    }

    /// Nullable int column referencing `schema.table(column)`.
    pub fn fk(mut self, name: &str, schema: &str, table: &str, column: &str) -> Self {
        self = self.column(name, "int", None);
        let key_name = format!("FK_{}_{}", self.table.name, name);
        self.keys.push(Key::foreign(
            self.table.clone(),
            name,
            key_name,
            ShallowTable::new(schema, table),
            column,
        ));
        self
    }

    pub fn build(self) -> Table {
        Table::new(self.table, self.columns, self.keys).expect("valid test table")
    }
}

#[derive(Default)]
struct State {
    schemas: Vec<String>,
    tables: Vec<Table>,
    rows: HashMap<ShallowTable, Vec<Vec<SqlValue<'static>>>>,
    executed: Vec<String>,
    fail_on: Option<String>,
}

impl State {
    fn find(&self, table: &ShallowTable) -> Option<&Table> {
        self.tables.iter().find(|t| &t.table == table)
    }

    fn apply(&mut self, statement: &str) -> u64 {
        let mut affected = 0;
        let mut creating: Option<Creating> = None;

        for line in statement.lines() {
            let line = line.trim();
            if let Some(mut table) = creating.take() {
                if line == ");" {
                    if let Ok(created) = Table::new(table.table, table.columns, table.keys) {
                        self.tables.push(created);
                    }
                } else {
                    table.push_column(line);
                    creating = Some(table);
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("CREATE SCHEMA ") {
                if let Some(name) = bracketed(rest).first() {
                    self.schemas.push(name.clone());
                }
            } else if let Some(rest) = line.strip_prefix("DROP TABLE IF EXISTS ") {
                if let [schema, name, ..] = bracketed(rest).as_slice() {
                    let target = ShallowTable::new(schema.as_str(), name.as_str());
                    self.tables.retain(|t| t.table != target);
                    self.rows.remove(&target);
                }
            } else if let Some(rest) = line.strip_prefix("CREATE TABLE ") {
                if let [schema, name, ..] = bracketed(rest).as_slice() {
                    creating = Some(Creating {
                        table: ShallowTable::new(schema.as_str(), name.as_str()),
                        columns: Vec::new(),
                        keys: Vec::new(),
                    });
                }
            } else if let Some(rest) = line.strip_prefix("INSERT ") {
                self.insert(rest);
                affected += 1;
            }
        }
        affected
    }

    /// Store the row of `[s].[t] ([a], [b]) VALUES (..)` when the table exists.
    fn insert(&mut self, statement: &str) {
        let Some((head, values)) = statement.split_once(") VALUES (") else {
            return;
        };
        let names = bracketed(head);
        let [schema, name, columns @ ..] = names.as_slice() else {
            return;
        };
        let target = ShallowTable::new(schema.as_str(), name.as_str());
        let Some(table) = self.find(&target) else {
            return;
        };

        let values = values.strip_suffix(')').unwrap_or(values);
        let row: Vec<SqlValue<'static>> = split_literals(values)
            .iter()
            .zip(columns)
            .map(|(literal, column)| {
                let column = table.columns.iter().find(|c| eq_ignore_case(&c.name, column));
                parse_literal(literal, column)
            })
            .collect();
        self.rows.entry(target).or_default().push(row);
    }
}

/// A CREATE TABLE statement being read line by line.
struct Creating {
    table: ShallowTable,
    columns: Vec<Column>,
    keys: Vec<Key>,
}

impl Creating {
    /// Read `[Name] type(args) IDENTITY NOT NULL ... PRIMARY KEY REFERENCES [s].[t]([c])`.
    fn push_column(&mut self, line: &str) {
        let line = line.trim_end_matches(',');
        let Some((name, rest)) = line.strip_prefix('[').and_then(|l| l.split_once("] ")) else {
            return;
        };
        let type_end = rest.find(['(', ' ']).unwrap_or(rest.len());
        let data_type = &rest[..type_end];
        let mut tail = &rest[type_end..];

        let (mut max_length, mut precision, mut scale) = (None, None, None);
        if let Some((args, after)) = tail.strip_prefix('(').and_then(|t| t.split_once(')')) {
            let args: Vec<&str> = args.split(',').map(str::trim).collect();
            if matches!(data_type.to_lowercase().as_str(), "decimal" | "numeric") {
                precision = args.first().and_then(|p| p.parse().ok());
                scale = args.get(1).and_then(|s| s.parse().ok());
            } else if args[0].eq_ignore_ascii_case("max") {
                max_length = Some(-1);
            } else {
                max_length = args[0].parse().ok();
            }
            tail = after;
        }

        self.columns.push(Column {
            name: name.to_string(),
            ordinal_pos: self.columns.len() as i32 + 1,
            default_value: None,
            is_nullable: !tail.contains(" NOT NULL"),
            data_type: data_type.to_string(),
            max_length,
            precision,
            scale,
            is_identity: tail.contains(" IDENTITY"),
        });

        if tail.contains(" PRIMARY KEY") {
            let key_name = format!("PK_{}", self.table.name);
            self.keys.push(Key::primary(self.table.clone(), name, key_name));
        }
        if let Some((_, reference)) = tail.split_once(" REFERENCES ") {
            if let [schema, table, column, ..] = bracketed(reference).as_slice() {
                let key_name = format!("FK_{}_{}", self.table.name, name);
                self.keys.push(Key::foreign(
                    self.table.clone(),
                    name,
                    key_name,
                    ShallowTable::new(schema.as_str(), table.as_str()),
                    column.as_str(),
                ));
            }
        }
    }
}

/// Split a VALUES list at top-level commas.
fn split_literals(values: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quoted = false;

    for c in values.chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Read back a literal rendered for `column`.
fn parse_literal(literal: &str, column: Option<&Column>) -> SqlValue<'static> {
    if literal == "NULL" {
        return SqlValue::Null;
    }
    if let Some(text) = literal.strip_prefix("N'").and_then(|t| t.strip_suffix('\'')) {
        return SqlValue::from(text.replace("''", "'"));
    }
    if literal.starts_with("CONVERT(varbinary") {
        let digits = literal
            .split_once("'0x")
            .and_then(|(_, rest)| rest.split_once('\''))
            .map(|(digits, _)| digits)
            .unwrap_or_default();
        return hex::decode(digits)
            .map(SqlValue::from)
            .unwrap_or_else(|_| SqlValue::from(literal.to_string()));
    }
    if let Some(rest) = literal.strip_prefix("CONVERT(uniqueidentifier, '") {
        let id = rest.trim_end_matches("')");
        return uuid::Uuid::parse_str(id)
            .map(SqlValue::Uuid)
            .unwrap_or_else(|_| SqlValue::from(literal.to_string()));
    }

    let inner = literal
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(literal);
    let data_type = column.map(|c| c.data_type.to_lowercase()).unwrap_or_default();
    let parsed = match data_type.as_str() {
        "bit" => Some(SqlValue::Bool(inner == "1")),
        "tinyint" => inner.parse().ok().map(SqlValue::U8),
        "smallint" => inner.parse().ok().map(SqlValue::I16),
        "int" => inner.parse().ok().map(SqlValue::I32),
        "bigint" => inner.parse().ok().map(SqlValue::I64),
        "decimal" | "numeric" => inner.parse().ok().map(SqlValue::Decimal),
        _ => None,
    };
    parsed.unwrap_or_else(|| SqlValue::from(inner.to_string()))
}

/// Bracket-quoted identifiers in order of appearance.
fn bracketed(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '[' {
            continue;
        }
        let mut name = String::new();
        while let Some(c) = chars.next() {
            if c == ']' {
                if chars.peek() == Some(&']') {
                    chars.next();
                    name.push(']');
                } else {
                    break;
                }
            } else {
                name.push(c);
            }
        }
        names.push(name);
    }
    names
}

/// A catalog backed by in-memory tables.
///
/// `execute` records every statement and applies CREATE SCHEMA, CREATE TABLE,
/// DROP TABLE IF EXISTS and INSERT, so metadata and row reads reflect earlier
/// statements.
pub struct MemoryCatalog {
    id: String,
    state: Mutex<State>,
    queries: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: Mutex::new(State::default()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_schema(self, schema: &str) -> Self {
        self.state.lock().unwrap().schemas.push(schema.to_string());
        self
    }

    /// Add a table, creating its schema if needed.
    pub fn with_table(self, table: Table) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if !state.schemas.iter().any(|s| table.table.in_schema(s)) {
                state.schemas.push(table.table.schema.clone());
            }
            state.tables.push(table);
        }
        self
    }

    pub fn with_rows(self, table: &ShallowTable, rows: Vec<Vec<SqlValue<'static>>>) -> Self {
        self.state.lock().unwrap().rows.insert(table.clone(), rows);
        self
    }

    /// Make `execute` fail for statements containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().fail_on = Some(pattern.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Rows currently stored for `table`.
    pub fn rows(&self, table: &ShallowTable) -> Vec<Vec<SqlValue<'static>>> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &ShallowTable) -> bool {
        self.state.lock().unwrap().find(table).is_some()
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .schemas
            .iter()
            .any(|s| eq_ignore_case(s, schema))
    }

    /// Number of catalog reads so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn read(&self) -> std::sync::MutexGuard<'_, State> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn default_schema(&self) -> Result<String> {
        Ok("dbo".to_string())
    }

    async fn list_schemas(&self) -> Result<Vec<Schema>> {
        Ok(self.read().schemas.iter().map(Schema::new).collect())
    }

    async fn list_tables(&self, scope: &SchemaScope) -> Result<Vec<ShallowTable>> {
        let mut tables: Vec<ShallowTable> = self
            .read()
            .tables
            .iter()
            .map(|t| t.table.clone())
            .filter(|t| scope.contains(&t.schema))
            .collect();
        tables.sort_by_key(|t| (t.schema.to_lowercase(), t.name.to_lowercase()));
        Ok(tables)
    }

    async fn list_columns(&self, table: &ShallowTable) -> Result<Vec<Column>> {
        Ok(self
            .read()
            .find(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key(&self, table: &ShallowTable) -> Result<Option<Key>> {
        Ok(self
            .read()
            .find(table)
            .and_then(|t| t.primary_key().cloned()))
    }

    async fn list_foreign_keys(
        &self,
        table: &ShallowTable,
        direction: FkDirection,
        scope: &SchemaScope,
    ) -> Result<Vec<Key>> {
        let state = self.read();
        let keys = match direction {
            FkDirection::Descending => state
                .find(table)
                .map(|t| {
                    t.foreign_keys()
                        .filter(|k| k.foreign_table().is_some_and(|f| scope.contains(&f.schema)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            FkDirection::Ascending => state
                .tables
                .iter()
                .filter(|t| scope.contains(&t.table.schema))
                .flat_map(|t| t.foreign_keys())
                .filter(|k| k.foreign_table() == Some(table))
                .cloned()
                .collect(),
        };
        Ok(keys)
    }

    async fn table_exists(&self, table: &ShallowTable) -> Result<bool> {
        Ok(self.read().find(table).is_some())
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.read().schemas.iter().any(|s| eq_ignore_case(s, schema)))
    }

    async fn execute(&self, statement: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if let Some(pattern) = &state.fail_on {
            if statement.contains(pattern.as_str()) {
                return Err(CloneError::execution(statement, "injected failure"));
            }
        }
        state.executed.push(statement.to_string());
        Ok(state.apply(statement))
    }

    async fn stream_rows(
        &self,
        statement: &str,
        _columns: &[Column],
        sink: RowSender,
    ) -> Result<()> {
        let from = statement
            .rsplit_once(" FROM ")
            .map(|(_, rest)| bracketed(rest))
            .unwrap_or_default();
        let [schema, name, ..] = from.as_slice() else {
            return Err(CloneError::execution(statement, "unsupported query"));
        };
        let target = ShallowTable::new(schema.as_str(), name.as_str());

        let rows = self.read().rows.get(&target).cloned().unwrap_or_default();
        for row in rows {
            if sink.send(row).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
