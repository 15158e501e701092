//! Catalog metadata types: tables, columns, keys and traversal options.
//!
//! All of these are read-only snapshots fetched from a [`Catalog`](super::Catalog)
//! for the duration of one operation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identifier::{eq_ignore_case, hash_ignore_case};
use crate::error::{CloneError, Result};

/// Table identity: schema + name, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShallowTable {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl ShallowTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Check whether this table lives in `schema`.
    pub fn in_schema(&self, schema: &str) -> bool {
        eq_ignore_case(&self.schema, schema)
    }

    /// Parse `schema.table`; a bare table name takes `default_schema`.
    pub fn parse(name: &str, default_schema: Option<&str>) -> Result<Self> {
        let parts: Vec<&str> = name.split('.').map(str::trim).collect();
        let table = match parts.as_slice() {
            [table] => match default_schema {
                Some(schema) => Self::new(schema, *table),
                None => {
                    return Err(CloneError::Config(format!(
                        "table '{}' needs a schema (expected schema.table)",
                        name
                    )))
                }
            },
            [schema, table] => Self::new(*schema, *table),
            _ => {
                return Err(CloneError::Config(format!(
                    "invalid table name '{}' (expected schema.table)",
                    name
                )))
            }
        };

        if table.schema.is_empty() || table.name.is_empty() {
            return Err(CloneError::Config(format!(
                "invalid table name '{}' (expected schema.table)",
                name
            )));
        }
        Ok(table)
    }
}

impl PartialEq for ShallowTable {
    fn eq(&self, other: &Self) -> bool {
        eq_ignore_case(&self.schema, &other.schema) && eq_ignore_case(&self.name, &other.name)
    }
}

impl Eq for ShallowTable {}

impl Hash for ShallowTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_ignore_case(&self.schema, state);
        hash_ignore_case(&self.name, state);
    }
}

impl fmt::Display for ShallowTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,

    /// Default expression as stored in the catalog, e.g. `((0))`.
    pub default_value: Option<String>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Data type (e.g., "int", "nvarchar", "decimal").
    pub data_type: String,

    /// Maximum length for string/binary types (-1 for max).
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub precision: Option<i32>,

    /// Numeric scale.
    pub scale: Option<i32>,

    /// Whether the column is an identity column.
    pub is_identity: bool,
}

impl Column {
    /// Check whether this is a decimal-family type that takes precision and scale.
    pub fn is_decimal(&self) -> bool {
        matches!(
            self.data_type.to_lowercase().as_str(),
            "decimal" | "numeric"
        )
    }
}

/// What a [`Key`] record describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Primary key on `Key::column`.
    Primary,

    /// Foreign key from `Key::column` to `table.column`.
    Foreign {
        table: ShallowTable,
        column: String,
    },
}

/// A single-column key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Table that declares the constraint.
    pub table: ShallowTable,

    /// Constrained column.
    pub column: String,

    /// Constraint name.
    pub name: String,

    /// Primary or foreign.
    pub kind: KeyKind,
}

impl Key {
    pub fn primary(table: ShallowTable, column: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
            name: name.into(),
            kind: KeyKind::Primary,
        }
    }

    pub fn foreign(
        table: ShallowTable,
        column: impl Into<String>,
        name: impl Into<String>,
        foreign_table: ShallowTable,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            table,
            column: column.into(),
            name: name.into(),
            kind: KeyKind::Foreign {
                table: foreign_table,
                column: foreign_column.into(),
            },
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self.kind, KeyKind::Primary)
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, KeyKind::Foreign { .. })
    }

    /// Referenced table of a foreign key.
    pub fn foreign_table(&self) -> Option<&ShallowTable> {
        match &self.kind {
            KeyKind::Foreign { table, .. } => Some(table),
            KeyKind::Primary => None,
        }
    }

    /// Check whether this foreign key points back at its own table.
    pub fn is_self_reference(&self) -> bool {
        self.foreign_table() == Some(&self.table)
    }
}

/// Full table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table identity.
    pub table: ShallowTable,

    /// Column definitions ordered by ordinal position.
    pub columns: Vec<Column>,

    /// Primary key (at most one) and outward foreign keys.
    pub keys: Vec<Key>,
}

impl Table {
    /// Build a table, sorting columns by position and checking key invariants.
    pub fn new(table: ShallowTable, mut columns: Vec<Column>, keys: Vec<Key>) -> Result<Self> {
        columns.sort_by_key(|c| c.ordinal_pos);

        if keys.iter().filter(|k| k.is_primary_key()).count() > 1 {
            return Err(CloneError::invalid_definition(
                &table,
                "more than one primary key column (composite keys are not supported)",
            ));
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| eq_ignore_case(&c.name, &column.name))
            {
                return Err(CloneError::invalid_definition(
                    &table,
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }

        Ok(Self {
            table,
            columns,
            keys,
        })
    }

    pub fn primary_key(&self) -> Option<&Key> {
        self.keys.iter().find(|k| k.is_primary_key())
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().filter(|k| k.is_foreign_key())
    }

    /// Check whether any column is an identity column.
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }
}

/// A schema and the tables it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,

    /// Table names, filled on demand.
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: None,
        }
    }
}

/// Which side of a foreign key to look from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FkDirection {
    /// Keys declared on the table, pointing at the tables it references.
    Descending,
    /// Keys declared on other tables, pointing at this table.
    Ascending,
}

/// Foreign-key traversal options for a seed table.
///
/// `descending` follows "this table references X", `ascending` follows
/// "X references this table", `schema` stops descent into tables outside the
/// inspected table's schema. All false means no traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferencedByOptions {
    pub descending: bool,
    pub ascending: bool,
    pub schema: bool,
}

impl ReferencedByOptions {
    pub const DISABLED: Self = Self {
        descending: false,
        ascending: false,
        schema: false,
    };

    pub const DESCENDING: Self = Self {
        descending: true,
        ascending: false,
        schema: false,
    };

    pub const ASCENDING: Self = Self {
        descending: false,
        ascending: true,
        schema: false,
    };

    /// Add the schema restriction.
    pub fn within_schema(mut self) -> Self {
        self.schema = true;
        self
    }

    /// Add the ascending direction.
    pub fn and_ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// Add the descending direction.
    pub fn and_descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// No traversal at all: the seed table only.
    pub fn is_disabled(&self) -> bool {
        *self == Self::DISABLED
    }

    /// Check that a traversal request names a direction.
    pub fn validate(&self) -> Result<()> {
        if !self.ascending && !self.descending {
            return Err(CloneError::Usage(format!(
                "cannot resolve referenced tables with '{}': select descending (references) \
                 and/or ascending (referenced by)",
                self
            )));
        }
        Ok(())
    }
}

impl FromStr for ReferencedByOptions {
    type Err = CloneError;

    fn from_str(s: &str) -> Result<Self> {
        let mut options = Self::DISABLED;
        for flag in s
            .split(|c| c == ',' || c == '|' || c == '+')
            .map(str::trim)
            .filter(|f| !f.is_empty())
        {
            match flag.to_lowercase().as_str() {
                "disabled" | "none" => {}
                "descending" | "full-descend" => options.descending = true,
                "ascending" => options.ascending = true,
                "both" => {
                    options.ascending = true;
                    options.descending = true;
                }
                "schema" => options.schema = true,
                "schema-only" => {
                    options.descending = true;
                    options.schema = true;
                }
                other => {
                    return Err(CloneError::Config(format!(
                        "unknown referenced option '{}' (expected disabled, descending, \
                         ascending, schema)",
                        other
                    )))
                }
            }
        }
        Ok(options)
    }
}

impl TryFrom<String> for ReferencedByOptions {
    type Error = CloneError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ReferencedByOptions> for String {
    fn from(value: ReferencedByOptions) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReferencedByOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            return f.write_str("disabled");
        }
        let flags: Vec<&str> = [
            (self.descending, "descending"),
            (self.ascending, "ascending"),
            (self.schema, "schema"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        f.write_str(&flags.join(","))
    }
}

/// A seed table and how to traverse from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableConfiguration {
    pub table: ShallowTable,
    pub referenced_by: ReferencedByOptions,
}

impl TableConfiguration {
    pub fn new(table: ShallowTable, referenced_by: ReferencedByOptions) -> Self {
        Self {
            table,
            referenced_by,
        }
    }
}

impl fmt::Display for TableConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.referenced_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn make_test_column(name: &str, data_type: &str, pos: i32) -> Column {
        Column {
            name: name.to_string(),
            ordinal_pos: pos,
            default_value: None,
            is_nullable: true,
            data_type: data_type.to_string(),
            max_length: None,
            precision: None,
            scale: None,
            is_identity: false,
        }
    }

    #[test]
    fn test_shallow_table_case_insensitive() {
        let a = ShallowTable::new("Sales", "Orders");
        let b = ShallowTable::new("SALES", "orders");
        assert_eq!(a, b);

        let set: HashSet<_> = [a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_ne!(a, ShallowTable::new("sales2", "Orders"));
        assert_eq!(a.to_string(), "Sales.Orders");
    }

    #[test]
    fn test_parse_table_name() {
        let t = ShallowTable::parse("sales.Orders", None).unwrap();
        assert_eq!(t, ShallowTable::new("sales", "Orders"));

        let t = ShallowTable::parse("Orders", Some("dbo")).unwrap();
        assert_eq!(t.schema, "dbo");

        assert!(ShallowTable::parse("Orders", None).is_err());
        assert!(ShallowTable::parse("a.b.c", None).is_err());
        assert!(ShallowTable::parse(".Orders", None).is_err());
    }

    #[test]
    fn test_table_sorts_columns_by_position() {
        let table = Table::new(
            ShallowTable::new("dbo", "T"),
            vec![
                make_test_column("b", "int", 2),
                make_test_column("a", "int", 1),
            ],
            vec![],
        )
        .unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_table_rejects_two_primary_keys() {
        let t = ShallowTable::new("dbo", "T");
        let result = Table::new(
            t.clone(),
            vec![make_test_column("a", "int", 1), make_test_column("b", "int", 2)],
            vec![
                Key::primary(t.clone(), "a", "PK_T"),
                Key::primary(t.clone(), "b", "PK_T"),
            ],
        );
        assert!(matches!(result, Err(CloneError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_table_rejects_duplicate_columns() {
        let result = Table::new(
            ShallowTable::new("dbo", "T"),
            vec![make_test_column("a", "int", 1), make_test_column("A", "int", 2)],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_self_reference() {
        let t = ShallowTable::new("hr", "Employee");
        let key = Key::foreign(t.clone(), "ManagerId", "FK_mgr", t.clone(), "Id");
        assert!(key.is_self_reference());
        assert!(key.is_foreign_key());

        let other = Key::foreign(t, "DeptId", "FK_dept", ShallowTable::new("hr", "Dept"), "Id");
        assert!(!other.is_self_reference());
    }

    #[test]
    fn test_parse_referenced_options() {
        let o: ReferencedByOptions = "descending".parse().unwrap();
        assert_eq!(o, ReferencedByOptions::DESCENDING);

        let o: ReferencedByOptions = "ascending, schema".parse().unwrap();
        assert!(o.ascending && o.schema && !o.descending);

        let o: ReferencedByOptions = "schema-only".parse().unwrap();
        assert_eq!(o, ReferencedByOptions::DESCENDING.within_schema());

        let o: ReferencedByOptions = "descending|ascending".parse().unwrap();
        assert!(o.ascending && o.descending);

        assert!("disabled".parse::<ReferencedByOptions>().unwrap().is_disabled());
        assert!("".parse::<ReferencedByOptions>().unwrap().is_disabled());
        assert!("sideways".parse::<ReferencedByOptions>().is_err());
    }

    #[test]
    fn test_referenced_options_display_round_trip() {
        let o = ReferencedByOptions::ASCENDING.and_descending().within_schema();
        assert_eq!(o.to_string(), "descending,ascending,schema");
        assert_eq!(o.to_string().parse::<ReferencedByOptions>().unwrap(), o);
        assert_eq!(ReferencedByOptions::DISABLED.to_string(), "disabled");
    }

    #[test]
    fn test_schema_flag_alone_is_a_usage_error() {
        let o = ReferencedByOptions::DISABLED.within_schema();
        assert!(!o.is_disabled());
        assert!(matches!(o.validate(), Err(CloneError::Usage(_))));
        assert!(ReferencedByOptions::ASCENDING.validate().is_ok());
    }
}
