//! Schema scope: which schemas catalog queries and graph traversal may enter.

use std::collections::BTreeSet;
use std::fmt;

use super::identifier::normalize;

/// Either every schema, or a fixed case-insensitive allow-set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaScope {
    /// Accept any schema name.
    #[default]
    All,

    /// Accept only these schemas (stored normalized).
    Only(BTreeSet<String>),
}

impl SchemaScope {
    /// Build a scope from configured names. No names means all schemas.
    pub fn new<I, S>(schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = schemas
            .into_iter()
            .map(|s| normalize(s.as_ref().trim()))
            .filter(|s| !s.is_empty())
            .collect();
        if set.is_empty() {
            SchemaScope::All
        } else {
            SchemaScope::Only(set)
        }
    }

    /// Scope containing exactly one schema.
    pub fn single(schema: &str) -> Self {
        Self::new([schema])
    }

    /// Check whether `schema` is inside the scope.
    pub fn contains(&self, schema: &str) -> bool {
        match self {
            SchemaScope::All => true,
            SchemaScope::Only(set) => set.contains(&normalize(schema)),
        }
    }
}

impl fmt::Display for SchemaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaScope::All => f.write_str("*"),
            SchemaScope::Only(set) => {
                let names: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scope_is_universal() {
        let scope = SchemaScope::new(Vec::<String>::new());
        assert_eq!(scope, SchemaScope::All);
        assert!(scope.contains("anything"));
        assert_eq!(scope.to_string(), "*");
    }

    #[test]
    fn test_scope_is_case_insensitive() {
        let scope = SchemaScope::new(["Sales", "HR"]);
        assert!(scope.contains("sales"));
        assert!(scope.contains("hr"));
        assert!(!scope.contains("dbo"));
        assert_eq!(scope.to_string(), "hr,sales");
    }

    #[test]
    fn test_blank_names_are_ignored() {
        assert_eq!(SchemaScope::new(["", "  "]), SchemaScope::All);
    }
}
