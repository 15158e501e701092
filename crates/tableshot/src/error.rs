//! Error types for the clone library.

use thiserror::Error;

/// Longest statement excerpt rendered in an error message.
const STATEMENT_PREVIEW_CHARS: usize = 2000;

/// Main error type for catalog, resolve and clone operations.
#[derive(Error, Debug)]
pub enum CloneError {
    /// Configuration error (invalid YAML values, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid option combination, rejected before any catalog access.
    #[error("Usage error: {0}")]
    Usage(String),

    /// A schema or table does not exist and cannot be created.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A table is still referenced by a foreign key and may not be dropped.
    #[error("Table {table} is referenced by foreign key {key} on {referencing}")]
    ReferentialIntegrity {
        table: String,
        referencing: String,
        key: String,
    },

    /// The dependency graph contains a cycle and strict ordering was requested.
    #[error("Dependency cycle detected at {item}")]
    Cycle { item: String },

    /// The target rejected a generated statement.
    #[error("Statement failed: {message}\n  Statement: {}", preview(.statement))]
    Execution { statement: String, message: String },

    /// A table definition cannot be rendered.
    #[error("Invalid definition for {table}: {message}")]
    InvalidDefinition { table: String, message: String },

    /// Driver error outside statement execution (connect, metadata query)
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A clone stopped part way; earlier tables remain applied on the target.
    #[error("Clone aborted at {table} after {applied} table(s) were applied; the target is partially cloned")]
    Aborted {
        table: String,
        applied: usize,
        #[source]
        source: Box<CloneError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloneError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CloneError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Execution error for a rejected statement.
    pub fn execution(statement: impl Into<String>, message: impl ToString) -> Self {
        CloneError::Execution {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create an InvalidDefinition error.
    pub fn invalid_definition(table: impl ToString, message: impl Into<String>) -> Self {
        CloneError::InvalidDefinition {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn schema_not_found(name: impl Into<String>) -> Self {
        CloneError::NotFound {
            kind: "Schema",
            name: name.into(),
        }
    }

    pub fn table_not_found(name: impl ToString) -> Self {
        CloneError::NotFound {
            kind: "Table",
            name: name.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CloneError::Config(_) | CloneError::Usage(_) | CloneError::Yaml(_) => 1,
            CloneError::Database(_) | CloneError::Pool { .. } => 2,
            CloneError::Execution { .. } | CloneError::InvalidDefinition { .. } => 3,
            CloneError::NotFound { .. } => 4,
            CloneError::ReferentialIntegrity { .. } => 5,
            CloneError::Cycle { .. } => 6,
            CloneError::Io(_) | CloneError::Json(_) => 7,
            CloneError::Aborted { source, .. } => source.exit_code(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn preview(statement: &str) -> String {
    match statement.char_indices().nth(STATEMENT_PREVIEW_CHARS) {
        Some((cut, _)) => format!(
            "{}... ({} bytes total)",
            &statement[..cut],
            statement.len()
        ),
        None => statement.to_string(),
    }
}

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, CloneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_keeps_full_statement() {
        let statement = "INSERT [sales].[Orders] ([Id]) VALUES ('1')".repeat(100);
        let err = CloneError::execution(statement.clone(), "constraint violation");

        match &err {
            CloneError::Execution { statement: s, .. } => assert_eq!(s, &statement),
            other => panic!("unexpected error: {other:?}"),
        }

        let message = err.to_string();
        assert!(message.contains("constraint violation"));
        assert!(message.contains("bytes total"));
        assert!(message.len() < statement.len());
    }

    #[test]
    fn test_short_statement_is_not_truncated() {
        let err = CloneError::execution("DROP TABLE IF EXISTS [a].[b]", "boom");
        assert!(err.to_string().ends_with("DROP TABLE IF EXISTS [a].[b]"));
    }

    #[test]
    fn test_aborted_reports_inner_cause() {
        let err = CloneError::Aborted {
            table: "sales.Orders".into(),
            applied: 2,
            source: Box::new(CloneError::table_not_found("sales.Orders")),
        };

        let detailed = err.format_detailed();
        assert!(detailed.contains("after 2 table(s)"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("Table not found: sales.Orders"));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CloneError::Usage("x".into()).exit_code(), 1);
        assert_eq!(CloneError::Cycle { item: "a".into() }.exit_code(), 6);
        assert_eq!(
            CloneError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")).exit_code(),
            7
        );
    }
}
