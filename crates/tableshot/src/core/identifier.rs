//! Identifier handling: SQL Server quoting and case-insensitive comparison.
//!
//! SQL Server resolves schema and table names case-insensitively under the
//! default collations, so every map key, set member and equality check on a
//! name goes through the helpers here rather than ad hoc `to_lowercase` calls.
//!
//! Identifiers cannot be bound as query parameters, so generated DDL and DML
//! quote every name with brackets after validating it.

use std::hash::{Hash, Hasher};

use crate::error::{CloneError, Result};

/// SQL Server identifier limit (sysname is nvarchar(128)).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding the SQL Server length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CloneError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CloneError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CloneError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a SQL Server table name with its schema.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

/// Normalized (lowercased) form of a name, used for owned set members.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive name equality.
pub fn eq_ignore_case(left: &str, right: &str) -> bool {
    left.chars()
        .flat_map(char::to_lowercase)
        .eq(right.chars().flat_map(char::to_lowercase))
}

/// Feed the case-folded characters of `name` into `state`.
///
/// Consistent with [`eq_ignore_case`]: names equal under it hash equally.
pub fn hash_ignore_case<H: Hasher>(name: &str, state: &mut H) {
    for c in name.chars().flat_map(char::to_lowercase) {
        c.hash(state);
    }
    // terminator so ("ab", "c") and ("a", "bc") hash differently
    0xffu8.hash(state);
}
