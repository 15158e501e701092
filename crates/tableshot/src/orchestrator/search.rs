//! Column search across the tables of a schema scope.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Catalog, SchemaScope};
use crate::error::Result;

/// A column whose name contains a searched pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub pattern: String,
    /// `schema.table`
    pub table: String,
    pub column: String,
    pub data_type: String,
}

/// Columns whose name contains any of `patterns`, ignoring case.
///
/// Results are grouped by pattern, in pattern order, then by table and
/// column position.
pub async fn find_columns(
    catalog: &dyn Catalog,
    scope: &SchemaScope,
    patterns: &[String],
) -> Result<Vec<ColumnMatch>> {
    let tables = catalog.list_tables(scope).await?;
    let columns = try_join_all(tables.iter().map(|t| catalog.list_columns(t))).await?;
    debug!("Searching {} table(s) for {} pattern(s)", tables.len(), patterns.len());

    let mut matches = Vec::new();
    for pattern in patterns {
        let needle = pattern.to_lowercase();
        for (table, table_columns) in tables.iter().zip(&columns) {
            matches.extend(
                table_columns
                    .iter()
                    .filter(|c| c.name.to_lowercase().contains(&needle))
                    .map(|c| ColumnMatch {
                        pattern: pattern.clone(),
                        table: table.to_string(),
                        column: c.name.clone(),
                        data_type: c.data_type.clone(),
                    }),
            );
        }
    }
    Ok(matches)
}
