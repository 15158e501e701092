//! Clone orchestrator - resolves, drops and copies tables in dependency order.

mod backup;
mod rows;
mod search;

pub use backup::{Exporter, BATCH_SEPARATOR, SINGLE_FILE_NAME};
pub use rows::DEFAULT_BATCH_BYTES;
pub use search::{find_columns, ColumnMatch};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::identifier::eq_ignore_case;
use crate::core::{Catalog, FkDirection, SchemaScope, ShallowTable, TableConfiguration};
use crate::error::{CloneError, Result};
use crate::graph::{expand_wildcards, CyclePolicy, DependencyResolver};
use crate::sqlgen::{SchemaRename, SqlGenerator};

use rows::{copy_rows, BatchSink};

/// What to clone and how.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Seed tables with their traversal flags.
    pub tables: Vec<TableConfiguration>,

    /// Schemas traversal may enter.
    pub scope: SchemaScope,

    /// Schema renamed on the target. Must be given together with `target_schema`.
    pub source_schema: Option<String>,

    pub target_schema: Option<String>,

    pub create_missing_schemas: bool,

    /// In a same-connection clone, leave tables outside the source schema alone.
    pub skip_shared_tables: bool,

    /// Refuse to drop a table another table still references.
    pub check_referenced_tables: bool,

    pub cycles: CyclePolicy,

    /// INSERT text sent to the target per batch.
    pub batch_bytes: usize,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            scope: SchemaScope::All,
            source_schema: None,
            target_schema: None,
            create_missing_schemas: false,
            skip_shared_tables: true,
            check_referenced_tables: false,
            cycles: CyclePolicy::default(),
            batch_bytes: DEFAULT_BATCH_BYTES,
        }
    }
}

impl CloneOptions {
    /// Options described by a configuration file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let clone = &config.clone;
        Ok(Self {
            tables: config.table_configurations()?,
            scope: config.scope(),
            source_schema: clone.source_schema.clone(),
            target_schema: clone.target_schema.clone(),
            create_missing_schemas: clone.create_missing_schemas,
            skip_shared_tables: clone.skip_shared_tables,
            check_referenced_tables: clone.check_referenced_tables,
            cycles: CyclePolicy::from_strict(clone.fail_on_cycle),
            batch_bytes: clone.batch_bytes,
        })
    }

    /// Check option combinations. Needs no catalog access.
    pub fn validate(&self, same_connection: bool) -> Result<()> {
        if self.tables.is_empty() {
            return Err(CloneError::Usage("no tables to clone".into()));
        }
        if self.batch_bytes == 0 {
            return Err(CloneError::Usage("batch size must be at least one byte".into()));
        }
        for config in &self.tables {
            if !config.referenced_by.is_disabled() {
                config.referenced_by.validate()?;
            }
        }

        match (&self.source_schema, &self.target_schema) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(CloneError::Usage(
                    "source and target schema must be given together".into(),
                ))
            }
            (Some(from), Some(to)) if same_connection && eq_ignore_case(from, to) => {
                return Err(CloneError::Usage(format!(
                    "source and target are the same database; target schema must differ from '{}'",
                    from
                )))
            }
            (None, None) if same_connection => {
                return Err(CloneError::Usage(
                    "source and target are the same database; a source and target schema are required"
                        .into(),
                ))
            }
            _ => {}
        }

        if same_connection && !self.skip_shared_tables {
            warn!("Shared tables are not skipped: tables outside the source schema will be dropped and recreated in place");
        }
        Ok(())
    }

    /// Source and target schema when both are set and differ.
    pub fn rename(&self) -> Option<SchemaRename> {
        match (&self.source_schema, &self.target_schema) {
            (Some(from), Some(to)) if !eq_ignore_case(from, to) => {
                Some(SchemaRename::new(from.clone(), to.clone()))
            }
            _ => None,
        }
    }
}

/// One table written to the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopiedTable {
    pub source: String,
    pub target: String,
    pub rows: u64,
}

/// Result of a clone run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneReport {
    /// Unique run identifier.
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Source and target are the same database.
    pub same_connection: bool,

    /// Tables in dependency order.
    pub tables_resolved: Vec<String>,

    pub schemas_created: Vec<String>,

    /// Target tables dropped, in drop order.
    pub tables_dropped: Vec<String>,

    pub tables_copied: Vec<CopiedTable>,

    /// Shared tables left untouched on the target.
    pub shared_tables_skipped: Vec<String>,

    pub rows_copied: u64,
}

impl CloneReport {
    fn new(same_connection: bool, tables: &[ShallowTable]) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            same_connection,
            tables_resolved: tables.iter().map(ToString::to_string).collect(),
            schemas_created: Vec::new(),
            tables_dropped: Vec::new(),
            tables_copied: Vec::new(),
            shared_tables_skipped: Vec::new(),
            rows_copied: 0,
        }
    }

    /// Whether anything has been written to the target.
    pub fn has_changes(&self) -> bool {
        !(self.schemas_created.is_empty()
            && self.tables_dropped.is_empty()
            && self.tables_copied.is_empty())
    }

    /// Wrap a failure once the target has been modified.
    fn abort(&self, at: impl ToString, err: CloneError) -> CloneError {
        if !self.has_changes() {
            return err;
        }
        CloneError::Aborted {
            table: at.to_string(),
            applied: self.tables_copied.len(),
            source: Box::new(err),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Clones tables from a source catalog to a target catalog.
///
/// Source and target may be the same database; tables are then cloned into
/// a different schema of that database.
pub struct Cloner {
    source: Arc<dyn Catalog>,
    target: Arc<dyn Catalog>,
    options: CloneOptions,
}

impl Cloner {
    pub fn new(source: Arc<dyn Catalog>, target: Arc<dyn Catalog>, options: CloneOptions) -> Self {
        Self {
            source,
            target,
            options,
        }
    }

    pub fn same_connection(&self) -> bool {
        self.source.connection_id() == self.target.connection_id()
    }

    /// Reject invalid option combinations before touching either database.
    pub fn validate(&self) -> Result<()> {
        self.options.validate(self.same_connection())
    }

    /// Tables to clone in dependency order.
    pub async fn resolve(&self) -> Result<Vec<ShallowTable>> {
        let opts = &self.options;
        let seeds = expand_wildcards(self.source.as_ref(), &opts.tables, &opts.scope).await?;
        DependencyResolver::new(self.source.as_ref(), &opts.scope)
            .with_cycle_policy(opts.cycles)
            .resolve_all(&seeds)
            .await
    }

    /// Whether `table` is pre-existing infrastructure the clone must not touch.
    fn is_shared(&self, table: &ShallowTable) -> bool {
        self.same_connection()
            && self.options.skip_shared_tables
            && self
                .options
                .source_schema
                .as_deref()
                .is_some_and(|schema| !table.in_schema(schema))
    }

    /// Run the clone.
    ///
    /// Stops at the first failure. Nothing is rolled back: once the target has
    /// been modified the failure is returned as [`CloneError::Aborted`].
    pub async fn run(&self) -> Result<CloneReport> {
        let start = Instant::now();
        self.validate()?;

        let generator = SqlGenerator::with_rename(self.options.rename());

        info!("Phase 1: Resolving tables");
        let tables = self.resolve().await?;
        let mut report = CloneReport::new(self.same_connection(), &tables);
        info!("Cloning {} table(s)", tables.len());

        info!("Phase 2: Ensuring target schemas");
        for schema in self.required_schemas(&generator, &tables) {
            let created = self
                .ensure_schema(&generator, &schema)
                .await
                .map_err(|e| report.abort(format!("schema {}", schema), e))?;
            if created {
                report.schemas_created.push(schema);
            }
        }

        info!("Phase 3: Dropping target tables");
        for table in tables.iter().rev() {
            if self.is_shared(table) {
                debug!("{} is shared, not dropping", table);
                continue;
            }
            let target = generator.target_table(table);
            let dropped = self
                .drop_table(&generator, table, &target)
                .await
                .map_err(|e| report.abort(&target, e))?;
            if dropped {
                report.tables_dropped.push(target.to_string());
            }
        }

        info!("Phase 4: Copying tables");
        for table in &tables {
            if self.is_shared(table) {
                let exists = self
                    .target
                    .table_exists(table)
                    .await
                    .map_err(|e| report.abort(table, e))?;
                if exists {
                    debug!("{} is shared and exists, skipping", table);
                    report.shared_tables_skipped.push(table.to_string());
                    continue;
                }
            }

            let target = generator.target_table(table);
            let rows = self
                .copy_table(&generator, table)
                .await
                .map_err(|e| report.abort(&target, e))?;
            info!("Copied {} -> {} ({} rows)", table, target, rows);

            report.rows_copied += rows;
            report.tables_copied.push(CopiedTable {
                source: table.to_string(),
                target: target.to_string(),
                rows,
            });
        }

        report.completed_at = Utc::now();
        report.duration_seconds = start.elapsed().as_secs_f64();
        info!(
            "Clone complete: {} table(s), {} row(s) in {:.2}s",
            report.tables_copied.len(),
            report.rows_copied,
            report.duration_seconds
        );
        Ok(report)
    }

    /// Distinct target schemas of `tables`, plus the configured target schema.
    fn required_schemas(&self, generator: &SqlGenerator, tables: &[ShallowTable]) -> Vec<String> {
        let mut schemas: Vec<String> = Vec::new();
        let candidates = tables
            .iter()
            .map(|t| generator.target_table(t).schema)
            .chain(self.options.target_schema.clone());

        for schema in candidates {
            if !schemas.iter().any(|s| eq_ignore_case(s, &schema)) {
                schemas.push(schema);
            }
        }
        schemas
    }

    async fn ensure_schema(&self, generator: &SqlGenerator, schema: &str) -> Result<bool> {
        if self.target.schema_exists(schema).await? {
            return Ok(false);
        }
        if !self.options.create_missing_schemas {
            return Err(CloneError::schema_not_found(schema));
        }

        info!("Creating schema {}", schema);
        self.target.execute(&generator.create_schema(schema)?).await?;
        Ok(true)
    }

    async fn drop_table(
        &self,
        generator: &SqlGenerator,
        table: &ShallowTable,
        target: &ShallowTable,
    ) -> Result<bool> {
        if !self.target.table_exists(target).await? {
            return Ok(false);
        }

        if self.options.check_referenced_tables {
            let referencing = self
                .target
                .list_foreign_keys(target, FkDirection::Ascending, &SchemaScope::All)
                .await?;
            if let Some(key) = referencing.iter().find(|k| !k.is_self_reference()) {
                return Err(CloneError::ReferentialIntegrity {
                    table: target.to_string(),
                    referencing: key.table.to_string(),
                    key: key.name.clone(),
                });
            }
        }

        debug!("Dropping {}", target);
        self.target.execute(&generator.drop_table(table)?).await?;
        Ok(true)
    }

    /// Create `table` on the target and copy its rows. Returns the row count.
    async fn copy_table(&self, generator: &SqlGenerator, table: &ShallowTable) -> Result<u64> {
        let definition = self.source.load_table(table).await?;
        self.target.execute(&generator.create_table(&definition)?).await?;

        let mut batches = TargetBatches {
            target: self.target.as_ref(),
            sent: 0,
        };
        let rows = copy_rows(
            self.source.as_ref(),
            generator,
            &definition,
            self.options.batch_bytes,
            &mut batches,
        )
        .await?;
        debug!("{}: {} row(s) in {} batch(es)", table, rows, batches.sent);
        Ok(rows)
    }
}

/// Executes INSERT batches on the target as they fill.
struct TargetBatches<'a> {
    target: &'a dyn Catalog,
    sent: usize,
}

#[async_trait]
impl BatchSink for TargetBatches<'_> {
    async fn write_batch(&mut self, batch: String) -> Result<()> {
        self.target.execute(&batch).await?;
        self.sent += 1;
        Ok(())
    }
}
