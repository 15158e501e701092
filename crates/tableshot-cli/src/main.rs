//! tableshot CLI - clone SQL Server tables along their foreign keys.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tableshot::graph::expand_wildcards;
use tableshot::{
    find_columns, Catalog, CloneError, CloneOptions, Cloner, Config, CyclePolicy,
    DependencyResolver, Exporter, MssqlCatalog, ReferencedByOptions, ShallowTable,
    TableConfiguration,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "tableshot")]
#[command(about = "Clone SQL Server tables, structure and data, along their foreign keys")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables linked to a table (or to the configured tables) in dependency order
    Resolve {
        /// Table as schema.table; a bare name uses the default schema
        table: Option<String>,

        /// Traversal flags, e.g. descending, ascending, "descending,schema"
        #[arg(short, long, default_value = "descending")]
        referenced: String,

        /// Fail on dependency cycles
        #[arg(long)]
        strict_cycles: bool,
    },

    /// Write the configured tables, structure and data, to SQL files
    Export {
        /// Write everything to this file
        #[arg(short, long, conflicts_with = "directory", required_unless_present = "directory")]
        output: Option<PathBuf>,

        /// Write one file per table into this directory
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Structure only, no data
        #[arg(short, long)]
        structure: bool,

        /// With --directory, write a single file instead of one per table
        #[arg(long, requires = "directory")]
        single_file: bool,
    },

    /// Clone the configured tables into the target
    Clone {
        /// Create schemas missing on the target
        #[arg(long)]
        create_missing: bool,

        /// Refuse to drop tables still referenced by foreign keys
        #[arg(long)]
        check_referenced: bool,

        /// Fail on dependency cycles
        #[arg(long)]
        strict_cycles: bool,

        /// Override source schema
        #[arg(long, requires = "target_schema")]
        source_schema: Option<String>,

        /// Override target schema
        #[arg(long, requires = "source_schema")]
        target_schema: Option<String>,
    },

    /// Replay a split backup directory against the target
    Import {
        /// Directory of <index>_<name>.sql files
        directory: PathBuf,
    },

    /// List the schemas of the source database
    Schemas {
        /// Also list the tables of each schema
        #[arg(long)]
        tables: bool,
    },

    /// Find columns whose name contains a pattern
    Find {
        /// Patterns, matched case-insensitively
        #[arg(required = true)]
        patterns: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CloneError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Resolve {
            table,
            referenced,
            strict_cycles,
        } => {
            let options: ReferencedByOptions = referenced.parse()?;
            let policy = CyclePolicy::from_strict(strict_cycles || config.clone.fail_on_cycle);
            let source = MssqlCatalog::connect(&config.source).await?;
            let scope = config.scope();

            let seeds = match table {
                Some(name) => {
                    let default_schema = source.default_schema().await?;
                    let table = ShallowTable::parse(&name, Some(&default_schema))?;
                    vec![TableConfiguration::new(table, options)]
                }
                None => config.table_configurations()?,
            };
            if seeds.is_empty() {
                return Err(CloneError::Usage(
                    "no table given and none configured".to_string(),
                ));
            }

            let seeds = expand_wildcards(&source, &seeds, &scope).await?;
            let tables = DependencyResolver::new(&source, &scope)
                .with_cycle_policy(policy)
                .resolve_all(&seeds)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{}", table);
                }
            }
        }

        Commands::Export {
            output,
            directory,
            structure,
            single_file,
        } => {
            let source = MssqlCatalog::connect(&config.source).await?;
            let tables = resolve_configured(&source, &config).await?;
            let exporter = Exporter::new(&source).with_batch_bytes(config.clone.batch_bytes);

            let written = match (output, directory) {
                (Some(path), _) => {
                    exporter.export_to_file(&path, &tables, structure).await?;
                    vec![path]
                }
                (None, Some(dir)) => {
                    exporter
                        .export_to_directory(&dir, &tables, !single_file, structure)
                        .await?
                }
                (None, None) => {
                    return Err(CloneError::Usage(
                        "one of --output or --directory is required".to_string(),
                    ))
                }
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&written)?);
            } else {
                println!("Exported {} table(s):", tables.len());
                for path in &written {
                    println!("  {}", path.display());
                }
            }
        }

        Commands::Clone {
            create_missing,
            check_referenced,
            strict_cycles,
            source_schema,
            target_schema,
        } => {
            // Apply overrides
            if source_schema.is_some() {
                config.clone.source_schema = source_schema;
                config.clone.target_schema = target_schema;
            }
            config.clone.create_missing_schemas |= create_missing;
            config.clone.check_referenced_tables |= check_referenced;
            config.clone.fail_on_cycle |= strict_cycles;

            let options = CloneOptions::from_config(&config)?;
            options.validate(config.same_connection())?;

            let source: Arc<dyn Catalog> = Arc::new(MssqlCatalog::connect(&config.source).await?);
            let target: Arc<dyn Catalog> = match &config.target {
                Some(target) if !config.same_connection() => {
                    Arc::new(MssqlCatalog::connect(target).await?)
                }
                _ => source.clone(),
            };

            let report = Cloner::new(source, target, options).run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nClone completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Tables resolved: {}", report.tables_resolved.len());
                if !report.schemas_created.is_empty() {
                    println!("  Schemas created: {}", report.schemas_created.join(", "));
                }
                println!("  Tables dropped: {}", report.tables_dropped.len());
                println!("  Tables copied: {}", report.tables_copied.len());
                if !report.shared_tables_skipped.is_empty() {
                    println!(
                        "  Shared tables skipped: {}",
                        report.shared_tables_skipped.join(", ")
                    );
                }
                println!("  Rows: {}", report.rows_copied);
            }
        }

        Commands::Import { directory } => {
            let server = config.target.as_ref().unwrap_or(&config.source);
            let target = MssqlCatalog::connect(server).await?;
            let imported = Exporter::new(&target)
                .import_from_directory(&directory)
                .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&imported)?);
            } else {
                println!("Imported {} file(s)", imported.len());
            }
        }

        Commands::Schemas { tables } => {
            let source = MssqlCatalog::connect(&config.source).await?;
            let scope = config.scope();
            let mut schemas = source.list_schemas().await?;
            schemas.retain(|s| scope.contains(&s.name));
            if tables {
                for schema in &mut schemas {
                    source.populate_schema(schema).await?;
                }
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&schemas)?);
            } else {
                for schema in &schemas {
                    println!("{}", schema.name);
                    for table in schema.tables.iter().flatten() {
                        println!("  {}", table);
                    }
                }
            }
        }

        Commands::Find { patterns } => {
            let source = MssqlCatalog::connect(&config.source).await?;
            let matches = find_columns(&source, &config.scope(), &patterns).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                for m in &matches {
                    println!("{}: {}.{} ({})", m.pattern, m.table, m.column, m.data_type);
                }
            }
        }
    }

    Ok(())
}

/// Configured tables, wildcards expanded, in dependency order.
async fn resolve_configured(
    catalog: &MssqlCatalog,
    config: &Config,
) -> Result<Vec<ShallowTable>, CloneError> {
    let seeds = config.table_configurations()?;
    if seeds.is_empty() {
        return Err(CloneError::Usage("no tables configured".to_string()));
    }

    let scope = config.scope();
    let seeds = expand_wildcards(catalog, &seeds, &scope).await?;
    DependencyResolver::new(catalog, &scope)
        .with_cycle_policy(CyclePolicy::from_strict(config.clone.fail_on_cycle))
        .resolve_all(&seeds)
        .await
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr so stdout stays clean for --output-json
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
