//! sql-migrator CLI - reversible schema migrations across SQL dialects.

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sql_migrator::{
    AliasRegistry, Config, DriverCatalog, MigrateError, MigrateOutcome, MigrateTarget,
    MigrationEngine, SchemaChange, TableSchema, TracingSink,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit code after Ctrl-C; any open transaction is rolled back by the engine.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "sql-migrator")]
#[command(about = "Reversible schema migrations for MySQL, SQL Server, Oracle, Snowflake and SQLite")]
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

    /// Log verbosity: debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

/// How far an `up` or `down` goes.
#[derive(Args)]
struct TargetArgs {
    /// Number of migrations to apply or revert
    #[arg(long, conflicts_with = "until")]
    steps: Option<usize>,

    /// Stop after the migration with this title (inclusive)
    #[arg(long)]
    until: Option<String>,
}

impl TargetArgs {
    fn target(self, default_steps: usize) -> MigrateTarget {
        match (self.until, self.steps) {
            (Some(title), _) => MigrateTarget::Until(title),
            (None, Some(n)) => MigrateTarget::Steps(n),
            (None, None) => MigrateTarget::Steps(default_steps),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the alias' database if missing, then its migration ledger
    Init { alias: String },

    /// Drop the alias' database
    Clean {
        alias: String,

        /// Required; the database and all its data are removed
        #[arg(long, short)]
        force: bool,
    },

    /// Create an empty migration
    Create { alias: String },

    /// List migrations with their applied state
    List { alias: String },

    /// Apply pending migrations (all by default)
    Up {
        alias: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Revert applied migrations (the latest by default)
    Down {
        alias: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Delete a migration, reverting it first when it is the latest applied
    Delete { alias: String, title: String },

    /// Print the SQL of a migration
    ToSql { alias: String, title: String },

    /// Show columns, indexes and relations of a table
    Introspect { alias: String, table: String },

    /// Print the DDL a change file would generate, without recording it
    Plan {
        alias: String,
        /// YAML or JSON file holding one schema change
        change: PathBuf,
    },

    /// Record and apply a change file as a new migration
    Apply {
        alias: String,
        /// YAML or JSON file holding one schema change
        change: PathBuf,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    tokio::select! {
        result = run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e.format_detailed());
                ExitCode::from(e.exit_code())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nReceived Ctrl-C. Pending work was rolled back.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let registry = Arc::new(AliasRegistry::new(
        Arc::new(config),
        Arc::new(DriverCatalog::with_builtins()),
    ));
    let engine = MigrationEngine::from_registry(registry)
        .await?
        .with_telemetry(Arc::new(TracingSink));

    let result = execute(&engine, cli.command, cli.output_json).await;
    engine.close().await;
    result
}

async fn execute(engine: &MigrationEngine, command: Commands, json: bool) -> Result<(), MigrateError> {
    match command {
        Commands::Init { alias } => {
            let outcome = engine.init_alias(&alias).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Initialized '{}':", outcome.alias);
                println!(
                    "  Database: {} ({})",
                    outcome.database,
                    if outcome.database_created { "created" } else { "exists" }
                );
                println!(
                    "  Ledger: {} ({})",
                    engine.ledger().table(),
                    if outcome.ledger_created { "created" } else { "exists" }
                );
            }
        }

        Commands::Clean { alias, force } => {
            if !force {
                return Err(MigrateError::Config(format!(
                    "Refusing to drop the database of '{}' without --force",
                    alias
                )));
            }
            engine.clean_alias(&alias).await?;
            if json {
                println!("{}", json!({ "alias": alias, "dropped": true }));
            } else {
                println!("Dropped database of '{}'", alias);
            }
        }

        Commands::Create { alias } => {
            let unit = engine.migrations_create(&alias).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&unit)?);
            } else {
                println!("Created {}", unit.title);
                println!("        {}", unit.title_down);
            }
        }

        Commands::List { alias } => {
            let outcome = engine.migrations_list(&alias).await?;
            print_outcome(&alias, &outcome, "Listed", json)?;
        }

        Commands::Up { alias, target } => {
            let outcome = engine.migrate(&alias, target.target(usize::MAX)).await?;
            print_outcome(&alias, &outcome, "Applied", json)?;
        }

        Commands::Down { alias, target } => {
            let outcome = engine.migrations_down(&alias, target.target(1)).await?;
            print_outcome(&alias, &outcome, "Reverted", json)?;
        }

        Commands::Delete { alias, title } => {
            let outcome = engine.migrations_delete(&alias, &title).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "deleted": title,
                        "reverted": outcome.applied_titles,
                    }))?
                );
            } else {
                for reverted in &outcome.applied_titles {
                    println!("Reverted {}", reverted);
                }
                println!("Deleted {}", title);
            }
        }

        Commands::ToSql { alias, title } => {
            let (up, down) = engine.migrations_to_sql(&alias, &title).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&json!({ "up": up, "down": down }))?);
            } else {
                println!("-- up\n{}", up);
                println!("-- down\n{}", down);
            }
        }

        Commands::Introspect { alias, table } => {
            let schema = engine.introspect(&alias, &table).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                print_schema(&schema);
            }
        }

        Commands::Plan { alias, change } => {
            let change = load_change(&change)?;
            let ddl = engine.plan_change(&alias, &change).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ddl)?);
            } else {
                println!("-- up");
                for statement in &ddl.up {
                    println!("{};", statement.sql());
                }
                println!("-- down");
                for statement in &ddl.down {
                    println!("{};", statement.sql());
                }
            }
        }

        Commands::Apply { alias, change } => {
            let change = load_change(&change)?;
            let ddl = engine.apply_structural_change(&alias, &change).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ddl)?);
            } else {
                println!(
                    "Applied {} on '{}' ({} statements, {} to revert)",
                    change.operation(),
                    alias,
                    ddl.up.len(),
                    ddl.down.len()
                );
            }
        }

        Commands::HealthCheck => {
            let result = engine.health_check().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for alias in &result.aliases {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        alias.alias,
                        alias.db_type,
                        if alias.connected { "OK" } else { "FAILED" },
                        alias.latency_ms
                    );
                    if let Some(ref version) = alias.version {
                        println!("    Version: {}", version);
                    }
                    if let Some(ref err) = alias.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Connection("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn load_change(path: &Path) -> Result<SchemaChange, MigrateError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn print_outcome(
    alias: &str,
    outcome: &MigrateOutcome,
    verb: &str,
    json: bool,
) -> Result<(), MigrateError> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if verb != "Listed" {
        if outcome.applied_titles.is_empty() {
            println!("Nothing to do on '{}'", alias);
        } else {
            println!("{} {} migration(s) on '{}':", verb, outcome.applied_titles.len(), alias);
            for title in &outcome.applied_titles {
                println!("  {}", title);
            }
        }
        return Ok(());
    }

    println!("Migrations for '{}':", alias);
    for unit in &outcome.listing {
        println!("  [{}] {}", if unit.applied { "x" } else { " " }, unit.title);
    }
    println!("\n  Pending: {}", outcome.pending);
    Ok(())
}

fn print_schema(schema: &TableSchema) {
    println!("Table {}:", schema.table);
    for col in &schema.columns {
        let mut line = format!("  {} {}", col.name, col.data_type);
        if let Some(ref precision) = col.precision {
            match col.scale {
                Some(ref scale) => line.push_str(&format!("({},{})", precision, scale)),
                None => line.push_str(&format!("({})", precision)),
            }
        }
        if col.required {
            line.push_str(" NOT NULL");
        }
        if col.primary_key {
            line.push_str(" PK");
        }
        if col.auto_increment {
            line.push_str(" AI");
        }
        if let Some(ref default) = col.default {
            line.push_str(&format!(" DEFAULT {}", default));
        }
        println!("{}", line);
    }
    for index in &schema.indexes {
        println!(
            "  index {} ({}){}",
            index.name,
            index.column_names().join(", "),
            if index.non_unique { "" } else { " UNIQUE" }
        );
    }
    for rel in &schema.relations {
        println!(
            "  relation {} -> {}.{}",
            rel.column, rel.parent_table, rel.parent_column
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}
