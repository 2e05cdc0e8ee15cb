//! oxide-schema CLI
//!
//! Command-line tool for rendering schema descriptions and migrating
//! SQLite databases towards them.

use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::*;

/// SQLite schema model and additive auto-migrations.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file (`:memory:` for an in-memory database).
    #[arg(short, long, env = "DATABASE_PATH", default_value = "db.sqlite3")]
    database: PathBuf,

    /// Read descriptions in the legacy `field_definition` layout.
    #[arg(long, global = true)]
    legacy: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the DDL script of a description.
    Sql {
        /// JSON description file.
        schema: PathBuf,
    },

    /// Print the table creation order.
    Order {
        /// JSON description file.
        schema: PathBuf,
    },

    /// Print the resolved structure as JSON.
    Describe {
        /// JSON description file.
        schema: PathBuf,
    },

    /// Create the database, or add missing tables and columns to it.
    Migrate {
        /// JSON description file.
        schema: PathBuf,

        /// Roll back instead of committing at the end.
        #[arg(long)]
        dry_run: bool,

        /// Keep going when a table fails to migrate.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Print the DDL of a live database's structure.
    Inspect,
}

fn load(schema: &Path, legacy: bool) -> anyhow::Result<Database> {
    let description = SchemaDescription::from_path(schema, legacy)?;
    Ok(Database::from_description(&description)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sql { schema } => {
            let db = load(&schema, cli.legacy)?;
            println!("{}", db.generate_ddl_script()?);
        }

        Commands::Order { schema } => {
            let db = load(&schema, cli.legacy)?;
            for (position, table) in db.creation_order().iter().enumerate() {
                println!("{:>3}. {}", position + 1, table.name());
            }
        }

        Commands::Describe { schema } => {
            let db = load(&schema, cli.legacy)?;
            println!("{}", serde_json::to_string_pretty(&db)?);
        }

        Commands::Migrate {
            schema,
            dry_run,
            continue_on_error,
        } => {
            let db = load(&schema, cli.legacy)?;
            if dry_run && !cli.database.exists() {
                info!("Dry run mode - the database would be created with:");
                println!("{}", db.generate_ddl_script()?);
                return Ok(());
            }
            let options = ConnectorOptions::new()
                .commit_on_close(!dry_run)
                .continue_on_table_error(continue_on_error);
            let mut connector = Connector::with_options(&cli.database, db, options);

            connector.connect().await?;
            if connector.is_new_database() {
                info!(
                    "Created {} with {} table(s).",
                    cli.database.display(),
                    connector.structure().len()
                );
            } else {
                let report = connector.validate().await?;
                if report.is_clean() {
                    info!("Database is up to date.");
                }
                for (table, error) in &report.failed_tables {
                    warn!("Table '{table}' was not migrated: {error}");
                }
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            if dry_run {
                info!("Dry run mode - changes are rolled back.");
            }
            connector.close().await?;
        }

        Commands::Inspect => {
            if !cli.database.exists() {
                bail!("database {} does not exist", cli.database.display());
            }
            let options = ConnectorOptions::new().commit_on_close(false);
            let mut connector = Connector::with_options(&cli.database, Database::new(), options);
            connector.connect().await?;
            let live = connector.load_structure().await?;
            connector.close().await?;

            for table in live.creation_order() {
                println!("{}\n", table.create_table_sql());
                for sql in table.create_index_sqls() {
                    println!("{sql}\n");
                }
            }
        }
    }

    Ok(())
}
