//! # Project Cards CLI (`pcards`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pcards init` | Create the SQLite database and schema |
//! | `pcards sync` | Ingest the configured workbook, replacing stored projects |
//! | `pcards search "<query>"` | Fuzzy search over projects |
//! | `pcards get <id>` | Show one project |
//! | `pcards list` | List all projects |
//! | `pcards delete <id>` | Delete one project |
//! | `pcards serve` | Start the HTTP API |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use project_cards::{config, ingest, migrate, projects, search, server};

/// Project Cards CLI: a spreadsheet-backed catalog of construction projects
/// with fuzzy search.
#[derive(Parser)]
#[command(name = "pcards", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pcards.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest the configured workbook.
    ///
    /// Replaces every stored project with the rows of the sheet. A source
    /// that cannot be read, or that holds no data rows, leaves the store
    /// untouched.
    Sync {
        /// Fetch and parse only; report counts without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Fuzzy search over titles, addresses, statuses and responsible persons.
    Search {
        query: String,

        /// Maximum number of results (defaults to `retrieval.final_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print the composite query before the results.
        #[arg(long)]
        explain: bool,
    },

    /// Show one project by id.
    Get { id: String },

    /// List all projects.
    List,

    /// Delete one project by id.
    Delete { id: String },

    /// Start the HTTP API.
    ///
    /// Runs one ingestion cycle first when a spreadsheet is configured.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { dry_run } => {
            ingest::run_sync(&cfg, dry_run).await?;
        }
        Commands::Search {
            query,
            limit,
            explain,
        } => {
            search::run_search(&cfg, &query, limit, explain).await?;
        }
        Commands::Get { id } => {
            projects::run_get(&cfg, &id).await?;
        }
        Commands::List => {
            projects::run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            projects::run_delete(&cfg, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
