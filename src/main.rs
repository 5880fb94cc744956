//! # Code Index CLI (`cidx`)
//!
//! ## Usage
//!
//! ```bash
//! cidx --config ./config/cidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cidx init` | Create the SQLite database and run schema migrations |
//! | `cidx sources` | List the files the source tree matches |
//! | `cidx reindex` | Index added and modified files, drop removed ones |
//! | `cidx search "<query>"` | Rank indexed chunks against a query |
//! | `cidx stats` | Show index statistics |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=code_index=debug`) to
//! change verbosity.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use code_index::progress::ProgressMode;
use code_index::{config, ingest, migrate, search, sources, stats};

/// Code Index CLI: incremental semantic search over a source tree.
#[derive(Parser)]
#[command(
    name = "cidx",
    about = "Incremental semantic indexing and search for a source tree",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List the files the configured source tree would index.
    Sources,

    /// Run an incremental indexing pass.
    ///
    /// Only files whose content changed since the last pass are chunked and
    /// embedded. Files missing from disk are dropped from the index.
    Reindex {
        /// Show what would change without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,

        /// Progress output on stderr. Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Search indexed chunks by semantic similarity.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of results (default: `retrieval.default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = code_index::db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Reindex {
            dry_run,
            json,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_reindex(&cfg, dry_run, json, mode).await?;
        }
        Commands::Search { query, top_k, json } => {
            search::run_search(&cfg, &query, top_k, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
