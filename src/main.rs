//! Tickercache CLI - local market data cache with a refresh ledger

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tickercache::config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tickercache")]
#[command(version)]
#[command(about = "Durable local cache of per-ticker market metrics with a refresh ledger")]
#[command(long_about = r#"
Tickercache keeps the latest snapshot of every tracked stock in SQLite and
records every refresh attempt in an append-only ledger.

Example usage:
  tickercache init
  tickercache refresh --input snapshot.json
  tickercache list --sort market_cap --limit 5
  tickercache movers --limit 10
  tickercache serve --port 8000
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputMode,

    /// Path to the config file (default: tickercache.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database schema
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Apply a batch of stock records from a JSON file
    Refresh {
        /// JSON array of stock records
        #[arg(short, long)]
        input: PathBuf,

        /// Data source label recorded with the refresh
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show one stock
    Show {
        /// Ticker symbol (case-insensitive)
        ticker: String,
    },

    /// List stocks with optional filters and sorting
    List {
        #[arg(long)]
        sector: Option<String>,

        #[arg(long)]
        industry: Option<String>,

        /// Only current universe members
        #[arg(long)]
        members_only: bool,

        /// Numeric field to sort by (e.g. market_cap, change_1d, pe)
        #[arg(short, long)]
        sort: Option<String>,

        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search stocks by ticker or name
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Top gainers and losers by 1-day change
    Movers {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Average performance per sector
    Sectors,

    /// Data freshness and recent refresh history
    Status {
        /// Number of ledger entries to show
        #[arg(long, default_value = "5")]
        history: usize,
    },

    /// Flag stocks missing from a universe list as non-members
    Reconcile {
        /// File with one ticker per line, or a JSON array of tickers
        #[arg(short, long)]
        universe: PathBuf,
    },

    /// Serve the read-only HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show statistics about the cache
    Stats,
}

/// How command results are printed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Text
    }
}

/// Machine-readable result envelope
pub fn envelope(ok: bool, command: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "ok": ok,
        "command": command,
        "data": data,
    })
}

/// Print an envelope in JSON mode; a no-op for human output
pub fn emit(output_mode: OutputMode, ok: bool, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&envelope(ok, command, data))?);
    Ok(())
}

pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    emit(output_mode, true, command, data)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Some(path) = &cli.config {
        if !path.exists() && !matches!(cli.command, Commands::Init { .. }) {
            anyhow::bail!("config file not found: {}", path.display());
        }
    }
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let settings = config::load_config(Some(&config_path))?.unwrap_or_default();
    let ctx = commands::Context {
        database: cli.database.clone().unwrap_or_else(|| settings.database_path()),
        config_path,
        settings,
        output: cli.format,
    };

    match cli.command {
        Commands::Init { force } => commands::run_init(&ctx, force),
        Commands::Refresh { input, source } => commands::run_refresh(&ctx, &input, source),
        Commands::Show { ticker } => commands::run_show(&ctx, &ticker),
        Commands::List {
            sector,
            industry,
            members_only,
            sort,
            asc,
            limit,
        } => commands::run_list(
            &ctx,
            commands::ListArgs {
                sector,
                industry,
                members_only,
                sort,
                asc,
                limit,
            },
        ),
        Commands::Search { query, limit } => commands::run_search(&ctx, &query, limit),
        Commands::Movers { limit } => commands::run_movers(&ctx, limit),
        Commands::Sectors => commands::run_sectors(&ctx),
        Commands::Status { history } => commands::run_status(&ctx, history),
        Commands::Reconcile { universe } => commands::run_reconcile(&ctx, &universe),
        Commands::Serve { port } => commands::run_serve(&ctx, port),
        Commands::Stats => commands::run_stats(&ctx),
    }
}
