//! # Tickercache - Local market data cache with a refresh ledger
//!
//! Keeps the latest known snapshot of every tracked ticker in SQLite and an
//! append-only log of every refresh attempt.
//!
//! Tickercache provides:
//! - A validated, atomic apply-refresh write path (full-overwrite upserts)
//! - An append-only refresh ledger written in the same transaction
//! - Filtered and ranked queries (sector roll-ups, top movers, largest caps)
//! - Refresh orchestration around a pluggable `Fetcher`
//! - A CLI and a read-only HTTP API on top of the store

pub mod stock;
pub mod validate;
pub mod refresh;
pub mod storage;
pub mod query;
pub mod fetcher;
pub mod refresher;
pub mod config;
pub mod server;
pub mod ui;

// Re-exports for convenient access
pub use stock::{Stock, StockCandidate, DEFAULT_DATA_SOURCE};
pub use validate::ValidationError;
pub use refresh::{LedgerEntry, RefreshOutcome, RefreshStatus, SkippedCandidate};
pub use storage::SqliteStore;
pub use query::{QueryEngine, SortField, SortOrder, StockQuery};
pub use fetcher::{Fetcher, JsonFileFetcher, StaticFetcher};
pub use refresher::{RefreshReport, Refresher};

/// Result type alias for Tickercache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tickercache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stock not found: {0}")]
    StockNotFound(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("A refresh is already in progress")]
    RefreshInProgress,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Corrupt stored value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: String },
}
