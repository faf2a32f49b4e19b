//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - stocks(ticker, name, sector, ..., last_updated, data_source, is_sp500)
//! - refresh_log(id, timestamp, stocks_updated, stocks_skipped, data_source, success, error_message, duration_seconds)

pub mod schema;
pub mod sqlite;
pub mod ledger;

pub use sqlite::{DbStats, RefreshGuard, SqliteStore, DEFAULT_SEARCH_LIMIT};
