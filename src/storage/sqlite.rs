//! SQLite storage implementation

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use super::ledger;
use super::schema::{self, STOCK_COLUMNS};
use crate::query::StockQuery;
use crate::refresh::{LedgerEntry, RefreshOutcome, SkippedCandidate};
use crate::stock::{normalize_ticker, Stock, StockCandidate};
use crate::validate::validate_candidate;
use crate::{Error, Result};

/// How long a connection waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default result cap for free-text search
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// SQLite-backed store for stock snapshots and the refresh ledger.
///
/// Every operation holds the connection lock for its whole duration, and a
/// refresh runs inside a single transaction, so readers see either the state
/// before a refresh or the state after it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    refresh_gate: Mutex<()>,
}

/// Proof that the caller owns the store's single refresh slot
pub struct RefreshGuard<'a> {
    _slot: MutexGuard<'a, ()>,
}

impl SqliteStore {
    /// Open a database file (creates it and its directory if missing)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened {} (journal_mode={})", path.display(), mode);

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            refresh_gate: Mutex::new(()),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Run raw SQL against the underlying connection
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    // ========== Stock Operations ==========

    /// Get a stock by ticker (case-insensitive)
    pub fn get_stock(&self, ticker: &str) -> Result<Option<Stock>> {
        let ticker = normalize_ticker(ticker);
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM stocks WHERE ticker = ?1", STOCK_COLUMNS),
            [&ticker],
            row_to_stock,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Get a stock by ticker, treating a miss as an error
    pub fn require_stock(&self, ticker: &str) -> Result<Stock> {
        self.get_stock(ticker)?
            .ok_or_else(|| Error::StockNotFound(normalize_ticker(ticker)))
    }

    /// List stocks matching a filter, sorted and limited
    pub fn list_stocks(&self, query: &StockQuery) -> Result<Vec<Stock>> {
        let (clause, values) = query.to_sql();
        let sql = format!("SELECT {} FROM stocks {}", STOCK_COLUMNS, clause);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let stocks = stmt
            .query_map(params_from_iter(values), row_to_stock)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stocks)
    }

    /// Search stocks by ticker or name substring, largest market cap first
    pub fn search_stocks(&self, query: &str, limit: usize) -> Result<Vec<Stock>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("search query is empty".to_string()));
        }
        let pattern = format!("%{}%", escape_like(&query.to_uppercase()));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stocks \
             WHERE ticker LIKE ?1 ESCAPE '\\' OR UPPER(name) LIKE ?1 ESCAPE '\\' \
             ORDER BY market_cap DESC, ticker ASC \
             LIMIT ?2",
            STOCK_COLUMNS
        ))?;
        let stocks = stmt
            .query_map(params![pattern, limit as i64], row_to_stock)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stocks)
    }

    /// Count all stocks
    pub fn count_stocks(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count stocks currently flagged as universe members
    pub fn count_members(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM stocks WHERE is_sp500 = 1", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most recent `last_updated` across all stocks
    pub fn newest_update(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT MAX(last_updated) FROM stocks", [], |row| row.get(0))?;
        value.map(|v| parse_timestamp("last_updated", &v)).transpose()
    }

    // ========== Refresh Operations ==========

    /// Claim the refresh slot, failing fast if another refresh holds it
    pub fn begin_refresh(&self) -> Result<RefreshGuard<'_>> {
        self.refresh_gate
            .try_lock()
            .map(|slot| RefreshGuard { _slot: slot })
            .ok_or(Error::RefreshInProgress)
    }

    /// Validate and upsert a batch of candidates in one transaction.
    ///
    /// Invalid candidates are skipped and reported in the outcome. A storage
    /// failure rolls back the whole batch. This does not touch the ledger; use
    /// `commit_refresh` (or the `Refresher`) to record the attempt atomically.
    pub fn apply_refresh(&self, candidates: &[StockCandidate], source: &str) -> Result<RefreshOutcome> {
        let _guard = self.begin_refresh()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = upsert_batch(&tx, candidates, source)?;
        tx.commit()?;

        log_outcome(&outcome, source);
        Ok(outcome)
    }

    /// Apply a batch and append its ledger entry as a single transaction.
    ///
    /// Either both the entity writes and the ledger entry land, or neither does.
    pub fn commit_refresh(
        &self,
        _guard: &RefreshGuard<'_>,
        candidates: &[StockCandidate],
        source: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(RefreshOutcome, LedgerEntry)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = upsert_batch(&tx, candidates, source)?;
        let duration = elapsed_since(started_at);
        let entry = ledger::insert_entry(&tx, &outcome, source, started_at, duration)?;
        tx.commit()?;

        log_outcome(&outcome, source);
        Ok((outcome, entry))
    }

    /// Flag every member absent from `universe` as a non-member.
    ///
    /// Refreshes never delete or demote stocks on their own; this is the
    /// explicit reconciliation step. Returns the demoted tickers.
    pub fn mark_non_members(&self, universe: &[String]) -> Result<Vec<String>> {
        let universe: HashSet<String> = universe
            .iter()
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .collect();
        if universe.is_empty() {
            return Err(Error::InvalidQuery(
                "refusing to reconcile against an empty universe".to_string(),
            ));
        }

        let _guard = self.begin_refresh()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let members: Vec<String> = {
            let mut stmt = tx.prepare("SELECT ticker FROM stocks WHERE is_sp500 = 1 ORDER BY ticker")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let stale: Vec<String> = members
            .into_iter()
            .filter(|ticker| !universe.contains(ticker))
            .collect();

        {
            let now = format_timestamp(Utc::now());
            let mut stmt =
                tx.prepare("UPDATE stocks SET is_sp500 = 0, last_updated = ?2 WHERE ticker = ?1")?;
            for ticker in &stale {
                stmt.execute(params![ticker, now])?;
            }
        }
        tx.commit()?;

        if !stale.is_empty() {
            tracing::info!("Marked {} stocks as non-members: {}", stale.len(), stale.join(", "));
        }
        Ok(stale)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            stocks: self.count_stocks()?,
            members: self.count_members()?,
            ledger_entries: self.count_ledger_entries()?,
            newest_update: self.newest_update()?,
            last_success: self.latest_success()?.map(|e| e.timestamp),
        })
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub stocks: usize,
    pub members: usize,
    pub ledger_entries: usize,
    pub newest_update: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |ts: Option<DateTime<Utc>>| {
            ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "never".to_string())
        };
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Stocks: {}", self.stocks)?;
        writeln!(f, "  Members: {}", self.members)?;
        writeln!(f, "  Refresh log entries: {}", self.ledger_entries)?;
        writeln!(f, "  Newest update: {}", show(self.newest_update))?;
        write!(f, "  Last successful refresh: {}", show(self.last_success))
    }
}

/// Validate and write every candidate on an open transaction
fn upsert_batch(conn: &Connection, candidates: &[StockCandidate], source: &str) -> Result<RefreshOutcome> {
    let mut outcome = RefreshOutcome {
        candidates: candidates.len(),
        ..Default::default()
    };
    let mut written: HashSet<String> = HashSet::new();

    let mut exists = conn.prepare_cached("SELECT 1 FROM stocks WHERE ticker = ?1")?;
    let mut upsert = conn.prepare_cached(&upsert_sql())?;

    for (index, candidate) in candidates.iter().enumerate() {
        let stock = match validate_candidate(candidate, source, Utc::now()) {
            Ok(stock) => stock,
            Err(e) => {
                let ticker = candidate.normalized_ticker();
                tracing::warn!("Skipping candidate #{} ({:?}): {}", index, ticker, e);
                outcome.skipped.push(SkippedCandidate {
                    index,
                    ticker,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let existed = exists.exists([&stock.ticker])?;
        upsert.execute(params![
            stock.ticker,
            stock.name,
            stock.sector,
            stock.industry,
            stock.price,
            stock.change_1d,
            stock.change_1w,
            stock.change_1m,
            stock.change_1y,
            stock.change_5y,
            stock.change_ytd,
            stock.volume,
            stock.high_1d,
            stock.low_1d,
            stock.high_1m,
            stock.low_1m,
            stock.high_1y,
            stock.low_1y,
            stock.high_5y,
            stock.low_5y,
            stock.pe_ratio,
            stock.eps,
            stock.dividend_yield,
            stock.market_cap,
            stock.shares_outstanding,
            stock.net_profit_margin,
            stock.gross_margin,
            stock.roe,
            stock.revenue_ttm,
            stock.beta,
            stock.institutional_ownership,
            stock.debt_to_equity,
            stock.year_founded,
            stock.website,
            stock.city,
            stock.state,
            stock.zip,
            stock.weight,
            format_timestamp(stock.last_updated),
            stock.data_source,
            stock.is_sp500,
        ])?;

        if !written.insert(stock.ticker.clone()) {
            tracing::debug!("{} appears twice in batch, later candidate wins", stock.ticker);
        } else if existed {
            tracing::debug!("Replaced {}", stock.ticker);
            outcome.updated.push(stock.ticker);
        } else {
            tracing::debug!("Inserted {}", stock.ticker);
            outcome.inserted.push(stock.ticker);
        }
    }

    Ok(outcome)
}

fn upsert_sql() -> String {
    let placeholders: Vec<String> = (1..=STOCK_COLUMNS.split(',').count())
        .map(|i| format!("?{}", i))
        .collect();
    format!(
        "INSERT OR REPLACE INTO stocks ({}) VALUES ({})",
        STOCK_COLUMNS,
        placeholders.join(", ")
    )
}

fn log_outcome(outcome: &RefreshOutcome, source: &str) {
    tracing::info!(
        "Refresh from {}: {} inserted, {} updated, {} skipped of {} ({})",
        source,
        outcome.inserted.len(),
        outcome.updated.len(),
        outcome.skipped.len(),
        outcome.candidates,
        outcome.status()
    );
}

fn elapsed_since(started_at: DateTime<Utc>) -> Duration {
    (Utc::now() - started_at).to_std().unwrap_or_default()
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render a timestamp for storage; fixed precision keeps text order equal to time order
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::CorruptValue {
            column,
            value: value.to_string(),
        })
}

/// Read a timestamp column inside a row mapper
pub(crate) fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Helper to convert a row to a Stock (columns in `STOCK_COLUMNS` order)
fn row_to_stock(row: &rusqlite::Row) -> rusqlite::Result<Stock> {
    Ok(Stock {
        ticker: row.get(0)?,
        name: row.get(1)?,
        sector: row.get(2)?,
        industry: row.get(3)?,
        price: row.get(4)?,
        change_1d: row.get(5)?,
        change_1w: row.get(6)?,
        change_1m: row.get(7)?,
        change_1y: row.get(8)?,
        change_5y: row.get(9)?,
        change_ytd: row.get(10)?,
        volume: row.get(11)?,
        high_1d: row.get(12)?,
        low_1d: row.get(13)?,
        high_1m: row.get(14)?,
        low_1m: row.get(15)?,
        high_1y: row.get(16)?,
        low_1y: row.get(17)?,
        high_5y: row.get(18)?,
        low_5y: row.get(19)?,
        pe_ratio: row.get(20)?,
        eps: row.get(21)?,
        dividend_yield: row.get(22)?,
        market_cap: row.get(23)?,
        shares_outstanding: row.get(24)?,
        net_profit_margin: row.get(25)?,
        gross_margin: row.get(26)?,
        roe: row.get(27)?,
        revenue_ttm: row.get(28)?,
        beta: row.get(29)?,
        institutional_ownership: row.get(30)?,
        debt_to_equity: row.get(31)?,
        year_founded: row.get(32)?,
        website: row.get(33)?,
        city: row.get(34)?,
        state: row.get(35)?,
        zip: row.get(36)?,
        weight: row.get(37)?,
        last_updated: timestamp_column(row, 38)?,
        data_source: row.get(39)?,
        is_sp500: row.get(40)?,
    })
}
