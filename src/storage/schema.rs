//! Database schema definitions

/// SQL to create the stocks table (one row per tracked ticker)
pub const CREATE_STOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stocks (
    ticker TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT,
    industry TEXT,

    price REAL NOT NULL,
    change_1d REAL NOT NULL DEFAULT 0,
    change_1w REAL NOT NULL DEFAULT 0,
    change_1m REAL NOT NULL DEFAULT 0,
    change_1y REAL NOT NULL DEFAULT 0,
    change_5y REAL NOT NULL DEFAULT 0,
    change_ytd REAL NOT NULL DEFAULT 0,

    volume INTEGER NOT NULL DEFAULT 0,
    high_1d REAL,
    low_1d REAL,
    high_1m REAL,
    low_1m REAL,
    high_1y REAL,
    low_1y REAL,
    high_5y REAL,
    low_5y REAL,

    pe_ratio REAL,
    eps REAL,
    dividend_yield REAL NOT NULL DEFAULT 0,
    market_cap REAL,
    shares_outstanding REAL,

    net_profit_margin REAL NOT NULL DEFAULT 0,
    gross_margin REAL NOT NULL DEFAULT 0,
    roe REAL NOT NULL DEFAULT 0,
    revenue_ttm REAL,

    beta REAL NOT NULL DEFAULT 1.0,
    institutional_ownership REAL NOT NULL DEFAULT 0,
    debt_to_equity REAL,

    year_founded INTEGER,
    website TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    weight REAL NOT NULL DEFAULT 0,

    last_updated TEXT NOT NULL,
    data_source TEXT NOT NULL,
    is_sp500 INTEGER NOT NULL DEFAULT 1
)
"#;

/// SQL to create the refresh ledger (append-only)
pub const CREATE_REFRESH_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    stocks_updated INTEGER NOT NULL DEFAULT 0,
    stocks_skipped INTEGER NOT NULL DEFAULT 0,
    data_source TEXT NOT NULL,
    success INTEGER NOT NULL,
    error_message TEXT,
    duration_seconds REAL NOT NULL DEFAULT 0
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_stocks_sector ON stocks(sector)",
    "CREATE INDEX IF NOT EXISTS idx_stocks_last_updated ON stocks(last_updated)",
    // Ranked lists order by (column DESC, ticker ASC)
    "CREATE INDEX IF NOT EXISTS idx_stocks_market_cap ON stocks(market_cap DESC, ticker)",
    "CREATE INDEX IF NOT EXISTS idx_stocks_change_1d ON stocks(change_1d DESC, ticker)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_log_timestamp ON refresh_log(timestamp DESC, id DESC)",
];

/// Column list shared by every stock SELECT and INSERT, in `Stock` field order
pub const STOCK_COLUMNS: &str = "ticker, name, sector, industry, \
    price, change_1d, change_1w, change_1m, change_1y, change_5y, change_ytd, \
    volume, high_1d, low_1d, high_1m, low_1m, high_1y, low_1y, high_5y, low_5y, \
    pe_ratio, eps, dividend_yield, market_cap, shares_outstanding, \
    net_profit_margin, gross_margin, roe, revenue_ttm, \
    beta, institutional_ownership, debt_to_equity, \
    year_founded, website, city, state, zip, weight, \
    last_updated, data_source, is_sp500";

/// Column list for ledger SELECTs
pub const LEDGER_COLUMNS: &str =
    "id, timestamp, stocks_updated, stocks_skipped, data_source, success, error_message, duration_seconds";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_STOCKS_TABLE, CREATE_REFRESH_LOG_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
