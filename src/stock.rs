//! Stock types - the cached entity and its raw refresh candidate
//!
//! A `Stock` is the latest snapshot of one tracked ticker as held by the
//! store. A `StockCandidate` is what a fetcher hands over: every field is
//! optional and nothing is trusted until it passes validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Data source label used when a refresh does not name one
pub const DEFAULT_DATA_SOURCE: &str = "yfinance";

/// Normalize a ticker for storage and lookup: trimmed, upper-case.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// A cached stock snapshot.
///
/// Exactly one live record exists per ticker. Writing a ticker again
/// replaces every field; `last_updated` is always stamped by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    // Identity
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,

    // Price / performance (percent changes)
    pub price: f64,
    pub change_1d: f64,
    pub change_1w: f64,
    pub change_1m: f64,
    pub change_1y: f64,
    pub change_5y: f64,
    pub change_ytd: f64,

    // Trading stats
    pub volume: i64,
    pub high_1d: Option<f64>,
    pub low_1d: Option<f64>,
    pub high_1m: Option<f64>,
    pub low_1m: Option<f64>,
    pub high_1y: Option<f64>,
    pub low_1y: Option<f64>,
    pub high_5y: Option<f64>,
    pub low_5y: Option<f64>,

    // Valuation
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: f64,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,

    // Profitability (TTM)
    pub net_profit_margin: f64,
    pub gross_margin: f64,
    pub roe: f64,
    pub revenue_ttm: Option<f64>,

    // Risk / ownership
    pub beta: f64,
    pub institutional_ownership: f64,
    pub debt_to_equity: Option<f64>,

    // Company info
    pub year_founded: Option<i32>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub weight: f64,

    // Metadata
    pub last_updated: DateTime<Utc>,
    pub data_source: String,
    pub is_sp500: bool,
}

impl Stock {
    /// Compare every field except `last_updated`.
    pub fn same_snapshot(&self, other: &Stock) -> bool {
        let mut other = other.clone();
        other.last_updated = self.last_updated;
        *self == other
    }
}

/// A raw record produced by a fetcher, before validation.
///
/// Missing optional metrics fall back to the store defaults (zero changes,
/// zero volume, beta 1.0, member of the universe).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockCandidate {
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,

    pub price: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_1w: Option<f64>,
    pub change_1m: Option<f64>,
    pub change_1y: Option<f64>,
    pub change_5y: Option<f64>,
    pub change_ytd: Option<f64>,

    #[serde(deserialize_with = "whole_number")]
    pub volume: Option<i64>,
    pub high_1d: Option<f64>,
    pub low_1d: Option<f64>,
    pub high_1m: Option<f64>,
    pub low_1m: Option<f64>,
    pub high_1y: Option<f64>,
    pub low_1y: Option<f64>,
    pub high_5y: Option<f64>,
    pub low_5y: Option<f64>,

    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,

    pub net_profit_margin: Option<f64>,
    pub gross_margin: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_ttm: Option<f64>,

    pub beta: Option<f64>,
    pub institutional_ownership: Option<f64>,
    pub debt_to_equity: Option<f64>,

    pub year_founded: Option<i32>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub weight: Option<f64>,

    pub is_sp500: Option<bool>,

    /// Decode error for a record that never became a usable candidate
    #[serde(skip)]
    pub malformed: Option<String>,
}

/// Accept `1234` and `1234.0`, reject fractional counts
fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(n) = number.as_i64() {
        return Ok(Some(n));
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
        _ => Err(D::Error::custom(format!("expected a whole number, got {}", number))),
    }
}

impl StockCandidate {
    /// Create a candidate with only the required fields set
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            ticker: Some(ticker.into()),
            name: Some(name.into()),
            price: Some(price),
            ..Default::default()
        }
    }

    /// A record that could not be decoded; it is always skipped on apply
    pub fn malformed(ticker: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            ticker,
            malformed: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Set sector and industry
    pub fn with_sector(mut self, sector: impl Into<String>, industry: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self.industry = Some(industry.into());
        self
    }

    /// Set the market capitalization
    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// Set the 1-day percent change
    pub fn with_change_1d(mut self, change: f64) -> Self {
        self.change_1d = Some(change);
        self
    }

    /// Ticker as it will be stored, if present
    pub fn normalized_ticker(&self) -> Option<String> {
        self.ticker
            .as_deref()
            .map(normalize_ticker)
            .filter(|t| !t.is_empty())
    }
}
