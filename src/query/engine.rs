//! Query engine implementation
//!
//! Provides the read-side use cases on top of the store:
//! - Largest companies by market cap
//! - Top gainers / losers by 1-day change
//! - Sector roll-ups
//! - Data staleness from the refresh ledger

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::filter::{SortField, SortOrder, StockQuery};
use crate::refresh::LedgerEntry;
use crate::stock::Stock;
use crate::storage::SqliteStore;
use crate::Result;

/// Data older than this is considered stale
pub const DEFAULT_MAX_AGE_MINUTES: i64 = 15;

/// Number of ledger entries included in a status report
const STATUS_HISTORY: usize = 5;

/// Sector labels that mean "unknown"
const PLACEHOLDER_SECTORS: &[&str] = &["", "--"];

/// Best and worst 1-day performers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMovers {
    pub gainers: Vec<Stock>,
    pub losers: Vec<Stock>,
}

/// Average performance of one sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub sector: String,
    pub change_1d: f64,
    pub change_1w: f64,
    pub change_1m: f64,
    pub stock_count: usize,
}

/// Freshness of the cached data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStatus {
    /// Minutes since the latest successful refresh started
    pub age_minutes: Option<f64>,
    pub needs_refresh: bool,
    pub last_success: Option<LedgerEntry>,
    pub recent_refreshes: Vec<LedgerEntry>,
    pub total_stocks: usize,
}

/// Query engine for ranked and aggregated stock views
pub struct QueryEngine<'a> {
    store: &'a SqliteStore,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Largest stocks by market capitalization
    pub fn largest(&self, limit: usize) -> Result<Vec<Stock>> {
        self.store.list_stocks(
            &StockQuery::new()
                .sort_by(SortField::MarketCap, SortOrder::Desc)
                .limit(limit),
        )
    }

    /// Top gainers and losers by 1-day change
    pub fn top_movers(&self, limit: usize) -> Result<TopMovers> {
        let gainers = self.store.list_stocks(
            &StockQuery::new()
                .sort_by(SortField::Change1d, SortOrder::Desc)
                .limit(limit),
        )?;
        let losers = self.store.list_stocks(
            &StockQuery::new()
                .sort_by(SortField::Change1d, SortOrder::Asc)
                .limit(limit),
        )?;
        Ok(TopMovers { gainers, losers })
    }

    /// All stocks in a sector, largest first
    pub fn by_sector(&self, sector: &str) -> Result<Vec<Stock>> {
        self.store.list_stocks(
            &StockQuery::new()
                .sector(sector)
                .sort_by(SortField::MarketCap, SortOrder::Desc),
        )
    }

    /// Search by ticker or name
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Stock>> {
        self.store.search_stocks(query, limit)
    }

    /// Mean 1-day / 1-week / 1-month change per sector, best 1-day first
    pub fn sector_performance(&self) -> Result<Vec<SectorPerformance>> {
        let stocks = self.store.list_stocks(&StockQuery::new())?;

        let mut sums: BTreeMap<String, ([f64; 3], usize)> = BTreeMap::new();
        for stock in &stocks {
            let Some(sector) = stock.sector.as_deref() else {
                continue;
            };
            if PLACEHOLDER_SECTORS.contains(&sector) {
                continue;
            }
            let (totals, count) = sums.entry(sector.to_string()).or_insert(([0.0; 3], 0));
            totals[0] += stock.change_1d;
            totals[1] += stock.change_1w;
            totals[2] += stock.change_1m;
            *count += 1;
        }

        let mut result: Vec<SectorPerformance> = sums
            .into_iter()
            .map(|(sector, (totals, count))| {
                let mean = |total: f64| round2(total / count as f64);
                SectorPerformance {
                    sector,
                    change_1d: mean(totals[0]),
                    change_1w: mean(totals[1]),
                    change_1m: mean(totals[2]),
                    stock_count: count,
                }
            })
            .collect();

        // Stable sort keeps sector-name order among equal averages
        result.sort_by(|a, b| b.change_1d.total_cmp(&a.change_1d));
        Ok(result)
    }

    /// Staleness report as of now
    pub fn data_status(&self, max_age: Duration) -> Result<DataStatus> {
        self.data_status_at(Utc::now(), max_age)
    }

    /// Staleness report as of `now`
    pub fn data_status_at(&self, now: DateTime<Utc>, max_age: Duration) -> Result<DataStatus> {
        let last_success = self.store.latest_success()?;
        let age = last_success.as_ref().map(|entry| entry.age(now));

        Ok(DataStatus {
            age_minutes: age.map(|a| round2(a.num_milliseconds() as f64 / 60_000.0)),
            needs_refresh: age.is_none_or(|a| a > max_age),
            last_success,
            recent_refreshes: self.store.history(STATUS_HISTORY)?,
            total_stocks: self.store.count_stocks()?,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshOutcome;
    use crate::stock::StockCandidate;

    fn stock(ticker: &str, sector: &str, change_1d: f64, cap: f64) -> StockCandidate {
        let mut c = StockCandidate::new(ticker, format!("{} Inc", ticker), 10.0)
            .with_market_cap(cap)
            .with_change_1d(change_1d);
        c.sector = Some(sector.to_string());
        c.change_1w = Some(change_1d * 2.0);
        c
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply_refresh(
                &[
                    stock("AAA", "Technology", 2.0, 500.0),
                    stock("BBB", "Technology", 1.0, 900.0),
                    stock("CCC", "Energy", -3.0, 100.0),
                    stock("DDD", "Energy", 0.5, 700.0),
                    stock("EEE", "--", 9.0, 50.0),
                    stock("FFF", "Utilities", 0.0, 300.0),
                    stock("GGG", "Utilities", 0.0, 300.0),
                ],
                "test",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_largest() {
        let store = seeded_store();
        let engine = QueryEngine::new(&store);

        let top: Vec<_> = engine.largest(5).unwrap().into_iter().map(|s| s.ticker).collect();
        assert_eq!(top, vec!["BBB", "DDD", "AAA", "FFF", "GGG"]);
    }

    #[test]
    fn test_top_movers() {
        let store = seeded_store();
        let engine = QueryEngine::new(&store);

        let movers = engine.top_movers(2).unwrap();
        let gainers: Vec<_> = movers.gainers.iter().map(|s| s.ticker.as_str()).collect();
        let losers: Vec<_> = movers.losers.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(gainers, vec!["EEE", "AAA"]);
        assert_eq!(losers, vec!["CCC", "FFF"]);
    }

    #[test]
    fn test_by_sector() {
        let store = seeded_store();
        let engine = QueryEngine::new(&store);

        let energy: Vec<_> = engine.by_sector("Energy").unwrap().into_iter().map(|s| s.ticker).collect();
        assert_eq!(energy, vec!["DDD", "CCC"]);
    }

    #[test]
    fn test_sector_performance() {
        let store = seeded_store();
        let engine = QueryEngine::new(&store);

        let sectors = engine.sector_performance().unwrap();
        let names: Vec<_> = sectors.iter().map(|s| s.sector.as_str()).collect();
        assert_eq!(names, vec!["Technology", "Utilities", "Energy"]);

        assert_eq!(sectors[0].change_1d, 1.5);
        assert_eq!(sectors[0].change_1w, 3.0);
        assert_eq!(sectors[0].stock_count, 2);
        assert_eq!(sectors[2].change_1d, -1.25);
    }

    #[test]
    fn test_data_status_without_refresh() {
        let store = SqliteStore::open_in_memory().unwrap();
        let engine = QueryEngine::new(&store);

        let status = engine.data_status(Duration::minutes(DEFAULT_MAX_AGE_MINUTES)).unwrap();
        assert!(status.needs_refresh);
        assert!(status.age_minutes.is_none());
        assert!(status.recent_refreshes.is_empty());
    }

    #[test]
    fn test_data_status_age() {
        let store = SqliteStore::open_in_memory().unwrap();
        let started = Utc::now();
        let outcome = RefreshOutcome {
            candidates: 1,
            inserted: vec!["AAA".into()],
            ..Default::default()
        };
        store
            .record_refresh(&outcome, "test", started, std::time::Duration::ZERO)
            .unwrap();

        let engine = QueryEngine::new(&store);
        let max_age = Duration::minutes(DEFAULT_MAX_AGE_MINUTES);

        let fresh = engine.data_status_at(started + Duration::minutes(5), max_age).unwrap();
        assert_eq!(fresh.age_minutes, Some(5.0));
        assert!(!fresh.needs_refresh);
        assert_eq!(fresh.recent_refreshes.len(), 1);

        let stale = engine.data_status_at(started + Duration::minutes(30), max_age).unwrap();
        assert!(stale.needs_refresh);
    }
}
