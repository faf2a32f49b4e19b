//! Refresh orchestration
//!
//! Pairs a fetch with apply-refresh and the ledger so that every call to
//! `Refresher::run` leaves exactly one new ledger entry behind, whatever
//! happened along the way.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fetcher::Fetcher;
use crate::refresh::{LedgerEntry, RefreshOutcome, RefreshStatus};
use crate::storage::SqliteStore;
use crate::Result;

/// Result of one orchestrated refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub outcome: RefreshOutcome,
    pub entry: LedgerEntry,
    pub elapsed_seconds: f64,
}

impl RefreshReport {
    pub fn status(&self) -> RefreshStatus {
        self.entry.status()
    }
}

/// Runs fetch → apply → record against a store
pub struct Refresher<'a> {
    store: &'a SqliteStore,
}

impl<'a> Refresher<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Run one refresh.
    ///
    /// A fetch failure is recorded as a failed attempt and reported through
    /// `Ok`. Storage failures roll the batch back, are recorded when the ledger
    /// is reachable, and come back as `Err`. A concurrent call is rejected with
    /// `Error::RefreshInProgress` after recording the rejection.
    pub fn run(&self, fetcher: &dyn Fetcher) -> Result<RefreshReport> {
        let source = fetcher.source().to_string();
        let started_at = Utc::now();

        let guard = match self.store.begin_refresh() {
            Ok(guard) => guard,
            Err(e) => {
                self.record_failure(&RefreshOutcome::failed(e.to_string()), &source, started_at);
                return Err(e);
            }
        };

        tracing::info!("Refreshing from {}", source);
        let candidates = match fetcher.fetch() {
            Ok(candidates) => candidates,
            Err(e) => {
                let outcome = RefreshOutcome::failed(format!("fetch failed: {}", e));
                let entry = self
                    .store
                    .record_refresh(&outcome, &source, started_at, elapsed_since(started_at))?;
                return Ok(report(outcome, entry, started_at));
            }
        };

        match self.store.commit_refresh(&guard, &candidates, &source, started_at) {
            Ok((outcome, entry)) => Ok(report(outcome, entry, started_at)),
            Err(e) => {
                let outcome = RefreshOutcome {
                    candidates: candidates.len(),
                    error: Some(format!("refresh not applied: {}", e)),
                    ..Default::default()
                };
                self.record_failure(&outcome, &source, started_at);
                Err(e)
            }
        }
    }

    /// Record a failed attempt on the way out of an error path
    fn record_failure(&self, outcome: &RefreshOutcome, source: &str, started_at: DateTime<Utc>) {
        if let Err(ledger_err) =
            self.store
                .record_refresh(outcome, source, started_at, elapsed_since(started_at))
        {
            tracing::error!(
                "Could not record failed refresh from {}: {} (cause: {})",
                source,
                ledger_err,
                outcome.error.as_deref().unwrap_or("unknown")
            );
        }
    }
}

fn report(outcome: RefreshOutcome, entry: LedgerEntry, started_at: DateTime<Utc>) -> RefreshReport {
    RefreshReport {
        elapsed_seconds: elapsed_since(started_at).as_secs_f64(),
        outcome,
        entry,
    }
}

fn elapsed_since(started_at: DateTime<Utc>) -> Duration {
    (Utc::now() - started_at).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;
    use crate::stock::StockCandidate;
    use crate::Error;
    use std::cell::RefCell;

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn source(&self) -> &str {
            "broken"
        }

        fn fetch(&self) -> Result<Vec<StockCandidate>> {
            Err(Error::Fetch("connection reset".to_string()))
        }
    }

    /// Starts a nested refresh from inside its own fetch
    struct ReentrantFetcher<'a> {
        store: &'a SqliteStore,
        nested: RefCell<Option<Result<RefreshReport>>>,
    }

    impl Fetcher for ReentrantFetcher<'_> {
        fn source(&self) -> &str {
            "outer"
        }

        fn fetch(&self) -> Result<Vec<StockCandidate>> {
            let inner = StaticFetcher::new("inner", vec![StockCandidate::new("ZZZ", "Inner", 1.0)]);
            *self.nested.borrow_mut() = Some(Refresher::new(self.store).run(&inner));
            Ok(vec![StockCandidate::new("AAA", "Outer", 2.0)])
        }
    }

    fn batch() -> Vec<StockCandidate> {
        vec![
            StockCandidate::new("AAA", "Alpha Co", 10.0),
            StockCandidate::new("BBB", "Beta Co", -5.0),
        ]
    }

    #[test]
    fn test_partial_refresh_is_recorded_as_success() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = Refresher::new(&store)
            .run(&StaticFetcher::new("test", batch()))
            .unwrap();

        assert_eq!(report.status(), RefreshStatus::Partial);
        assert_eq!(report.outcome.inserted, vec!["AAA".to_string()]);
        assert_eq!(report.outcome.skipped[0].ticker.as_deref(), Some("BBB"));
        assert_eq!(report.entry.stocks_updated, 1);
        assert!(report.entry.success);

        let latest = store.latest_success().unwrap().unwrap();
        assert_eq!(latest.id, report.entry.id);
        let stock = store.get_stock("AAA").unwrap().unwrap();
        assert!(latest.timestamp <= stock.last_updated);
    }

    #[test]
    fn test_fetch_failure_recorded_not_propagated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.apply_refresh(&[StockCandidate::new("AAA", "Alpha Co", 10.0)], "seed").unwrap();

        let report = Refresher::new(&store).run(&FailingFetcher).unwrap();

        assert_eq!(report.status(), RefreshStatus::Failed);
        assert_eq!(report.entry.stocks_updated, 0);
        assert!(report.entry.error_message.as_deref().unwrap().contains("connection reset"));
        assert_eq!(store.count_ledger_entries().unwrap(), 1);
        assert_eq!(store.get_stock("AAA").unwrap().unwrap().data_source, "seed");
    }

    #[test]
    fn test_empty_fetch_is_failure() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = Refresher::new(&store)
            .run(&StaticFetcher::new("test", Vec::new()))
            .unwrap();

        assert_eq!(report.status(), RefreshStatus::Failed);
        assert!(store.latest_success().unwrap().is_none());
    }

    #[test]
    fn test_storage_failure_rolls_back_and_records() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_raw(
                "CREATE TRIGGER boom BEFORE INSERT ON stocks WHEN NEW.ticker = 'BBB' \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let fetcher = StaticFetcher::new(
            "test",
            vec![
                StockCandidate::new("AAA", "Alpha Co", 10.0),
                StockCandidate::new("BBB", "Beta Co", 11.0),
            ],
        );
        let result = Refresher::new(&store).run(&fetcher);

        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(store.count_stocks().unwrap(), 0);

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].stocks_updated, 0);
        assert!(history[0].error_message.as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn test_ledger_failure_discards_entity_writes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_raw(
                "CREATE TRIGGER ledger_down BEFORE INSERT ON refresh_log \
                 BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END;",
            )
            .unwrap();

        let result = Refresher::new(&store).run(&StaticFetcher::new("test", batch()));

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(store.get_stock("AAA").unwrap().is_none());
        assert_eq!(store.count_ledger_entries().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_refresh_rejected_and_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let fetcher = ReentrantFetcher {
            store: &store,
            nested: RefCell::new(None),
        };

        let report = Refresher::new(&store).run(&fetcher).unwrap();
        assert_eq!(report.status(), RefreshStatus::Success);

        let nested = fetcher.nested.borrow_mut().take().unwrap();
        assert!(matches!(nested, Err(Error::RefreshInProgress)));
        assert!(store.get_stock("ZZZ").unwrap().is_none());

        // One entry per call: the rejected inner run and the outer run
        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 2);
        let outer = history.iter().find(|e| e.data_source == "outer").unwrap();
        let inner = history.iter().find(|e| e.data_source == "inner").unwrap();
        assert!(outer.success);
        assert!(!inner.success);
        assert!(inner.id < outer.id);
        assert!(inner.timestamp >= outer.timestamp);
        assert_eq!(store.latest_success().unwrap().unwrap().id, outer.id);
    }
}
