//! Refresh ledger operations
//!
//! The ledger is append-only: rows are inserted, never updated or deleted.
//! Entries are ordered by attempt start time. Identifiers come from SQLite's
//! AUTOINCREMENT, follow insertion order, and only break timestamp ties.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::schema::LEDGER_COLUMNS;
use super::sqlite::{format_timestamp, timestamp_column, SqliteStore};
use crate::refresh::{LedgerEntry, RefreshOutcome};
use crate::Result;

impl SqliteStore {
    // ========== Ledger Operations ==========

    /// Append one entry describing a refresh attempt.
    ///
    /// Must be called once per attempt whatever its outcome. A failure here is
    /// returned to the caller; an unrecorded refresh must not look successful.
    pub fn record_refresh(
        &self,
        outcome: &RefreshOutcome,
        source: &str,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Result<LedgerEntry> {
        let conn = self.connection();
        insert_entry(&conn, outcome, source, started_at, duration)
    }

    /// Successful (or partially successful) refresh that started last
    pub fn latest_success(&self) -> Result<Option<LedgerEntry>> {
        let conn = self.connection();
        conn.query_row(
            &format!(
                "SELECT {} FROM refresh_log WHERE success = 1 ORDER BY timestamp DESC, id DESC LIMIT 1",
                LEDGER_COLUMNS
            ),
            [],
            row_to_entry,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Ledger entries, latest attempt first
    pub fn history(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM refresh_log ORDER BY timestamp DESC, id DESC LIMIT ?1",
            LEDGER_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Count ledger entries
    pub fn count_ledger_entries(&self) -> Result<usize> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM refresh_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Insert a ledger row on `conn` (a plain connection or an open transaction)
pub(crate) fn insert_entry(
    conn: &Connection,
    outcome: &RefreshOutcome,
    source: &str,
    started_at: DateTime<Utc>,
    duration: Duration,
) -> Result<LedgerEntry> {
    let status = outcome.status();
    let entry = LedgerEntry {
        id: 0, // Set by DB
        // Stored with microsecond precision
        timestamp: started_at.trunc_subsecs(6),
        stocks_updated: outcome.stocks_updated() as i64,
        stocks_skipped: outcome.skipped.len() as i64,
        data_source: source.to_string(),
        success: status.is_success(),
        error_message: outcome.error_message(),
        duration_seconds: duration.as_secs_f64(),
    };

    conn.execute(
        r#"
        INSERT INTO refresh_log (timestamp, stocks_updated, stocks_skipped, data_source, success, error_message, duration_seconds)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            format_timestamp(entry.timestamp),
            entry.stocks_updated,
            entry.stocks_skipped,
            entry.data_source,
            entry.success,
            entry.error_message,
            entry.duration_seconds,
        ],
    )?;

    if !entry.success {
        tracing::warn!(
            "Refresh from {} failed: {}",
            source,
            entry.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(LedgerEntry {
        id: conn.last_insert_rowid(),
        ..entry
    })
}

/// Helper to convert a row to a LedgerEntry
fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        stocks_updated: row.get(2)?,
        stocks_skipped: row.get(3)?,
        data_source: row.get(4)?,
        success: row.get(5)?,
        error_message: row.get(6)?,
        duration_seconds: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshStatus;

    fn written(tickers: &[&str]) -> RefreshOutcome {
        RefreshOutcome {
            candidates: tickers.len(),
            inserted: tickers.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let started = Utc::now();

        let entry = store
            .record_refresh(&written(&["AAA", "BBB"]), "test", started, Duration::from_millis(1500))
            .unwrap();
        assert!(entry.id > 0);
        assert_eq!(entry.stocks_updated, 2);
        assert!(entry.success);

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, entry.id);
        assert_eq!(history[0].duration_seconds, 1.5);
        assert_eq!(history[0].timestamp.timestamp_micros(), started.timestamp_micros());
    }

    #[test]
    fn test_failed_attempt_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = store
            .record_refresh(&RefreshOutcome::failed("timeout"), "test", Utc::now(), Duration::ZERO)
            .unwrap();

        assert!(!entry.success);
        assert_eq!(entry.stocks_updated, 0);
        assert_eq!(entry.error_message.as_deref(), Some("timeout"));
        assert_eq!(entry.status(), RefreshStatus::Failed);
        assert!(store.latest_success().unwrap().is_none());
    }

    #[test]
    fn test_history_most_recent_first_and_latest_success() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        let first = store.record_refresh(&written(&["AAA"]), "test", now, Duration::ZERO).unwrap();
        let second = store
            .record_refresh(&RefreshOutcome::failed("boom"), "test", now, Duration::ZERO)
            .unwrap();
        let third = store.record_refresh(&written(&["BBB"]), "test", now, Duration::ZERO).unwrap();
        let fourth = store
            .record_refresh(&RefreshOutcome::failed("boom"), "test", now, Duration::ZERO)
            .unwrap();

        let ids: Vec<i64> = store.history(10).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![fourth.id, third.id, second.id, first.id]);
        assert_eq!(store.history(2).unwrap().len(), 2);

        assert_eq!(store.latest_success().unwrap().unwrap().id, third.id);
        assert_eq!(store.count_ledger_entries().unwrap(), 4);
    }

    #[test]
    fn test_history_follows_attempt_time_not_insertion() {
        let store = SqliteStore::open_in_memory().unwrap();
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(5);

        // The later attempt is written first, as when a rejected refresh
        // records itself before the refresh it lost to
        let rejected = store
            .record_refresh(&RefreshOutcome::failed("busy"), "late", late, Duration::ZERO)
            .unwrap();
        let applied = store
            .record_refresh(&written(&["AAA"]), "early", early, Duration::ZERO)
            .unwrap();

        let ids: Vec<i64> = store.history(10).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![rejected.id, applied.id]);
        assert_eq!(store.latest_success().unwrap().unwrap().id, applied.id);

        let conn = store.connection();
        let plan: Vec<String> = conn
            .prepare(&format!(
                "EXPLAIN QUERY PLAN SELECT {} FROM refresh_log ORDER BY timestamp DESC, id DESC LIMIT 5",
                LEDGER_COLUMNS
            ))
            .unwrap()
            .query_map([], |row| row.get(3))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert!(plan.iter().any(|step| step.contains("idx_refresh_log_timestamp")), "{:?}", plan);
    }
}
