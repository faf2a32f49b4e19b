//! Refresh outcome and ledger entry types
//!
//! A refresh ends in one of three states:
//! - `Success`: every candidate was written
//! - `Partial`: some candidates were written, some skipped as invalid
//! - `Failed`: nothing was written (fetch error, storage error, empty or all-invalid batch)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many skipped tickers are spelled out in a ledger error message
const MAX_SKIPS_IN_MESSAGE: usize = 10;

/// Final state of one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Partial,
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Success => "success",
            RefreshStatus::Partial => "partial",
            RefreshStatus::Failed => "failed",
        }
    }

    /// Whether the ledger records this attempt as successful
    pub fn is_success(&self) -> bool {
        !matches!(self, RefreshStatus::Failed)
    }
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate that was not written, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    /// Position of the candidate in the submitted batch
    pub index: usize,
    pub ticker: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for SkippedCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ticker {
            Some(ticker) => write!(f, "{} ({})", ticker, self.reason),
            None => write!(f, "#{} ({})", self.index, self.reason),
        }
    }
}

/// Summary of an apply-refresh call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    /// Number of candidates submitted
    pub candidates: usize,
    /// Tickers that did not exist before this refresh
    pub inserted: Vec<String>,
    /// Tickers whose existing record was replaced
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedCandidate>,
    /// Set when the attempt failed as a whole
    pub error: Option<String>,
}

impl RefreshOutcome {
    /// Outcome of an attempt that never got to write anything
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Records written (inserted + updated)
    pub fn stocks_updated(&self) -> usize {
        self.inserted.len() + self.updated.len()
    }

    pub fn status(&self) -> RefreshStatus {
        if self.error.is_some() || self.stocks_updated() == 0 {
            RefreshStatus::Failed
        } else if !self.skipped.is_empty() {
            RefreshStatus::Partial
        } else {
            RefreshStatus::Success
        }
    }

    /// Message stored in the ledger; `None` only for a clean success
    pub fn error_message(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        if self.candidates == 0 {
            return Some("fetcher returned no records".to_string());
        }
        if self.skipped.is_empty() {
            return None;
        }

        let mut listed: Vec<String> = self
            .skipped
            .iter()
            .take(MAX_SKIPS_IN_MESSAGE)
            .map(ToString::to_string)
            .collect();
        if self.skipped.len() > MAX_SKIPS_IN_MESSAGE {
            listed.push(format!("and {} more", self.skipped.len() - MAX_SKIPS_IN_MESSAGE));
        }

        Some(format!(
            "skipped {} of {} candidates: {}",
            self.skipped.len(),
            self.candidates,
            listed.join("; ")
        ))
    }
}

/// One immutable row of the refresh ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    /// When the attempt started
    pub timestamp: DateTime<Utc>,
    pub stocks_updated: i64,
    pub stocks_skipped: i64,
    pub data_source: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_seconds: f64,
}

impl LedgerEntry {
    pub fn status(&self) -> RefreshStatus {
        match (self.success, self.error_message.is_some()) {
            (false, _) => RefreshStatus::Failed,
            (true, true) => RefreshStatus::Partial,
            (true, false) => RefreshStatus::Success,
        }
    }

    /// Age of this entry relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
