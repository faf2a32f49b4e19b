//! Fetcher capability consumed by the refresher
//!
//! Network access lives outside this crate. A fetcher only has to hand back
//! the raw candidates for the whole tracked universe, or fail.

use std::path::{Path, PathBuf};

use crate::stock::StockCandidate;
use crate::{Error, Result};

/// Source of raw stock candidates
pub trait Fetcher {
    /// Label recorded as `data_source` on stocks and ledger entries
    fn source(&self) -> &str;

    /// Fetch candidates for the whole universe
    fn fetch(&self) -> Result<Vec<StockCandidate>>;
}

/// Fetcher over a fixed, in-memory batch
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    source: String,
    candidates: Vec<StockCandidate>,
}

impl StaticFetcher {
    pub fn new(source: impl Into<String>, candidates: Vec<StockCandidate>) -> Self {
        Self {
            source: source.into(),
            candidates,
        }
    }
}

impl Fetcher for StaticFetcher {
    fn source(&self) -> &str {
        &self.source
    }

    fn fetch(&self) -> Result<Vec<StockCandidate>> {
        Ok(self.candidates.clone())
    }
}

/// Fetcher reading a JSON array of candidates from disk.
///
/// Each element is decoded on its own. An element that does not decode
/// still occupies its position in the batch and is skipped on apply, so one
/// bad record never costs the rest of the file.
#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
    source: String,
}

impl JsonFileFetcher {
    pub fn new(path: impl AsRef<Path>, source: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }
}

impl Fetcher for JsonFileFetcher {
    fn source(&self) -> &str {
        &self.source
    }

    fn fetch(&self) -> Result<Vec<StockCandidate>> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Fetch(format!("cannot read {}: {}", self.path.display(), e)))?;
        let records: Vec<serde_json::Value> = serde_json::from_str(&contents)?;
        let candidates: Vec<StockCandidate> = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| decode_record(index, record))
            .collect();
        tracing::debug!("Read {} candidates from {}", candidates.len(), self.path.display());
        Ok(candidates)
    }
}

fn decode_record(index: usize, record: serde_json::Value) -> StockCandidate {
    let ticker = record
        .get("ticker")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    match serde_json::from_value(record) {
        Ok(candidate) => candidate,
        Err(e) => {
            tracing::warn!("Record #{} ({:?}) does not decode: {}", index, ticker, e);
            StockCandidate::malformed(ticker, e.to_string())
        }
    }
}
