//! Validated store write boundary
//!
//! Turns a raw `StockCandidate` into a `Stock` or explains why it cannot be
//! stored. Range constraints live here rather than in the schema.

use chrono::{DateTime, Utc};

use crate::stock::{normalize_ticker, Stock, StockCandidate};

/// Longest ticker accepted (index symbols such as `^GSPC` included)
const MAX_TICKER_LEN: usize = 16;

/// Why a candidate was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid ticker {0:?}")]
    InvalidTicker(String),

    #[error("field `{field}` is not a finite number")]
    NotFinite { field: &'static str },

    #[error("field `{field}` must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{horizon} high {high} is below low {low}")]
    InvertedRange {
        horizon: &'static str,
        high: f64,
        low: f64,
    },
}

/// Validate a candidate and build the record that will be written.
///
/// `last_updated` is taken from `now`, never from the candidate.
pub fn validate_candidate(
    candidate: &StockCandidate,
    source: &str,
    now: DateTime<Utc>,
) -> Result<Stock, ValidationError> {
    if let Some(reason) = &candidate.malformed {
        return Err(ValidationError::Malformed(reason.clone()));
    }
    let ticker = validate_ticker(candidate.ticker.as_deref())?;

    let name = candidate
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ValidationError::MissingField("name"))?
        .to_string();

    let price = candidate.price.ok_or(ValidationError::MissingField("price"))?;
    let price = non_negative("price", price)?;

    let volume = candidate.volume.unwrap_or(0);
    if volume < 0 {
        return Err(ValidationError::Negative {
            field: "volume",
            value: volume as f64,
        });
    }

    let (high_1d, low_1d) = range("1d", candidate.high_1d, candidate.low_1d)?;
    let (high_1m, low_1m) = range("1m", candidate.high_1m, candidate.low_1m)?;
    let (high_1y, low_1y) = range("1y", candidate.high_1y, candidate.low_1y)?;
    let (high_5y, low_5y) = range("5y", candidate.high_5y, candidate.low_5y)?;

    let institutional_ownership =
        finite_or("institutional_ownership", candidate.institutional_ownership, 0.0)?;
    if !(0.0..=1.0).contains(&institutional_ownership) {
        tracing::warn!(
            "{}: institutional ownership {} outside [0, 1], storing as given",
            ticker,
            institutional_ownership
        );
    }

    Ok(Stock {
        ticker,
        name,
        sector: text(&candidate.sector),
        industry: text(&candidate.industry),

        price,
        change_1d: finite_or("change_1d", candidate.change_1d, 0.0)?,
        change_1w: finite_or("change_1w", candidate.change_1w, 0.0)?,
        change_1m: finite_or("change_1m", candidate.change_1m, 0.0)?,
        change_1y: finite_or("change_1y", candidate.change_1y, 0.0)?,
        change_5y: finite_or("change_5y", candidate.change_5y, 0.0)?,
        change_ytd: finite_or("change_ytd", candidate.change_ytd, 0.0)?,

        volume,
        high_1d,
        low_1d,
        high_1m,
        low_1m,
        high_1y,
        low_1y,
        high_5y,
        low_5y,

        // P/E is the one valuation ratio that may go negative
        pe_ratio: optional_finite("pe_ratio", candidate.pe_ratio)?,
        eps: optional_non_negative("eps", candidate.eps)?,
        dividend_yield: non_negative("dividend_yield", candidate.dividend_yield.unwrap_or(0.0))?,
        market_cap: optional_non_negative("market_cap", candidate.market_cap)?,
        shares_outstanding: optional_non_negative("shares_outstanding", candidate.shares_outstanding)?,

        net_profit_margin: finite_or("net_profit_margin", candidate.net_profit_margin, 0.0)?,
        gross_margin: finite_or("gross_margin", candidate.gross_margin, 0.0)?,
        roe: finite_or("roe", candidate.roe, 0.0)?,
        revenue_ttm: optional_non_negative("revenue_ttm", candidate.revenue_ttm)?,

        beta: finite_or("beta", candidate.beta, 1.0)?,
        institutional_ownership,
        debt_to_equity: optional_finite("debt_to_equity", candidate.debt_to_equity)?,

        year_founded: candidate.year_founded,
        website: text(&candidate.website),
        city: text(&candidate.city),
        state: text(&candidate.state),
        zip: text(&candidate.zip),
        weight: finite_or("weight", candidate.weight, 0.0)?,

        last_updated: now,
        data_source: source.to_string(),
        is_sp500: candidate.is_sp500.unwrap_or(true),
    })
}

fn validate_ticker(raw: Option<&str>) -> Result<String, ValidationError> {
    let raw = raw.ok_or(ValidationError::MissingField("ticker"))?;
    let ticker = normalize_ticker(raw);
    if ticker.is_empty() {
        return Err(ValidationError::MissingField("ticker"));
    }

    let well_formed = ticker.len() <= MAX_TICKER_LEN
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !well_formed {
        return Err(ValidationError::InvalidTicker(raw.to_string()));
    }
    Ok(ticker)
}

fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NotFinite { field })
    }
}

fn finite_or(field: &'static str, value: Option<f64>, default: f64) -> Result<f64, ValidationError> {
    finite(field, value.unwrap_or(default))
}

fn optional_finite(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    value.map(|v| finite(field, v)).transpose()
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

fn optional_non_negative(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    value.map(|v| non_negative(field, v)).transpose()
}

fn range(
    horizon: &'static str,
    high: Option<f64>,
    low: Option<f64>,
) -> Result<(Option<f64>, Option<f64>), ValidationError> {
    let high = optional_finite("high", high)?;
    let low = optional_finite("low", low)?;
    if let (Some(h), Some(l)) = (high, low) {
        if h < l {
            return Err(ValidationError::InvertedRange { horizon, high: h, low: l });
        }
    }
    Ok((high, low))
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(candidate: StockCandidate) -> Result<Stock, ValidationError> {
        validate_candidate(&candidate, "test", Utc::now())
    }

    #[test]
    fn test_minimal_candidate_gets_defaults() {
        let stock = check(StockCandidate::new("aaa", " Alpha Co ", 10.0)).unwrap();

        assert_eq!(stock.ticker, "AAA");
        assert_eq!(stock.name, "Alpha Co");
        assert_eq!(stock.volume, 0);
        assert_eq!(stock.beta, 1.0);
        assert_eq!(stock.dividend_yield, 0.0);
        assert!(stock.is_sp500);
        assert_eq!(stock.data_source, "test");
    }

    #[test]
    fn test_negative_price_rejected() {
        let err = check(StockCandidate::new("BBB", "Beta Co", -5.0)).unwrap_err();
        assert!(matches!(err, ValidationError::Negative { field: "price", .. }));
    }

    #[test]
    fn test_missing_required_fields() {
        let mut candidate = StockCandidate::new("CCC", "Gamma", 1.0);
        candidate.price = None;
        assert_eq!(check(candidate).unwrap_err(), ValidationError::MissingField("price"));

        let mut candidate = StockCandidate::new("CCC", "Gamma", 1.0);
        candidate.name = Some("  ".to_string());
        assert_eq!(check(candidate).unwrap_err(), ValidationError::MissingField("name"));

        let mut candidate = StockCandidate::new("CCC", "Gamma", 1.0);
        candidate.ticker = None;
        assert_eq!(check(candidate).unwrap_err(), ValidationError::MissingField("ticker"));
    }

    #[test]
    fn test_nan_price_rejected() {
        let err = check(StockCandidate::new("DDD", "Delta", f64::NAN)).unwrap_err();
        assert_eq!(err, ValidationError::NotFinite { field: "price" });
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut candidate = StockCandidate::new("EEE", "Echo", 5.0);
        candidate.high_1y = Some(4.0);
        candidate.low_1y = Some(6.0);
        assert!(matches!(
            check(candidate).unwrap_err(),
            ValidationError::InvertedRange { horizon: "1y", .. }
        ));
    }

    #[test]
    fn test_half_range_accepted() {
        let mut candidate = StockCandidate::new("FFF", "Foxtrot", 5.0);
        candidate.high_1m = Some(7.0);
        let stock = check(candidate).unwrap();
        assert_eq!(stock.high_1m, Some(7.0));
        assert_eq!(stock.low_1m, None);
    }

    #[test]
    fn test_negative_pe_tolerated() {
        let mut candidate = StockCandidate::new("GGG", "Golf", 5.0);
        candidate.pe_ratio = Some(-12.5);
        candidate.beta = Some(-0.3);
        let stock = check(candidate).unwrap();
        assert_eq!(stock.pe_ratio, Some(-12.5));
        assert_eq!(stock.beta, -0.3);
    }

    #[test]
    fn test_negative_eps_rejected() {
        let mut candidate = StockCandidate::new("GGG", "Golf", 5.0);
        candidate.pe_ratio = Some(-12.5);
        candidate.eps = Some(-0.4);
        assert!(matches!(
            check(candidate).unwrap_err(),
            ValidationError::Negative { field: "eps", .. }
        ));
    }

    #[test]
    fn test_negative_market_cap_rejected() {
        let candidate = StockCandidate::new("HHH", "Hotel", 5.0).with_market_cap(-1.0);
        assert!(matches!(
            check(candidate).unwrap_err(),
            ValidationError::Negative { field: "market_cap", .. }
        ));
    }

    #[test]
    fn test_ownership_out_of_range_is_not_fatal() {
        let mut candidate = StockCandidate::new("III", "India", 5.0);
        candidate.institutional_ownership = Some(1.4);
        assert_eq!(check(candidate).unwrap().institutional_ownership, 1.4);
    }

    #[test]
    fn test_undecodable_record_rejected() {
        let candidate = StockCandidate::malformed(Some("BBB".to_string()), "invalid type: string \"n/a\"");
        let err = check(candidate).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(ref reason) if reason.contains("n/a")));
    }

    #[test]
    fn test_malformed_ticker_rejected() {
        let candidate = StockCandidate::new("BAD TICKER", "Nope", 5.0);
        assert!(matches!(check(candidate).unwrap_err(), ValidationError::InvalidTicker(_)));
    }
}
