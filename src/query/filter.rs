//! Stock list filters and sort keys
//!
//! `StockQuery` compiles to a WHERE / ORDER BY / LIMIT clause. Column names
//! come only from `SortField`, never from caller text, and filter values are
//! bound as parameters.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Numeric columns a stock list can be ranked by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Change1d,
    Change1w,
    Change1m,
    Change1y,
    Change5y,
    ChangeYtd,
    Volume,
    PeRatio,
    Eps,
    DividendYield,
    MarketCap,
    SharesOutstanding,
    NetProfitMargin,
    GrossMargin,
    Roe,
    RevenueTtm,
    Beta,
    InstitutionalOwnership,
    DebtToEquity,
    Weight,
}

impl SortField {
    /// Column name backing this field
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::Change1d => "change_1d",
            SortField::Change1w => "change_1w",
            SortField::Change1m => "change_1m",
            SortField::Change1y => "change_1y",
            SortField::Change5y => "change_5y",
            SortField::ChangeYtd => "change_ytd",
            SortField::Volume => "volume",
            SortField::PeRatio => "pe_ratio",
            SortField::Eps => "eps",
            SortField::DividendYield => "dividend_yield",
            SortField::MarketCap => "market_cap",
            SortField::SharesOutstanding => "shares_outstanding",
            SortField::NetProfitMargin => "net_profit_margin",
            SortField::GrossMargin => "gross_margin",
            SortField::Roe => "roe",
            SortField::RevenueTtm => "revenue_ttm",
            SortField::Beta => "beta",
            SortField::InstitutionalOwnership => "institutional_ownership",
            SortField::DebtToEquity => "debt_to_equity",
            SortField::Weight => "weight",
        }
    }

    /// Whether the column may hold NULL
    pub fn nullable(&self) -> bool {
        matches!(
            self,
            SortField::PeRatio
                | SortField::Eps
                | SortField::MarketCap
                | SortField::SharesOutstanding
                | SortField::RevenueTtm
                | SortField::DebtToEquity
        )
    }

    /// Get all sort fields
    pub fn all() -> &'static [SortField] {
        &[
            SortField::Price,
            SortField::Change1d,
            SortField::Change1w,
            SortField::Change1m,
            SortField::Change1y,
            SortField::Change5y,
            SortField::ChangeYtd,
            SortField::Volume,
            SortField::PeRatio,
            SortField::Eps,
            SortField::DividendYield,
            SortField::MarketCap,
            SortField::SharesOutstanding,
            SortField::NetProfitMargin,
            SortField::GrossMargin,
            SortField::Roe,
            SortField::RevenueTtm,
            SortField::Beta,
            SortField::InstitutionalOwnership,
            SortField::DebtToEquity,
            SortField::Weight,
        ]
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('-', "_");
        if let Some(field) = SortField::all().iter().find(|f| f.as_str() == key) {
            return Ok(*field);
        }
        match key.as_str() {
            "cap" | "mcap" | "marketcap" => Ok(SortField::MarketCap),
            "change" | "1d" => Ok(SortField::Change1d),
            "1w" => Ok(SortField::Change1w),
            "1m" => Ok(SortField::Change1m),
            "1y" => Ok(SortField::Change1y),
            "5y" => Ok(SortField::Change5y),
            "ytd" => Ok(SortField::ChangeYtd),
            "pe" => Ok(SortField::PeRatio),
            "yield" | "dividend" => Ok(SortField::DividendYield),
            "revenue" => Ok(SortField::RevenueTtm),
            "margin" => Ok(SortField::NetProfitMargin),
            _ => Err(Error::InvalidQuery(format!("Unknown sort field: {}", s))),
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter, sort and limit for listing stocks.
///
/// Without a sort field results come back in ticker order. With one, missing
/// values sort last in either direction and ties fall back to ticker order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockQuery {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub is_sp500: Option<bool>,
    pub sort: Option<SortField>,
    #[serde(default)]
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl StockQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Only stocks currently flagged as universe members
    pub fn members_only(mut self) -> Self {
        self.is_sp500 = Some(true);
        self
    }

    pub fn sort_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Some(field);
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the clause that follows `SELECT ... FROM stocks`, plus its bound values
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(sector) = &self.sector {
            values.push(Value::Text(sector.clone()));
            conditions.push(format!("sector = ?{}", values.len()));
        }
        if let Some(industry) = &self.industry {
            values.push(Value::Text(industry.clone()));
            conditions.push(format!("industry = ?{}", values.len()));
        }
        if let Some(member) = self.is_sp500 {
            values.push(Value::Integer(member as i64));
            conditions.push(format!("is_sp500 = ?{}", values.len()));
        }

        let mut clause = String::new();
        if !conditions.is_empty() {
            clause.push_str("WHERE ");
            clause.push_str(&conditions.join(" AND "));
            clause.push(' ');
        }

        // SQLite sorts NULL lowest, so DESC already puts it last. That form
        // matches the (column DESC, ticker) indexes.
        match (self.sort, self.order) {
            (Some(field), SortOrder::Asc) if field.nullable() => {
                clause.push_str(&format!("ORDER BY {} ASC NULLS LAST, ticker ASC", field.as_str()));
            }
            (Some(field), order) => {
                clause.push_str(&format!("ORDER BY {} {}, ticker ASC", field.as_str(), order.as_sql()));
            }
            (None, _) => clause.push_str("ORDER BY ticker ASC"),
        }

        if let Some(limit) = self.limit {
            values.push(Value::Integer(limit as i64));
            clause.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        (clause, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_roundtrip() {
        for field in SortField::all() {
            let parsed: SortField = field.as_str().parse().unwrap();
            assert_eq!(*field, parsed);
        }
    }

    #[test]
    fn test_sort_field_aliases() {
        assert_eq!(SortField::from_str("cap").unwrap(), SortField::MarketCap);
        assert_eq!(SortField::from_str("market-cap").unwrap(), SortField::MarketCap);
        assert_eq!(SortField::from_str("1D").unwrap(), SortField::Change1d);
        assert!(SortField::from_str("ticker; DROP TABLE stocks").is_err());
    }

    #[test]
    fn test_nullable_ascending_sort_puts_nulls_last() {
        let (clause, _) = StockQuery::new()
            .sort_by(SortField::MarketCap, SortOrder::Asc)
            .to_sql();
        assert_eq!(clause, "ORDER BY market_cap ASC NULLS LAST, ticker ASC");

        let (clause, _) = StockQuery::new()
            .sort_by(SortField::MarketCap, SortOrder::Desc)
            .to_sql();
        assert_eq!(clause, "ORDER BY market_cap DESC, ticker ASC");
    }

    #[test]
    fn test_empty_query_orders_by_ticker() {
        let (clause, values) = StockQuery::new().to_sql();
        assert_eq!(clause, "ORDER BY ticker ASC");
        assert!(values.is_empty());
    }

    #[test]
    fn test_full_query_sql() {
        let query = StockQuery::new()
            .sector("Energy")
            .members_only()
            .sort_by(SortField::Change1d, SortOrder::Asc)
            .limit(5);
        let (clause, values) = query.to_sql();

        assert_eq!(
            clause,
            "WHERE sector = ?1 AND is_sp500 = ?2 ORDER BY change_1d ASC, ticker ASC LIMIT ?3"
        );
        assert_eq!(
            values,
            vec![Value::Text("Energy".into()), Value::Integer(1), Value::Integer(5)]
        );
    }
}
