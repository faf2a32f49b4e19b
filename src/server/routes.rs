use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::query::{DataStatus, QueryEngine, SectorPerformance, SortField, SortOrder, StockQuery, TopMovers};
use crate::refresh::LedgerEntry;
use crate::server::AppState;
use crate::storage::DEFAULT_SEARCH_LIMIT;
use crate::stock::Stock;
use crate::Error;

const DEFAULT_MOVERS_LIMIT: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub members_only: Option<bool>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        Error::StockNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidQuery(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::RefreshInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match state.store.count_stocks() {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Health check could not reach the database: {}", e);
            "unavailable"
        }
    };
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        database,
    })
}

/// Every cached stock, largest market cap first
pub async fn universe_core(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Stock>> {
    let stocks = state
        .store
        .list_stocks(&StockQuery::new().sort_by(SortField::MarketCap, SortOrder::Desc))
        .map_err(api_error)?;
    Ok(Json(stocks))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Stock>> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let stocks = QueryEngine::new(&state.store)
        .search(&params.q, limit)
        .map_err(api_error)?;
    Ok(Json(stocks))
}

pub async fn list_stocks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Stock>> {
    let mut query = StockQuery::new();
    if let Some(sector) = params.sector {
        query = query.sector(sector);
    }
    if let Some(industry) = params.industry {
        query = query.industry(industry);
    }
    if params.members_only.unwrap_or(false) {
        query = query.members_only();
    }
    if let Some(sort) = params.sort {
        let field = SortField::from_str(&sort).map_err(api_error)?;
        query = query.sort_by(field, params.order.unwrap_or_default());
    }
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }

    let stocks = state.store.list_stocks(&query).map_err(api_error)?;
    Ok(Json(stocks))
}

pub async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<Stock> {
    let stock = state.store.require_stock(&ticker).map_err(api_error)?;
    Ok(Json(stock))
}

pub async fn sectors(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SectorPerformance>> {
    let sectors = QueryEngine::new(&state.store)
        .sector_performance()
        .map_err(api_error)?;
    Ok(Json(sectors))
}

pub async fn top_movers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<TopMovers> {
    let limit = params.limit.unwrap_or(DEFAULT_MOVERS_LIMIT);
    let movers = QueryEngine::new(&state.store)
        .top_movers(limit)
        .map_err(api_error)?;
    Ok(Json(movers))
}

pub async fn data_status(State(state): State<Arc<AppState>>) -> ApiResult<DataStatus> {
    let status = QueryEngine::new(&state.store)
        .data_status(state.max_age)
        .map_err(api_error)?;
    Ok(Json(status))
}

pub async fn refresh_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<LedgerEntry>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let entries = state.store.history(limit).map_err(api_error)?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;
    use crate::refresher::Refresher;
    use crate::stock::StockCandidate;
    use crate::storage::SqliteStore;

    fn state() -> State<Arc<AppState>> {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch = vec![
            StockCandidate::new("AAA", "Alpha Co", 10.0)
                .with_sector("Technology", "Software")
                .with_market_cap(500.0)
                .with_change_1d(1.5),
            StockCandidate::new("BBB", "Beta Co", 20.0)
                .with_sector("Energy", "Oil & Gas")
                .with_market_cap(900.0)
                .with_change_1d(-2.0),
        ];
        Refresher::new(&store)
            .run(&StaticFetcher::new("test", batch))
            .unwrap();

        State(Arc::new(AppState {
            store: Arc::new(store),
            max_age: chrono::Duration::minutes(15),
        }))
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health(state()).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.database, "connected");
    }

    #[tokio::test]
    async fn test_universe_core_ordered_by_market_cap() {
        let Json(stocks) = universe_core(state()).await.ok().unwrap();
        let tickers: Vec<_> = stocks.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "AAA"]);
    }

    #[tokio::test]
    async fn test_get_stock_case_insensitive_and_404() {
        let state = state();
        let Json(stock) = get_stock(state.clone(), Path("aaa".to_string())).await.ok().unwrap();
        assert_eq!(stock.ticker, "AAA");

        let (status, Json(body)) = get_stock(state, Path("ZZZ".to_string())).await.err().unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("ZZZ"));
    }

    #[tokio::test]
    async fn test_search_rejects_blank_query() {
        let params = SearchParams {
            q: " ".to_string(),
            limit: None,
        };
        let (status, _) = search(state(), Query(params)).await.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_stocks_with_sort_and_filter() {
        let params = ListParams {
            sort: Some("1d".to_string()),
            order: Some(SortOrder::Asc),
            ..Default::default()
        };
        let Json(stocks) = list_stocks(state(), Query(params)).await.ok().unwrap();
        assert_eq!(stocks[0].ticker, "BBB");

        let params = ListParams {
            sector: Some("Technology".to_string()),
            ..Default::default()
        };
        let Json(stocks) = list_stocks(state(), Query(params)).await.ok().unwrap();
        assert_eq!(stocks.len(), 1);

        let params = ListParams {
            sort: Some("ticker".to_string()),
            ..Default::default()
        };
        let (status, _) = list_stocks(state(), Query(params)).await.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_top_movers_and_sectors() {
        let state = state();
        let Json(movers) = top_movers(state.clone(), Query(LimitParams { limit: Some(1) }))
            .await
            .ok()
            .unwrap();
        assert_eq!(movers.gainers[0].ticker, "AAA");
        assert_eq!(movers.losers[0].ticker, "BBB");

        let Json(sectors) = sectors(state).await.ok().unwrap();
        assert_eq!(sectors[0].sector, "Technology");
        assert_eq!(sectors[0].stock_count, 1);
    }

    #[tokio::test]
    async fn test_data_status_and_history() {
        let state = state();
        let Json(status) = data_status(state.clone()).await.ok().unwrap();
        assert!(!status.needs_refresh);
        assert_eq!(status.total_stocks, 2);
        assert_eq!(status.recent_refreshes.len(), 1);

        let Json(history) = refresh_history(state, Query(LimitParams { limit: None }))
            .await
            .ok()
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
    }
}
