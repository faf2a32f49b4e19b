pub mod engine;
pub mod filter;

pub use engine::{DataStatus, QueryEngine, SectorPerformance, TopMovers, DEFAULT_MAX_AGE_MINUTES};
pub use filter::{SortField, SortOrder, StockQuery};
