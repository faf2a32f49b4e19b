use chrono::SecondsFormat;
use tabled::{settings::Style, Table, Tabled};

use crate::query::SectorPerformance;
use crate::refresh::LedgerEntry;
use crate::stock::Stock;
use crate::ui::output::human_amount;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Tabled)]
struct StockRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Sector")]
    sector: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "1D")]
    change_1d: String,
    #[tabled(rename = "Market Cap")]
    market_cap: String,
}

#[derive(Tabled)]
struct LedgerRow {
    #[tabled(rename = "#")]
    id: i64,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: i64,
    #[tabled(rename = "Skipped")]
    skipped: i64,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Error")]
    error: String,
}

#[derive(Tabled)]
struct SectorRow {
    #[tabled(rename = "Sector")]
    sector: String,
    #[tabled(rename = "1D %")]
    change_1d: String,
    #[tabled(rename = "1W %")]
    change_1w: String,
    #[tabled(rename = "1M %")]
    change_1m: String,
    #[tabled(rename = "Stocks")]
    stock_count: usize,
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn stock_table(stocks: &[Stock]) -> String {
    let rows: Vec<StockRow> = stocks
        .iter()
        .map(|s| StockRow {
            ticker: s.ticker.clone(),
            name: truncate(&s.name, 32),
            sector: s.sector.clone().unwrap_or_else(|| "--".to_string()),
            price: format!("{:.2}", s.price),
            change_1d: format!("{:+.2}%", s.change_1d),
            market_cap: s.market_cap.map(human_amount).unwrap_or_else(|| "--".to_string()),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn ledger_table(entries: &[LedgerEntry]) -> String {
    let rows: Vec<LedgerRow> = entries
        .iter()
        .map(|e| LedgerRow {
            id: e.id,
            started: e.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            source: e.data_source.clone(),
            status: e.status().to_string(),
            updated: e.stocks_updated,
            skipped: e.stocks_skipped,
            duration: format!("{:.2}s", e.duration_seconds),
            error: e.error_message.as_deref().map(|m| truncate(m, 48)).unwrap_or_default(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn sector_table(sectors: &[SectorPerformance]) -> String {
    let rows: Vec<SectorRow> = sectors
        .iter()
        .map(|s| SectorRow {
            sector: s.sector.clone(),
            change_1d: format!("{:+.2}", s.change_1d),
            change_1w: format!("{:+.2}", s.change_1w),
            change_1m: format!("{:+.2}", s.change_1m),
            stock_count: s.stock_count,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}
