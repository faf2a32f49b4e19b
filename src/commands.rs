use crate::{emit, emit_success, OutputMode};
use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tickercache::config::{self, TickercacheConfig};
use tickercache::ui::{self, Icons, Spinner, TableBuilder};
use tickercache::{
    JsonFileFetcher, QueryEngine, RefreshReport, RefreshStatus, Refresher, SortField, SortOrder,
    SqliteStore, Stock, StockQuery,
};

/// Resolved settings shared by every command
pub struct Context {
    pub database: PathBuf,
    pub config_path: PathBuf,
    pub settings: TickercacheConfig,
    pub output: OutputMode,
}

impl Context {
    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        config::ensure_db_dir(&self.database)?;
        Ok(SqliteStore::open(&self.database)?)
    }
}

pub struct ListArgs {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub members_only: bool,
    pub sort: Option<String>,
    pub asc: bool,
    pub limit: Option<usize>,
}

pub fn run_init(ctx: &Context, force: bool) -> anyhow::Result<()> {
    let mut settings = TickercacheConfig::with_defaults();
    settings.database = Some(ctx.database.display().to_string());
    config::write_config(&ctx.config_path, &settings, force)?;
    ctx.open_store()?;

    if ctx.output.is_human() {
        ui::success(&format!("Wrote {}", ctx.config_path.display()));
        ui::status(Icons::DATABASE, "Database", &ctx.database.display().to_string());
    } else {
        emit_success(
            ctx.output,
            "init",
            serde_json::json!({
                "config": ctx.config_path,
                "database": ctx.database,
            }),
        )?;
    }
    Ok(())
}

pub fn run_refresh(ctx: &Context, input: &Path, source: Option<String>) -> anyhow::Result<()> {
    let source = source.unwrap_or_else(|| ctx.settings.data_source().to_string());
    let store = ctx.open_store()?;
    let fetcher = JsonFileFetcher::new(input, source);

    let spinner = ctx
        .output
        .is_human()
        .then(|| Spinner::new(&format!("Refreshing from {}", input.display())));
    let result = Refresher::new(&store).run(&fetcher);
    if let Some(spinner) = &spinner {
        spinner.clear();
    }
    let report = result?;

    if ctx.output.is_human() {
        ui::refresh_summary(&report);
    } else {
        emit(
            ctx.output,
            refresh_succeeded(&report),
            "refresh",
            serde_json::to_value(&report)?,
        )?;
    }

    if !refresh_succeeded(&report) {
        anyhow::bail!(
            "refresh failed: {}",
            report.entry.error_message.as_deref().unwrap_or("no records written")
        );
    }
    Ok(())
}

/// A refresh that wrote nothing fails the command
fn refresh_succeeded(report: &RefreshReport) -> bool {
    report.status() != RefreshStatus::Failed
}

pub fn run_show(ctx: &Context, ticker: &str) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stock = store.require_stock(ticker)?;

    if ctx.output.is_human() {
        ui::section(&format!("{} · {}", stock.ticker, stock.name));
        println!("{}", stock_detail(&stock));
    } else {
        emit_success(ctx.output, "show", serde_json::to_value(&stock)?)?;
    }
    Ok(())
}

pub fn run_list(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let mut query = StockQuery::new();
    if let Some(sector) = args.sector {
        query = query.sector(sector);
    }
    if let Some(industry) = args.industry {
        query = query.industry(industry);
    }
    if args.members_only {
        query = query.members_only();
    }
    if let Some(sort) = &args.sort {
        let order = if args.asc { SortOrder::Asc } else { SortOrder::Desc };
        query = query.sort_by(SortField::from_str(sort)?, order);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }

    let store = ctx.open_store()?;
    let stocks = store.list_stocks(&query)?;
    print_stocks(ctx, "list", &stocks)
}

pub fn run_search(ctx: &Context, query: &str, limit: usize) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stocks = QueryEngine::new(&store).search(query, limit)?;
    if ctx.output.is_human() {
        println!("{} Searching for '{}'", Icons::SEARCH, query);
    }
    print_stocks(ctx, "search", &stocks)
}

pub fn run_movers(ctx: &Context, limit: usize) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let movers = QueryEngine::new(&store).top_movers(limit)?;

    if ctx.output.is_human() {
        ui::section(&format!("{} Top gainers", Icons::UP));
        println!("{}", ui::stock_table(&movers.gainers));
        ui::section(&format!("{} Top losers", Icons::DOWN));
        println!("{}", ui::stock_table(&movers.losers));
    } else {
        emit_success(ctx.output, "movers", serde_json::to_value(&movers)?)?;
    }
    Ok(())
}

pub fn run_sectors(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let sectors = QueryEngine::new(&store).sector_performance()?;

    if ctx.output.is_human() {
        if sectors.is_empty() {
            println!("{} No sector data cached.", Icons::CROSS);
        } else {
            ui::section(&format!("{} Sector performance", Icons::CHART));
            println!("{}", ui::sector_table(&sectors));
        }
    } else {
        emit_success(ctx.output, "sectors", serde_json::to_value(&sectors)?)?;
    }
    Ok(())
}

pub fn run_status(ctx: &Context, history: usize) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let status = QueryEngine::new(&store).data_status(ctx.settings.max_age())?;
    let entries = store.history(history)?;

    if !ctx.output.is_human() {
        let mut data = serde_json::to_value(&status)?;
        data["recent_refreshes"] = serde_json::to_value(&entries)?;
        return emit_success(ctx.output, "status", data);
    }

    let age = status
        .age_minutes
        .map(|m| format!("{:.2} minutes", m))
        .unwrap_or_else(|| "never refreshed".to_string());
    ui::status(Icons::CLOCK, "Data age", &age);
    ui::status(Icons::DATABASE, "Stocks", &status.total_stocks.to_string());
    if status.needs_refresh {
        ui::warn("Data is stale; run `tickercache refresh`");
    } else {
        ui::success("Data is fresh");
    }

    if !entries.is_empty() {
        ui::section("Recent refreshes");
        println!("{}", ui::ledger_table(&entries));
    }
    Ok(())
}

pub fn run_reconcile(ctx: &Context, universe: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(universe)?;
    let tickers = parse_universe(&contents)?;
    let store = ctx.open_store()?;
    let demoted = store.mark_non_members(&tickers)?;

    if ctx.output.is_human() {
        if demoted.is_empty() {
            ui::success(&format!("All members present in {} tickers", tickers.len()));
        } else {
            ui::warn(&format!("{} stocks left the universe", demoted.len()));
            for ticker in &demoted {
                println!("  {}", ui::muted(ticker));
            }
        }
    } else {
        emit_success(ctx.output, "reconcile", serde_json::json!({ "demoted": demoted }))?;
    }
    Ok(())
}

pub fn run_serve(ctx: &Context, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or_else(|| ctx.settings.port());
    let store = Arc::new(ctx.open_store()?);

    if ctx.output.is_human() {
        ui::status(
            Icons::GLOBE,
            "Serving",
            &format!("http://0.0.0.0:{}", port).bold().to_string(),
        );
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(tickercache::server::start_server(
        port,
        store,
        ctx.settings.max_age(),
    ))
}

pub fn run_stats(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats()?;

    if ctx.output.is_human() {
        ui::header(&format!("Tickercache Statistics ({})", ctx.database.display()));
        let show = |ts: Option<chrono::DateTime<chrono::Utc>>| {
            ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "never".to_string())
        };
        let rows = [
            ("Stocks", stats.stocks.to_string()),
            ("Members", stats.members.to_string()),
            ("Refresh log entries", stats.ledger_entries.to_string()),
            ("Newest update", show(stats.newest_update)),
            ("Last successful refresh", show(stats.last_success)),
        ];
        let rows: Vec<(&str, &str)> = rows.iter().map(|(label, value)| (*label, value.as_str())).collect();
        println!("{}", ui::stats_table(&rows));
    } else {
        emit_success(ctx.output, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

fn print_stocks(ctx: &Context, command: &str, stocks: &[Stock]) -> anyhow::Result<()> {
    if !ctx.output.is_human() {
        return emit_success(ctx.output, command, serde_json::to_value(stocks)?);
    }
    if stocks.is_empty() {
        println!("{} No stocks found.", Icons::CROSS);
    } else {
        println!("{}", ui::stock_table(stocks));
        println!("{}", ui::dim(&format!("{} stocks", stocks.len())));
    }
    Ok(())
}

fn stock_detail(stock: &Stock) -> String {
    let opt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "--".to_string());
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "--".to_string());

    let mut table = TableBuilder::new();
    table.add_row("Sector", &text(&stock.sector));
    table.add_row("Industry", &text(&stock.industry));
    table.add_row("Price", &format!("{:.2}", stock.price));
    table.add_row("1D", &ui::change(stock.change_1d));
    table.add_row("1W", &ui::change(stock.change_1w));
    table.add_row("1M", &ui::change(stock.change_1m));
    table.add_row("1Y", &ui::change(stock.change_1y));
    table.add_row("YTD", &ui::change(stock.change_ytd));
    table.add_row("Volume", &stock.volume.to_string());
    table.add_row("Market cap", &stock.market_cap.map(ui::human_amount).unwrap_or_else(|| "--".to_string()));
    table.add_row("P/E", &opt(stock.pe_ratio));
    table.add_row("EPS", &opt(stock.eps));
    table.add_row("Dividend yield", &format!("{:.2}%", stock.dividend_yield));
    table.add_row("Net margin", &format!("{:.2}%", stock.net_profit_margin));
    table.add_row("ROE", &format!("{:.2}%", stock.roe));
    table.add_row("Beta", &format!("{:.2}", stock.beta));
    table.add_row("52W range", &format!("{} - {}", opt(stock.low_1y), opt(stock.high_1y)));
    table.add_row("Website", &text(&stock.website));
    table.add_row("Member", if stock.is_sp500 { "yes" } else { "no" });
    table.add_row(
        "Updated",
        &format!(
            "{} ({})",
            stock.last_updated.to_rfc3339_opts(SecondsFormat::Secs, true),
            stock.data_source
        ),
    );
    table.build()
}

/// Tickers from a universe file: a JSON array, or one ticker per line (`#` comments allowed)
fn parse_universe(contents: &str) -> anyhow::Result<Vec<String>> {
    let trimmed = contents.trim_start();
    let tickers: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };

    if tickers.is_empty() {
        anyhow::bail!("universe file lists no tickers");
    }
    Ok(tickers)
}
