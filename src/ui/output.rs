use crate::refresh::RefreshStatus;
use crate::refresher::RefreshReport;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `TICKERCACHE_QUIET=1` hides spinners and decorative output
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("TICKERCACHE_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn timing(elapsed: &str) {
    println!("{} {}", Icons::CLOCK.style(theme().dim.clone()), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// Percent change with sign, colored by direction
pub fn change(value: f64) -> String {
    format!("{:+.2}%", value)
        .style(theme().change(value))
        .to_string()
}

/// Large amounts in T/B/M/K units
pub fn human_amount(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.1}K", value / 1e3)
    } else {
        format!("{:.0}", value)
    }
}

/// Print the result of one refresh run
pub fn refresh_summary(report: &RefreshReport) {
    let outcome = &report.outcome;
    match report.status() {
        RefreshStatus::Success => success(&format!(
            "Refreshed {} stocks from {}",
            outcome.stocks_updated(),
            report.entry.data_source
        )),
        RefreshStatus::Partial => warn(&format!(
            "Refreshed {} of {} stocks from {}",
            outcome.stocks_updated(),
            outcome.candidates,
            report.entry.data_source
        )),
        RefreshStatus::Failed => error(&format!(
            "Refresh from {} failed: {}",
            report.entry.data_source,
            report.entry.error_message.as_deref().unwrap_or("unknown error")
        )),
    }

    summary_row("Inserted:", &outcome.inserted.len().to_string());
    summary_row("Updated: ", &outcome.updated.len().to_string());
    summary_row("Skipped: ", &outcome.skipped.len().to_string());
    for skip in outcome.skipped.iter().take(10) {
        println!("    {}", muted(&skip.to_string()));
    }
    if outcome.skipped.len() > 10 {
        println!("    {}", muted(&format!("... and {} more", outcome.skipped.len() - 10)));
    }
    summary_row("Ledger entry:", &format!("#{}", report.entry.id));
    timing(&format!("{:.2}s", report.elapsed_seconds));
}
