pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    change, dim, error, header, human_amount, is_quiet, muted, refresh_summary, section,
    status, success, summary_row, timing, warn,
};
pub use progress::Spinner;
pub use table::{ledger_table, sector_table, stats_table, stock_table, TableBuilder};
pub use theme::{theme, Theme};
