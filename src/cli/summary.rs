use super::ui;
use crate::config::AppConfig;
use crate::stats::{self, StatsCache};
use crate::store;
use anyhow::Result;
use comfy_table::Cell;

/// Displays portfolio-level aggregates over the derived loan fields.
pub async fn run(config: &AppConfig) -> Result<()> {
    let store = store::open_default(config)?;
    let cache = StatsCache::new();
    let summary = stats::compute(store.as_ref(), &cache).await?;

    println!(
        "{}\n",
        ui::style_text("Portfolio summary", ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
    table.add_row(vec![
        Cell::new("Loans"),
        Cell::new(summary.loan_count.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Total invested"),
        Cell::new(format!("{:.2}", summary.total_invested)),
    ]);
    table.add_row(vec![
        Cell::new("Invested in open loans"),
        Cell::new(format!("{:.2}", summary.open_invested)),
    ]);
    table.add_row(vec![
        Cell::new("Total repaid"),
        Cell::new(format!("{:.2}", summary.total_repaid)),
    ]);
    table.add_row(vec![
        Cell::new("Weighted realized IRR (closed)"),
        ui::optional_rate_cell(summary.weighted_realized_irr),
    ]);
    println!("{table}");
    Ok(())
}
