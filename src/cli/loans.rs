use super::ui;
use crate::config::AppConfig;
use crate::core::closure;
use crate::core::model::Loan;
use crate::store;
use anyhow::{Result, bail};
use comfy_table::Cell;
use futures::future::join_all;
use tracing::debug;

/// Lists loans with their derived metrics, optionally filtered by a
/// `field=value` expression.
pub async fn run(config: &AppConfig, filter: Option<&str>) -> Result<()> {
    let store = store::open_default(config)?;

    let loans = match filter {
        Some(expression) => {
            let Some((field, value)) = expression.split_once('=') else {
                bail!("filter must be of the form field=value, got: {expression}");
            };
            store.filter_loans(field.trim(), value.trim()).await?
        }
        None => store.list_loans().await?,
    };
    debug!(count = loans.len(), "loaded loans");

    if loans.is_empty() {
        println!("No loans found.");
        return Ok(());
    }

    // Each loan's cash flows are fetched concurrently, mirroring the
    // original API which embeds them in every loan listing.
    let flow_futures = loans.iter().map(|loan| store.cash_flows_for(&loan.identifier));
    let flows = join_all(flow_futures)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Identifier"),
        ui::header_cell("Rating"),
        ui::header_cell("Issue"),
        ui::header_cell("Maturity"),
        ui::header_cell("Invested"),
        ui::header_cell("Exp. Interest"),
        ui::header_cell("Exp. IRR"),
        ui::header_cell("Real. IRR"),
        ui::header_cell("Repaid"),
        ui::header_cell("Closed"),
    ]);

    for (loan, loan_flows) in loans.iter().zip(&flows) {
        table.add_row(loan_row(loan, closure::total_repaid(loan_flows)));
    }
    println!("{table}");
    println!(
        "\n{} {}",
        ui::style_text("Loans:", ui::StyleType::TotalLabel),
        loans.len()
    );
    Ok(())
}

fn loan_row(loan: &Loan, repaid: f64) -> Vec<Cell> {
    vec![
        Cell::new(loan.identifier.clone()),
        Cell::new(loan.rating.to_string()),
        Cell::new(loan.issue_date.to_string()),
        Cell::new(loan.maturity_date.to_string()),
        ui::format_optional_cell(loan.invested_amount, |v| format!("{v:.2}")),
        ui::format_optional_cell(loan.expected_interest_amount, |v| format!("{v:.2}")),
        ui::optional_rate_cell(loan.expected_irr),
        ui::optional_rate_cell(loan.realized_irr),
        Cell::new(format!("{repaid:.2}")),
        Cell::new(if loan.is_closed { "yes" } else { "no" }),
    ]
}
