use super::ui;
use crate::config::AppConfig;
use crate::store;
use anyhow::{Result, bail};
use comfy_table::Cell;

/// Lists cash flows, optionally filtered by a `field=value` expression.
pub async fn run(config: &AppConfig, filter: Option<&str>) -> Result<()> {
    let store = store::open_default(config)?;

    let flows = match filter {
        Some(expression) => {
            let Some((field, value)) = expression.split_once('=') else {
                bail!("filter must be of the form field=value, got: {expression}");
            };
            store.filter_cash_flows(field.trim(), value.trim()).await?
        }
        None => store.list_cash_flows().await?,
    };

    if flows.is_empty() {
        println!("No cash flows found.");
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Loan"),
        ui::header_cell("Date"),
        ui::header_cell("Type"),
        ui::header_cell("Amount"),
    ]);
    for flow in &flows {
        table.add_row(vec![
            Cell::new(flow.id.to_string()),
            Cell::new(flow.loan_identifier.clone()),
            Cell::new(flow.reference_date.to_string()),
            Cell::new(flow.kind.to_string()),
            Cell::new(format!("{:.2}", flow.amount)),
        ]);
    }
    println!("{table}");
    println!(
        "\n{} {}",
        ui::style_text("Cash flows:", ui::StyleType::TotalLabel),
        flows.len()
    );
    Ok(())
}
