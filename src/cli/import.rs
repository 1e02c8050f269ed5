use super::ui;
use crate::config::{AppConfig, IngestMode};
use crate::ingest::{self, IngestReport};
use crate::service::LoanService;
use crate::stats::StatsCache;
use crate::store;
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::fs;
use std::sync::Arc;
use tracing::info;

/// Loads two CSV files into the store and derives metrics for every loan
/// the batch touches.
pub async fn run(
    config: &AppConfig,
    loans_path: &str,
    cash_flows_path: &str,
    replace: bool,
) -> Result<()> {
    let loans_csv = fs::read_to_string(loans_path)
        .with_context(|| format!("Failed to read loans file: {loans_path}"))?;
    let cash_flows_csv = fs::read_to_string(cash_flows_path)
        .with_context(|| format!("Failed to read cash flows file: {cash_flows_path}"))?;

    let mode = if replace {
        IngestMode::Replace
    } else {
        config.ingest.mode
    };
    info!(?mode, "Starting bulk ingestion");

    let store = store::open_default(config)?;
    let service = LoanService::new(store, Arc::new(StatsCache::new()));

    let data_rows = |text: &str| text.lines().skip(1).filter(|l| !l.trim().is_empty()).count();
    let pb = ui::new_progress_bar((data_rows(&loans_csv) + data_rows(&cash_flows_csv)) as u64, true);
    pb.set_message("Loading rows...");

    let pb_clone = pb.clone();
    let report = ingest::run(&service, &loans_csv, &cash_flows_csv, mode, &move || {
        pb_clone.inc(1)
    })
    .await?;
    pb.finish_and_clear();

    display_report(&report);
    Ok(())
}

fn display_report(report: &IngestReport) {
    println!(
        "{} {} loans, {} cash flows",
        ui::style_text("Created:", ui::StyleType::TotalLabel),
        report.loans_created,
        report.cash_flows_created
    );

    if !report.rejected.is_empty() {
        println!(
            "\n{}",
            ui::style_text("Rejected rows", ui::StyleType::Error)
        );
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Table"),
            ui::header_cell("Row"),
            ui::header_cell("Reason"),
        ]);
        for rejected in &report.rejected {
            table.add_row(vec![
                Cell::new(rejected.table.to_string()),
                Cell::new(rejected.row.to_string()),
                Cell::new(rejected.reason.to_string()),
            ]);
        }
        println!("{table}");
    }

    if !report.derivation_failures.is_empty() {
        println!(
            "\n{}",
            ui::style_text("Derivation failures", ui::StyleType::Error)
        );
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Loan"), ui::header_cell("Reason")]);
        for failure in &report.derivation_failures {
            table.add_row(vec![
                Cell::new(failure.identifier.clone()),
                Cell::new(failure.reason.clone()),
            ]);
        }
        println!("{table}");
    }

    if report.is_clean() {
        println!("{}", ui::style_text("No rows rejected.", ui::StyleType::TotalValue));
    }
}
