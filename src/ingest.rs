//! Bulk ingestion of loans and cash flows from CSV text.
//!
//! The pipeline is one unit of work: load loan rows, load cash-flow rows,
//! then run the full derivation sequence over every loan the batch touched.
//! Row failures are partial-success: a bad row is recorded in the report
//! and skipped, the batch continues. Re-running the same inputs is safe:
//! replace mode clears first, append mode rejects duplicate identifiers.
use crate::config::IngestMode;
use crate::core::model::{CashFlowKind, Loan, NewCashFlow};
use crate::service::LoanService;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

/// Expected loan CSV header:
/// `identifier,issue_date,total_amount,rating,maturity_date,total_expected_interest_amount`
#[derive(Debug, Deserialize)]
struct LoanRow {
    identifier: String,
    issue_date: NaiveDate,
    total_amount: f64,
    rating: u8,
    maturity_date: NaiveDate,
    total_expected_interest_amount: f64,
}

/// Expected cash-flow CSV header:
/// `loan_identifier,reference_date,type,amount`
#[derive(Debug, Deserialize)]
struct CashFlowRow {
    loan_identifier: String,
    reference_date: NaiveDate,
    #[serde(rename = "type")]
    kind: CashFlowKind,
    amount: f64,
}

#[derive(Debug, Error)]
pub enum RowError {
    #[error("invalid row: {0}")]
    Validation(String),
    #[error("unknown loan identifier {0}")]
    UnknownLoan(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTable {
    Loans,
    CashFlows,
}

impl std::fmt::Display for RowTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowTable::Loans => write!(f, "loans"),
            RowTable::CashFlows => write!(f, "cash flows"),
        }
    }
}

#[derive(Debug)]
pub struct RejectedRow {
    pub table: RowTable,
    /// 1-based data row number, excluding the header.
    pub row: usize,
    pub reason: RowError,
}

/// A loan whose rows loaded but whose derivation chain failed in part.
#[derive(Debug)]
pub struct DerivationFailure {
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub loans_created: usize,
    pub cash_flows_created: usize,
    pub rejected: Vec<RejectedRow>,
    pub derivation_failures: Vec<DerivationFailure>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.derivation_failures.is_empty()
    }

    fn reject(&mut self, table: RowTable, row: usize, reason: RowError) {
        warn!(%table, row, %reason, "rejected row");
        self.rejected.push(RejectedRow { table, row, reason });
    }
}

/// Runs the ingestion pipeline. `progress` is invoked once per processed
/// row.
pub async fn run(
    service: &LoanService,
    loans_csv: &str,
    cash_flows_csv: &str,
    mode: IngestMode,
    progress: &(dyn Fn() + Sync),
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let store = service.store();

    if mode == IngestMode::Replace {
        info!("replace mode: clearing existing loans");
        store.clear_loans().await?;
    }

    // Identifiers touched by this batch, derived once at the end.
    let mut touched = BTreeSet::new();

    let mut reader = csv::Reader::from_reader(loans_csv.as_bytes());
    for (index, record) in reader.deserialize::<LoanRow>().enumerate() {
        let row = index + 1;
        progress();
        let parsed = match record {
            Ok(parsed) => parsed,
            Err(error) => {
                report.reject(RowTable::Loans, row, RowError::Validation(error.to_string()));
                continue;
            }
        };
        let loan = Loan::new(
            parsed.identifier,
            parsed.issue_date,
            parsed.maturity_date,
            parsed.total_amount,
            parsed.rating,
            parsed.total_expected_interest_amount,
        );
        if let Err(error) = loan.validate() {
            report.reject(RowTable::Loans, row, RowError::Validation(error.to_string()));
            continue;
        }
        if store.get_loan(&loan.identifier).await?.is_some() {
            report.reject(
                RowTable::Loans,
                row,
                RowError::Validation(format!("loan {} already exists", loan.identifier)),
            );
            continue;
        }
        let identifier = loan.identifier.clone();
        service.create_loan(loan).await?;
        touched.insert(identifier);
        report.loans_created += 1;
    }

    let mut reader = csv::Reader::from_reader(cash_flows_csv.as_bytes());
    for (index, record) in reader.deserialize::<CashFlowRow>().enumerate() {
        let row = index + 1;
        progress();
        let parsed = match record {
            Ok(parsed) => parsed,
            Err(error) => {
                report.reject(
                    RowTable::CashFlows,
                    row,
                    RowError::Validation(error.to_string()),
                );
                continue;
            }
        };
        // Resolve against loans from this batch or pre-existing ones.
        if store.get_loan(&parsed.loan_identifier).await?.is_none() {
            report.reject(
                RowTable::CashFlows,
                row,
                RowError::UnknownLoan(parsed.loan_identifier),
            );
            continue;
        }
        let flow = NewCashFlow {
            loan_identifier: parsed.loan_identifier.clone(),
            reference_date: parsed.reference_date,
            kind: parsed.kind,
            amount: parsed.amount,
        };
        store.create_cash_flow(flow).await?;
        touched.insert(parsed.loan_identifier);
        report.cash_flows_created += 1;
    }

    // Derive every touched loan; one loan's failure never stops the rest.
    for identifier in &touched {
        let failures = service.compute_loan_metrics(identifier).await?;
        for failure in failures {
            warn!(%identifier, %failure, "derivation failure during ingest");
            report.derivation_failures.push(DerivationFailure {
                identifier: identifier.clone(),
                reason: failure.to_string(),
            });
        }
    }

    info!(
        loans = report.loans_created,
        cash_flows = report.cash_flows_created,
        rejected = report.rejected.len(),
        "ingestion finished"
    );
    Ok(report)
}
