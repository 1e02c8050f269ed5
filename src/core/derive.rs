//! Pure derivation of loan-level metrics from a loan and its cash flows.
//!
//! Each function computes one derived field; [`crate::service`] runs them in
//! order (investment date, invested amount, expected interest, expected IRR,
//! realized IRR) and persists the results. Nothing here touches storage.
//!
//! Sign convention: amounts are stored as magnitudes; the IRR input builders
//! negate funding flows and keep repayments positive.
use super::irr::{self, IrrError};
use super::model::{CashFlow, CashFlowKind, Loan};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("loan {0}: total amount is zero, cannot apportion expected interest")]
    DivisionByZero(String),
    #[error("loan {0}: no funding cash flow")]
    MissingFunding(String),
    #[error("loan {0}: no repayment cash flow")]
    MissingRepayment(String),
    #[error("loan {identifier}: irr did not converge: {source}")]
    Irr {
        identifier: String,
        #[source]
        source: IrrError,
    },
}

/// The funding flow used by every derivation step: latest `reference_date`,
/// ties broken by highest id.
pub fn funding_flow(flows: &[CashFlow]) -> Option<&CashFlow> {
    flows
        .iter()
        .filter(|flow| flow.kind == CashFlowKind::Funding)
        .max_by_key(|flow| (flow.reference_date, flow.id))
}

/// Step 1: the funding flow's reference date, or `None` when the loan has no
/// funding flow yet.
pub fn investment_date(flows: &[CashFlow]) -> Option<NaiveDate> {
    funding_flow(flows).map(|flow| flow.reference_date)
}

/// Step 2: the magnitude of the funding flow's amount.
pub fn invested_amount(flows: &[CashFlow]) -> Option<f64> {
    funding_flow(flows).map(|flow| flow.amount.abs())
}

/// Step 3: expected interest apportioned to the invested share of the loan.
/// `None` until an invested amount has been derived.
pub fn expected_interest(loan: &Loan) -> Result<Option<f64>, DeriveError> {
    let Some(invested) = loan.invested_amount else {
        return Ok(None);
    };
    if loan.total_amount == 0.0 {
        return Err(DeriveError::DivisionByZero(loan.identifier.clone()));
    }
    Ok(Some(
        loan.total_expected_interest_amount * (invested / loan.total_amount),
    ))
}

/// Step 4: expected IRR from funding to the projected payoff at maturity.
/// Requires steps 1-3 to have run.
pub fn expected_irr(loan: &Loan, flows: &[CashFlow]) -> Result<f64, DeriveError> {
    let funding =
        funding_flow(flows).ok_or_else(|| DeriveError::MissingFunding(loan.identifier.clone()))?;
    let (Some(invested), Some(interest)) = (loan.invested_amount, loan.expected_interest_amount)
    else {
        return Err(DeriveError::MissingFunding(loan.identifier.clone()));
    };

    let projected = vec![
        (funding.reference_date, -invested),
        (loan.maturity_date, invested + interest),
    ];
    irr::solve_irr(&projected).map_err(|source| DeriveError::Irr {
        identifier: loan.identifier.clone(),
        source,
    })
}

/// Step 5: realized IRR from the funding flow and the repayments actually
/// received, ordered by reference date then id. Only meaningful for closed
/// loans; requires at least one funding and one repayment flow.
pub fn realized_irr(loan: &Loan, flows: &[CashFlow]) -> Result<f64, DeriveError> {
    let funding =
        funding_flow(flows).ok_or_else(|| DeriveError::MissingFunding(loan.identifier.clone()))?;

    let mut repayments: Vec<&CashFlow> = flows
        .iter()
        .filter(|flow| flow.kind == CashFlowKind::Repayment)
        .collect();
    if repayments.is_empty() {
        return Err(DeriveError::MissingRepayment(loan.identifier.clone()));
    }
    repayments.sort_by_key(|flow| (flow.reference_date, flow.id));

    let mut realized = vec![(funding.reference_date, -funding.amount.abs())];
    realized.extend(
        repayments
            .iter()
            .map(|flow| (flow.reference_date, flow.amount.abs())),
    );

    irr::solve_irr(&realized).map_err(|source| DeriveError::Irr {
        identifier: loan.identifier.clone(),
        source,
    })
}
