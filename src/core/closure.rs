//! Closure determination: a loan is closed once cumulative repayments meet
//! or exceed its expected payoff (invested amount + expected interest).
//!
//! Evaluation is idempotent but not monotonic: a loan can flip back to open
//! after later edits. The service layer owns the side effects (realized IRR
//! on close, clearing it on reopen).
use super::model::{CashFlow, CashFlowKind, Loan};

/// Sum of repayment magnitudes over the loan's cash flows.
pub fn total_repaid(flows: &[CashFlow]) -> f64 {
    flows
        .iter()
        .filter(|flow| flow.kind == CashFlowKind::Repayment)
        .map(|flow| flow.amount.abs())
        .sum()
}

/// `invested_amount + expected_interest_amount`, or `None` while either
/// side is underived. A loan without a payoff is never closed.
pub fn expected_payoff(loan: &Loan) -> Option<f64> {
    match (loan.invested_amount, loan.expected_interest_amount) {
        (Some(invested), Some(interest)) => Some(invested + interest),
        _ => None,
    }
}

/// Whether the loan should be considered closed given its cash flows.
pub fn evaluate(loan: &Loan, flows: &[CashFlow]) -> bool {
    match expected_payoff(loan) {
        Some(payoff) => total_repaid(flows) >= payoff,
        None => false,
    }
}
