//! Orchestration over the pure core: loads records, runs the derivation
//! sequence and closure evaluation in order, persists each result and
//! invalidates the touched stat keys.
//!
//! Derivation failures are isolated per loan: a failed step is logged and
//! returned, earlier results stay persisted, and sibling loans in a batch
//! are unaffected. Callers must serialize derivation per loan identifier;
//! the service itself takes no locks.
use crate::core::closure;
use crate::core::derive::{self, DeriveError};
use crate::core::model::{CashFlow, CashFlowKind, Loan, NewCashFlow};
use crate::stats::{self, LoanWrite, StatsInvalidation};
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown loan identifier {0}")]
    UnknownLoan(String),
}

pub struct LoanService {
    store: Arc<dyn Store>,
    stats: Arc<dyn StatsInvalidation>,
}

impl LoanService {
    pub fn new(store: Arc<dyn Store>, stats: Arc<dyn StatsInvalidation>) -> Self {
        Self { store, stats }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validates and persists a new loan. Derived fields start unset.
    pub async fn create_loan(&self, loan: Loan) -> Result<()> {
        loan.validate()?;
        self.store.create_loan(loan).await?;
        self.stats
            .invalidate(stats::keys_touched(LoanWrite::LoanCreated))
            .await;
        Ok(())
    }

    /// Deletes a loan, cascading to its cash flows.
    pub async fn delete_loan(&self, identifier: &str) -> Result<bool> {
        let removed = self.store.delete_loan(identifier).await?;
        if removed {
            self.stats
                .invalidate(stats::keys_touched(LoanWrite::LoanDeleted))
                .await;
        }
        Ok(removed)
    }

    /// Records a cash flow against an existing loan, then re-derives the
    /// loan's metrics and re-evaluates closure.
    pub async fn record_cash_flow(
        &self,
        flow: NewCashFlow,
    ) -> Result<(CashFlow, Vec<DeriveError>)> {
        if self.store.get_loan(&flow.loan_identifier).await?.is_none() {
            return Err(ServiceError::UnknownLoan(flow.loan_identifier).into());
        }
        let write = match flow.kind {
            CashFlowKind::Funding => LoanWrite::FundingRecorded,
            CashFlowKind::Repayment => LoanWrite::RepaymentRecorded,
        };
        let flow = self.store.create_cash_flow(flow).await?;
        self.stats.invalidate(stats::keys_touched(write)).await;

        let failures = self.compute_loan_metrics(&flow.loan_identifier).await?;
        Ok((flow, failures))
    }

    /// Runs the full derivation sequence for one loan: investment date,
    /// invested amount, expected interest, expected IRR, then closure
    /// evaluation (which owns the realized IRR). Each step persists before
    /// the next runs. Returned errors are the steps that failed; they never
    /// abort the caller's batch.
    pub async fn compute_loan_metrics(&self, identifier: &str) -> Result<Vec<DeriveError>> {
        let mut loan = self
            .store
            .get_loan(identifier)
            .await?
            .ok_or_else(|| ServiceError::UnknownLoan(identifier.to_string()))?;
        let flows = self.store.cash_flows_for(identifier).await?;
        let mut failures = Vec::new();

        // Steps 1-2 are documented no-ops without a funding flow.
        if let Some(date) = derive::investment_date(&flows) {
            loan.investment_date = Some(date);
            self.store.update_loan(&loan).await?;
        }
        if let Some(amount) = derive::invested_amount(&flows) {
            loan.invested_amount = Some(amount);
            self.store.update_loan(&loan).await?;
        }

        // Step 3; a zero total amount ends this loan's chain.
        match derive::expected_interest(&loan) {
            Ok(Some(interest)) => {
                loan.expected_interest_amount = Some(interest);
                self.store.update_loan(&loan).await?;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(identifier, %error, "expected interest derivation failed");
                failures.push(error);
                self.stats
                    .invalidate(stats::keys_touched(LoanWrite::MetricsDerived))
                    .await;
                return Ok(failures);
            }
        }

        // Step 4 requires the outputs of steps 1-3. An IRR failure leaves
        // only this field untouched.
        if loan.invested_amount.is_some() && loan.expected_interest_amount.is_some() {
            match derive::expected_irr(&loan, &flows) {
                Ok(rate) => {
                    loan.expected_irr = Some(rate);
                    self.store.update_loan(&loan).await?;
                }
                Err(error) => {
                    warn!(identifier, %error, "expected irr derivation failed");
                    failures.push(error);
                }
            }
        }

        self.apply_closure(&mut loan, &flows, &mut failures).await?;
        self.stats
            .invalidate(stats::keys_touched(LoanWrite::MetricsDerived))
            .await;
        debug!(identifier, failed_steps = failures.len(), "derived loan metrics");
        Ok(failures)
    }

    /// Re-evaluates closure for a loan looked up by identifier. Used after
    /// a repayment is posted.
    pub async fn evaluate_closure(&self, identifier: &str) -> Result<Vec<DeriveError>> {
        let loan = self
            .store
            .get_loan(identifier)
            .await?
            .ok_or_else(|| ServiceError::UnknownLoan(identifier.to_string()))?;
        self.evaluate_closure_for(loan).await
    }

    /// Re-evaluates closure for an already materialized loan.
    pub async fn evaluate_closure_for(&self, mut loan: Loan) -> Result<Vec<DeriveError>> {
        let flows = self.store.cash_flows_for(&loan.identifier).await?;
        let mut failures = Vec::new();
        let changed = self.apply_closure(&mut loan, &flows, &mut failures).await?;
        if changed {
            self.stats
                .invalidate(stats::keys_touched(LoanWrite::ClosureChanged))
                .await;
        }
        Ok(failures)
    }

    /// Applies the closure decision and its side effects: a closed loan gets
    /// a realized IRR, a reopened loan drops its realized IRR. Returns
    /// whether the closed state changed.
    async fn apply_closure(
        &self,
        loan: &mut Loan,
        flows: &[CashFlow],
        failures: &mut Vec<DeriveError>,
    ) -> Result<bool> {
        let was_closed = loan.is_closed;
        let closed = closure::evaluate(loan, flows);
        loan.is_closed = closed;

        if closed {
            match derive::realized_irr(loan, flows) {
                Ok(rate) => loan.realized_irr = Some(rate),
                Err(error) => {
                    warn!(identifier = %loan.identifier, %error, "realized irr derivation failed");
                    failures.push(error);
                }
            }
        } else if was_closed {
            // Stale realized rates do not survive reopening.
            loan.realized_irr = None;
        }

        self.store.update_loan(loan).await?;
        if was_closed != closed {
            debug!(identifier = %loan.identifier, closed, "closure state changed");
        }
        Ok(was_closed != closed)
    }
}
