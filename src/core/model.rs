//! Value records for loans and their cash flows.
//!
//! Records are plain serde values; derived fields are only ever written by
//! the derivation engine in [`crate::service`]. Cash-flow amounts are stored
//! as unsigned magnitudes, sign is applied at the IRR boundary.
use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashFlowKind {
    Funding,
    Repayment,
}

impl std::fmt::Display for CashFlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CashFlowKind::Funding => write!(f, "Funding"),
            CashFlowKind::Repayment => write!(f, "Repayment"),
        }
    }
}

/// A loan position. `identifier` is the unique business key; ids assigned
/// by upstream systems are opaque strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub identifier: String,
    pub issue_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub total_amount: f64,
    pub rating: u8,
    pub total_expected_interest_amount: f64,
    #[serde(default)]
    pub investment_date: Option<NaiveDate>,
    #[serde(default)]
    pub invested_amount: Option<f64>,
    #[serde(default)]
    pub expected_interest_amount: Option<f64>,
    #[serde(default)]
    pub expected_irr: Option<f64>,
    #[serde(default)]
    pub realized_irr: Option<f64>,
    #[serde(default)]
    pub is_closed: bool,
}

impl Loan {
    pub fn new(
        identifier: impl Into<String>,
        issue_date: NaiveDate,
        maturity_date: NaiveDate,
        total_amount: f64,
        rating: u8,
        total_expected_interest_amount: f64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            issue_date,
            maturity_date,
            total_amount,
            rating,
            total_expected_interest_amount,
            investment_date: None,
            invested_amount: None,
            expected_interest_amount: None,
            expected_irr: None,
            realized_irr: None,
            is_closed: false,
        }
    }

    /// Checks the record invariants. Derived fields are not validated here,
    /// they are owned by the derivation engine.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            bail!("loan identifier must not be empty");
        }
        if self.issue_date > self.maturity_date {
            bail!(
                "loan {}: issue date {} is after maturity date {}",
                self.identifier,
                self.issue_date,
                self.maturity_date
            );
        }
        if !(1..=9).contains(&self.rating) {
            bail!("loan {}: rating {} is not in 1..=9", self.identifier, self.rating);
        }
        if !(self.total_amount > 0.0) {
            bail!(
                "loan {}: total amount {} must be positive",
                self.identifier,
                self.total_amount
            );
        }
        Ok(())
    }
}

/// A dated cash event against a loan. `id` is assigned by the store and is
/// monotone in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub id: u64,
    pub loan_identifier: String,
    pub reference_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: CashFlowKind,
    pub amount: f64,
}

/// A cash flow as submitted by a caller, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCashFlow {
    pub loan_identifier: String,
    pub reference_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: CashFlowKind,
    pub amount: f64,
}

impl NewCashFlow {
    pub fn into_cash_flow(self, id: u64) -> CashFlow {
        CashFlow {
            id,
            loan_identifier: self.loan_identifier,
            reference_date: self.reference_date,
            kind: self.kind,
            amount: self.amount,
        }
    }
}
