//! Storage collaborator for loan and cash-flow records.
//!
//! The rest of the crate only sees the [`Store`] trait: keyed CRUD plus
//! filter-by-field on both record types, with deletes cascading from a loan
//! to its cash flows. Two backends: [`memory::MemoryStore`] for tests and
//! ephemeral runs, [`disk::DiskStore`] on fjall for the CLI.
pub mod disk;
pub mod memory;

use crate::config::AppConfig;
use crate::core::model::{CashFlow, Loan, NewCashFlow};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[async_trait]
pub trait Store: Send + Sync {
    /// Creates a loan; fails if the identifier is already present.
    async fn create_loan(&self, loan: Loan) -> Result<()>;
    async fn get_loan(&self, identifier: &str) -> Result<Option<Loan>>;
    /// Replaces an existing loan record; fails if the identifier is unknown.
    async fn update_loan(&self, loan: &Loan) -> Result<()>;
    /// All loans, ordered by identifier.
    async fn list_loans(&self) -> Result<Vec<Loan>>;
    /// Deletes a loan and all of its cash flows. Returns false when the
    /// identifier was not present.
    async fn delete_loan(&self, identifier: &str) -> Result<bool>;
    /// Removes every loan and cash flow (full-replace ingestion).
    async fn clear_loans(&self) -> Result<()>;

    /// Persists a cash flow, assigning the next id.
    async fn create_cash_flow(&self, flow: NewCashFlow) -> Result<CashFlow>;
    /// All cash flows, ordered by id.
    async fn list_cash_flows(&self) -> Result<Vec<CashFlow>>;
    /// Cash flows belonging to one loan, ordered by id.
    async fn cash_flows_for(&self, loan_identifier: &str) -> Result<Vec<CashFlow>>;

    async fn filter_loans(&self, field: &str, value: &str) -> Result<Vec<Loan>> {
        let mut loans = self.list_loans().await?;
        loans.retain(|loan| field_matches(loan, field, value));
        Ok(loans)
    }

    async fn filter_cash_flows(&self, field: &str, value: &str) -> Result<Vec<CashFlow>> {
        let mut flows = self.list_cash_flows().await?;
        flows.retain(|flow| field_matches(flow, field, value));
        Ok(flows)
    }
}

/// Compares a record's serialized field against a textual value. Numbers
/// and booleans are compared after parsing, so `is_closed=true` and
/// `rating=5` behave as expected.
pub(crate) fn field_matches<T: Serialize>(record: &T, field: &str, value: &str) -> bool {
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(record) else {
        return false;
    };
    match map.get(field) {
        Some(serde_json::Value::String(text)) => text == value,
        Some(serde_json::Value::Bool(flag)) => value.parse() == Ok(*flag),
        Some(serde_json::Value::Number(number)) => value
            .parse::<f64>()
            .is_ok_and(|parsed| number.as_f64() == Some(parsed)),
        _ => false,
    }
}

/// Opens the persistent store at the configured data directory.
pub fn open_default(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let path = config.data_path()?;
    Ok(Arc::new(disk::DiskStore::open(&path)?))
}
