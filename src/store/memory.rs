//! In-memory store backend, used by tests and ephemeral runs.
use super::Store;
use crate::core::model::{CashFlow, Loan, NewCashFlow};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Default)]
pub struct MemoryStore {
    loans: RwLock<HashMap<String, Loan>>,
    cash_flows: RwLock<Vec<CashFlow>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            loans: RwLock::new(HashMap::new()),
            cash_flows: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_loan(&self, loan: Loan) -> Result<()> {
        let mut loans = self.loans.write().unwrap();
        if loans.contains_key(&loan.identifier) {
            bail!("loan {} already exists", loan.identifier);
        }
        debug!(identifier = %loan.identifier, "create loan");
        loans.insert(loan.identifier.clone(), loan);
        Ok(())
    }

    async fn get_loan(&self, identifier: &str) -> Result<Option<Loan>> {
        Ok(self.loans.read().unwrap().get(identifier).cloned())
    }

    async fn update_loan(&self, loan: &Loan) -> Result<()> {
        let mut loans = self.loans.write().unwrap();
        if !loans.contains_key(&loan.identifier) {
            bail!("loan {} does not exist", loan.identifier);
        }
        loans.insert(loan.identifier.clone(), loan.clone());
        Ok(())
    }

    async fn list_loans(&self) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self.loans.read().unwrap().values().cloned().collect();
        loans.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(loans)
    }

    async fn delete_loan(&self, identifier: &str) -> Result<bool> {
        let removed = self.loans.write().unwrap().remove(identifier).is_some();
        if removed {
            self.cash_flows
                .write()
                .unwrap()
                .retain(|flow| flow.loan_identifier != identifier);
            debug!(identifier, "deleted loan and cascaded cash flows");
        }
        Ok(removed)
    }

    async fn clear_loans(&self) -> Result<()> {
        self.loans.write().unwrap().clear();
        self.cash_flows.write().unwrap().clear();
        Ok(())
    }

    async fn create_cash_flow(&self, flow: NewCashFlow) -> Result<CashFlow> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let flow = flow.into_cash_flow(id);
        self.cash_flows.write().unwrap().push(flow.clone());
        Ok(flow)
    }

    async fn list_cash_flows(&self) -> Result<Vec<CashFlow>> {
        Ok(self.cash_flows.read().unwrap().clone())
    }

    async fn cash_flows_for(&self, loan_identifier: &str) -> Result<Vec<CashFlow>> {
        Ok(self
            .cash_flows
            .read()
            .unwrap()
            .iter()
            .filter(|flow| flow.loan_identifier == loan_identifier)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::CashFlowKind;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(identifier: &str) -> Loan {
        Loan::new(
            identifier,
            date(2022, 1, 1),
            date(2023, 1, 1),
            1000.0,
            5,
            100.0,
        )
    }

    fn new_flow(identifier: &str) -> NewCashFlow {
        NewCashFlow {
            loan_identifier: identifier.to_string(),
            reference_date: date(2022, 2, 1),
            kind: CashFlowKind::Funding,
            amount: 500.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_loan() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        let fetched = store.get_loan("L-1").await.unwrap().unwrap();
        assert_eq!(fetched.identifier, "L-1");
        assert!(store.get_loan("L-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        assert!(store.create_loan(loan("L-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_requires_existing_loan() {
        let store = MemoryStore::new();
        assert!(store.update_loan(&loan("L-1")).await.is_err());

        store.create_loan(loan("L-1")).await.unwrap();
        let mut updated = loan("L-1");
        updated.invested_amount = Some(500.0);
        store.update_loan(&updated).await.unwrap();
        let fetched = store.get_loan("L-1").await.unwrap().unwrap();
        assert_eq!(fetched.invested_amount, Some(500.0));
    }

    #[tokio::test]
    async fn test_cash_flow_ids_are_monotone() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        let first = store.create_cash_flow(new_flow("L-1")).await.unwrap();
        let second = store.create_cash_flow(new_flow("L-1")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_delete_cascades_cash_flows() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        store.create_loan(loan("L-2")).await.unwrap();
        store.create_cash_flow(new_flow("L-1")).await.unwrap();
        store.create_cash_flow(new_flow("L-2")).await.unwrap();

        assert!(store.delete_loan("L-1").await.unwrap());
        assert!(!store.delete_loan("L-1").await.unwrap());
        assert!(store.cash_flows_for("L-1").await.unwrap().is_empty());
        assert_eq!(store.cash_flows_for("L-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_loans_by_field() {
        let store = MemoryStore::new();
        let mut closed = loan("L-1");
        closed.is_closed = true;
        store.create_loan(closed).await.unwrap();
        store.create_loan(loan("L-2")).await.unwrap();

        let closed_loans = store.filter_loans("is_closed", "true").await.unwrap();
        assert_eq!(closed_loans.len(), 1);
        assert_eq!(closed_loans[0].identifier, "L-1");

        let rated = store.filter_loans("rating", "5").await.unwrap();
        assert_eq!(rated.len(), 2);
    }

    #[tokio::test]
    async fn test_filter_cash_flows_by_field() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        store.create_cash_flow(new_flow("L-1")).await.unwrap();
        let mut repayment = new_flow("L-1");
        repayment.kind = CashFlowKind::Repayment;
        store.create_cash_flow(repayment).await.unwrap();

        let fundings = store.filter_cash_flows("type", "Funding").await.unwrap();
        assert_eq!(fundings.len(), 1);
        let for_loan = store
            .filter_cash_flows("loan_identifier", "L-1")
            .await
            .unwrap();
        assert_eq!(for_loan.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = MemoryStore::new();
        store.create_loan(loan("L-1")).await.unwrap();
        store.create_cash_flow(new_flow("L-1")).await.unwrap();
        store.clear_loans().await.unwrap();
        assert!(store.list_loans().await.unwrap().is_empty());
        assert!(store.list_cash_flows().await.unwrap().is_empty());
    }
}
