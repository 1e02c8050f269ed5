//! Persistent store backend on a fjall keyspace.
//!
//! Loans live in a `loans` partition keyed by identifier, cash flows in a
//! `cash_flows` partition keyed by big-endian id so iteration is id-ordered.
//! The id counter persists in a `meta` partition.
use super::Store;
use crate::core::model::{CashFlow, Loan, NewCashFlow};
use anyhow::{Result, bail};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const NEXT_ID_KEY: &str = "next_cash_flow_id";

pub struct DiskStore {
    keyspace: Keyspace,
    loans: PartitionHandle,
    cash_flows: PartitionHandle,
    meta: PartitionHandle,
    next_id: AtomicU64,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let keyspace = fjall::Config::new(path).open()?;
        let loans = keyspace.open_partition("loans", PartitionCreateOptions::default())?;
        let cash_flows = keyspace.open_partition("cash_flows", PartitionCreateOptions::default())?;
        let meta = keyspace.open_partition("meta", PartitionCreateOptions::default())?;

        let next_id = match meta.get(NEXT_ID_KEY)? {
            Some(raw) => u64::from_be_bytes(raw.as_ref().try_into()?),
            None => 1,
        };
        debug!(path = %path.display(), next_id, "opened disk store");

        Ok(Self {
            keyspace,
            loans,
            cash_flows,
            meta,
            next_id: AtomicU64::new(next_id),
        })
    }

    fn sync(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn allocate_id(&self) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.meta.insert(NEXT_ID_KEY, (id + 1).to_be_bytes())?;
        Ok(id)
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn create_loan(&self, loan: Loan) -> Result<()> {
        if self.loans.contains_key(&loan.identifier)? {
            bail!("loan {} already exists", loan.identifier);
        }
        self.loans
            .insert(&loan.identifier, serde_json::to_vec(&loan)?)?;
        self.sync()
    }

    async fn get_loan(&self, identifier: &str) -> Result<Option<Loan>> {
        match self.loans.get(identifier)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn update_loan(&self, loan: &Loan) -> Result<()> {
        if !self.loans.contains_key(&loan.identifier)? {
            bail!("loan {} does not exist", loan.identifier);
        }
        self.loans
            .insert(&loan.identifier, serde_json::to_vec(loan)?)?;
        self.sync()
    }

    async fn list_loans(&self) -> Result<Vec<Loan>> {
        let mut loans = Vec::new();
        for entry in self.loans.iter() {
            let (_, raw) = entry?;
            loans.push(serde_json::from_slice(&raw)?);
        }
        Ok(loans)
    }

    async fn delete_loan(&self, identifier: &str) -> Result<bool> {
        if !self.loans.contains_key(identifier)? {
            return Ok(false);
        }
        self.loans.remove(identifier)?;

        // Cascade: drop the loan's cash flows.
        let mut doomed = Vec::new();
        for entry in self.cash_flows.iter() {
            let (key, raw) = entry?;
            let flow: CashFlow = serde_json::from_slice(&raw)?;
            if flow.loan_identifier == identifier {
                doomed.push(key);
            }
        }
        for key in doomed {
            self.cash_flows.remove(key)?;
        }
        debug!(identifier, "deleted loan and cascaded cash flows");
        self.sync()?;
        Ok(true)
    }

    async fn clear_loans(&self) -> Result<()> {
        for partition in [&self.loans, &self.cash_flows] {
            let mut keys = Vec::new();
            for entry in partition.iter() {
                let (key, _) = entry?;
                keys.push(key);
            }
            for key in keys {
                partition.remove(key)?;
            }
        }
        self.sync()
    }

    async fn create_cash_flow(&self, flow: NewCashFlow) -> Result<CashFlow> {
        let flow = flow.into_cash_flow(self.allocate_id()?);
        self.cash_flows
            .insert(flow.id.to_be_bytes(), serde_json::to_vec(&flow)?)?;
        self.sync()?;
        Ok(flow)
    }

    async fn list_cash_flows(&self) -> Result<Vec<CashFlow>> {
        let mut flows = Vec::new();
        for entry in self.cash_flows.iter() {
            let (_, raw) = entry?;
            flows.push(serde_json::from_slice(&raw)?);
        }
        Ok(flows)
    }

    async fn cash_flows_for(&self, loan_identifier: &str) -> Result<Vec<CashFlow>> {
        let mut flows = self.list_cash_flows().await?;
        flows.retain(|flow| flow.loan_identifier == loan_identifier);
        Ok(flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::CashFlowKind;
    use chrono::NaiveDate;
    use tempfile::tempdir;

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
    async fn test_loan_crud_roundtrip() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.create_loan(loan("L-1")).await.unwrap();
        assert!(store.create_loan(loan("L-1")).await.is_err());

        let mut updated = loan("L-1");
        updated.invested_amount = Some(250.0);
        store.update_loan(&updated).await.unwrap();
        let fetched = store.get_loan("L-1").await.unwrap().unwrap();
        assert_eq!(fetched.invested_amount, Some(250.0));

        assert!(store.delete_loan("L-1").await.unwrap());
        assert!(store.get_loan("L-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_cash_flows() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.create_loan(loan("L-1")).await.unwrap();
        store.create_loan(loan("L-2")).await.unwrap();
        store.create_cash_flow(new_flow("L-1")).await.unwrap();
        store.create_cash_flow(new_flow("L-2")).await.unwrap();

        store.delete_loan("L-1").await.unwrap();
        assert!(store.cash_flows_for("L-1").await.unwrap().is_empty());
        assert_eq!(store.cash_flows_for("L-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        let first_id = {
            let store = DiskStore::open(dir.path()).unwrap();
            store.create_loan(loan("L-1")).await.unwrap();
            store.create_cash_flow(new_flow("L-1")).await.unwrap().id
        };

        let store = DiskStore::open(dir.path()).unwrap();
        let flow = store.create_cash_flow(new_flow("L-1")).await.unwrap();
        assert!(flow.id > first_id);
        assert_eq!(store.list_cash_flows().await.unwrap().len(), 2);
        assert_eq!(store.list_loans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_loans_empties_partitions() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.create_loan(loan("L-1")).await.unwrap();
        store.create_cash_flow(new_flow("L-1")).await.unwrap();
        store.clear_loans().await.unwrap();

        assert!(store.list_loans().await.unwrap().is_empty());
        assert!(store.list_cash_flows().await.unwrap().is_empty());
    }
}
