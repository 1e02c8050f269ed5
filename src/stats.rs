//! Aggregate portfolio statistics over derived loan fields.
//!
//! Pure consumers of the derivation engine's outputs: no financial logic of
//! its own. Results are cached per metric key; the service layer invalidates
//! exactly the keys a write touches, through [`StatsInvalidation`].
use crate::cache::Cache;
use crate::core::closure;
use crate::store::Store;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

pub const LOAN_COUNT: &str = "loan_count";
pub const TOTAL_INVESTED: &str = "total_invested";
pub const OPEN_INVESTED: &str = "open_invested";
pub const TOTAL_REPAID: &str = "total_repaid";
pub const WEIGHTED_REALIZED_IRR: &str = "weighted_realized_irr";

pub type StatsCache = Cache<&'static str, f64>;

/// A write against loan data, from the cache's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanWrite {
    LoanCreated,
    LoanDeleted,
    MetricsDerived,
    ClosureChanged,
    FundingRecorded,
    RepaymentRecorded,
}

/// The stat keys a given write invalidates.
pub fn keys_touched(write: LoanWrite) -> &'static [&'static str] {
    match write {
        LoanWrite::LoanCreated => &[LOAN_COUNT],
        LoanWrite::LoanDeleted => &[
            LOAN_COUNT,
            TOTAL_INVESTED,
            OPEN_INVESTED,
            TOTAL_REPAID,
            WEIGHTED_REALIZED_IRR,
        ],
        LoanWrite::MetricsDerived => &[TOTAL_INVESTED, OPEN_INVESTED, WEIGHTED_REALIZED_IRR],
        LoanWrite::ClosureChanged => &[OPEN_INVESTED, WEIGHTED_REALIZED_IRR],
        // Funding flows only matter once metrics are re-derived.
        LoanWrite::FundingRecorded => &[],
        LoanWrite::RepaymentRecorded => &[TOTAL_REPAID],
    }
}

/// Invalidation port the service layer calls after mutating loan data.
#[async_trait]
pub trait StatsInvalidation: Send + Sync {
    async fn invalidate(&self, keys: &[&'static str]);
}

#[async_trait]
impl StatsInvalidation for StatsCache {
    async fn invalidate(&self, keys: &[&'static str]) {
        for key in keys {
            debug!(key, "invalidating stat");
            self.remove(key).await;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioStats {
    pub loan_count: usize,
    pub total_invested: f64,
    pub open_invested: f64,
    pub total_repaid: f64,
    /// Invested-amount-weighted average realized IRR over closed loans;
    /// `None` while no closed loan carries a realized rate.
    pub weighted_realized_irr: Option<f64>,
}

/// Computes the portfolio statistics, serving from the cache when every key
/// is present. The weighted rate is cached as NaN when absent so a cache
/// hit can still represent "no closed loans".
pub async fn compute(store: &dyn Store, cache: &StatsCache) -> Result<PortfolioStats> {
    if let (Some(count), Some(invested), Some(open), Some(repaid), Some(weighted)) = (
        cache.get(&LOAN_COUNT).await,
        cache.get(&TOTAL_INVESTED).await,
        cache.get(&OPEN_INVESTED).await,
        cache.get(&TOTAL_REPAID).await,
        cache.get(&WEIGHTED_REALIZED_IRR).await,
    ) {
        debug!("serving portfolio stats from cache");
        return Ok(PortfolioStats {
            loan_count: count as usize,
            total_invested: invested,
            open_invested: open,
            total_repaid: repaid,
            weighted_realized_irr: (!weighted.is_nan()).then_some(weighted),
        });
    }

    let loans = store.list_loans().await?;
    let flows = store.list_cash_flows().await?;

    let total_invested: f64 = loans.iter().filter_map(|loan| loan.invested_amount).sum();
    let open_invested: f64 = loans
        .iter()
        .filter(|loan| !loan.is_closed)
        .filter_map(|loan| loan.invested_amount)
        .sum();
    let total_repaid = closure::total_repaid(&flows);

    let mut weighted_sum = 0.0;
    let mut weight = 0.0;
    for loan in loans.iter().filter(|loan| loan.is_closed) {
        if let (Some(invested), Some(rate)) = (loan.invested_amount, loan.realized_irr) {
            weighted_sum += invested * rate;
            weight += invested;
        }
    }
    let weighted_realized_irr = (weight > 0.0).then(|| weighted_sum / weight);

    cache.put(LOAN_COUNT, loans.len() as f64).await;
    cache.put(TOTAL_INVESTED, total_invested).await;
    cache.put(OPEN_INVESTED, open_invested).await;
    cache.put(TOTAL_REPAID, total_repaid).await;
    cache
        .put(
            WEIGHTED_REALIZED_IRR,
            weighted_realized_irr.unwrap_or(f64::NAN),
        )
        .await;

    Ok(PortfolioStats {
        loan_count: loans.len(),
        total_invested,
        open_invested,
        total_repaid,
        weighted_realized_irr,
    })
}
