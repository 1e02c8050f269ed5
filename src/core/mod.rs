//! Core financial logic: records, the IRR solver, metric derivation and
//! closure determination. Everything in here is pure and storage-free.

pub mod closure;
pub mod derive;
pub mod irr;
pub mod model;

// Re-export main types for cleaner imports
pub use derive::DeriveError;
pub use irr::IrrError;
pub use model::{CashFlow, CashFlowKind, Loan, NewCashFlow};
