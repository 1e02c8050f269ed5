//! CLI command implementations and shared table/progress helpers.

pub mod cashflows;
pub mod import;
pub mod loans;
pub mod summary;
pub mod ui;
