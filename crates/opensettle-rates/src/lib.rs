//! # opensettle-rates
//!
//! **Pure pricing plane for OpenSettle.**
//!
//! Takes a fiat amount plus an asset tag and produces an exact,
//! asset-denominated cost breakdown against a versioned rate snapshot. It
//! has:
//!
//! - **Zero side effects**: no ledger access, no clock reads in the math
//! - **Deterministic output**: same snapshot + inputs -> identical quote
//! - **Explicit snapshots**: rates are injected, never read from globals

pub mod calculator;
pub mod rate_table;

pub use calculator::{CostCalculator, Quote};
pub use rate_table::RateTable;
