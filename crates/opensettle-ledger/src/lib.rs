//! # opensettle-ledger
//!
//! **Wallet ledger for OpenSettle.**
//!
//! The ledger owns balance truth for the pipeline: per-(account, asset)
//! wallets, the atomic affordability-check-plus-debit, and the compensation
//! path that reverses a debit when a transfer fails. It guarantees:
//!
//! - **No double-spend**: check and debit share one critical section
//! - **Idempotent debits**: reservations are keyed by payment id
//! - **Exactly-once compensation**: a reversal can be retried but never
//!   applied twice
//! - **No negative balances**: shortfalls fail whole, never clamp

pub mod ledger;

pub use ledger::{CreditReason, Reservation, WalletLedger};
