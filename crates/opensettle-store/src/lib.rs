//! Durable payment records and their tamper-evident history.
//!
//! - [`payment_store::PaymentStore`]: append-only record of every payment,
//!   with validated status transitions, the transfer-issued flag, and the
//!   per-payment dispatch lease.
//! - [`audit`]: the hash-chained transition log. Each entry's digest commits
//!   to the previous digest, so any rewrite of history is detectable.

pub mod audit;
pub mod payment_store;

pub use audit::{Transition, chain_digest, genesis_digest, verify_chain};
pub use payment_store::PaymentStore;
