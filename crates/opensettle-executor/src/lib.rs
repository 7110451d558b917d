//! Execution plane for **OpenSettle** payments.
//!
//! - [`executor::SettlementExecutor`]: the pipeline from a fiat intent to a
//!   confirmed asset transfer, with idempotent re-entry and automatic
//!   compensation on failure.
//! - [`oracle`]: the narrow async boundary to the asset network, plus the
//!   scripted `SimOracle` behind the `test-helpers` feature.
//!
//! Settlement dispatch (what happens after confirmation) lives in
//! `opensettle-dispatch`.

pub mod executor;
pub mod oracle;

pub use executor::SettlementExecutor;
pub use oracle::{TransferAck, TransferOracle, TransferRequest, TransferStatus};

#[cfg(any(test, feature = "test-helpers"))]
pub use oracle::{SimOracle, TransferScript};
