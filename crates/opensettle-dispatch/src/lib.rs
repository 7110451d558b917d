//! Dispatch plane for **OpenSettle** payments.
//!
//! After the executor confirms the asset transfer, this crate routes the
//! payment to its purpose-specific [`handler::SettlementHandler`] and
//! drives retries until the side effect lands or the payment is
//! dead-lettered.
//!
//! - [`handler`]: the capability interface and the purpose routing table
//! - [`dispatcher`]: claim, attempt loop, backoff, dead-letter
//! - [`retry`]: the backoff schedule

pub mod dispatcher;
pub mod handler;
pub mod retry;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handler::{HandlerOutcome, HandlerRegistry, SettlementHandler};
pub use retry::backoff_delay;
