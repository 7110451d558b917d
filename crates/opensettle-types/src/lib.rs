//! # opensettle-types
//!
//! Shared types, errors, and configuration for the **OpenSettle** payment
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`PaymentId`], [`AccountId`], [`TransferRef`]
//! - **Asset model**: [`Asset`], [`AssetId`]
//! - **Payment model**: [`Payment`], [`PaymentStatus`], [`PaymentIntent`]
//! - **Purposes**: [`Purpose`] with its closed wire-tag set
//! - **Configuration**: [`ExecutorConfig`], [`DispatchConfig`]
//! - **Errors**: [`OpensettleError`] with `OS_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod asset;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod intent;
pub mod payment;
pub mod purpose;

// Re-export all primary types at crate root for ergonomic imports:
//   use opensettle_types::{Payment, PaymentStatus, Purpose, ...};

pub use asset::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use intent::*;
pub use payment::*;
pub use purpose::*;

// Constants are accessed via `opensettle_types::constants::FOO`
// (not re-exported to avoid name collisions).
