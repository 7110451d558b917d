//! # Payment: the settlement lifecycle record
//!
//! A `Payment` is the durable record of one settlement attempt: the priced
//! intent, the lifecycle status, and the transfer reference once the network
//! confirms.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  transfer ok  ┌───────────┐  dispatch ok  ┌─────────┐
//!   │ PENDING ├──────────────▶│ CONFIRMED ├──────────────▶│ SETTLED │
//!   └────┬────┘               └─────┬─────┘               └─────────┘
//!        │ funds/transfer/cancel    │ retries exhausted
//!        ▼                          ▼
//!   ┌────────┐              ┌───────────────┐
//!   │ FAILED │              │ DEAD_LETTERED │
//!   └────────┘              └───────────────┘
//! ```
//!
//! ## Invariants
//!
//! - **Monotonic**: transitions never go backwards; terminal states are final
//! - **Priced once**: `asset_amount`, `fee` and `total_asset` are fixed at
//!   creation and never recomputed, whatever the rate does afterwards
//! - **Confirmed means moved**: a `Confirmed` or later payment has debited
//!   funds that are never automatically returned

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, PaymentId, Purpose, TransferRef};

/// The lifecycle status of a payment.
///
/// Transitions are **monotonic** (never go backwards):
/// - `Pending → Confirmed` (funds debited and transfer confirmed)
/// - `Pending → Failed` (validation, funds, transfer failure, or cancel)
/// - `Confirmed → Settled` (downstream settlement action applied)
/// - `Confirmed → DeadLettered` (dispatch retries exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Created, funds not yet irrevocably moved. Covers both "not yet
    /// submitted" and "submitted, awaiting network confirmation"; which of
    /// the two is tracked store-side via the transfer-issued flag, never
    /// exposed as a distinct status.
    Pending,
    /// The asset transfer is confirmed. Funds have moved. **Irreversible.**
    Confirmed,
    /// The purpose-specific settlement action has been applied. Terminal.
    Settled,
    /// The payment did not reach confirmation. Any debit was compensated.
    /// Terminal.
    Failed,
    /// Funds moved but dispatch retries were exhausted. Requires manual
    /// reconciliation. Terminal.
    DeadLettered,
}

impl PaymentStatus {
    /// Can this payment transition to the given target status?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Confirmed | Self::Failed)
                | (Self::Confirmed, Self::Settled | Self::DeadLettered)
        )
    }

    /// Terminal statuses admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed | Self::DeadLettered)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Failed => write!(f, "FAILED"),
            Self::DeadLettered => write!(f, "DEAD_LETTERED"),
        }
    }
}

/// A payment: one priced settlement attempt from sender to recipient.
///
/// The asset-denominated amounts are computed exactly once, from the rate
/// snapshot active at submission. All later steps (reservation, transfer,
/// dispatch) consume these stored values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Globally unique payment identifier and idempotency key.
    pub id: PaymentId,
    /// The account whose wallet funds the payment.
    pub sender: AccountId,
    /// The account the settlement action targets.
    pub recipient: AccountId,
    /// Routes the post-confirmation settlement action.
    pub purpose: Purpose,
    /// The asset the transfer is denominated in.
    pub asset: AssetId,
    /// The fiat amount the sender asked to pay.
    pub usd_amount: Decimal,
    /// Principal converted to asset units at the snapshot rate.
    pub asset_amount: Decimal,
    /// Flat network fee converted to asset units at the same rate.
    pub fee: Decimal,
    /// `asset_amount + fee`. The amount actually debited.
    pub total_asset: Decimal,
    /// `usd_amount + network_fee_usd`. For display and audit.
    pub total_usd: Decimal,
    /// Version of the rate snapshot that priced this payment.
    pub rate_version: u64,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Network transaction reference, set once on confirmation.
    pub transfer_ref: Option<TransferRef>,
    /// Recorded when the payment fails, e.g. `insufficient_balance`.
    pub failure_reason: Option<String>,
    /// Caller-supplied correlation id, passed through untouched.
    pub correlation_id: Option<String>,
    /// Free-form caller metadata, passed through to the settlement handler.
    pub metadata: BTreeMap<String, String>,
    /// When the payment was created.
    pub created_at: DateTime<Utc>,
    /// When the transfer was confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Create a freshly priced payment in `Pending` status.
    ///
    /// `total_asset` is fixed here as `asset_amount + fee` and never
    /// recomputed afterwards.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: AccountId,
        recipient: AccountId,
        purpose: Purpose,
        asset: impl Into<AssetId>,
        usd_amount: Decimal,
        asset_amount: Decimal,
        fee: Decimal,
        total_usd: Decimal,
        rate_version: u64,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            sender,
            recipient,
            purpose,
            asset: asset.into(),
            usd_amount,
            asset_amount,
            fee,
            total_asset: asset_amount + fee,
            total_usd,
            rate_version,
            status: PaymentStatus::Pending,
            transfer_ref: None,
            failure_reason: None,
            correlation_id: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }

    /// Returns `true` once no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attempt to transition to CONFIRMED, recording the transfer reference.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the current status is not Pending.
    pub fn mark_confirmed(&mut self, transfer_ref: TransferRef) -> crate::Result<()> {
        self.transition(PaymentStatus::Confirmed)?;
        self.transfer_ref = Some(transfer_ref);
        self.confirmed_at = Some(Utc::now());
        Ok(())
    }

    /// Attempt to transition to FAILED, recording the reason.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the current status is not Pending.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> crate::Result<()> {
        self.transition(PaymentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Attempt to transition to SETTLED.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the current status is not Confirmed.
    pub fn mark_settled(&mut self) -> crate::Result<()> {
        self.transition(PaymentStatus::Settled)
    }

    /// Attempt to transition to DEAD_LETTERED.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the current status is not Confirmed.
    pub fn mark_dead_lettered(&mut self) -> crate::Result<()> {
        self.transition(PaymentStatus::DeadLettered)
    }

    fn transition(&mut self, target: PaymentStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(crate::OpensettleError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Dummy payment for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Payment {
    /// Create a dummy pending payment priced like 100 USD of ETH at 2800.
    pub fn dummy(purpose: Purpose) -> Self {
        Self::new(
            AccountId::new(),
            AccountId::new(),
            purpose,
            "eth",
            Decimal::new(100, 0),
            Decimal::new(3_571_429, 8),
            Decimal::new(303_571, 8),
            Decimal::new(10850, 2),
            1,
        )
    }
}
