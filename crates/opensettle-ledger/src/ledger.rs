//! Balance accounting for the settlement pipeline.
//!
//! Tracks per-(account, asset) balances and per-payment reservations. The
//! ledger is the serialization point for spends: the affordability check and
//! the debit happen inside one map-entry critical section, so two concurrent
//! payments can never both pass the check against the same funds.
//!
//! Locking rules:
//! - reservation entry first, then the balance entry; both sections are
//!   synchronous and never held across an await
//! - mutual exclusion is per (account, asset); unrelated wallets proceed
//!   in parallel with no global lock

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use opensettle_types::{AccountId, AssetId, OpensettleError, PaymentId, Result};

/// Why a credit was applied. Carried in the structured logs so credits can
/// be reconciled without replaying the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditReason {
    /// Reversal of a reservation after a failed or cancelled transfer.
    Compensation,
    /// Receiving side of an internal settlement action (p2p, tip).
    InternalSettlement,
    /// External funding.
    Funding,
}

impl std::fmt::Display for CreditReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compensation => write!(f, "COMPENSATION"),
            Self::InternalSettlement => write!(f, "INTERNAL_SETTLEMENT"),
            Self::Funding => write!(f, "FUNDING"),
        }
    }
}

/// A recorded debit, keyed by payment id.
///
/// Reservations are retained after resolution (with `refunded` flipped on
/// compensation) so replayed pipeline steps can always tell "already done"
/// from "never happened".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub payment_id: PaymentId,
    pub account: AccountId,
    pub asset: AssetId,
    pub amount: Decimal,
    pub refunded: bool,
    pub reserved_at: DateTime<Utc>,
}

/// Per-(account, asset) wallet balances with idempotent reserve-and-debit.
///
/// All methods take `&self`; interior sharded maps provide the per-key
/// critical sections. Wallets are created lazily on first use (balance 0)
/// and never deleted.
pub struct WalletLedger {
    balances: DashMap<(AccountId, AssetId), Decimal>,
    reservations: DashMap<PaymentId, Reservation>,
}

impl WalletLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            reservations: DashMap::new(),
        }
    }

    /// Current balance for a (account, asset) pair. Unknown pairs are 0.
    #[must_use]
    pub fn balance(&self, account: AccountId, asset: &str) -> Decimal {
        self.balances
            .get(&(account, asset.to_string()))
            .map(|bal| *bal)
            .unwrap_or(Decimal::ZERO)
    }

    /// Fund a wallet from outside the pipeline.
    pub fn deposit(&self, account: AccountId, asset: &str, amount: Decimal) {
        self.credit(account, asset, amount, CreditReason::Funding);
    }

    /// Credit a wallet, creating it if needed.
    pub fn credit(&self, account: AccountId, asset: &str, amount: Decimal, reason: CreditReason) {
        let mut bal = self
            .balances
            .entry((account, asset.to_string()))
            .or_default();
        *bal += amount;
        tracing::debug!(
            account = %account,
            asset,
            amount = %amount,
            reason = %reason,
            balance = %*bal,
            "Credit applied"
        );
    }

    /// Atomically check affordability and debit `amount`, recording a
    /// reservation keyed by `payment_id`.
    ///
    /// Idempotent: if a reservation for this payment already exists (in any
    /// state), nothing is debited and the call succeeds. The balance check
    /// is never clamped: either the full amount is debited or nothing is.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` with the exact shortfall if the wallet
    /// cannot cover the full amount.
    pub fn reserve_and_debit(
        &self,
        payment_id: PaymentId,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<()> {
        match self.reservations.entry(payment_id) {
            Entry::Occupied(_) => {
                tracing::debug!(payment = %payment_id, "Reservation exists, debit skipped");
                Ok(())
            }
            Entry::Vacant(slot) => {
                let mut bal = self
                    .balances
                    .entry((account, asset.to_string()))
                    .or_default();
                if *bal < amount {
                    return Err(OpensettleError::InsufficientFunds {
                        needed: amount,
                        available: *bal,
                    });
                }
                *bal -= amount;
                let remaining = *bal;
                drop(bal);
                slot.insert(Reservation {
                    payment_id,
                    account,
                    asset: asset.to_string(),
                    amount,
                    refunded: false,
                    reserved_at: Utc::now(),
                });
                tracing::debug!(
                    payment = %payment_id,
                    account = %account,
                    asset,
                    amount = %amount,
                    balance = %remaining,
                    "Funds reserved and debited"
                );
                Ok(())
            }
        }
    }

    /// Reverse the reservation for `payment_id`, crediting the debited
    /// amount back to the source wallet.
    ///
    /// Exactly-once: the first call returns the refunded amount, every
    /// later call returns `Decimal::ZERO`. Re-running compensation after an
    /// ambiguous crash is a supported path.
    ///
    /// # Errors
    /// Returns `ReservationNotFound` if this payment never debited anything.
    pub fn compensate(&self, payment_id: PaymentId) -> Result<Decimal> {
        let mut resv = self
            .reservations
            .get_mut(&payment_id)
            .ok_or(OpensettleError::ReservationNotFound(payment_id))?;
        if resv.refunded {
            tracing::debug!(payment = %payment_id, "Already compensated, skipping");
            return Ok(Decimal::ZERO);
        }
        resv.refunded = true;

        let mut bal = self
            .balances
            .entry((resv.account, resv.asset.clone()))
            .or_default();
        *bal += resv.amount;
        let restored = *bal;
        drop(bal);

        tracing::warn!(
            payment = %payment_id,
            account = %resv.account,
            asset = %resv.asset,
            amount = %resv.amount,
            balance = %restored,
            "Reservation compensated"
        );
        Ok(resv.amount)
    }

    /// Look up the reservation recorded for a payment, if any.
    #[must_use]
    pub fn reservation(&self, payment_id: PaymentId) -> Option<Reservation> {
        self.reservations.get(&payment_id).map(|r| r.clone())
    }

    /// Total balance of an asset across all accounts. Audit helper.
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|entry| entry.key().1 == asset)
            .map(|entry| *entry.value())
            .sum()
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}
