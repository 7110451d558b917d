//! Settlement executor: drives a payment from priced intent to a confirmed
//! asset transfer.
//!
//! Pipeline for a `Pending` payment:
//!
//! ```text
//!  intent --quote--> Payment (PENDING) stored
//!     |
//!     |  1. reserve_and_debit (idempotent; InsufficientFunds -> FAILED)
//!     |  2. try_issue_transfer (closes the cancellation window)
//!     |  3. oracle.submit under transfer_timeout
//!     |        confirmed        -> CONFIRMED
//!     |        pending/timeout  -> stays PENDING (resolve on re-entry)
//!     |        rejected         -> compensate -> FAILED
//!     |  4. re-entry with transfer issued: one oracle.status poll
//!     |        confirmed -> CONFIRMED, failed -> compensate -> FAILED,
//!     |        pending -> stays PENDING
//! ```
//!
//! The debit always commits before the oracle is called, and no ledger or
//! store guard is held across an await. A deadline or an unreachable oracle
//! leaves the payment `Pending` with the debit in place: the outcome is
//! unknown, so neither success nor failure is assumed.

use std::sync::Arc;

use rust_decimal::Decimal;

use opensettle_ledger::WalletLedger;
use opensettle_rates::{CostCalculator, Quote, RateTable};
use opensettle_store::PaymentStore;
use opensettle_types::{
    ExecutorConfig, OpensettleError, Payment, PaymentId, PaymentIntent, PaymentStatus, Result,
    TransferRef,
};

use crate::oracle::{TransferAck, TransferOracle, TransferRequest, TransferStatus};

/// Orchestrates pricing, fund reservation, and the asset transfer for a
/// payment. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct SettlementExecutor {
    calculator: CostCalculator,
    ledger: Arc<WalletLedger>,
    store: Arc<PaymentStore>,
    oracle: Arc<dyn TransferOracle>,
    config: ExecutorConfig,
}

impl SettlementExecutor {
    #[must_use]
    pub fn new(
        rates: Arc<RateTable>,
        ledger: Arc<WalletLedger>,
        store: Arc<PaymentStore>,
        oracle: Arc<dyn TransferOracle>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            calculator: CostCalculator::new(rates),
            ledger,
            store,
            oracle,
            config,
        }
    }

    /// Price a prospective payment without creating anything.
    ///
    /// # Errors
    /// `InvalidAmount` or `UnsupportedAsset` from the calculator.
    pub fn quote(&self, usd_amount: Decimal, asset_id: &str) -> Result<Quote> {
        self.calculator.quote(usd_amount, asset_id)
    }

    /// Validate, price, record, and execute a payment intent.
    ///
    /// Nothing is stored when validation fails. After the record exists the
    /// execution pipeline runs once; a `TransferPending` error leaves the
    /// payment `Pending` for a later [`execute`](Self::execute).
    ///
    /// # Errors
    /// Validation errors, `InsufficientFunds`, `TransferFailed`,
    /// `TransferPending`.
    pub async fn submit(&self, intent: PaymentIntent) -> Result<Payment> {
        let PaymentIntent {
            sender,
            recipient,
            usd_amount,
            asset,
            purpose,
            correlation_id,
            metadata,
        } = intent;
        let quote = self.calculator.quote(usd_amount, &asset)?;
        let mut payment = Payment::new(
            sender,
            recipient,
            purpose,
            quote.asset,
            quote.usd_amount,
            quote.asset_amount,
            quote.fee,
            quote.total_usd,
            quote.rate_version,
        );
        payment.correlation_id = correlation_id;
        payment.metadata = metadata;
        let id = payment.id;
        tracing::info!(
            payment = %id,
            sender = %sender,
            purpose = %purpose,
            usd = %usd_amount,
            total_asset = %payment.total_asset,
            asset = %payment.asset,
            "Payment submitted"
        );
        self.store.insert(payment)?;
        self.execute(id).await
    }

    /// Drive a recorded payment forward. Safe to call any number of times:
    /// a `Confirmed` or terminal payment is returned unchanged, a `Pending`
    /// one resumes exactly where it stopped.
    ///
    /// # Errors
    /// `PaymentNotFound`, `InsufficientFunds`, `PaymentCancelled`,
    /// `TransferFailed`, `TransferPending`, `OracleUnavailable`.
    pub async fn execute(&self, id: PaymentId) -> Result<Payment> {
        let payment = self.store.get(id)?;
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        if let Err(err) = self.ledger.reserve_and_debit(
            id,
            payment.sender,
            &payment.asset,
            payment.total_asset,
        ) {
            self.fail_pre_issue(id, "insufficient_balance")?;
            return Err(err);
        }

        let own_submission = match self.store.try_issue_transfer(id) {
            Ok(own) => own,
            Err(err) => {
                // A cancel won the race between the debit and the issue
                // claim. The debit must not stand.
                self.compensate(id);
                return Err(err);
            }
        };

        if own_submission {
            self.issue_transfer(&payment).await
        } else {
            self.resolve_transfer(id).await
        }
    }

    /// Cancel a payment before its transfer is issued, refunding anything
    /// already debited.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `CancelTooLate` once the transfer is issued or
    /// the status has moved on (state unaffected).
    pub fn cancel(&self, id: PaymentId) -> Result<Payment> {
        let payment = self.store.cancel(id)?;
        self.compensate(id);
        Ok(payment)
    }

    /// Current view of a payment.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn payment(&self, id: PaymentId) -> Result<Payment> {
        self.store.get(id)
    }

    async fn issue_transfer(&self, payment: &Payment) -> Result<Payment> {
        let id = payment.id;
        let request = TransferRequest {
            payment_id: id,
            asset: payment.asset.clone(),
            amount: payment.asset_amount,
            destination: payment.recipient,
        };
        let submitted =
            tokio::time::timeout(self.config.transfer_timeout, self.oracle.submit(&request)).await;
        match submitted {
            Ok(Ok(TransferAck::Confirmed(transfer_ref))) => self.confirm(id, transfer_ref),
            Ok(Ok(TransferAck::Pending(_))) => {
                self.store.annotate(id, "transfer_pending")?;
                Err(OpensettleError::TransferPending(id))
            }
            Ok(Err(err)) => {
                // The submission was rejected or never reached the network,
                // so the funds provably did not move.
                self.compensate(id);
                self.fail(id, "transfer_failed")?;
                Err(match err {
                    failed @ OpensettleError::TransferFailed { .. } => failed,
                    other => OpensettleError::TransferFailed {
                        payment_id: id,
                        reason: other.to_string(),
                    },
                })
            }
            Err(_elapsed) => {
                // Deadline passed with the submission still in flight. The
                // outcome is unknown: keep the debit, resolve later.
                tracing::warn!(
                    payment = %id,
                    timeout_ms = %self.config.transfer_timeout.as_millis(),
                    "Transfer deadline elapsed, outcome unknown"
                );
                self.store.annotate(id, "transfer_pending")?;
                Err(OpensettleError::TransferPending(id))
            }
        }
    }

    async fn resolve_transfer(&self, id: PaymentId) -> Result<Payment> {
        match self.oracle.status(id).await? {
            TransferStatus::Confirmed(transfer_ref) => self.confirm(id, transfer_ref),
            TransferStatus::Failed(reason) => {
                self.compensate(id);
                self.fail(id, "transfer_failed")?;
                Err(OpensettleError::TransferFailed {
                    payment_id: id,
                    reason,
                })
            }
            TransferStatus::Pending => Err(OpensettleError::TransferPending(id)),
        }
    }

    fn confirm(&self, id: PaymentId, transfer_ref: TransferRef) -> Result<Payment> {
        match self.store.mark_confirmed(id, transfer_ref) {
            Err(OpensettleError::InvalidTransition {
                from: PaymentStatus::Confirmed,
                ..
            }) => {
                // A concurrent execute confirmed first. Same outcome.
                self.store.get(id)
            }
            other => other,
        }
    }

    fn fail(&self, id: PaymentId, reason: &str) -> Result<()> {
        match self.store.mark_failed(id, reason) {
            Ok(_) => Ok(()),
            Err(OpensettleError::InvalidTransition { from, .. }) if from.is_terminal() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn fail_pre_issue(&self, id: PaymentId, reason: &str) -> Result<()> {
        match self.store.fail_if_unissued(id, reason) {
            Ok(true) => Ok(()),
            Ok(false) => {
                // Stale verdict: a concurrent deposit let another execute
                // reserve and issue the transfer first. That call owns the
                // payment now.
                tracing::debug!(
                    payment = %id,
                    reason,
                    "Transfer already issued, discarding failure verdict"
                );
                Ok(())
            }
            Err(OpensettleError::InvalidTransition { from, .. }) if from.is_terminal() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn compensate(&self, id: PaymentId) {
        // ReservationNotFound just means nothing was debited for this
        // payment; compensate itself is exactly-once.
        if let Err(err) = self.ledger.compensate(id) {
            tracing::debug!(payment = %id, error = %err, "Nothing to compensate");
        }
    }
}
