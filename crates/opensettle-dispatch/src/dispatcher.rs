//! Purpose-routed settlement dispatch.
//!
//! A confirmed payment has already moved funds; dispatch is about the
//! downstream side effect. That asymmetry drives the design:
//!
//! - the dispatcher never touches the wallet ledger and never retries the
//!   fund transfer,
//! - handler failures are retried with exponential backoff, then
//!   dead-lettered rather than dropped or rolled back,
//! - a per-payment claim in the store keeps concurrent `settle` calls from
//!   double-applying a handler, while independent payments dispatch in
//!   parallel.
//!
//! `DEAD_LETTERED` is the alertable end state: funds stay moved and
//! reconciliation is manual.

use std::sync::Arc;

use opensettle_store::PaymentStore;
use opensettle_types::{
    DispatchConfig, OpensettleError, Payment, PaymentId, PaymentStatus, Result,
};

use crate::handler::{HandlerOutcome, HandlerRegistry, SettlementHandler};
use crate::retry::backoff_delay;

/// Terminal result of a dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The purpose handler applied the payment.
    Settled,
    /// Every attempt failed; the payment is parked for manual
    /// reconciliation.
    DeadLettered { attempts: u32 },
}

/// Routes confirmed payments to their purpose handler and drives the retry
/// loop. Shared behind an `Arc`; `settle` takes `&self`.
pub struct Dispatcher {
    store: Arc<PaymentStore>,
    registry: HandlerRegistry,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// # Errors
    /// Returns `Configuration` if the dispatch config is unusable.
    pub fn new(
        store: Arc<PaymentStore>,
        registry: HandlerRegistry,
        config: DispatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry,
            config,
        })
    }

    /// Dispatch a confirmed payment to its purpose handler.
    ///
    /// Idempotent: an already settled payment returns `Settled` and an
    /// already dead-lettered one returns `DeadLettered` without invoking
    /// the handler again. Of two concurrent calls for the same payment one
    /// runs and the other gets `DispatchInFlight`.
    ///
    /// # Errors
    /// `PaymentNotFound`, `NotDispatchable` for payments that never
    /// confirmed, `DispatchInFlight`, `HandlerNotRegistered`.
    pub async fn settle(&self, id: PaymentId) -> Result<DispatchOutcome> {
        let payment = self.store.get(id)?;

        if let Err(err) = self.store.claim_dispatch(id) {
            return match err {
                // Someone already finished this payment; report their
                // outcome instead of failing.
                OpensettleError::NotDispatchable {
                    status: PaymentStatus::Settled,
                    ..
                } => Ok(DispatchOutcome::Settled),
                OpensettleError::NotDispatchable {
                    status: PaymentStatus::DeadLettered,
                    ..
                } => Ok(DispatchOutcome::DeadLettered {
                    attempts: self.store.dispatch_attempts(id)?,
                }),
                other => Err(other),
            };
        }

        let Some(handler) = self.registry.get(payment.purpose) else {
            self.store.release_dispatch(id)?;
            return Err(OpensettleError::HandlerNotRegistered(payment.purpose));
        };

        let outcome = self.run_attempts(&payment, handler.as_ref()).await;
        // The claim is released however the attempt loop ended.
        self.store.release_dispatch(id)?;
        outcome
    }

    async fn run_attempts(
        &self,
        payment: &Payment,
        handler: &dyn SettlementHandler,
    ) -> Result<DispatchOutcome> {
        let id = payment.id;
        let started = tokio::time::Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            let total = self.store.record_dispatch_attempt(id)?;
            match handler.apply(payment).await {
                Ok(HandlerOutcome::Applied | HandlerOutcome::AlreadyApplied) => {
                    self.store.mark_settled(id)?;
                    return Ok(DispatchOutcome::Settled);
                }
                Ok(HandlerOutcome::Rejected(reason)) => last_error = reason,
                Err(err) => last_error = err.to_string(),
            }
            tracing::warn!(
                payment = %id,
                purpose = %payment.purpose,
                attempt = total,
                error = %last_error,
                "Settlement attempt failed"
            );
            self.store
                .annotate(id, &format!("dispatch_retry attempt={total} error={last_error}"))?;

            if attempt < self.config.max_attempts {
                let delay =
                    backoff_delay(self.config.base_backoff, self.config.max_backoff, attempt);
                if started.elapsed() + delay > self.config.total_budget {
                    tracing::warn!(payment = %id, "Dispatch budget exhausted");
                    break;
                }
                tracing::debug!(
                    payment = %id,
                    backoff_ms = %delay.as_millis(),
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }

        self.store.mark_dead_lettered(id, &last_error)?;
        let attempts = self.store.dispatch_attempts(id)?;
        tracing::error!(
            payment = %id,
            purpose = %payment.purpose,
            attempts,
            error = %last_error,
            "Payment dead-lettered, manual reconciliation required"
        );
        Ok(DispatchOutcome::DeadLettered { attempts })
    }
}
