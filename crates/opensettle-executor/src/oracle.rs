//! Transfer oracle boundary.
//!
//! The oracle is the engine's only window onto the asset network. It is
//! deliberately narrow: issue a transfer, poll its status. Everything else
//! (balances, records, compensation) stays on this side of the boundary.
//!
//! Contract notes:
//! - `submit` is keyed by `payment_id`; the executor never calls it twice
//!   for the same payment unless the first call provably did not reach the
//!   network.
//! - An `Err` from `status` means the oracle could not be reached. It says
//!   nothing about the transfer itself and must not change any state.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use opensettle_types::{AccountId, AssetId, PaymentId, Result, TransferRef};

/// A transfer the executor asks the network to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub payment_id: PaymentId,
    pub asset: AssetId,
    /// Amount of `asset` to deliver to `destination`. The network fee is
    /// funded by the remainder of the sender's debit.
    pub amount: Decimal,
    pub destination: AccountId,
}

/// Immediate answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAck {
    /// The network confirmed the transfer synchronously.
    Confirmed(TransferRef),
    /// The network accepted the transfer but has not finalized it.
    Pending(TransferRef),
}

/// Answer to a status poll for an issued transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Confirmed(TransferRef),
    Failed(String),
}

/// Asset-network client used by the executor to move funds.
#[async_trait]
pub trait TransferOracle: Send + Sync {
    /// Issue the transfer described by `request`.
    ///
    /// # Errors
    /// An error means the transfer was rejected or never reached the
    /// network; the caller may safely treat the funds as unmoved.
    async fn submit(&self, request: &TransferRequest) -> Result<TransferAck>;

    /// Poll the outcome of a previously issued transfer.
    ///
    /// # Errors
    /// Returns `OracleUnavailable` when the oracle cannot be reached; the
    /// transfer outcome stays unknown.
    async fn status(&self, payment_id: PaymentId) -> Result<TransferStatus>;
}

/// Scripted oracle for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub use sim::{SimOracle, TransferScript};

#[cfg(any(test, feature = "test-helpers"))]
mod sim {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use opensettle_types::{OpensettleError, PaymentId, Result, TransferRef};

    use super::{TransferAck, TransferOracle, TransferRequest, TransferStatus};

    /// What the simulated network does with a given payment.
    #[derive(Debug, Clone)]
    pub enum TransferScript {
        /// Confirm synchronously on submit.
        Confirm,
        /// Reject the submission outright.
        Reject(String),
        /// Never answer the submission; only a deadline gets the caller out.
        Hang,
        /// Ack as pending, report `Pending` for `polls` status calls, then
        /// confirm.
        PendingThenConfirm { polls: u32 },
        /// Ack as pending, report `Pending` for `polls` status calls, then
        /// fail.
        PendingThenFail { polls: u32, reason: String },
        /// Every call errors as unreachable.
        Unavailable,
    }

    #[derive(Default)]
    struct SimState {
        scripts: HashMap<PaymentId, TransferScript>,
        fallback: Option<TransferScript>,
        submits: HashMap<PaymentId, u32>,
        polls: HashMap<PaymentId, u32>,
    }

    impl SimState {
        fn script_for(&self, payment_id: PaymentId) -> TransferScript {
            self.scripts
                .get(&payment_id)
                .or(self.fallback.as_ref())
                .cloned()
                .unwrap_or(TransferScript::Confirm)
        }
    }

    /// In-memory oracle following per-payment scripts. Unscripted payments
    /// confirm synchronously.
    #[derive(Default)]
    pub struct SimOracle {
        state: Mutex<SimState>,
    }

    impl SimOracle {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the script for one payment, replacing any previous one.
        pub fn script(&self, payment_id: PaymentId, script: TransferScript) {
            self.state.lock().unwrap().scripts.insert(payment_id, script);
        }

        /// Script applied to payments without a specific script. Useful when
        /// the payment id is not known before submission.
        pub fn script_fallback(&self, script: TransferScript) {
            self.state.lock().unwrap().fallback = Some(script);
        }

        /// How many times `submit` was called for this payment.
        #[must_use]
        pub fn submit_calls(&self, payment_id: PaymentId) -> u32 {
            self.state
                .lock()
                .unwrap()
                .submits
                .get(&payment_id)
                .copied()
                .unwrap_or(0)
        }

        /// How many times `status` was called for this payment.
        #[must_use]
        pub fn status_calls(&self, payment_id: PaymentId) -> u32 {
            self.state
                .lock()
                .unwrap()
                .polls
                .get(&payment_id)
                .copied()
                .unwrap_or(0)
        }

        fn transfer_ref(payment_id: PaymentId) -> TransferRef {
            TransferRef::new(format!("sim:{payment_id}"))
        }
    }

    #[async_trait]
    impl TransferOracle for SimOracle {
        async fn submit(&self, request: &TransferRequest) -> Result<TransferAck> {
            let id = request.payment_id;
            let script = {
                let mut state = self.state.lock().unwrap();
                *state.submits.entry(id).or_insert(0) += 1;
                state.script_for(id)
            };
            match script {
                TransferScript::Confirm => Ok(TransferAck::Confirmed(Self::transfer_ref(id))),
                TransferScript::Reject(reason) => Err(OpensettleError::TransferFailed {
                    payment_id: id,
                    reason,
                }),
                TransferScript::Hang => loop {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                },
                TransferScript::PendingThenConfirm { .. }
                | TransferScript::PendingThenFail { .. } => {
                    Ok(TransferAck::Pending(Self::transfer_ref(id)))
                }
                TransferScript::Unavailable => Err(OpensettleError::OracleUnavailable {
                    reason: "simulated outage".to_string(),
                }),
            }
        }

        async fn status(&self, payment_id: PaymentId) -> Result<TransferStatus> {
            let (script, poll) = {
                let mut state = self.state.lock().unwrap();
                let poll = state.polls.entry(payment_id).or_insert(0);
                *poll += 1;
                let poll = *poll;
                (state.script_for(payment_id), poll)
            };
            match script {
                TransferScript::Confirm => {
                    Ok(TransferStatus::Confirmed(Self::transfer_ref(payment_id)))
                }
                TransferScript::Reject(reason) => Ok(TransferStatus::Failed(reason)),
                TransferScript::Hang => Ok(TransferStatus::Pending),
                TransferScript::PendingThenConfirm { polls } => {
                    if poll > polls {
                        Ok(TransferStatus::Confirmed(Self::transfer_ref(payment_id)))
                    } else {
                        Ok(TransferStatus::Pending)
                    }
                }
                TransferScript::PendingThenFail { polls, reason } => {
                    if poll > polls {
                        Ok(TransferStatus::Failed(reason))
                    } else {
                        Ok(TransferStatus::Pending)
                    }
                }
                TransferScript::Unavailable => Err(OpensettleError::OracleUnavailable {
                    reason: "simulated outage".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use opensettle_types::{AccountId, OpensettleError, PaymentId};
    use rust_decimal::Decimal;

    use super::*;

    fn request(id: PaymentId) -> TransferRequest {
        TransferRequest {
            payment_id: id,
            asset: "eth".to_string(),
            amount: Decimal::new(3_571_429, 8),
            destination: AccountId::new(),
        }
    }

    #[tokio::test]
    async fn unscripted_payment_confirms() {
        let oracle = SimOracle::new();
        let id = PaymentId::new();
        let ack = oracle.submit(&request(id)).await.unwrap();
        assert!(matches!(ack, TransferAck::Confirmed(_)));
        assert_eq!(oracle.submit_calls(id), 1);
    }

    #[tokio::test]
    async fn pending_script_resolves_after_polls() {
        let oracle = SimOracle::new();
        let id = PaymentId::new();
        oracle.script(id, TransferScript::PendingThenConfirm { polls: 2 });

        let ack = oracle.submit(&request(id)).await.unwrap();
        assert!(matches!(ack, TransferAck::Pending(_)));

        assert_eq!(oracle.status(id).await.unwrap(), TransferStatus::Pending);
        assert_eq!(oracle.status(id).await.unwrap(), TransferStatus::Pending);
        assert!(matches!(
            oracle.status(id).await.unwrap(),
            TransferStatus::Confirmed(_)
        ));
        assert_eq!(oracle.status_calls(id), 3);
    }

    #[tokio::test]
    async fn reject_script_errors_on_submit() {
        let oracle = SimOracle::new();
        let id = PaymentId::new();
        oracle.script(id, TransferScript::Reject("gas too low".to_string()));
        let err = oracle.submit(&request(id)).await.unwrap_err();
        assert!(matches!(err, OpensettleError::TransferFailed { .. }));
    }

    #[tokio::test]
    async fn unavailable_script_errors_on_status() {
        let oracle = SimOracle::new();
        let id = PaymentId::new();
        oracle.script(id, TransferScript::Unavailable);
        let err = oracle.status(id).await.unwrap_err();
        assert!(matches!(err, OpensettleError::OracleUnavailable { .. }));
    }
}
