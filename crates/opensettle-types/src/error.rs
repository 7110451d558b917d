//! Error types for the OpenSettle settlement engine.
//!
//! All errors use the `OS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Intent / validation errors
//! - 2xx: Wallet ledger errors
//! - 3xx: Transfer errors
//! - 4xx: Dispatch errors
//! - 5xx: Payment store errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{PaymentId, PaymentStatus, Purpose};

/// Central error enum for all OpenSettle operations.
#[derive(Debug, Error)]
pub enum OpensettleError {
    // =================================================================
    // Intent / Validation Errors (1xx)
    // =================================================================
    /// The fiat amount is zero, negative, or otherwise unusable.
    #[error("OS_ERR_100: Invalid amount: {amount} (must be positive)")]
    InvalidAmount { amount: Decimal },

    /// The requested asset is not present in the active rate snapshot.
    #[error("OS_ERR_101: Unsupported asset: {0}")]
    UnsupportedAsset(String),

    /// The purpose tag does not name a known settlement purpose.
    #[error("OS_ERR_102: Unknown purpose: {0}")]
    UnknownPurpose(String),

    /// Cancellation arrived after the transfer was already issued.
    #[error("OS_ERR_103: Too late to cancel payment {0}: transfer already issued")]
    CancelTooLate(PaymentId),

    /// The payment was cancelled while execution was being driven.
    #[error("OS_ERR_104: Payment cancelled: {0}")]
    PaymentCancelled(PaymentId),

    // =================================================================
    // Wallet Ledger Errors (2xx)
    // =================================================================
    /// Not enough balance to cover the total asset cost. Never clamped.
    #[error("OS_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// No reservation recorded for this payment (nothing to compensate).
    #[error("OS_ERR_201: No reservation found for payment {0}")]
    ReservationNotFound(PaymentId),

    // =================================================================
    // Transfer Errors (3xx)
    // =================================================================
    /// The transfer oracle rejected the transfer. The debit has been
    /// compensated by the time this error is returned.
    #[error("OS_ERR_300: Transfer failed for payment {payment_id}: {reason}")]
    TransferFailed {
        payment_id: PaymentId,
        reason: String,
    },

    /// The transfer is submitted but not yet resolved. The payment stays
    /// pending; re-drive it to poll for the outcome.
    #[error("OS_ERR_301: Transfer pending for payment {0}")]
    TransferPending(PaymentId),

    /// The oracle could not be reached for a status poll. No state changed.
    #[error("OS_ERR_302: Transfer oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    // =================================================================
    // Dispatch Errors (4xx)
    // =================================================================
    /// No settlement handler registered for this purpose.
    #[error("OS_ERR_400: No handler registered for purpose: {0}")]
    HandlerNotRegistered(Purpose),

    /// Another dispatch cycle already holds the claim for this payment.
    #[error("OS_ERR_401: Dispatch already in flight for payment {0}")]
    DispatchInFlight(PaymentId),

    /// The payment is not in a dispatchable state (must be confirmed).
    #[error("OS_ERR_402: Payment {payment_id} not dispatchable in status {status}")]
    NotDispatchable {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    // =================================================================
    // Payment Store Errors (5xx)
    // =================================================================
    /// The requested payment was not found.
    #[error("OS_ERR_500: Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// A payment with this ID already exists.
    #[error("OS_ERR_501: Payment already exists: {0}")]
    DuplicatePayment(PaymentId),

    /// The requested status change violates the lifecycle state machine.
    #[error("OS_ERR_502: Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// The transition digest chain does not verify.
    #[error("OS_ERR_503: Audit chain broken: {reason}")]
    AuditChainBroken { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid policy, missing handler, etc.).
    #[error("OS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("OS_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, OpensettleError>;

// Conversion from std::io::Error
impl From<std::io::Error> for OpensettleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = OpensettleError::PaymentNotFound(PaymentId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("OS_ERR_500"), "Got: {msg}");
    }

    #[test]
    fn insufficient_funds_display() {
        let err = OpensettleError::InsufficientFunds {
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("OS_ERR_200"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = OpensettleError::InvalidTransition {
            from: PaymentStatus::Settled,
            to: PaymentStatus::Pending,
        };
        let msg = format!("{err}");
        assert!(msg.contains("OS_ERR_502"));
        assert!(msg.contains("SETTLED"));
        assert!(msg.contains("PENDING"));
    }

    #[test]
    fn all_errors_have_os_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(OpensettleError::UnsupportedAsset("doge".into())),
            Box::new(OpensettleError::TransferPending(PaymentId::new())),
            Box::new(OpensettleError::HandlerNotRegistered(Purpose::Tip)),
            Box::new(OpensettleError::Internal("test".into())),
            Box::new(OpensettleError::InvalidAmount {
                amount: Decimal::ZERO,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("OS_ERR_"),
                "Error missing OS_ERR_ prefix: {msg}"
            );
        }
    }
}
