//! Settlement handlers and the purpose routing table.
//!
//! Every purpose settles through the same capability interface; adding a
//! purpose means registering one more handler, not growing a branch chain.
//! Handlers own the downstream side effect (crediting a marketplace seller,
//! extending a subscription, releasing an escrow) and must be idempotent by
//! payment id: the dispatcher retries, so a handler may see the same payment
//! more than once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use opensettle_types::{OpensettleError, Payment, Purpose, Result};

/// What a handler did with a confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The downstream side effect was performed.
    Applied,
    /// The side effect had already been performed for this payment id.
    /// Success, exactly like [`Applied`](HandlerOutcome::Applied).
    AlreadyApplied,
    /// The downstream refused the payment; worth retrying.
    Rejected(String),
}

/// Purpose-specific settlement capability.
#[async_trait]
pub trait SettlementHandler: Send + Sync {
    /// Apply the confirmed payment downstream.
    ///
    /// # Errors
    /// A transport-level error; the dispatcher retries it like a
    /// [`Rejected`](HandlerOutcome::Rejected) outcome.
    async fn apply(&self, payment: &Payment) -> Result<HandlerOutcome>;
}

/// Purpose -> handler routing table, fixed at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Purpose, Arc<dyn SettlementHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a purpose, replacing any previous one.
    pub fn register(&mut self, purpose: Purpose, handler: Arc<dyn SettlementHandler>) {
        self.handlers.insert(purpose, handler);
    }

    /// The handler routed for `purpose`, if one is registered.
    #[must_use]
    pub fn get(&self, purpose: Purpose) -> Option<Arc<dyn SettlementHandler>> {
        self.handlers.get(&purpose).cloned()
    }

    /// Purposes with a registered handler.
    #[must_use]
    pub fn purposes(&self) -> Vec<Purpose> {
        self.handlers.keys().copied().collect()
    }

    /// Check that every purpose has a handler. Run at startup: a payment
    /// for an unroutable purpose is a deployment mistake, not a payment
    /// failure.
    ///
    /// # Errors
    /// Returns `Configuration` naming every missing purpose.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = Purpose::ALL
            .into_iter()
            .filter(|purpose| !self.handlers.contains_key(purpose))
            .map(|purpose| purpose.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OpensettleError::Configuration(format!(
                "no settlement handler registered for: {}",
                missing.join(", ")
            )))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
