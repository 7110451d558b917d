//! Payment intents: the caller-facing request shape.
//!
//! An intent is transient: it is validated, priced against the active rate
//! snapshot, and consumed to produce a durable [`Payment`](crate::Payment).
//! Nothing is persisted for intents that fail validation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetId, Purpose};

/// A request to pay `usd_amount` USD worth of `asset` from sender to
/// recipient for the given purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub sender: AccountId,
    pub recipient: AccountId,
    /// Fiat amount the sender wants to pay, in USD. Must be positive.
    pub usd_amount: Decimal,
    /// Asset tag to settle in, e.g. `"eth"`.
    pub asset: AssetId,
    pub purpose: Purpose,
    /// Caller-supplied correlation id, passed through to the payment.
    pub correlation_id: Option<String>,
    /// Free-form metadata, passed through to the settlement handler.
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    #[must_use]
    pub fn new(
        sender: AccountId,
        recipient: AccountId,
        usd_amount: Decimal,
        asset: impl Into<AssetId>,
        purpose: Purpose,
    ) -> Self {
        Self {
            sender,
            recipient,
            usd_amount,
            asset: asset.into(),
            purpose,
            correlation_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Dummy intent for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl PaymentIntent {
    /// 100 USD of ETH from `sender` to a fresh recipient.
    pub fn dummy(sender: AccountId, purpose: Purpose) -> Self {
        Self::new(
            sender,
            AccountId::new(),
            Decimal::new(100, 0),
            "eth",
            purpose,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_intent_has_no_metadata() {
        let intent = PaymentIntent::dummy(AccountId::new(), Purpose::Tip);
        assert!(intent.correlation_id.is_none());
        assert!(intent.metadata.is_empty());
        assert_eq!(intent.usd_amount, Decimal::new(100, 0));
    }

    #[test]
    fn serde_roundtrip() {
        let mut intent = PaymentIntent::dummy(AccountId::new(), Purpose::Freelance);
        intent.correlation_id = Some("inv-2041".to_string());
        intent
            .metadata
            .insert("invoice".to_string(), "2041".to_string());
        let json = serde_json::to_string(&intent).unwrap();
        let back: PaymentIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sender, intent.sender);
        assert_eq!(back.correlation_id.as_deref(), Some("inv-2041"));
        assert_eq!(back.metadata.get("invoice").map(String::as_str), Some("2041"));
    }
}
