//! Hash-chained transition log.
//!
//! Every payment record carries an ordered list of [`Transition`]s. Each
//! entry's digest commits to the previous digest plus the entry's own
//! contents, and the first entry commits to the payment's creation-fixed
//! fields. Editing, reordering or splicing any entry breaks verification
//! from that point on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use opensettle_types::{OpensettleError, Payment, PaymentStatus, Result};

/// One entry in a payment's transition log.
///
/// Annotations (non-transitioning audit notes such as `transfer_pending`)
/// repeat the current status in `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Status after this entry.
    pub to: PaymentStatus,
    /// Why, e.g. `insufficient_balance`, `transfer_failed`, `cancelled`.
    pub reason: Option<String>,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
    /// SHA-256 chain digest over the previous digest and this entry.
    pub digest: [u8; 32],
}

/// Digest committing to a payment's creation-fixed fields.
///
/// Format: `"opensettle:payment:v1:" || id || sender || recipient ||
/// purpose || asset || usd_amount || asset_amount || fee || total_asset ||
/// rate_version || created_at_millis`
#[must_use]
pub fn genesis_digest(payment: &Payment) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"opensettle:payment:v1:");
    hasher.update(payment.id.0.as_bytes());
    hasher.update(payment.sender.0.as_bytes());
    hasher.update(payment.recipient.0.as_bytes());
    hasher.update(payment.purpose.as_str().as_bytes());
    hasher.update(payment.asset.as_bytes());
    hasher.update(payment.usd_amount.to_string().as_bytes());
    hasher.update(payment.asset_amount.to_string().as_bytes());
    hasher.update(payment.fee.to_string().as_bytes());
    hasher.update(payment.total_asset.to_string().as_bytes());
    hasher.update(payment.rate_version.to_le_bytes());
    hasher.update(payment.created_at.timestamp_millis().to_le_bytes());
    hasher.finalize().into()
}

/// Digest for one log entry.
///
/// Format: `"opensettle:transition:v1:" || prev || seq || to ||
/// reason_tag || [reason_len || reason] || at_millis`
///
/// The presence tag and length prefix keep the reason commitment
/// injective: an absent reason and an empty one must produce different
/// digests.
#[must_use]
pub fn chain_digest(
    prev: &[u8; 32],
    seq: u64,
    to: PaymentStatus,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"opensettle:transition:v1:");
    hasher.update(prev);
    hasher.update(seq.to_le_bytes());
    hasher.update(to.to_string().as_bytes());
    match reason {
        Some(reason) => {
            hasher.update([1u8]);
            hasher.update((reason.len() as u64).to_le_bytes());
            hasher.update(reason.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(at.timestamp_millis().to_le_bytes());
    hasher.finalize().into()
}

/// Recompute and verify the full digest chain for a payment's log.
///
/// # Errors
/// Returns `AuditChainBroken` naming the first entry whose digest does not
/// match, or an empty log.
pub fn verify_chain(payment: &Payment, transitions: &[Transition]) -> Result<()> {
    if transitions.is_empty() {
        return Err(OpensettleError::AuditChainBroken {
            reason: format!("payment {} has an empty transition log", payment.id),
        });
    }
    let mut prev = genesis_digest(payment);
    for (seq, entry) in transitions.iter().enumerate() {
        let expected = chain_digest(
            &prev,
            seq as u64,
            entry.to,
            entry.reason.as_deref(),
            entry.at,
        );
        if entry.digest != expected {
            return Err(OpensettleError::AuditChainBroken {
                reason: format!(
                    "digest mismatch at entry {seq} (status {}): expected {}, found {}",
                    entry.to,
                    hex::encode(expected),
                    hex::encode(entry.digest)
                ),
            });
        }
        prev = entry.digest;
    }
    Ok(())
}
