//! Append-only payment records.
//!
//! The store owns the durable view of every payment: the priced record, the
//! hash-chained transition log, the transfer-issued flag that closes the
//! cancellation window, and the dispatch lease. Status changes go through
//! validated monotonic transitions; nothing is ever deleted or rewritten.
//!
//! Guard discipline: a record's map entry is the critical section for that
//! payment. Index guards and record guards are never held at the same time.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use opensettle_types::{
    AccountId, OpensettleError, Payment, PaymentId, PaymentStatus, Purpose, Result, TransferRef,
};

use crate::audit::{self, Transition};

struct PaymentRecord {
    payment: Payment,
    transitions: Vec<Transition>,
    /// Set once, just before the transfer oracle is called. While set, the
    /// payment can no longer be cancelled.
    transfer_issued: bool,
    /// Dispatch lease: at most one dispatch cycle per payment at a time.
    dispatch_claimed: bool,
    dispatch_attempts: u32,
}

impl PaymentRecord {
    fn new(payment: Payment) -> Self {
        Self {
            payment,
            transitions: Vec::new(),
            transfer_issued: false,
            dispatch_claimed: false,
            dispatch_attempts: 0,
        }
    }

    fn append(&mut self, to: PaymentStatus, reason: Option<String>) {
        let prev = self
            .transitions
            .last()
            .map_or_else(|| audit::genesis_digest(&self.payment), |t| t.digest);
        let seq = self.transitions.len() as u64;
        let at = chrono::Utc::now();
        let digest = audit::chain_digest(&prev, seq, to, reason.as_deref(), at);
        self.transitions.push(Transition {
            to,
            reason,
            at,
            digest,
        });
    }
}

/// In-memory payment store with purpose and sender indexes.
pub struct PaymentStore {
    records: DashMap<PaymentId, PaymentRecord>,
    by_purpose: DashMap<Purpose, Vec<PaymentId>>,
    by_account: DashMap<AccountId, Vec<PaymentId>>,
}

impl PaymentStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_purpose: DashMap::new(),
            by_account: DashMap::new(),
        }
    }

    /// Record a freshly created payment and seed its audit chain.
    ///
    /// # Errors
    /// Returns `DuplicatePayment` if the id is already recorded.
    pub fn insert(&self, payment: Payment) -> Result<()> {
        let id = payment.id;
        let purpose = payment.purpose;
        let sender = payment.sender;
        match self.records.entry(id) {
            Entry::Occupied(_) => return Err(OpensettleError::DuplicatePayment(id)),
            Entry::Vacant(slot) => {
                let mut record = PaymentRecord::new(payment);
                record.append(PaymentStatus::Pending, None);
                slot.insert(record);
            }
        }
        self.by_purpose.entry(purpose).or_default().push(id);
        self.by_account.entry(sender).or_default().push(id);
        tracing::debug!(payment = %id, purpose = %purpose, "Payment recorded");
        Ok(())
    }

    /// Fetch a payment by id.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn get(&self, id: PaymentId) -> Result<Payment> {
        self.records
            .get(&id)
            .map(|rec| rec.payment.clone())
            .ok_or(OpensettleError::PaymentNotFound(id))
    }

    /// All payments recorded for a purpose, in insertion order.
    #[must_use]
    pub fn list_by_purpose(&self, purpose: Purpose) -> Vec<Payment> {
        let ids: Vec<PaymentId> = self
            .by_purpose
            .get(&purpose)
            .map(|v| v.clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.records.get(id).map(|rec| rec.payment.clone()))
            .collect()
    }

    /// All payments sent by an account, in insertion order.
    #[must_use]
    pub fn list_by_account(&self, account: AccountId) -> Vec<Payment> {
        let ids: Vec<PaymentId> = self
            .by_account
            .get(&account)
            .map(|v| v.clone())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.records.get(id).map(|rec| rec.payment.clone()))
            .collect()
    }

    /// Transition to CONFIRMED, recording the oracle's transfer reference.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `InvalidTransition` if not currently Pending.
    pub fn mark_confirmed(&self, id: PaymentId, transfer_ref: TransferRef) -> Result<Payment> {
        let ref_display = transfer_ref.clone();
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.payment.mark_confirmed(transfer_ref)?;
        rec.append(PaymentStatus::Confirmed, None);
        let payment = rec.payment.clone();
        drop(rec);
        tracing::info!(payment = %id, transfer_ref = %ref_display, "Payment confirmed");
        Ok(payment)
    }

    /// Transition to FAILED, recording the reason.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `InvalidTransition` if not currently Pending.
    pub fn mark_failed(&self, id: PaymentId, reason: &str) -> Result<Payment> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.payment.mark_failed(reason)?;
        rec.append(PaymentStatus::Failed, Some(reason.to_string()));
        let payment = rec.payment.clone();
        drop(rec);
        tracing::warn!(payment = %id, reason, "Payment failed");
        Ok(payment)
    }

    /// Transition to FAILED only if no transfer has been issued.
    ///
    /// A failure verdict formed before the transfer was issued can be stale
    /// by the time it is recorded: the transfer may have been issued in the
    /// meantime and must then resolve through the oracle, not through the
    /// verdict. The check and the transition are one atomic step, as in
    /// [`cancel`](Self::cancel). Returns `true` when the payment is marked
    /// FAILED, `false` when a transfer was issued first and the verdict
    /// must not land.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `InvalidTransition` if the status moved on
    /// without any transfer being issued.
    pub fn fail_if_unissued(&self, id: PaymentId, reason: &str) -> Result<bool> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        if rec.transfer_issued {
            return Ok(false);
        }
        rec.payment.mark_failed(reason)?;
        rec.append(PaymentStatus::Failed, Some(reason.to_string()));
        drop(rec);
        tracing::warn!(payment = %id, reason, "Payment failed");
        Ok(true)
    }

    /// Transition to SETTLED.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `InvalidTransition` if not currently Confirmed.
    pub fn mark_settled(&self, id: PaymentId) -> Result<Payment> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.payment.mark_settled()?;
        rec.append(PaymentStatus::Settled, None);
        let payment = rec.payment.clone();
        drop(rec);
        tracing::info!(payment = %id, "Payment settled");
        Ok(payment)
    }

    /// Transition to DEAD_LETTERED after dispatch exhaustion.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `InvalidTransition` if not currently Confirmed.
    pub fn mark_dead_lettered(&self, id: PaymentId, reason: &str) -> Result<Payment> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.payment.mark_dead_lettered()?;
        rec.append(PaymentStatus::DeadLettered, Some(reason.to_string()));
        let attempts = rec.dispatch_attempts;
        let payment = rec.payment.clone();
        drop(rec);
        tracing::warn!(payment = %id, attempts, reason, "Payment dead-lettered");
        Ok(payment)
    }

    /// Append a non-transitioning audit note (e.g. `transfer_pending`).
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn annotate(&self, id: PaymentId, note: &str) -> Result<()> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        let current = rec.payment.status;
        rec.append(current, Some(note.to_string()));
        Ok(())
    }

    /// Atomically claim transfer submission for this payment.
    ///
    /// Returns `true` if this call closed the cancellation window (the
    /// caller owns the oracle submission), `false` if the transfer was
    /// already issued earlier (the caller should poll for the outcome).
    ///
    /// # Errors
    /// - `PaymentNotFound` if the id is unknown
    /// - `PaymentCancelled` if the payment stopped being Pending before any
    ///   transfer was issued (a cancel won the race)
    pub fn try_issue_transfer(&self, id: PaymentId) -> Result<bool> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        if rec.transfer_issued {
            return Ok(false);
        }
        if rec.payment.status != PaymentStatus::Pending {
            return Err(OpensettleError::PaymentCancelled(id));
        }
        rec.transfer_issued = true;
        rec.append(PaymentStatus::Pending, Some("transfer_issued".to_string()));
        Ok(true)
    }

    /// Whether the transfer has been issued for this payment.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn transfer_issued(&self, id: PaymentId) -> Result<bool> {
        self.records
            .get(&id)
            .map(|rec| rec.transfer_issued)
            .ok_or(OpensettleError::PaymentNotFound(id))
    }

    /// Cancel a payment, allowed only while it is Pending and no transfer
    /// has been issued. The check and the transition are one atomic step.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the id is unknown
    /// - `CancelTooLate` once the transfer is issued or the status moved on
    pub fn cancel(&self, id: PaymentId) -> Result<Payment> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        if rec.payment.status != PaymentStatus::Pending || rec.transfer_issued {
            return Err(OpensettleError::CancelTooLate(id));
        }
        rec.payment.mark_failed("cancelled")?;
        rec.append(PaymentStatus::Failed, Some("cancelled".to_string()));
        let payment = rec.payment.clone();
        drop(rec);
        tracing::info!(payment = %id, "Payment cancelled");
        Ok(payment)
    }

    /// Take the dispatch lease for a confirmed payment.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the id is unknown
    /// - `NotDispatchable` if the payment is not Confirmed
    /// - `DispatchInFlight` if another cycle holds the lease
    pub fn claim_dispatch(&self, id: PaymentId) -> Result<()> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        if rec.payment.status != PaymentStatus::Confirmed {
            return Err(OpensettleError::NotDispatchable {
                payment_id: id,
                status: rec.payment.status,
            });
        }
        if rec.dispatch_claimed {
            return Err(OpensettleError::DispatchInFlight(id));
        }
        rec.dispatch_claimed = true;
        tracing::debug!(payment = %id, "Dispatch claimed");
        Ok(())
    }

    /// Release the dispatch lease.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn release_dispatch(&self, id: PaymentId) -> Result<()> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.dispatch_claimed = false;
        Ok(())
    }

    /// Count a handler attempt; returns the new total.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn record_dispatch_attempt(&self, id: PaymentId) -> Result<u32> {
        let mut rec = self
            .records
            .get_mut(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        rec.dispatch_attempts += 1;
        Ok(rec.dispatch_attempts)
    }

    /// Handler attempts recorded so far.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn dispatch_attempts(&self, id: PaymentId) -> Result<u32> {
        self.records
            .get(&id)
            .map(|rec| rec.dispatch_attempts)
            .ok_or(OpensettleError::PaymentNotFound(id))
    }

    /// The full transition log for a payment.
    ///
    /// # Errors
    /// Returns `PaymentNotFound` if the id is unknown.
    pub fn transitions(&self, id: PaymentId) -> Result<Vec<Transition>> {
        self.records
            .get(&id)
            .map(|rec| rec.transitions.clone())
            .ok_or(OpensettleError::PaymentNotFound(id))
    }

    /// Recompute and verify the payment's digest chain.
    ///
    /// # Errors
    /// `PaymentNotFound`, or `AuditChainBroken` naming the bad entry.
    pub fn verify_transitions(&self, id: PaymentId) -> Result<()> {
        let rec = self
            .records
            .get(&id)
            .ok_or(OpensettleError::PaymentNotFound(id))?;
        audit::verify_chain(&rec.payment, &rec.transitions)
    }

    /// Number of payments recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for PaymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use opensettle_types::Purpose;

    use super::*;

    fn store_with(purpose: Purpose) -> (PaymentStore, PaymentId) {
        let store = PaymentStore::new();
        let payment = Payment::dummy(purpose);
        let id = payment.id;
        store.insert(payment).unwrap();
        (store, id)
    }

    #[test]
    fn insert_and_get() {
        let (store, id) = store_with(Purpose::Marketplace);
        let payment = store.get(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_insert_blocked() {
        let store = PaymentStore::new();
        let payment = Payment::dummy(Purpose::Tip);
        store.insert(payment.clone()).unwrap();
        let err = store.insert(payment).unwrap_err();
        assert!(matches!(err, OpensettleError::DuplicatePayment(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_payment_not_found() {
        let store = PaymentStore::new();
        assert!(matches!(
            store.get(PaymentId::new()).unwrap_err(),
            OpensettleError::PaymentNotFound(_)
        ));
    }

    #[test]
    fn confirm_records_ref_and_transition() {
        let (store, id) = store_with(Purpose::Freelance);
        let payment = store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert_eq!(payment.transfer_ref, Some(TransferRef::new("0xabc")));

        let log = store.transitions(id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].to, PaymentStatus::Confirmed);
    }

    #[test]
    fn fail_records_reason() {
        let (store, id) = store_with(Purpose::Reward);
        store.mark_failed(id, "insufficient_balance").unwrap();
        let payment = store.get(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("insufficient_balance"));

        let log = store.transitions(id).unwrap();
        assert_eq!(log.last().unwrap().reason.as_deref(), Some("insufficient_balance"));
    }

    #[test]
    fn backward_transition_rejected() {
        let (store, id) = store_with(Purpose::Subscription);
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        store.mark_settled(id).unwrap();
        let err = store.mark_failed(id, "late").unwrap_err();
        assert!(matches!(err, OpensettleError::InvalidTransition { .. }));
        assert_eq!(store.get(id).unwrap().status, PaymentStatus::Settled);
    }

    #[test]
    fn annotate_keeps_status() {
        let (store, id) = store_with(Purpose::Tip);
        store.annotate(id, "transfer_pending").unwrap();
        assert_eq!(store.get(id).unwrap().status, PaymentStatus::Pending);
        let log = store.transitions(id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].reason.as_deref(), Some("transfer_pending"));
        store.verify_transitions(id).unwrap();
    }

    #[test]
    fn audit_chain_verifies_full_lifecycle() {
        let (store, id) = store_with(Purpose::PeerToPeer);
        store.annotate(id, "transfer_issued").unwrap();
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        store.mark_settled(id).unwrap();
        store.verify_transitions(id).unwrap();
        assert_eq!(store.transitions(id).unwrap().len(), 4);
    }

    #[test]
    fn tampered_log_detected() {
        let (store, id) = store_with(Purpose::Reward);
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        {
            let mut rec = store.records.get_mut(&id).unwrap();
            rec.transitions[1].reason = Some("forged".to_string());
        }
        let err = store.verify_transitions(id).unwrap_err();
        assert!(matches!(err, OpensettleError::AuditChainBroken { .. }));
    }

    #[test]
    fn issue_transfer_flips_once() {
        let (store, id) = store_with(Purpose::Marketplace);
        assert!(store.try_issue_transfer(id).unwrap());
        assert!(!store.try_issue_transfer(id).unwrap());
        assert!(store.transfer_issued(id).unwrap());
    }

    #[test]
    fn issue_after_cancel_reports_cancelled() {
        let (store, id) = store_with(Purpose::Marketplace);
        store.cancel(id).unwrap();
        let err = store.try_issue_transfer(id).unwrap_err();
        assert!(matches!(err, OpensettleError::PaymentCancelled(_)));
    }

    #[test]
    fn fail_after_issue_is_refused() {
        let (store, id) = store_with(Purpose::Marketplace);
        assert!(store.try_issue_transfer(id).unwrap());
        // A shortfall verdict that lost the race to the issue claim must
        // not land: the transfer is in flight and will resolve.
        assert!(!store.fail_if_unissued(id, "insufficient_balance").unwrap());
        assert_eq!(store.get(id).unwrap().status, PaymentStatus::Pending);

        let payment = store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        store.verify_transitions(id).unwrap();
    }

    #[test]
    fn fail_before_issue_lands() {
        let (store, id) = store_with(Purpose::Marketplace);
        assert!(store.fail_if_unissued(id, "insufficient_balance").unwrap());
        let payment = store.get(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("insufficient_balance"));
        store.verify_transitions(id).unwrap();
    }

    #[test]
    fn fail_after_cancel_reports_transition() {
        let (store, id) = store_with(Purpose::Marketplace);
        store.cancel(id).unwrap();
        let err = store.fail_if_unissued(id, "insufficient_balance").unwrap_err();
        assert!(matches!(err, OpensettleError::InvalidTransition { .. }));
        assert_eq!(store.get(id).unwrap().failure_reason.as_deref(), Some("cancelled"));
    }

    #[test]
    fn cancel_while_pending_fails_payment() {
        let (store, id) = store_with(Purpose::Subscription);
        let payment = store.cancel(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("cancelled"));
        store.verify_transitions(id).unwrap();
    }

    #[test]
    fn cancel_after_issue_is_too_late() {
        let (store, id) = store_with(Purpose::Subscription);
        store.try_issue_transfer(id).unwrap();
        let err = store.cancel(id).unwrap_err();
        assert!(matches!(err, OpensettleError::CancelTooLate(_)));
        // Unchanged: still pending, still issued.
        assert_eq!(store.get(id).unwrap().status, PaymentStatus::Pending);
        assert!(store.transfer_issued(id).unwrap());
    }

    #[test]
    fn cancel_terminal_is_too_late() {
        let (store, id) = store_with(Purpose::Tip);
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        assert!(matches!(
            store.cancel(id).unwrap_err(),
            OpensettleError::CancelTooLate(_)
        ));
    }

    #[test]
    fn claim_requires_confirmed() {
        let (store, id) = store_with(Purpose::Freelance);
        let err = store.claim_dispatch(id).unwrap_err();
        match err {
            OpensettleError::NotDispatchable { status, .. } => {
                assert_eq!(status, PaymentStatus::Pending);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn claim_excludes_concurrent_dispatch() {
        let (store, id) = store_with(Purpose::Freelance);
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        store.claim_dispatch(id).unwrap();
        assert!(matches!(
            store.claim_dispatch(id).unwrap_err(),
            OpensettleError::DispatchInFlight(_)
        ));
        store.release_dispatch(id).unwrap();
        store.claim_dispatch(id).unwrap();
    }

    #[test]
    fn dispatch_attempts_accumulate() {
        let (store, id) = store_with(Purpose::Reward);
        assert_eq!(store.dispatch_attempts(id).unwrap(), 0);
        assert_eq!(store.record_dispatch_attempt(id).unwrap(), 1);
        assert_eq!(store.record_dispatch_attempt(id).unwrap(), 2);
        assert_eq!(store.dispatch_attempts(id).unwrap(), 2);
    }

    #[test]
    fn dead_letter_from_confirmed() {
        let (store, id) = store_with(Purpose::Marketplace);
        store.mark_confirmed(id, TransferRef::new("0xabc")).unwrap();
        store.record_dispatch_attempt(id).unwrap();
        let payment = store.mark_dead_lettered(id, "handler_unavailable").unwrap();
        assert_eq!(payment.status, PaymentStatus::DeadLettered);
        store.verify_transitions(id).unwrap();
    }

    #[test]
    fn purpose_index_filters() {
        let store = PaymentStore::new();
        let tip = Payment::dummy(Purpose::Tip);
        let p2p_a = Payment::dummy(Purpose::PeerToPeer);
        let p2p_b = Payment::dummy(Purpose::PeerToPeer);
        store.insert(tip.clone()).unwrap();
        store.insert(p2p_a.clone()).unwrap();
        store.insert(p2p_b.clone()).unwrap();

        let p2p = store.list_by_purpose(Purpose::PeerToPeer);
        assert_eq!(p2p.len(), 2);
        assert_eq!(p2p[0].id, p2p_a.id);
        assert_eq!(p2p[1].id, p2p_b.id);
        assert_eq!(store.list_by_purpose(Purpose::Tip).len(), 1);
        assert!(store.list_by_purpose(Purpose::Marketplace).is_empty());
    }

    #[test]
    fn account_index_filters() {
        let store = PaymentStore::new();
        let a = Payment::dummy(Purpose::Tip);
        let sender = a.sender;
        store.insert(a).unwrap();
        store.insert(Payment::dummy(Purpose::Tip)).unwrap();

        let sent = store.list_by_account(sender);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender, sender);
    }
}
