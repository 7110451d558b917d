//! Shared rig for the end-to-end dispatch tests: a full engine (rates,
//! ledger, store, executor, dispatcher) wired with recording handlers so
//! tests can assert exactly which purpose surface saw which payment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use opensettle_dispatch::{Dispatcher, HandlerOutcome, HandlerRegistry, SettlementHandler};
use opensettle_executor::{SettlementExecutor, SimOracle};
use opensettle_ledger::{CreditReason, WalletLedger};
use opensettle_rates::RateTable;
use opensettle_store::PaymentStore;
use opensettle_types::{
    AccountId, DispatchConfig, ExecutorConfig, Payment, PaymentId, Purpose, Result,
};

/// Initialize test logging once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Handler that credits the recipient on the shared ledger and records every
/// payment it applied. Idempotent by payment id, like a real downstream.
pub struct RecordingHandler {
    ledger: Arc<WalletLedger>,
    applied: Mutex<Vec<PaymentId>>,
}

impl RecordingHandler {
    pub fn new(ledger: Arc<WalletLedger>) -> Self {
        Self {
            ledger,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn applied_ids(&self) -> Vec<PaymentId> {
        self.applied.lock().unwrap().clone()
    }

    pub fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

#[async_trait]
impl SettlementHandler for RecordingHandler {
    async fn apply(&self, payment: &Payment) -> Result<HandlerOutcome> {
        let mut applied = self.applied.lock().unwrap();
        if applied.contains(&payment.id) {
            return Ok(HandlerOutcome::AlreadyApplied);
        }
        self.ledger.credit(
            payment.recipient,
            &payment.asset,
            payment.asset_amount,
            CreditReason::InternalSettlement,
        );
        applied.push(payment.id);
        Ok(HandlerOutcome::Applied)
    }
}

/// Handler that refuses every payment, for dead-letter scenarios.
#[derive(Default)]
pub struct RejectingHandler {
    pub calls: AtomicU32,
}

#[async_trait]
impl SettlementHandler for RejectingHandler {
    async fn apply(&self, _payment: &Payment) -> Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::Rejected("ledger import offline".to_string()))
    }
}

/// Full engine: submit through the executor, settle through the dispatcher,
/// with one recording handler per purpose.
pub struct Pipeline {
    pub ledger: Arc<WalletLedger>,
    pub store: Arc<PaymentStore>,
    pub oracle: Arc<SimOracle>,
    pub executor: Arc<SettlementExecutor>,
    pub dispatcher: Arc<Dispatcher>,
    handlers: HashMap<Purpose, Arc<RecordingHandler>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same engine, but `purpose` routes to `override_handler` instead of a
    /// recording handler.
    pub fn with_handler(purpose: Purpose, override_handler: Arc<dyn SettlementHandler>) -> Self {
        Self::build(Some((purpose, override_handler)))
    }

    fn build(override_entry: Option<(Purpose, Arc<dyn SettlementHandler>)>) -> Self {
        let ledger = Arc::new(WalletLedger::new());
        let store = Arc::new(PaymentStore::new());
        let oracle = Arc::new(SimOracle::new());
        let executor = Arc::new(SettlementExecutor::new(
            Arc::new(RateTable::dummy()),
            ledger.clone(),
            store.clone(),
            oracle.clone(),
            ExecutorConfig::default(),
        ));

        let mut registry = HandlerRegistry::new();
        let mut handlers = HashMap::new();
        for purpose in Purpose::ALL {
            let handler = Arc::new(RecordingHandler::new(ledger.clone()));
            registry.register(purpose, handler.clone());
            handlers.insert(purpose, handler);
        }
        if let Some((purpose, handler)) = override_entry {
            registry.register(purpose, handler);
        }
        registry.validate().expect("registry must cover every purpose");

        let dispatcher = Arc::new(
            Dispatcher::new(store.clone(), registry, DispatchConfig::default())
                .expect("default dispatch config must validate"),
        );
        Self {
            ledger,
            store,
            oracle,
            executor,
            dispatcher,
            handlers,
        }
    }

    pub fn fund(&self, account: AccountId, asset: &str, amount: Decimal) {
        self.ledger.deposit(account, asset, amount);
    }

    pub fn handler(&self, purpose: Purpose) -> &Arc<RecordingHandler> {
        &self.handlers[&purpose]
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
