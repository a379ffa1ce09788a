//! Shared fixture for settlement integration tests

#![allow(dead_code)]

use ledger_core::MemoryStore;
use rust_decimal::Decimal;
use settlement::{
    Config, NewPayment, ParticipantId, PaymentRecord, PaymentStatus, RecordingEventSink,
    SettlementEngine, StaticIdentity,
};
use std::sync::Arc;

pub const CLEARING: &str = "Clearing";

/// Engine over an in-memory store, with switchable caller identity
pub struct TestNetwork {
    pub engine: SettlementEngine,
    pub identity: Arc<StaticIdentity>,
    pub events: Arc<RecordingEventSink>,
    pub store: Arc<MemoryStore>,
}

impl TestNetwork {
    /// Network of `banks`, each seeded with `seed`
    pub fn new(banks: &[&str], seed: i64) -> Self {
        let mut config = Config::default();
        config.participants.banks = banks.iter().map(|b| b.to_string()).collect();
        config.participants.clearinghouse = CLEARING.to_string();
        config.seed.initial_balance = dec(seed);
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let identity = Arc::new(StaticIdentity::new(CLEARING));
        let events = Arc::new(RecordingEventSink::new());
        let store = Arc::new(MemoryStore::new());

        let engine =
            SettlementEngine::new(config, store.clone(), identity.clone(), events.clone()).unwrap();
        engine.bootstrap().unwrap();

        Self {
            engine,
            identity,
            events,
            store,
        }
    }

    pub fn act_as(&self, participant: &str) {
        self.identity.switch_to(participant);
    }

    /// Created, acknowledged and batched; caller left as clearinghouse
    pub fn batched(&self, id: &str, payer: &str, payee: &str, amount: i64) -> PaymentRecord {
        self.act_as(payer);
        self.engine
            .lifecycle()
            .create(NewPayment::new(payer, payee, dec(amount)).with_id(id))
            .unwrap();

        self.act_as(payee);
        self.engine.lifecycle().acknowledge(id).unwrap();

        self.act_as(CLEARING);
        self.engine.lifecycle().batch(id).unwrap()
    }

    /// Batched then returned to the queue; caller left as clearinghouse
    pub fn queued(&self, id: &str, payer: &str, payee: &str, amount: i64) -> PaymentRecord {
        self.batched(id, payer, payee, amount);
        self.engine
            .lifecycle()
            .transition(id, PaymentStatus::Queued)
            .unwrap()
    }

    /// Current record, read as the clearinghouse
    pub fn payment(&self, id: &str) -> PaymentRecord {
        self.act_as(CLEARING);
        self.engine.lifecycle().get_payment(id).unwrap()
    }

    /// Current balance, read as the clearinghouse
    pub fn balance(&self, bank: &str) -> Decimal {
        self.act_as(CLEARING);
        self.engine.ledger().get_account(&pid(bank)).unwrap().balance
    }

    /// Number of events with `name`
    pub fn event_count(&self, name: &str) -> usize {
        self.events.names().iter().filter(|n| **n == name).count()
    }
}

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}
