//! Settlement events
//!
//! Every state change emits one [`SettlementEvent`] through an
//! [`EventSink`]. Emission is fire-and-forget: a sink failure is logged and
//! counted by the caller but never undoes the state change.

use crate::{
    types::{BatchWindowId, ParticipantId, PaymentRecord, PaymentStatus},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Payment identification carried by lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventDetails {
    /// Payment ID
    pub id: String,
    /// Paying participant
    pub payer: ParticipantId,
    /// Receiving participant
    pub payee: ParticipantId,
    /// Batch window of the payment
    pub batch_window: BatchWindowId,
    /// Status before the change (absent on creation)
    pub previous_status: Option<PaymentStatus>,
    /// Participant that caused the change
    pub changed_by: ParticipantId,
}

impl PaymentEventDetails {
    /// Details for `record` after a change from `previous_status`
    pub fn for_record(
        record: &PaymentRecord,
        previous_status: Option<PaymentStatus>,
        changed_by: &ParticipantId,
    ) -> Self {
        Self {
            id: record.id.clone(),
            payer: record.payer.clone(),
            payee: record.payee.clone(),
            batch_window: record.batch_window,
            previous_status,
            changed_by: changed_by.clone(),
        }
    }
}

/// What drove a settlement-account movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSource {
    /// Net position of a multilateral pass
    MultilateralNetting,
    /// Gross settlement of one batched payment
    GrossSettlement,
    /// Direct clearinghouse call
    Direct,
}

/// Settlement-account debit or credit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMovement {
    /// Account owner
    pub participant: ParticipantId,
    /// Amount moved (always positive)
    pub amount: Decimal,
    /// Balance after the movement
    pub new_balance: Decimal,
    /// Origin
    pub source: MovementSource,
    /// Time of the movement
    pub timestamp: DateTime<Utc>,
}

/// Settlement event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum SettlementEvent {
    /// Payment created
    PaymentPending(PaymentEventDetails),
    /// Payee accepted the payment
    PaymentAcknowledged(PaymentEventDetails),
    /// Clearinghouse batched the payment
    PaymentBatched(PaymentEventDetails),
    /// Payer debited during gross settlement
    PaymentDebited(PaymentEventDetails),
    /// Payment returned to the queue
    PaymentQueued {
        /// Payment
        details: PaymentEventDetails,
        /// Why it was queued
        reason: String,
        /// Payer balance when funds were insufficient
        available_balance: Option<Decimal>,
    },
    /// Payment fully settled
    PaymentSettled(PaymentEventDetails),
    /// Bilateral offset applied
    BilateralOffsetExecuted {
        /// First participant
        party_a: ParticipantId,
        /// Second participant
        party_b: ParticipantId,
        /// Realised offset
        offset: Decimal,
        /// Payments updated
        updates_count: usize,
    },
    /// Multilateral pass applied
    MultilateralOffsetExecuted {
        /// Net positions applied
        net_positions: BTreeMap<ParticipantId, Decimal>,
        /// Payments settled
        updates_count: usize,
        /// Sum of positive positions
        total_settled: Decimal,
        /// Participants debited or credited
        processed_participants: Vec<ParticipantId>,
        /// Completion time
        timestamp: DateTime<Utc>,
    },
    /// Scheduled pass found nothing to net
    MultilateralNettingSkipped {
        /// Why
        reason: String,
        /// Window the pass was restricted to
        batch_window: Option<BatchWindowId>,
        /// Time of the pass
        timestamp: DateTime<Utc>,
    },
    /// Settlement account debited
    NettingDebitExecuted(AccountMovement),
    /// Settlement account credited
    NettingCreditExecuted(AccountMovement),
}

impl SettlementEvent {
    /// Event name
    pub fn name(&self) -> &'static str {
        match self {
            SettlementEvent::PaymentPending(_) => "PaymentPending",
            SettlementEvent::PaymentAcknowledged(_) => "PaymentAcknowledged",
            SettlementEvent::PaymentBatched(_) => "PaymentBatched",
            SettlementEvent::PaymentDebited(_) => "PaymentDebited",
            SettlementEvent::PaymentQueued { .. } => "PaymentQueued",
            SettlementEvent::PaymentSettled(_) => "PaymentSettled",
            SettlementEvent::BilateralOffsetExecuted { .. } => "BilateralOffsetExecuted",
            SettlementEvent::MultilateralOffsetExecuted { .. } => "MultilateralOffsetExecuted",
            SettlementEvent::MultilateralNettingSkipped { .. } => "MultilateralNettingSkipped",
            SettlementEvent::NettingDebitExecuted(_) => "NettingDebitExecuted",
            SettlementEvent::NettingCreditExecuted(_) => "NettingCreditExecuted",
        }
    }

    /// Lifecycle event for a payment that just reached `status`
    pub fn for_status(status: PaymentStatus, details: PaymentEventDetails) -> Self {
        match status {
            PaymentStatus::Pending => SettlementEvent::PaymentPending(details),
            PaymentStatus::Acknowledged => SettlementEvent::PaymentAcknowledged(details),
            PaymentStatus::Batched => SettlementEvent::PaymentBatched(details),
            PaymentStatus::Debited => SettlementEvent::PaymentDebited(details),
            PaymentStatus::Queued => SettlementEvent::PaymentQueued {
                details,
                reason: "requeued".to_string(),
                available_balance: None,
            },
            PaymentStatus::Settled => SettlementEvent::PaymentSettled(details),
        }
    }
}

/// Event destination
pub trait EventSink: Send + Sync {
    /// Publish one event
    fn emit(&self, event: &SettlementEvent) -> Result<()>;
}

/// Writes every event to the `tracing` log
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &SettlementEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(event = event.name(), payload = %payload, "Settlement event");
        Ok(())
    }
}

/// Keeps events in memory; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SettlementEvent>>,
    failing: AtomicBool,
}

impl RecordingEventSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<SettlementEvent> {
        self.events.lock().clone()
    }

    /// Names of the events received so far
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SettlementEvent::name).collect()
    }

    /// Forget received events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Reject every subsequent event
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &SettlementEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Other(format!("Event sink rejected {}", event.name())));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
