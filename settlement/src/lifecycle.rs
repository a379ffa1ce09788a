//! Payment lifecycle
//!
//! A payment lives in two places: the full record in the payer/payee
//! partition and an integrity stub in the public partition. Both are keyed
//! by payment ID and written in the same batch, so the stub's status always
//! mirrors the record's.

use crate::{
    context::{SettlementContext, WriteSet},
    events::{PaymentEventDetails, SettlementEvent},
    types::{
        NewPayment, ParticipantId, PartitionName, PaymentRecord, PaymentStatus, PaymentStub,
        PaymentSummary, PaymentTally, PaymentUpdate,
    },
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Payment lifecycle operations
#[derive(Debug, Clone)]
pub struct PaymentLifecycle {
    ctx: Arc<SettlementContext>,
}

impl PaymentLifecycle {
    /// Create lifecycle component
    pub fn new(ctx: Arc<SettlementContext>) -> Self {
        Self { ctx }
    }

    /// Create a PENDING payment on behalf of its payer
    pub fn create(&self, payment: NewPayment) -> Result<PaymentRecord> {
        let caller = self.ctx.caller()?;

        if payment.amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "Amount must be positive, got {}",
                payment.amount
            )));
        }
        if payment.payer != caller {
            return Err(Error::InvalidInput(format!(
                "Payer {} must match calling participant {}",
                payment.payer, caller
            )));
        }
        if payment.payer == payment.payee {
            return Err(Error::InvalidInput(
                "Payer and payee must differ".to_string(),
            ));
        }
        self.ctx.require_bank(&payment.payer)?;
        self.ctx.require_bank(&payment.payee)?;

        let id = match payment.id {
            Some(id) if id.trim().is_empty() => {
                return Err(Error::InvalidInput("Payment ID must not be empty".to_string()))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let public = PartitionName::public();
        if self.ctx.store().get(&public, &id)?.is_some() {
            return Err(Error::InvalidInput(format!("Payment {} already exists", id)));
        }

        let now = Utc::now();
        let record = PaymentRecord {
            id: id.clone(),
            payer: payment.payer,
            payee: payment.payee,
            amount: payment.amount,
            remaining: payment.amount,
            currency: payment.currency,
            status: PaymentStatus::Pending,
            created_at: now,
            batch_window: self.ctx.windows().window_at(now),
            payer_account: payment.payer_account,
            payee_account: payment.payee_account,
            reference: payment.reference,
            version: 1,
        };

        let mut writes = WriteSet::new();
        writes.put_json(record.partition(), id.as_str(), &record)?;
        writes.put_json(public, id.as_str(), &record.stub()?)?;
        self.ctx.commit(writes)?;

        self.ctx.metrics().payments_created.inc();
        tracing::info!(
            payment_id = %record.id,
            payer = %record.payer,
            payee = %record.payee,
            amount = %record.amount,
            batch_window = record.batch_window,
            "Payment created"
        );

        self.ctx.emit(SettlementEvent::PaymentPending(
            PaymentEventDetails::for_record(&record, None, &caller),
        ));

        Ok(record)
    }

    /// Payee accepts a PENDING payment
    pub fn acknowledge(&self, id: &str) -> Result<PaymentRecord> {
        let caller = self.ctx.caller()?;
        let record = self.load(id)?;

        if record.payee != caller {
            return Err(Error::Unauthorized(format!(
                "Only payee {} can acknowledge payment {}",
                record.payee, id
            )));
        }
        if record.status != PaymentStatus::Pending {
            return Err(Error::InvalidTransition {
                from: record.status,
                to: PaymentStatus::Acknowledged,
            });
        }

        self.enact(record, PaymentStatus::Acknowledged, &caller)
    }

    /// Clearinghouse picks up an acknowledged (or re-queued) payment
    pub fn batch(&self, id: &str) -> Result<PaymentRecord> {
        let caller = self.ctx.require_clearinghouse("Batching")?;
        let record = self.load(id)?;
        self.enact(record, PaymentStatus::Batched, &caller)
    }

    /// Move a payment one step along the transition table
    ///
    /// Only the payee acknowledges, and only the clearinghouse batches,
    /// queues or debits. SETTLED is reached through netting or gross
    /// settlement, never through this call.
    pub fn transition(&self, id: &str, new_status: PaymentStatus) -> Result<PaymentRecord> {
        let record = self.load(id)?;
        let caller = self.ctx.require_party_or_clearinghouse(
            "Status transition",
            &[&record.payer, &record.payee],
        )?;

        let from = record.status;
        if !from.can_transition_to(new_status) {
            return Err(Error::InvalidTransition { from, to: new_status });
        }

        match new_status {
            PaymentStatus::Acknowledged if record.payee != caller => {
                return Err(Error::Unauthorized(format!(
                    "Only payee {} can acknowledge payment {}",
                    record.payee, id
                )));
            }
            PaymentStatus::Batched | PaymentStatus::Queued | PaymentStatus::Debited
                if !self.ctx.participants().is_clearinghouse(&caller) =>
            {
                return Err(Error::Unauthorized(format!(
                    "{} cannot move payment {} to {}: clearinghouse only",
                    caller, id, new_status
                )));
            }
            PaymentStatus::Settled => {
                return Err(Error::Unauthorized(format!(
                    "Payment {} settles through netting or gross settlement only",
                    id
                )));
            }
            _ => {}
        }

        self.enact(record, new_status, &caller)
    }

    /// Private record, visible to payer, payee and clearinghouse
    pub fn get_payment(&self, id: &str) -> Result<PaymentRecord> {
        let record = self.load(id)?;
        self.ctx.require_party_or_clearinghouse(
            &format!("Reading payment {}", id),
            &[&record.payer, &record.payee],
        )?;
        Ok(record)
    }

    /// Public stub, visible to everyone
    pub fn get_stub(&self, id: &str) -> Result<PaymentStub> {
        self.ctx
            .read_json(&PartitionName::public(), id)?
            .ok_or_else(|| Error::NotFound(format!("Payment {}", id)))
    }

    /// Recompute the private record's content hash and compare with its stub
    pub fn verify_integrity(&self, id: &str) -> Result<bool> {
        let stub = self.get_stub(id)?;
        let record = self.get_payment(id)?;
        let hash = record.content_hash()?;

        if hash != stub.hash {
            tracing::warn!(payment_id = %id, expected = %stub.hash, actual = %hash, "Content hash mismatch");
            return Ok(false);
        }
        Ok(true)
    }

    /// Every payment between `a` and `b`, in store order
    pub fn payments_between(&self, a: &ParticipantId, b: &ParticipantId) -> Result<Vec<PaymentRecord>> {
        self.ctx
            .require_party_or_clearinghouse("Listing bilateral payments", &[a, b])?;
        self.ctx.scan_payments(&PartitionName::bilateral(a, b))
    }

    /// Payments between `a` and `b` in one status
    pub fn payments_by_status(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        status: PaymentStatus,
    ) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .payments_between(a, b)?
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    /// Counts and totals of the payments between `a` and `b`
    pub fn payment_summary(&self, a: &ParticipantId, b: &ParticipantId) -> Result<PaymentSummary> {
        let payments = self.payments_between(a, b)?;

        let mut total = PaymentTally::default();
        let mut by_status: BTreeMap<PaymentStatus, PaymentTally> = BTreeMap::new();
        for payment in &payments {
            total.add(payment.amount);
            by_status.entry(payment.status).or_default().add(payment.amount);
        }

        Ok(PaymentSummary {
            party_a: a.clone(),
            party_b: b.clone(),
            partition: PartitionName::bilateral(a, b),
            total,
            by_status,
        })
    }

    /// Load a record through its public stub
    fn load(&self, id: &str) -> Result<PaymentRecord> {
        let stub = self.get_stub(id)?;
        load_record(&self.ctx, &WriteSet::new(), &stub.payer, &stub.payee, id)
    }

    /// Validate, stage, commit and announce one transition
    fn enact(
        &self,
        mut record: PaymentRecord,
        to: PaymentStatus,
        caller: &ParticipantId,
    ) -> Result<PaymentRecord> {
        let from = record.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        record.status = to;
        let mut writes = WriteSet::new();
        stage_record(&self.ctx, &mut writes, &mut record)?;
        self.ctx.commit(writes)?;

        self.ctx.metrics().record_transition(to.as_str());
        tracing::info!(payment_id = %record.id, from = %from, to = %to, by = %caller, "Payment status changed");

        self.ctx.emit(SettlementEvent::for_status(
            to,
            PaymentEventDetails::for_record(&record, Some(from), caller),
        ));

        Ok(record)
    }
}

/// Read a payment record, staged writes first
pub(crate) fn load_record(
    ctx: &SettlementContext,
    writes: &WriteSet,
    payer: &ParticipantId,
    payee: &ParticipantId,
    id: &str,
) -> Result<PaymentRecord> {
    let record: PaymentRecord = writes
        .read_json(ctx.store(), &PartitionName::bilateral(payer, payee), id)?
        .ok_or_else(|| Error::NotFound(format!("Payment {}", id)))?;

    if &record.payer != payer || &record.payee != payee {
        return Err(Error::InvalidInput(format!(
            "Payment {} is {} -> {}, not {} -> {}",
            id, record.payer, record.payee, payer, payee
        )));
    }
    Ok(record)
}

/// Bump the version and stage the record plus its stub's status
pub(crate) fn stage_record(
    ctx: &SettlementContext,
    writes: &mut WriteSet,
    record: &mut PaymentRecord,
) -> Result<()> {
    record.version += 1;

    let public = PartitionName::public();
    let stub = match writes.read_json::<PaymentStub>(ctx.store(), &public, &record.id)? {
        Some(mut stub) => {
            stub.status = record.status;
            stub
        }
        None => {
            tracing::warn!(payment_id = %record.id, "Public stub missing, recreating");
            record.stub()?
        }
    };

    writes.put_json(record.partition(), record.id.as_str(), record)?;
    writes.put_json(public, record.id.as_str(), &stub)?;
    Ok(())
}

/// Stage one netting update; returns the record before and after
///
/// Netting may settle or re-queue records that are QUEUED or BATCHED. The
/// target must be consistent: SETTLED with nothing remaining, or QUEUED with
/// a positive remainder no larger than the current one.
pub(crate) fn stage_netting_update(
    ctx: &SettlementContext,
    writes: &mut WriteSet,
    update: &PaymentUpdate,
) -> Result<(PaymentRecord, PaymentRecord)> {
    let before = load_record(ctx, writes, &update.payer, &update.payee, &update.payment_id)?;

    if before.version != update.version {
        return Err(Error::WriteConflict(format!(
            "Payment {} is at version {}, proposal was calculated at {}",
            before.id, before.version, update.version
        )));
    }
    if !before.status.is_nettable() {
        return Err(Error::InvalidTransition {
            from: before.status,
            to: update.status,
        });
    }

    match update.status {
        PaymentStatus::Settled if update.remaining.is_zero() => {}
        PaymentStatus::Queued
            if update.remaining > Decimal::ZERO && update.remaining <= before.remaining => {}
        PaymentStatus::Settled | PaymentStatus::Queued => {
            return Err(Error::InvalidInput(format!(
                "Payment {}: remaining {} inconsistent with {} (currently {})",
                before.id, update.remaining, update.status, before.remaining
            )))
        }
        other => {
            return Err(Error::InvalidTransition {
                from: before.status,
                to: other,
            })
        }
    }

    let mut after = before.clone();
    after.remaining = update.remaining;
    after.status = update.status;
    stage_record(ctx, writes, &mut after)?;

    tracing::debug!(
        payment_id = %after.id,
        remaining = %after.remaining,
        status = %after.status,
        "Netting update staged"
    );

    Ok((before, after))
}
