//! Settlement ledger
//!
//! One account per participant in its own `col-settlement-{participant}`
//! partition, keyed by the participant ID. Debits carry no minimum-balance
//! check: a negative balance is an overdraft backed by the clearinghouse.

use crate::{
    context::{SettlementContext, WriteSet},
    events::{AccountMovement, MovementSource, PaymentEventDetails, SettlementEvent},
    lifecycle::{load_record, stage_record},
    types::{ParticipantId, PartitionName, PaymentRecord, PaymentStatus, PaymentStub, SettlementAccount},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Result of settling one batched payment gross
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    /// Payer debited, payee credited, payment SETTLED
    Settled(PaymentRecord),
    /// Payer could not cover the payment; it is QUEUED for netting
    Queued {
        /// Payment after the change
        payment: PaymentRecord,
        /// Payer balance at the time
        available_balance: Decimal,
    },
}

/// Settlement-account operations
#[derive(Debug, Clone)]
pub struct SettlementLedger {
    ctx: Arc<SettlementContext>,
}

impl SettlementLedger {
    /// Create ledger component
    pub fn new(ctx: Arc<SettlementContext>) -> Self {
        Self { ctx }
    }

    /// Account of `participant`, visible to its owner and the clearinghouse
    pub fn get_account(&self, participant: &ParticipantId) -> Result<SettlementAccount> {
        self.ctx
            .require_party_or_clearinghouse("Reading settlement account", &[participant])?;
        self.ctx
            .read_json(&PartitionName::settlement(participant), participant.as_str())?
            .ok_or_else(|| Error::NotFound(format!("Settlement account of {}", participant)))
    }

    /// Create an account with an opening balance; existing accounts are left alone
    pub fn seed_account(&self, participant: &ParticipantId, balance: Decimal) -> Result<SettlementAccount> {
        self.ctx.require_clearinghouse("Seeding accounts")?;
        self.ctx.require_bank(participant)?;

        let partition = PartitionName::settlement(participant);
        if let Some(existing) = self
            .ctx
            .read_json::<SettlementAccount>(&partition, participant.as_str())?
        {
            tracing::debug!(participant = %participant, balance = %existing.balance, "Account already seeded");
            return Ok(existing);
        }

        let account = SettlementAccount {
            participant: participant.clone(),
            balance,
            updated_at: Utc::now(),
        };
        let mut writes = WriteSet::new();
        writes.put_json(partition, participant.as_str(), &account)?;
        self.ctx.commit(writes)?;

        tracing::info!(participant = %participant, balance = %balance, "Settlement account seeded");
        Ok(account)
    }

    /// Subtract `amount`; the account must exist
    pub fn debit(&self, participant: &ParticipantId, amount: Decimal) -> Result<SettlementAccount> {
        self.ctx.require_clearinghouse("Debit")?;

        let mut writes = WriteSet::new();
        let movement = stage_debit(&self.ctx, &mut writes, participant, amount, MovementSource::Direct, Utc::now())?;
        self.ctx.commit(writes)?;

        let account = movement_account(&movement);
        self.ctx.emit(SettlementEvent::NettingDebitExecuted(movement));
        Ok(account)
    }

    /// Add `amount`; a missing account is created at zero first
    pub fn credit(&self, participant: &ParticipantId, amount: Decimal) -> Result<SettlementAccount> {
        self.ctx.require_clearinghouse("Credit")?;

        let mut writes = WriteSet::new();
        let movement = stage_credit(&self.ctx, &mut writes, participant, amount, MovementSource::Direct, Utc::now())?;
        self.ctx.commit(writes)?;

        let account = movement_account(&movement);
        self.ctx.emit(SettlementEvent::NettingCreditExecuted(movement));
        Ok(account)
    }

    /// Settle one BATCHED payment gross against the payer's balance
    ///
    /// With enough funds the payer is debited, the payee credited and the
    /// payment goes BATCHED → DEBITED → SETTLED in one write. Otherwise the
    /// payment is QUEUED for the next netting pass.
    pub fn settle_batched(&self, id: &str) -> Result<DebitOutcome> {
        let caller = self.ctx.require_clearinghouse("Gross settlement")?;

        let stub: PaymentStub = self
            .ctx
            .read_json(&PartitionName::public(), id)?
            .ok_or_else(|| Error::NotFound(format!("Payment {}", id)))?;

        let mut writes = WriteSet::new();
        let mut payment = load_record(&self.ctx, &writes, &stub.payer, &stub.payee, id)?;
        if payment.status != PaymentStatus::Batched {
            return Err(Error::InvalidTransition {
                from: payment.status,
                to: PaymentStatus::Debited,
            });
        }

        let payer_account: SettlementAccount = writes
            .read_json(
                self.ctx.store(),
                &PartitionName::settlement(&payment.payer),
                payment.payer.as_str(),
            )?
            .ok_or_else(|| Error::NotFound(format!("Settlement account of {}", payment.payer)))?;

        if payer_account.balance < payment.remaining {
            payment.status = PaymentStatus::Queued;
            stage_record(&self.ctx, &mut writes, &mut payment)?;
            self.ctx.commit(writes)?;

            self.ctx.metrics().record_transition(PaymentStatus::Queued.as_str());
            tracing::info!(
                payment_id = %id,
                payer = %payment.payer,
                required = %payment.remaining,
                available = %payer_account.balance,
                "Insufficient funds, payment queued"
            );
            self.ctx.emit(SettlementEvent::PaymentQueued {
                details: PaymentEventDetails::for_record(&payment, Some(PaymentStatus::Batched), &caller),
                reason: "insufficient_funds".to_string(),
                available_balance: Some(payer_account.balance),
            });

            return Ok(DebitOutcome::Queued {
                payment,
                available_balance: payer_account.balance,
            });
        }

        let now = Utc::now();
        let amount = payment.remaining;
        let debit = stage_debit(&self.ctx, &mut writes, &payment.payer, amount, MovementSource::GrossSettlement, now)?;
        let credit = stage_credit(&self.ctx, &mut writes, &payment.payee, amount, MovementSource::GrossSettlement, now)?;

        payment.status = PaymentStatus::Debited;
        let debited = PaymentEventDetails::for_record(&payment, Some(PaymentStatus::Batched), &caller);
        payment.status = PaymentStatus::Settled;
        payment.remaining = Decimal::ZERO;
        stage_record(&self.ctx, &mut writes, &mut payment)?;
        self.ctx.commit(writes)?;

        self.ctx.metrics().record_transition(PaymentStatus::Debited.as_str());
        self.ctx.metrics().record_transition(PaymentStatus::Settled.as_str());
        tracing::info!(payment_id = %id, amount = %amount, "Batched payment settled gross");

        self.ctx.emit_all([
            SettlementEvent::PaymentDebited(debited),
            SettlementEvent::NettingDebitExecuted(debit),
            SettlementEvent::NettingCreditExecuted(credit),
            SettlementEvent::PaymentSettled(PaymentEventDetails::for_record(
                &payment,
                Some(PaymentStatus::Debited),
                &caller,
            )),
        ]);

        Ok(DebitOutcome::Settled(payment))
    }

    /// Settle every BATCHED payment gross, one commit per payment
    pub fn settle_all_batched(&self) -> Result<Vec<(String, DebitOutcome)>> {
        self.ctx.require_clearinghouse("Gross settlement")?;

        let mut batched = Vec::new();
        for (a, b) in self.ctx.participants().pairs() {
            let records = self.ctx.scan_payments(&PartitionName::bilateral(a, b))?;
            batched.extend(
                records
                    .into_iter()
                    .filter(|r| r.status == PaymentStatus::Batched)
                    .map(|r| r.id),
            );
        }

        let mut outcomes = Vec::with_capacity(batched.len());
        for id in batched {
            let outcome = self.settle_batched(&id)?;
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }
}

fn movement_account(movement: &AccountMovement) -> SettlementAccount {
    SettlementAccount {
        participant: movement.participant.clone(),
        balance: movement.new_balance,
        updated_at: movement.timestamp,
    }
}

fn require_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidInput(format!(
            "Amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Stage a debit; fails when the account does not exist
pub(crate) fn stage_debit(
    ctx: &SettlementContext,
    writes: &mut WriteSet,
    participant: &ParticipantId,
    amount: Decimal,
    source: MovementSource,
    now: DateTime<Utc>,
) -> Result<AccountMovement> {
    require_positive(amount)?;

    let partition = PartitionName::settlement(participant);
    let mut account: SettlementAccount = writes
        .read_json(ctx.store(), &partition, participant.as_str())?
        .ok_or_else(|| Error::NotFound(format!("Settlement account of {}", participant)))?;

    account.balance -= amount;
    account.updated_at = now;
    writes.put_json(partition, participant.as_str(), &account)?;

    if account.balance < Decimal::ZERO {
        tracing::warn!(participant = %participant, balance = %account.balance, "Settlement account overdrawn");
    }
    tracing::debug!(participant = %participant, amount = %amount, balance = %account.balance, "Debit staged");

    Ok(AccountMovement {
        participant: participant.clone(),
        amount,
        new_balance: account.balance,
        source,
        timestamp: now,
    })
}

/// Stage a credit, creating a zero account when absent
pub(crate) fn stage_credit(
    ctx: &SettlementContext,
    writes: &mut WriteSet,
    participant: &ParticipantId,
    amount: Decimal,
    source: MovementSource,
    now: DateTime<Utc>,
) -> Result<AccountMovement> {
    require_positive(amount)?;

    let partition = PartitionName::settlement(participant);
    let mut account = writes
        .read_json::<SettlementAccount>(ctx.store(), &partition, participant.as_str())?
        .unwrap_or_else(|| {
            tracing::info!(participant = %participant, "Creating settlement account on first credit");
            SettlementAccount::empty(participant.clone(), now)
        });

    account.balance += amount;
    account.updated_at = now;
    writes.put_json(partition, participant.as_str(), &account)?;

    tracing::debug!(participant = %participant, amount = %amount, balance = %account.balance, "Credit staged");

    Ok(AccountMovement {
        participant: participant.clone(),
        amount,
        new_balance: account.balance,
        source,
        timestamp: now,
    })
}
