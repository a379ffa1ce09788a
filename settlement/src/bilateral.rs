//! Bilateral netting
//!
//! Offsets the queued obligations two participants hold against each other.
//!
//! # Algorithm
//!
//! 1. Split the QUEUED records of the pair's partition into A→B and B→A,
//!    keeping store order
//! 2. `offset = min(Σ remaining A→B, Σ remaining B→A)`
//! 3. Walk each direction deducting `min(remaining, leftover)` until the
//!    offset is used up; a record left at zero is SETTLED
//!
//! ```text
//! A→B: 1000, 500      B→A: 800
//! offset = min(1500, 800) = 800
//!
//! A→B: 1000 → 200 (QUEUED), 500 untouched
//! B→A:  800 →   0 (SETTLED)
//! ```
//!
//! Both directions are reduced by exactly `offset`.

use crate::{
    context::{SettlementContext, WriteSet},
    events::{PaymentEventDetails, SettlementEvent},
    lifecycle::stage_netting_update,
    types::{OffsetResult, ParticipantId, PartitionName, PaymentRecord, PaymentStatus, PaymentUpdate},
    Error, Result,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

/// Bilateral netting engine
#[derive(Debug, Clone)]
pub struct BilateralNetting {
    ctx: Arc<SettlementContext>,
}

impl BilateralNetting {
    /// Create bilateral netting engine
    pub fn new(ctx: Arc<SettlementContext>) -> Self {
        Self { ctx }
    }

    /// Compute the offset between `a` and `b` without changing anything
    pub fn calculate_offset(&self, a: &ParticipantId, b: &ParticipantId) -> Result<OffsetResult> {
        self.check_pair("Bilateral netting", a, b)?;

        let records = self.ctx.scan_payments(&PartitionName::bilateral(a, b))?;

        let mut a_to_b: Vec<&PaymentRecord> = Vec::new();
        let mut b_to_a: Vec<&PaymentRecord> = Vec::new();
        for record in records.iter().filter(|r| r.status == PaymentStatus::Queued) {
            if &record.payer == a && &record.payee == b {
                a_to_b.push(record);
            } else if &record.payer == b && &record.payee == a {
                b_to_a.push(record);
            }
        }

        let total_ab: Decimal = a_to_b.iter().map(|r| r.remaining).sum();
        let total_ba: Decimal = b_to_a.iter().map(|r| r.remaining).sum();
        let offset = total_ab.min(total_ba);

        let mut updates = Vec::new();
        if offset > Decimal::ZERO {
            deduct(&a_to_b, offset, &mut updates);
            deduct(&b_to_a, offset, &mut updates);
        }

        tracing::info!(
            party_a = %a,
            party_b = %b,
            total_ab = %total_ab,
            total_ba = %total_ba,
            offset = %offset,
            updates = updates.len(),
            "Bilateral offset calculated"
        );

        Ok(OffsetResult {
            party_a: a.clone(),
            party_b: b.clone(),
            total_ab,
            total_ba,
            offset,
            updates,
        })
    }

    /// Apply a proposal from [`BilateralNetting::calculate_offset`]
    ///
    /// Every update is validated and staged before anything is written; the
    /// first missing or changed record aborts the whole apply, as does a
    /// proposal that reduces the two directions by different amounts.
    /// Returns the realised offset.
    pub fn apply_offset(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
        proposal: &OffsetResult,
    ) -> Result<Decimal> {
        let caller = self.check_pair("Bilateral netting", a, b)?;

        let same_pair = (&proposal.party_a == a && &proposal.party_b == b)
            || (&proposal.party_a == b && &proposal.party_b == a);
        if !same_pair {
            return Err(Error::InvalidInput(format!(
                "Proposal is for {}/{}, not {}/{}",
                proposal.party_a, proposal.party_b, a, b
            )));
        }

        let mut seen = HashSet::new();
        let mut writes = WriteSet::new();
        let mut events = Vec::new();
        let mut realised = Decimal::ZERO;
        let mut reverse = Decimal::ZERO;

        for update in &proposal.updates {
            check_update_pair(update, a, b)?;
            if !seen.insert(update.payment_id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Payment {} appears twice in proposal",
                    update.payment_id
                )));
            }

            let (before, after) = stage_netting_update(&self.ctx, &mut writes, update)?;
            let deduction = before.remaining - after.remaining;
            if &after.payer == a {
                realised += deduction;
            } else {
                reverse += deduction;
            }
            if after.status != before.status {
                events.push(SettlementEvent::for_status(
                    after.status,
                    PaymentEventDetails::for_record(&after, Some(before.status), &caller),
                ));
            }
        }

        if realised != reverse {
            return Err(Error::InvalidInput(format!(
                "Unbalanced proposal: deducts {} from {} -> {} but {} from {} -> {}",
                realised, a, b, reverse, b, a
            )));
        }

        self.ctx.commit(writes)?;

        self.ctx
            .metrics()
            .record_netting_pass("bilateral", proposal.updates.len());
        tracing::info!(
            party_a = %a,
            party_b = %b,
            offset = %realised,
            updates = proposal.updates.len(),
            "Bilateral offset applied"
        );

        self.ctx.emit_all(events);
        self.ctx.emit(SettlementEvent::BilateralOffsetExecuted {
            party_a: a.clone(),
            party_b: b.clone(),
            offset: realised,
            updates_count: proposal.updates.len(),
        });

        Ok(realised)
    }

    /// Distinct configured banks, caller one of them or the clearinghouse
    fn check_pair(&self, operation: &str, a: &ParticipantId, b: &ParticipantId) -> Result<ParticipantId> {
        if a == b {
            return Err(Error::InvalidInput(format!(
                "Bilateral netting needs two distinct participants, got {} twice",
                a
            )));
        }
        self.ctx.require_bank(a)?;
        self.ctx.require_bank(b)?;
        self.ctx.require_party_or_clearinghouse(operation, &[a, b])
    }
}

/// Greedy deduction of `offset` across `records`, in order
fn deduct(records: &[&PaymentRecord], offset: Decimal, updates: &mut Vec<PaymentUpdate>) {
    let mut leftover = offset;

    for record in records {
        if leftover.is_zero() {
            break;
        }

        let deduction = record.remaining.min(leftover);
        let remaining = record.remaining - deduction;
        leftover -= deduction;

        updates.push(PaymentUpdate {
            payment_id: record.id.clone(),
            payer: record.payer.clone(),
            payee: record.payee.clone(),
            remaining,
            status: if remaining.is_zero() {
                PaymentStatus::Settled
            } else {
                PaymentStatus::Queued
            },
            version: record.version,
        });
    }
}

fn check_update_pair(update: &PaymentUpdate, a: &ParticipantId, b: &ParticipantId) -> Result<()> {
    let forward = &update.payer == a && &update.payee == b;
    let reverse = &update.payer == b && &update.payee == a;
    if !forward && !reverse {
        return Err(Error::InvalidInput(format!(
            "Payment {} ({} -> {}) is not between {} and {}",
            update.payment_id, update.payer, update.payee, a, b
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn queued(id: &str, payer: &str, payee: &str, remaining: i64) -> PaymentRecord {
        PaymentRecord {
            id: id.to_string(),
            payer: ParticipantId::new(payer),
            payee: ParticipantId::new(payee),
            amount: Decimal::new(remaining, 0),
            remaining: Decimal::new(remaining, 0),
            currency: Default::default(),
            status: PaymentStatus::Queued,
            created_at: Utc::now(),
            batch_window: 0,
            payer_account: None,
            payee_account: None,
            reference: None,
            version: 3,
        }
    }

    #[test]
    fn test_deduct_is_greedy_in_order() {
        let records = [queued("p1", "A", "B", 1000), queued("p2", "A", "B", 500)];
        let refs: Vec<&PaymentRecord> = records.iter().collect();

        let mut updates = Vec::new();
        deduct(&refs, Decimal::new(800, 0), &mut updates);

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].payment_id, "p1");
        assert_eq!(updates[0].remaining, Decimal::new(200, 0));
        assert_eq!(updates[0].status, PaymentStatus::Queued);
        assert_eq!(updates[0].version, 3);
    }

    #[test]
    fn test_deduct_settles_exhausted_records() {
        let records = [queued("p1", "A", "B", 300), queued("p2", "A", "B", 300)];
        let refs: Vec<&PaymentRecord> = records.iter().collect();

        let mut updates = Vec::new();
        deduct(&refs, Decimal::new(450, 0), &mut updates);

        assert_eq!(updates[0].status, PaymentStatus::Settled);
        assert_eq!(updates[0].remaining, Decimal::ZERO);
        assert_eq!(updates[1].status, PaymentStatus::Queued);
        assert_eq!(updates[1].remaining, Decimal::new(150, 0));
    }

    #[test]
    fn test_update_outside_pair_rejected() {
        let update = PaymentUpdate {
            payment_id: "p1".to_string(),
            payer: ParticipantId::new("A"),
            payee: ParticipantId::new("C"),
            remaining: Decimal::ZERO,
            status: PaymentStatus::Settled,
            version: 1,
        };
        assert!(check_update_pair(&update, &ParticipantId::new("A"), &ParticipantId::new("B")).is_err());
    }
}
