//! Multilateral netting
//!
//! Nets every eligible obligation across all bank pairs at once and moves
//! money once per participant.
//!
//! # Algorithm
//!
//! 1. Visit each unordered bank pair's partition exactly once
//! 2. For every eligible record: `net[payee] += remaining`,
//!    `net[payer] -= remaining`, and propose remaining 0 / SETTLED
//! 3. On apply, debit every negative position and credit every positive one
//!
//! ```text
//! A→B: 1000   B→C: 800   C→A: 600
//!
//! Net positions:
//!   A: -1000 + 600 = -400 (debited)
//!   B: +1000 - 800 = +200 (credited)
//!   C:  +800 - 600 = +200 (credited)
//! ```
//!
//! Each record adds and subtracts the same amount, so positions always sum
//! to exactly zero.

use crate::{
    accounts::{stage_credit, stage_debit},
    context::{SettlementContext, WriteSet},
    events::{MovementSource, PaymentEventDetails, SettlementEvent},
    lifecycle::stage_netting_update,
    types::{
        BatchWindowId, Eligibility, MultilateralOffsetResult, NettingReport, NettingStatus,
        ParticipantId, PartitionName, PaymentStatus, PaymentTally, PaymentUpdate,
        SettlementAccount, SettlementStatistics,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Which batch windows a pass draws records from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowScope {
    All,
    Only(BatchWindowId),
    Through(BatchWindowId),
}

impl WindowScope {
    fn admits(self, window: BatchWindowId) -> bool {
        match self {
            WindowScope::All => true,
            WindowScope::Only(w) => window == w,
            WindowScope::Through(w) => window <= w,
        }
    }

    fn window(self) -> Option<BatchWindowId> {
        match self {
            WindowScope::All => None,
            WindowScope::Only(w) | WindowScope::Through(w) => Some(w),
        }
    }
}

/// Multilateral netting engine
#[derive(Debug, Clone)]
pub struct MultilateralNetting {
    ctx: Arc<SettlementContext>,
    eligibility: Eligibility,
}

impl MultilateralNetting {
    /// Create multilateral netting engine
    pub fn new(ctx: Arc<SettlementContext>, eligibility: Eligibility) -> Self {
        Self { ctx, eligibility }
    }

    /// Which records a pass nets
    pub fn eligibility(&self) -> Eligibility {
        self.eligibility
    }

    /// Net positions over every eligible record
    pub fn calculate_multilateral_offset(&self) -> Result<MultilateralOffsetResult> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.calculate(WindowScope::All)
    }

    /// Net positions over the eligible records of one batch window
    pub fn calculate_for_window(&self, window: BatchWindowId) -> Result<MultilateralOffsetResult> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.ctx.windows().validate_window_at(window, Utc::now())?;
        self.calculate(WindowScope::Only(window))
    }

    /// Net positions over the eligible records of `window` and every earlier one
    pub fn calculate_through_window(&self, window: BatchWindowId) -> Result<MultilateralOffsetResult> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.ctx.windows().validate_window_at(window, Utc::now())?;
        self.calculate(WindowScope::Through(window))
    }

    fn calculate(&self, scope: WindowScope) -> Result<MultilateralOffsetResult> {
        let window = scope.window();
        let mut net_positions: BTreeMap<ParticipantId, Decimal> = BTreeMap::new();
        let mut updates = Vec::new();

        for (a, b) in self.ctx.participants().pairs() {
            let partition = PartitionName::bilateral(a, b);

            for record in self.ctx.scan_payments(&partition)? {
                if !self.eligibility.includes(record.status) {
                    continue;
                }
                if !scope.admits(record.batch_window) {
                    continue;
                }
                if record.partition() != partition {
                    tracing::warn!(
                        payment_id = %record.id,
                        partition = %partition,
                        "Skipping record stored outside its bilateral partition"
                    );
                    self.ctx.metrics().records_skipped.inc();
                    continue;
                }

                *net_positions.entry(record.payee.clone()).or_default() += record.remaining;
                *net_positions.entry(record.payer.clone()).or_default() -= record.remaining;

                updates.push(PaymentUpdate {
                    payment_id: record.id,
                    payer: record.payer,
                    payee: record.payee,
                    remaining: Decimal::ZERO,
                    status: PaymentStatus::Settled,
                    version: record.version,
                });
            }
        }

        let result = MultilateralOffsetResult {
            net_positions,
            updates,
            batch_window: window,
            calculated_at: Utc::now(),
        };

        tracing::info!(
            participants = result.net_positions.len(),
            updates = result.updates.len(),
            total_settled = %result.total_settled(),
            batch_window = ?window,
            "Multilateral offset calculated"
        );

        Ok(result)
    }

    /// Apply a proposal: settle its payments and move each net position once
    pub fn apply_multilateral_offset(&self, proposal: &MultilateralOffsetResult) -> Result<NettingReport> {
        let caller = self.ctx.require_clearinghouse("Multilateral netting")?;

        if !proposal.net_sum().is_zero() {
            return Err(Error::InvalidInput(format!(
                "Net positions sum to {}, expected zero",
                proposal.net_sum()
            )));
        }
        for participant in proposal.net_positions.keys() {
            self.ctx.require_bank(participant)?;
        }

        let mut seen = HashSet::new();
        let mut writes = WriteSet::new();
        let mut events = Vec::new();

        for update in &proposal.updates {
            if !seen.insert(update.payment_id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Payment {} appears twice in proposal",
                    update.payment_id
                )));
            }

            let (before, after) = stage_netting_update(&self.ctx, &mut writes, update)?;
            if after.status != before.status {
                events.push(SettlementEvent::for_status(
                    after.status,
                    PaymentEventDetails::for_record(&after, Some(before.status), &caller),
                ));
            }
        }

        let now = Utc::now();
        for (participant, net) in &proposal.net_positions {
            if *net < Decimal::ZERO {
                let movement = stage_debit(
                    &self.ctx,
                    &mut writes,
                    participant,
                    -*net,
                    MovementSource::MultilateralNetting,
                    now,
                )?;
                events.push(SettlementEvent::NettingDebitExecuted(movement));
            } else if *net > Decimal::ZERO {
                let movement = stage_credit(
                    &self.ctx,
                    &mut writes,
                    participant,
                    *net,
                    MovementSource::MultilateralNetting,
                    now,
                )?;
                events.push(SettlementEvent::NettingCreditExecuted(movement));
            }
        }

        self.ctx.commit(writes)?;

        let report = NettingReport {
            executed: true,
            net_positions: proposal.net_positions.clone(),
            updates_count: proposal.updates.len(),
            total_settled: proposal.total_settled(),
            processed_participants: proposal.processed_participants(),
            batch_window: proposal.batch_window,
            timestamp: now,
        };

        self.ctx
            .metrics()
            .record_netting_pass("multilateral", report.updates_count);
        tracing::info!(
            updates = report.updates_count,
            total_settled = %report.total_settled,
            participants = report.processed_participants.len(),
            "Multilateral offset applied"
        );

        self.ctx.emit_all(events);
        self.ctx.emit(SettlementEvent::MultilateralOffsetExecuted {
            net_positions: report.net_positions.clone(),
            updates_count: report.updates_count,
            total_settled: report.total_settled,
            processed_participants: report.processed_participants.clone(),
            timestamp: report.timestamp,
        });

        Ok(report)
    }

    /// Calculate, then apply when there is anything to net
    pub fn execute_scheduled_netting(&self) -> Result<NettingReport> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.execute(WindowScope::All)
    }

    /// [`MultilateralNetting::execute_scheduled_netting`] restricted to one window
    pub fn execute_for_window(&self, window: BatchWindowId) -> Result<NettingReport> {
        self.execute_for_window_at(window, Utc::now())
    }

    /// [`MultilateralNetting::execute_for_window`] with the window validated against `now`
    pub fn execute_for_window_at(&self, window: BatchWindowId, now: DateTime<Utc>) -> Result<NettingReport> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.ctx.windows().validate_window_at(window, now)?;
        self.execute(WindowScope::Only(window))
    }

    /// Net `window` together with whatever earlier windows still hold
    ///
    /// Records created in a window that was already netted, but which only
    /// became eligible afterwards, are picked up here.
    pub fn execute_through_window(&self, window: BatchWindowId) -> Result<NettingReport> {
        self.execute_through_window_at(window, Utc::now())
    }

    /// [`MultilateralNetting::execute_through_window`] with the window validated against `now`
    pub fn execute_through_window_at(
        &self,
        window: BatchWindowId,
        now: DateTime<Utc>,
    ) -> Result<NettingReport> {
        self.ctx.require_clearinghouse("Multilateral netting")?;
        self.ctx.windows().validate_window_at(window, now)?;
        self.execute(WindowScope::Through(window))
    }

    fn execute(&self, scope: WindowScope) -> Result<NettingReport> {
        let window = scope.window();
        let timer = self.ctx.metrics().netting_duration.start_timer();
        let proposal = self.calculate(scope)?;

        if proposal.updates.is_empty() {
            let timestamp = Utc::now();
            let reason = "No eligible payments found for multilateral netting".to_string();

            self.ctx.metrics().netting_skipped.inc();
            tracing::info!(batch_window = ?window, "{}", reason);
            self.ctx.emit(SettlementEvent::MultilateralNettingSkipped {
                reason,
                batch_window: window,
                timestamp,
            });

            timer.observe_duration();
            return Ok(NettingReport {
                executed: false,
                net_positions: BTreeMap::new(),
                updates_count: 0,
                total_settled: Decimal::ZERO,
                processed_participants: Vec::new(),
                batch_window: window,
                timestamp,
            });
        }

        let report = self.apply_multilateral_offset(&proposal)?;
        timer.observe_duration();
        Ok(report)
    }

    /// Eligible payments awaiting the next pass, per payer
    ///
    /// Reporting only: unreadable partitions are listed and skipped rather
    /// than failing the query.
    pub fn netting_status(&self) -> Result<NettingStatus> {
        self.ctx.require_clearinghouse("Netting status")?;

        let mut by_payer: BTreeMap<ParticipantId, PaymentTally> = BTreeMap::new();
        let mut total = PaymentTally::default();
        let mut skipped_partitions = Vec::new();

        for (a, b) in self.ctx.participants().pairs() {
            let partition = PartitionName::bilateral(a, b);
            let records = match self.ctx.scan_payments(&partition) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(partition = %partition, error = %e, "Skipping partition in netting status");
                    skipped_partitions.push(partition);
                    continue;
                }
            };

            for record in records.into_iter().filter(|r| self.eligibility.includes(r.status)) {
                by_payer.entry(record.payer).or_default().add(record.remaining);
                total.add(record.remaining);
            }
        }

        Ok(NettingStatus {
            by_payer,
            total,
            skipped_partitions,
            current_window: self.ctx.windows().current_window(),
        })
    }

    /// Payment totals per status and bank balances across the network
    pub fn statistics(&self) -> Result<SettlementStatistics> {
        self.ctx.require_clearinghouse("Settlement statistics")?;

        let mut total = PaymentTally::default();
        let mut by_status: BTreeMap<PaymentStatus, PaymentTally> = BTreeMap::new();
        let mut skipped_partitions = Vec::new();

        for (a, b) in self.ctx.participants().pairs() {
            let partition = PartitionName::bilateral(a, b);
            let records = match self.ctx.scan_payments(&partition) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(partition = %partition, error = %e, "Skipping partition in statistics");
                    skipped_partitions.push(partition);
                    continue;
                }
            };

            for record in records {
                total.add(record.amount);
                by_status.entry(record.status).or_default().add(record.amount);
            }
        }

        let mut balances = BTreeMap::new();
        for bank in self.ctx.participants().banks() {
            let partition = PartitionName::settlement(bank);
            match self.ctx.read_json::<SettlementAccount>(&partition, bank.as_str()) {
                Ok(Some(account)) => {
                    balances.insert(bank.clone(), account.balance);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(participant = %bank, error = %e, "Skipping unreadable account");
                }
            }
        }

        Ok(SettlementStatistics {
            total,
            by_status,
            balances,
            skipped_partitions,
            collected_at: Utc::now(),
        })
    }
}
