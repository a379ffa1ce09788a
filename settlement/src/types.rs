//! Core types for settlement engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use ledger_core::types::{Currency, ParticipantId, PartitionName};

/// Batch window identifier: `floor(unix_seconds / window_duration)`
pub type BatchWindowId = i64;

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created by the payer
    Pending,
    /// Accepted by the payee
    Acknowledged,
    /// Picked up by the clearinghouse for the current window
    Batched,
    /// Waiting for a later netting pass
    Queued,
    /// Payer side debited, payee credit outstanding
    Debited,
    /// Terminal
    Settled,
}

impl PaymentStatus {
    /// Every status, in lifecycle order
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Acknowledged,
        PaymentStatus::Batched,
        PaymentStatus::Queued,
        PaymentStatus::Debited,
        PaymentStatus::Settled,
    ];

    /// Statuses reachable in one step
    pub fn allowed_transitions(self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Acknowledged],
            Acknowledged => &[Batched, Queued],
            Batched => &[Debited, Queued],
            Queued => &[Batched, Settled],
            Debited => &[Settled],
            Settled => &[],
        }
    }

    /// Check a single step against the transition table
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Statuses a netting pass may settle directly
    pub fn is_nettable(self) -> bool {
        matches!(self, PaymentStatus::Queued | PaymentStatus::Batched)
    }

    /// No further transitions possible
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Acknowledged => "ACKNOWLEDGED",
            PaymentStatus::Batched => "BATCHED",
            PaymentStatus::Queued => "QUEUED",
            PaymentStatus::Debited => "DEBITED",
            PaymentStatus::Settled => "SETTLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        PaymentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown payment status '{}'", s)))
    }
}

/// Which records a multilateral pass nets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Only records returned to the queue
    Queued,
    /// Only records the clearinghouse has batched
    Batched,
    /// Both queued and batched records
    #[default]
    QueuedAndBatched,
}

impl Eligibility {
    /// Whether a record in `status` takes part in the pass
    pub fn includes(self, status: PaymentStatus) -> bool {
        match self {
            Eligibility::Queued => status == PaymentStatus::Queued,
            Eligibility::Batched => status == PaymentStatus::Batched,
            Eligibility::QueuedAndBatched => status.is_nettable(),
        }
    }
}

/// Banks taking part in netting plus the clearinghouse
///
/// Banks keep their configured order; pairs are produced as `(banks[i],
/// banks[j])` with `i < j`, so every bilateral partition is visited once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSet {
    banks: Vec<ParticipantId>,
    clearinghouse: ParticipantId,
}

impl ParticipantSet {
    /// Build and validate a participant set
    pub fn new(
        banks: impl IntoIterator<Item = ParticipantId>,
        clearinghouse: ParticipantId,
    ) -> crate::Result<Self> {
        let mut unique: Vec<ParticipantId> = Vec::new();
        for bank in banks {
            check_participant_id("bank", &bank)?;
            // `col-settlement-{p}` must never double as a bilateral name
            if bank.as_str() == "settlement" {
                return Err(crate::Error::Config(
                    "Bank id \"settlement\" is reserved".to_string(),
                ));
            }
            if !unique.contains(&bank) {
                unique.push(bank);
            }
        }

        check_participant_id("clearinghouse", &clearinghouse)?;
        if unique.contains(&clearinghouse) {
            return Err(crate::Error::Config(format!(
                "Clearinghouse {} cannot also be a bank",
                clearinghouse
            )));
        }

        Ok(Self {
            banks: unique,
            clearinghouse,
        })
    }

    /// Configured banks
    pub fn banks(&self) -> &[ParticipantId] {
        &self.banks
    }

    /// The clearinghouse
    pub fn clearinghouse(&self) -> &ParticipantId {
        &self.clearinghouse
    }

    /// Is `id` a configured bank
    pub fn is_bank(&self, id: &ParticipantId) -> bool {
        self.banks.contains(id)
    }

    /// Is `id` the clearinghouse
    pub fn is_clearinghouse(&self, id: &ParticipantId) -> bool {
        &self.clearinghouse == id
    }

    /// Bank or clearinghouse
    pub fn is_member(&self, id: &ParticipantId) -> bool {
        self.is_bank(id) || self.is_clearinghouse(id)
    }

    /// Every unordered pair of banks, exactly once
    pub fn pairs(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantId)> + '_ {
        self.banks.iter().enumerate().flat_map(move |(i, a)| {
            self.banks[i + 1..].iter().map(move |b| (a, b))
        })
    }
}

/// Ids become part of partition names, so they cannot be empty or contain
/// the partition separator
fn check_participant_id(kind: &str, id: &ParticipantId) -> crate::Result<()> {
    if id.as_str().is_empty() {
        return Err(crate::Error::Config(format!("Empty {} id", kind)));
    }
    if id.as_str().contains(PartitionName::SEPARATOR) {
        return Err(crate::Error::Config(format!(
            "{} id {} contains the partition separator '{}'",
            kind,
            id,
            PartitionName::SEPARATOR
        )));
    }
    Ok(())
}

/// Confidential payment record, stored in the payer/payee partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment ID
    pub id: String,

    /// Paying participant
    pub payer: ParticipantId,

    /// Receiving participant
    pub payee: ParticipantId,

    /// Original amount
    pub amount: Decimal,

    /// Amount still to settle
    pub remaining: Decimal,

    /// Currency
    #[serde(default)]
    pub currency: Currency,

    /// Lifecycle status
    pub status: PaymentStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Batch window the payment was created in
    pub batch_window: BatchWindowId,

    /// Payer account reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_account: Option<String>,

    /// Payee account reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_account: Option<String>,

    /// Free-text reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Incremented on every write
    #[serde(default)]
    pub version: u64,
}

/// Immutable fields covered by the public content hash
#[derive(Serialize)]
struct HashablePayment<'a> {
    id: &'a str,
    payer: &'a ParticipantId,
    payee: &'a ParticipantId,
    amount: String,
    currency: &'a Currency,
    created_at: &'a DateTime<Utc>,
    payer_account: &'a Option<String>,
    payee_account: &'a Option<String>,
    reference: &'a Option<String>,
}

impl PaymentRecord {
    /// Bilateral partition holding this record
    pub fn partition(&self) -> PartitionName {
        PartitionName::bilateral(&self.payer, &self.payee)
    }

    /// SHA-256 over the immutable fields (status and remaining excluded)
    pub fn content_hash(&self) -> crate::Result<String> {
        let hashable = HashablePayment {
            id: &self.id,
            payer: &self.payer,
            payee: &self.payee,
            amount: self.amount.normalize().to_string(),
            currency: &self.currency,
            created_at: &self.created_at,
            payer_account: &self.payer_account,
            payee_account: &self.payee_account,
            reference: &self.reference,
        };
        Ok(ledger_core::crypto::content_hash(&hashable)?)
    }

    /// Payer or payee
    pub fn involves(&self, participant: &ParticipantId) -> bool {
        &self.payer == participant || &self.payee == participant
    }

    /// Public stub for this record
    pub fn stub(&self) -> crate::Result<PaymentStub> {
        Ok(PaymentStub {
            id: self.id.clone(),
            hash: self.content_hash()?,
            payer: self.payer.clone(),
            payee: self.payee.clone(),
            status: self.status,
            created_at: self.created_at,
            batch_window: self.batch_window,
        })
    }
}

/// Public integrity stub, readable by every ledger member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStub {
    /// Payment ID
    pub id: String,
    /// Hex SHA-256 of the immutable payment fields
    pub hash: String,
    /// Paying participant
    pub payer: ParticipantId,
    /// Receiving participant
    pub payee: ParticipantId,
    /// Mirrors the private record
    pub status: PaymentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Batch window
    pub batch_window: BatchWindowId,
}

/// Payment submitted by a payer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    /// Caller-chosen ID; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Paying participant (must be the caller)
    pub payer: ParticipantId,
    /// Receiving participant
    pub payee: ParticipantId,
    /// Amount, strictly positive
    pub amount: Decimal,
    /// Currency
    #[serde(default)]
    pub currency: Currency,
    /// Payer account reference
    #[serde(default)]
    pub payer_account: Option<String>,
    /// Payee account reference
    #[serde(default)]
    pub payee_account: Option<String>,
    /// Free-text reference
    #[serde(default)]
    pub reference: Option<String>,
}

impl NewPayment {
    /// Payment with generated ID and default currency
    pub fn new(payer: impl Into<String>, payee: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: None,
            payer: ParticipantId::new(payer),
            payee: ParticipantId::new(payee),
            amount,
            currency: Currency::default(),
            payer_account: None,
            payee_account: None,
            reference: None,
        }
    }

    /// Set explicit ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set account references
    pub fn with_accounts(mut self, payer_account: impl Into<String>, payee_account: impl Into<String>) -> Self {
        self.payer_account = Some(payer_account.into());
        self.payee_account = Some(payee_account.into());
        self
    }

    /// Set free-text reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Settlement-account balance of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementAccount {
    /// Owner
    pub participant: ParticipantId,
    /// Signed balance; negative means clearinghouse-backed overdraft
    pub balance: Decimal,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl SettlementAccount {
    /// Zero-balance account
    pub fn empty(participant: ParticipantId, now: DateTime<Utc>) -> Self {
        Self {
            participant,
            balance: Decimal::ZERO,
            updated_at: now,
        }
    }
}

/// One entry of a netting proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    /// Payment ID
    pub payment_id: String,
    /// Paying participant
    pub payer: ParticipantId,
    /// Receiving participant
    pub payee: ParticipantId,
    /// Remaining amount after apply
    pub remaining: Decimal,
    /// Status after apply
    pub status: PaymentStatus,
    /// Record version observed at calculation
    pub version: u64,
}

impl PaymentUpdate {
    /// Partition holding the target record
    pub fn partition(&self) -> PartitionName {
        PartitionName::bilateral(&self.payer, &self.payee)
    }
}

/// Bilateral netting proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetResult {
    /// First participant
    pub party_a: ParticipantId,
    /// Second participant
    pub party_b: ParticipantId,
    /// Sum of queued remaining amounts A→B
    pub total_ab: Decimal,
    /// Sum of queued remaining amounts B→A
    pub total_ba: Decimal,
    /// `min(total_ab, total_ba)`
    pub offset: Decimal,
    /// Per-payment updates, A→B first then B→A
    pub updates: Vec<PaymentUpdate>,
}

impl OffsetResult {
    /// Nothing to offset
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Multilateral netting proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultilateralOffsetResult {
    /// Participant → signed net position (positive = net creditor)
    pub net_positions: BTreeMap<ParticipantId, Decimal>,
    /// Every contributing payment, target remaining 0 and SETTLED
    pub updates: Vec<PaymentUpdate>,
    /// Window the pass was restricted to
    pub batch_window: Option<BatchWindowId>,
    /// Calculation time
    pub calculated_at: DateTime<Utc>,
}

impl MultilateralOffsetResult {
    /// Sum of every net position; zero by construction
    pub fn net_sum(&self) -> Decimal {
        self.net_positions.values().copied().sum()
    }

    /// Money actually moved: sum of the positive positions
    pub fn total_settled(&self) -> Decimal {
        self.net_positions
            .values()
            .filter(|v| **v > Decimal::ZERO)
            .copied()
            .sum()
    }

    /// Participants with a non-zero position
    pub fn processed_participants(&self) -> Vec<ParticipantId> {
        self.net_positions
            .iter()
            .filter(|(_, v)| !v.is_zero())
            .map(|(p, _)| p.clone())
            .collect()
    }
}

/// Outcome of a scheduled netting pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NettingReport {
    /// Whether the apply phase ran
    pub executed: bool,
    /// Net positions applied (empty when skipped)
    pub net_positions: BTreeMap<ParticipantId, Decimal>,
    /// Payments settled
    pub updates_count: usize,
    /// Sum of positive net positions
    pub total_settled: Decimal,
    /// Participants debited or credited
    pub processed_participants: Vec<ParticipantId>,
    /// Window the pass was restricted to
    pub batch_window: Option<BatchWindowId>,
    /// Completion time
    pub timestamp: DateTime<Utc>,
}

/// Count and value of payments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentTally {
    /// Number of payments
    pub count: usize,
    /// Sum of amounts
    pub amount: Decimal,
}

impl PaymentTally {
    /// Add one payment
    pub fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

/// Netting-eligible payments awaiting the next pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NettingStatus {
    /// Eligible payments per payer (remaining amounts)
    pub by_payer: BTreeMap<ParticipantId, PaymentTally>,
    /// All eligible payments
    pub total: PaymentTally,
    /// Partitions that could not be read
    pub skipped_partitions: Vec<PartitionName>,
    /// Current batch window
    pub current_window: BatchWindowId,
}

/// Payments between two participants, grouped by status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    /// First participant
    pub party_a: ParticipantId,
    /// Second participant
    pub party_b: ParticipantId,
    /// Partition the payments live in
    pub partition: PartitionName,
    /// All payments (original amounts)
    pub total: PaymentTally,
    /// Per status (original amounts)
    pub by_status: BTreeMap<PaymentStatus, PaymentTally>,
}

/// Network-wide view for the clearinghouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementStatistics {
    /// All payments (original amounts)
    pub total: PaymentTally,
    /// Per status (original amounts)
    pub by_status: BTreeMap<PaymentStatus, PaymentTally>,
    /// Settlement balances of the banks that have an account
    pub balances: BTreeMap<ParticipantId, Decimal>,
    /// Partitions that could not be read
    pub skipped_partitions: Vec<PartitionName>,
    /// Collection time
    pub collected_at: DateTime<Utc>,
}
