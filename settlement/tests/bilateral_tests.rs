//! Bilateral netting scenarios
//!
//! - Equal and unequal mutual obligations
//! - One-directional flows
//! - Idempotent recalculation
//! - All-or-nothing apply (missing records, stale versions, unbalanced updates)

mod common;

use common::{dec, pid, TestNetwork, CLEARING};
use rust_decimal::Decimal;
use settlement::{Error, PaymentStatus, PaymentUpdate};

const A: &str = "BankA";
const B: &str = "BankB";
const C: &str = "BankC";

fn network() -> TestNetwork {
    TestNetwork::new(&[A, B, C], 1_000_000)
}

#[test]
fn test_equal_totals_settle_both_sides() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 1000);

    net.act_as(A);
    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.offset, dec(1000));
    assert_eq!(proposal.updates.len(), 2);
    assert!(proposal
        .updates
        .iter()
        .all(|u| u.status == PaymentStatus::Settled && u.remaining.is_zero()));

    let realised = net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();
    assert_eq!(realised, dec(1000));

    for id in ["ab-1", "ba-1"] {
        let payment = net.payment(id);
        assert_eq!(payment.status, PaymentStatus::Settled);
        assert_eq!(payment.remaining, Decimal::ZERO);
        assert_eq!(net.engine.lifecycle().get_stub(id).unwrap().status, PaymentStatus::Settled);
    }
    assert_eq!(net.event_count("BilateralOffsetExecuted"), 1);
}

#[test]
fn test_unequal_totals_leave_difference_queued() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ab-2", A, B, 500);
    net.queued("ba-1", B, A, 800);

    net.act_as(B);
    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.total_ab, dec(1500));
    assert_eq!(proposal.total_ba, dec(800));
    assert_eq!(proposal.offset, dec(800));

    net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();

    let ab_1 = net.payment("ab-1");
    let ab_2 = net.payment("ab-2");
    assert_eq!(ab_1.remaining, dec(200));
    assert_eq!(ab_1.status, PaymentStatus::Queued);
    assert_eq!(ab_2.remaining, dec(500));
    assert_eq!(ab_1.remaining + ab_2.remaining, dec(700));

    let ba_1 = net.payment("ba-1");
    assert_eq!(ba_1.status, PaymentStatus::Settled);
    assert_eq!(ba_1.remaining, Decimal::ZERO);
}

#[test]
fn test_deductions_equal_offset_per_direction() {
    let net = network();
    net.queued("ab-1", A, B, 300);
    net.queued("ab-2", A, B, 300);
    net.queued("ba-1", B, A, 250);
    net.queued("ba-2", B, A, 200);

    net.act_as(CLEARING);
    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.offset, dec(450));

    let deducted = |payer: &str| -> Decimal {
        proposal
            .updates
            .iter()
            .filter(|u| u.payer.as_str() == payer)
            .map(|u| net.payment(&u.payment_id).remaining - u.remaining)
            .sum()
    };
    assert_eq!(deducted(A), proposal.offset);
    assert_eq!(deducted(B), proposal.offset);
}

#[test]
fn test_one_direction_has_no_offset() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ab-2", A, B, 400);

    net.act_as(A);
    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.offset, Decimal::ZERO);
    assert!(proposal.updates.is_empty());
}

#[test]
fn test_only_queued_records_are_offset() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.batched("ba-1", B, A, 1000);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.total_ba, Decimal::ZERO);
    assert!(proposal.updates.is_empty());
}

#[test]
fn test_recalculation_after_settlement_is_empty() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 1000);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();

    let again = net.engine.bilateral().calculate_offset(&pid(B), &pid(A)).unwrap();
    assert_eq!(again.offset, Decimal::ZERO);
    assert!(again.updates.is_empty());
}

#[test]
fn test_missing_record_writes_nothing() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 1000);

    let mut proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    proposal.updates.push(PaymentUpdate {
        payment_id: "ghost".to_string(),
        payer: pid(A),
        payee: pid(B),
        remaining: Decimal::ZERO,
        status: PaymentStatus::Settled,
        version: 1,
    });

    let err = net
        .engine
        .bilateral()
        .apply_offset(&pid(A), &pid(B), &proposal)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    for id in ["ab-1", "ba-1"] {
        let payment = net.payment(id);
        assert_eq!(payment.status, PaymentStatus::Queued);
        assert_eq!(payment.remaining, dec(1000));
    }
    assert_eq!(net.event_count("BilateralOffsetExecuted"), 0);
}

#[test]
fn test_stale_proposal_is_a_write_conflict() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 600);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();

    // Record moves on between calculation and apply
    net.engine
        .lifecycle()
        .transition("ba-1", PaymentStatus::Batched)
        .unwrap();

    let err = net
        .engine
        .bilateral()
        .apply_offset(&pid(A), &pid(B), &proposal)
        .unwrap_err();
    assert!(matches!(err, Error::WriteConflict(_)));
    assert_eq!(net.payment("ab-1").remaining, dec(1000));
}

#[test]
fn test_apply_twice_conflicts() {
    let net = network();
    net.queued("ab-1", A, B, 700);
    net.queued("ba-1", B, A, 300);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();

    assert!(matches!(
        net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal),
        Err(Error::WriteConflict(_))
    ));
    assert_eq!(net.payment("ab-1").remaining, dec(400));
}

#[test]
fn test_empty_apply_still_emits_completion() {
    let net = network();

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    let realised = net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();

    assert_eq!(realised, Decimal::ZERO);
    assert_eq!(net.event_count("BilateralOffsetExecuted"), 1);
}

#[test]
fn test_outsider_cannot_net_pair() {
    let net = network();
    net.act_as(C);

    assert!(matches!(
        net.engine.bilateral().calculate_offset(&pid(A), &pid(B)),
        Err(Error::Unauthorized(_))
    ));
}

#[test]
fn test_pair_must_be_distinct() {
    let net = network();
    assert!(matches!(
        net.engine.bilateral().calculate_offset(&pid(A), &pid(A)),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_proposal_for_other_pair_rejected() {
    let net = network();
    net.queued("ab-1", A, B, 100);
    net.queued("ba-1", B, A, 100);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert!(matches!(
        net.engine.bilateral().apply_offset(&pid(A), &pid(C), &proposal),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_corrupt_record_is_skipped() {
    use ledger_core::{PartitionName, PartitionStore};

    let net = network();
    net.queued("ab-1", A, B, 500);
    net.queued("ba-1", B, A, 200);
    net.store
        .put(&PartitionName::bilateral(&pid(A), &pid(B)), "zz-garbage", b"{not json".to_vec())
        .unwrap();

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    assert_eq!(proposal.offset, dec(200));
    assert_eq!(net.engine.metrics().records_skipped.get(), 1);
}

#[test]
fn test_pending_cannot_jump_to_settled() {
    let net = network();
    net.act_as(A);
    net.engine
        .lifecycle()
        .create(settlement::NewPayment::new(A, B, dec(10)).with_id("p-1"))
        .unwrap();

    assert!(matches!(
        net.engine.lifecycle().transition("p-1", PaymentStatus::Settled),
        Err(Error::InvalidTransition {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Settled
        })
    ));
    assert_eq!(net.payment("p-1").status, PaymentStatus::Pending);
}

#[test]
fn test_one_sided_proposal_is_rejected() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 600);

    let mut proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    proposal.updates.retain(|u| u.payment_id != "ba-1");

    let err = net
        .engine
        .bilateral()
        .apply_offset(&pid(A), &pid(B), &proposal)
        .unwrap_err();
    assert!(matches!(&err, Error::InvalidInput(msg) if msg.contains("Unbalanced")));

    assert_eq!(net.payment("ab-1").remaining, dec(1000));
    assert_eq!(net.payment("ba-1").remaining, dec(600));
    assert_eq!(net.event_count("BilateralOffsetExecuted"), 0);
}

#[test]
fn test_update_cannot_raise_remaining() {
    let net = network();
    net.queued("ab-1", A, B, 1000);
    net.queued("ba-1", B, A, 400);

    let proposal = net.engine.bilateral().calculate_offset(&pid(A), &pid(B)).unwrap();
    net.engine.bilateral().apply_offset(&pid(A), &pid(B), &proposal).unwrap();
    let partial = net.payment("ab-1");
    assert_eq!(partial.remaining, dec(600));

    let inflated = settlement::OffsetResult {
        party_a: pid(A),
        party_b: pid(B),
        total_ab: dec(600),
        total_ba: Decimal::ZERO,
        offset: Decimal::ZERO,
        updates: vec![PaymentUpdate {
            payment_id: "ab-1".to_string(),
            payer: pid(A),
            payee: pid(B),
            remaining: dec(900),
            status: PaymentStatus::Queued,
            version: partial.version,
        }],
    };

    let err = net
        .engine
        .bilateral()
        .apply_offset(&pid(A), &pid(B), &inflated)
        .unwrap_err();
    assert!(matches!(&err, Error::InvalidInput(msg) if msg.contains("inconsistent")));

    let after = net.payment("ab-1");
    assert_eq!(after.remaining, dec(600));
    assert_eq!(after.version, partial.version);
}
