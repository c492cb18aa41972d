//! Receipt ledger scenarios across servicers and sessions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::TestHarness;
use relay_audit::{AuditEvent, Error, EvidenceType, Receipt, SessionHeader};

fn header(app: &str, start: u64) -> SessionHeader {
    SessionHeader::new(app, "0021", start)
}

/// Receipts are queryable individually, per servicer and in full.
#[test]
fn test_receipts_across_servicers_and_sessions() {
    let mut h = TestHarness::setup(2);
    let early = header("app1", 1);
    let late = header("app1", 9);
    let other_app = header("app2", 1);

    h.serve(0, &early, EvidenceType::Relay, 3).unwrap();
    h.serve(0, &other_app, EvidenceType::Relay, 8).unwrap();
    h.serve(1, &early, EvidenceType::Relay, 2).unwrap();
    let a = h.commit(0, &early, EvidenceType::Relay).unwrap();
    let b = h.commit(0, &other_app, EvidenceType::Relay).unwrap();
    let c = h.commit(1, &early, EvidenceType::Relay).unwrap();

    h.chain.advance_to(9);
    h.serve(0, &late, EvidenceType::Relay, 6).unwrap();
    let d = h.commit(0, &late, EvidenceType::Relay).unwrap();
    assert_eq!(d.lookahead_height, 21);

    h.open_audit(&a);
    for entry in [&a, &b, &c] {
        let index = if entry.claim.claimant == h.servicer(0).unwrap().address() { 0 } else { 1 };
        let msg = h.answer(index, entry).unwrap();
        h.prove(&msg).unwrap();
    }
    h.open_audit(&d);
    let msg = h.answer(0, &d).unwrap();
    h.prove(&msg).unwrap();

    let first = h.servicer(0).unwrap().address();
    let second = h.servicer(1).unwrap().address();

    let mine = h.keeper.receipts_for_servicer(&first).unwrap();
    assert_eq!(mine.len(), 3);
    assert_eq!(mine.iter().map(|r| r.total).sum::<u64>(), 17);
    assert_eq!(h.keeper.receipts_for_servicer(&second).unwrap().len(), 1);
    assert_eq!(h.keeper.all_receipts().unwrap().len(), 4);

    let single = h
        .keeper
        .receipt(second, &early, EvidenceType::Relay)
        .unwrap()
        .unwrap();
    assert_eq!(single.total, 2);
    assert_eq!(
        h.keeper
            .receipt(second, &late, EvidenceType::Relay)
            .unwrap(),
        None
    );
    assert_eq!(
        h.keeper
            .receipt(first, &early, EvidenceType::Challenge)
            .unwrap(),
        None
    );
}

/// A batch that collides with a settled receipt is rejected whole.
#[test]
fn test_batch_put_is_all_or_nothing() {
    let mut h = TestHarness::setup(1);
    let session = header("app1", 1);
    let settled = h.settle(0, &session, EvidenceType::Relay, 4).unwrap();

    let fresh = Receipt {
        header: header("app3", 2),
        ..settled.clone()
    };
    let err = h
        .keeper
        .put_receipts(&[fresh.clone(), settled.clone()])
        .expect_err("collision");
    assert!(matches!(err, Error::DuplicateReceipt(_)));
    assert_eq!(h.keeper.all_receipts().unwrap(), vec![settled.clone()]);

    h.keeper.put_receipts(&[fresh.clone()]).unwrap();
    let all = h.keeper.all_receipts().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.contains(&fresh));

    // The settled receipt is never overwritten.
    let stored = h
        .keeper
        .receipt(settled.servicer_address, &session, EvidenceType::Relay)
        .unwrap();
    assert_eq!(stored, Some(settled));
}

/// Sweeping only expires lapsed pending claims; settled ones keep their receipt.
#[test]
fn test_sweep_leaves_settled_claims_alone() {
    let mut h = TestHarness::setup(2);
    let session = header("app1", 1);
    h.serve(0, &session, EvidenceType::Relay, 3).unwrap();
    h.serve(1, &session, EvidenceType::Relay, 3).unwrap();
    let settled = h.commit(0, &session, EvidenceType::Relay).unwrap();
    let lapsed = h.commit(1, &session, EvidenceType::Relay).unwrap();

    h.open_audit(&settled);
    let msg = h.answer(0, &settled).unwrap();
    h.prove(&msg).unwrap();
    assert!(h.keeper.sweep_expired_claims(&h.chain).unwrap().is_empty());

    h.chain.advance_to(lapsed.expiry_height + 1);
    h.drain_events();
    let swept = h.keeper.sweep_expired_claims(&h.chain).unwrap();
    assert_eq!(swept, vec![lapsed.key()]);
    assert_eq!(
        h.drain_events(),
        vec![AuditEvent::ClaimExpired { key: lapsed.key() }]
    );

    // A second sweep has nothing left to do.
    assert!(h.keeper.sweep_expired_claims(&h.chain).unwrap().is_empty());
    assert_eq!(h.keeper.all_receipts().unwrap().len(), 1);
    let kept = h.keeper.claim(&h.chain, &settled.key()).unwrap().unwrap();
    assert_eq!(kept.status, relay_audit::ClaimStatus::Validated);
}
