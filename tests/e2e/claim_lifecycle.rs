//! Claim lifecycle scenarios: commit, audit, settle, and every way it fails.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{relay, TestHarness, TEST_PARAMS};
use relay_audit::audit::index_at;
use relay_audit::{
    AuditEvent, ClaimStatus, Error, EvidenceKey, EvidenceType, ProofMsg, SessionHeader,
};

fn header(start: u64) -> SessionHeader {
    SessionHeader::new("a1b2c3d4", "0021", start)
}

/// Five relays are committed, audited and settled into one receipt.
#[test]
fn test_five_relays_settle_into_receipt() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    h.chain.advance(3);

    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    assert_eq!(entry.status, ClaimStatus::Pending);
    assert_eq!(entry.claim.total_records, 5);
    assert_eq!(entry.submission_height, 4);
    assert_eq!(entry.lookahead_height, 13);
    assert_eq!(entry.expiry_height, 21);

    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();
    assert!(msg.proof.leaf_index < 5);
    let receipt = h.prove(&msg).unwrap();

    let address = h.servicer(0).unwrap().address();
    assert_eq!(receipt.total, 5);
    assert_eq!(receipt.servicer_address, address);
    assert_eq!(receipt.header, session);
    assert_eq!(receipt.evidence_type, EvidenceType::Relay);

    let stored = h.keeper.claim(&h.chain, &entry.key()).unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Validated);
    assert_eq!(
        h.keeper
            .receipt(address, &session, EvidenceType::Relay)
            .unwrap(),
        Some(receipt)
    );

    let events = h.drain_events();
    assert!(matches!(
        events.as_slice(),
        [
            AuditEvent::ClaimSubmitted { total_records: 5, lookahead_height: 13, .. },
            AuditEvent::ProofValidated { .. },
            AuditEvent::ReceiptWritten { total: 5, .. },
        ]
    ));
}

/// A settled claim cannot be claimed or proved again.
#[test]
fn test_settlement_is_idempotent() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();
    h.prove(&msg).unwrap();

    assert!(matches!(
        h.prove(&msg),
        Err(Error::ClaimAlreadySettled(_))
    ));
    let again = h
        .keeper
        .submit_claim(&h.chain, entry.claim.clone())
        .expect_err("already claimed");
    assert!(matches!(again, Error::DuplicateClaim(_)));
    assert_eq!(h.keeper.all_receipts().unwrap().len(), 1);
}

/// Resubmitting a live claim is rejected and leaves the original in place.
#[test]
fn test_duplicate_pending_claim_rejected() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 3).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();

    let mut altered = entry.claim.clone();
    altered.root = [0xee; 32];
    assert!(matches!(
        h.keeper.submit_claim(&h.chain, altered),
        Err(Error::DuplicateClaim(_))
    ));
    let stored = h.keeper.claim(&h.chain, &entry.key()).unwrap().unwrap();
    assert_eq!(stored.claim.root, entry.claim.root);
}

/// A claim can no longer be submitted once its lookahead block exists.
#[test]
fn test_late_claim_rejected() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 3).unwrap();
    h.chain.advance_to(13);

    let claim = h
        .servicer(0)
        .unwrap()
        .build_claim(&session, EvidenceType::Relay)
        .unwrap();
    let err = h.keeper.submit_claim(&h.chain, claim).expect_err("late");
    assert!(matches!(
        err,
        Error::SubmissionWindowClosed {
            lookahead_height: 13,
            current_height: 13
        }
    ));
    assert!(h.keeper.pending_claims().unwrap().is_empty());
}

/// Before the lookahead height the audit fails retryably and nothing changes.
#[test]
fn test_audit_before_window_is_retryable() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 7).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();

    // The servicer cannot even derive its index yet.
    let err = h
        .servicer(0)
        .unwrap()
        .answer_audit(&h.chain, &entry)
        .expect_err("no entropy yet");
    assert!(matches!(err, Error::FutureContextUnavailable { height: 13, .. }));
    assert!(err.is_retryable());

    // A guessed proof is refused on timing alone.
    let (leaf, proof) = h
        .servicer(0)
        .unwrap()
        .ledger()
        .get(&EvidenceKey::new(session.clone(), EvidenceType::Relay))
        .unwrap()
        .merkle_proof(0)
        .unwrap();
    let guess = ProofMsg {
        key: entry.key(),
        leaf,
        proof,
    };
    h.chain.advance_to(12);
    let err = h.prove(&guess).expect_err("too early");
    assert!(matches!(
        err,
        Error::AuditWindowNotYetOpen {
            lookahead_height: 13,
            current_height: 12
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(h.keeper.pending_claims().unwrap().len(), 1);

    // Once the window opens the same claim settles normally.
    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();
    assert_eq!(h.prove(&msg).unwrap().total, 7);
}

/// A proof after the expiry height fails, and the claim expires on sweep.
#[test]
fn test_expired_claim_cannot_settle() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();
    h.drain_events();

    h.chain.advance_to(TEST_PARAMS.expiry_height(&session).unwrap() + 1);
    let err = h.prove(&msg).expect_err("expired");
    assert!(matches!(
        err,
        Error::ClaimExpired {
            expiry_height: 21,
            current_height: 22
        }
    ));
    assert!(!err.is_retryable());
    assert!(h.keeper.all_receipts().unwrap().is_empty());

    // Lookups already report the lapse; the sweep makes it permanent.
    let seen = h.keeper.claim(&h.chain, &entry.key()).unwrap().unwrap();
    assert_eq!(seen.status, ClaimStatus::Expired);
    assert_eq!(h.keeper.pending_claims().unwrap().len(), 1);

    let swept = h.keeper.sweep_expired_claims(&h.chain).unwrap();
    assert_eq!(swept, vec![entry.key()]);
    assert!(h.keeper.pending_claims().unwrap().is_empty());
    assert!(matches!(
        h.drain_events().as_slice(),
        [AuditEvent::ClaimExpired { .. }]
    ));
    assert!(matches!(
        h.prove(&msg),
        Err(Error::ClaimAlreadySettled(_))
    ));
}

/// A node that pruned the lookahead block cannot audit; the claim stays pending.
#[test]
fn test_pruned_lookahead_block() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();

    h.chain.advance(1);
    h.chain.prune_before(14);
    let err = h.prove(&msg).expect_err("pruned");
    assert!(matches!(err, Error::FutureContextUnavailable { height: 13, .. }));
    assert_eq!(h.keeper.pending_claims().unwrap().len(), 1);
}

/// The index is re-derived from the lookahead block; any other leaf fails.
#[test]
fn test_only_the_audited_leaf_is_accepted() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 11).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    h.open_audit(&entry);

    let expected = index_at(&h.chain, 13, &session, 11).unwrap();
    let evidence = h
        .servicer(0)
        .unwrap()
        .ledger()
        .get(&EvidenceKey::new(session.clone(), EvidenceType::Relay))
        .unwrap();

    for index in (0..11).filter(|i| *i != expected) {
        let (leaf, proof) = evidence.merkle_proof(index).unwrap();
        let msg = ProofMsg {
            key: entry.key(),
            leaf,
            proof,
        };
        assert!(
            matches!(h.prove(&msg), Err(Error::InvalidMerkleProof(_))),
            "index {index} should be rejected"
        );
    }

    let (leaf, proof) = evidence.merkle_proof(expected).unwrap();
    let msg = ProofMsg {
        key: entry.key(),
        leaf,
        proof,
    };
    assert!(h.prove(&msg).is_ok());
}

/// Tampering with the revealed record or a sibling hash breaks the proof.
#[test]
fn test_tampered_proof_rejected() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 6).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();
    h.open_audit(&entry);
    let msg = h.answer(0, &entry).unwrap();

    let mut bad_leaf = msg.clone();
    bad_leaf.leaf.entropy += 1;
    assert!(matches!(
        h.prove(&bad_leaf),
        Err(Error::InvalidMerkleProof(_))
    ));

    let mut bad_sibling = msg.clone();
    bad_sibling.proof.siblings[0].hash[0] ^= 0xff;
    assert!(matches!(
        h.prove(&bad_sibling),
        Err(Error::InvalidMerkleProof(_))
    ));

    let mut truncated = msg.clone();
    truncated.proof.siblings.pop();
    assert!(matches!(
        h.prove(&truncated),
        Err(Error::InvalidMerkleProof(_))
    ));

    assert_eq!(h.keeper.pending_claims().unwrap().len(), 1);
    assert!(h.prove(&msg).is_ok());
}

/// A servicer claiming another servicer's evidence fails the binding check.
#[test]
fn test_claiming_someone_elses_evidence() {
    let mut h = TestHarness::setup(2);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 4).unwrap();

    let victim = h.servicer(0).unwrap().clone();
    let thief = h.servicer(1).unwrap().address();
    let mut claim = victim.build_claim(&session, EvidenceType::Relay).unwrap();
    claim.claimant = thief;
    let entry = h.keeper.submit_claim(&h.chain, claim).unwrap();
    h.open_audit(&entry);

    let index = index_at(&h.chain, entry.lookahead_height, &session, 4).unwrap();
    let (leaf, proof) = victim
        .ledger()
        .get(&EvidenceKey::new(session.clone(), EvidenceType::Relay))
        .unwrap()
        .merkle_proof(index)
        .unwrap();
    let msg = ProofMsg {
        key: entry.key(),
        leaf,
        proof,
    };
    assert!(matches!(
        h.prove(&msg),
        Err(Error::RecordBindingMismatch(_))
    ));
    assert!(h.keeper.receipts_for_servicer(&thief).unwrap().is_empty());
}

/// Records from another session cannot back a claim, even if they hash into its root.
#[test]
fn test_records_from_other_session_rejected() {
    let mut h = TestHarness::setup(1);
    let claimed = header(1);
    let actual = header(5);
    let address = h.servicer(0).unwrap().address();

    let leaves: Vec<_> = (0..3)
        .map(|seq| relay(&actual, address, EvidenceType::Relay, seq))
        .collect();
    let tree = relay_audit::MerkleTree::from_leaves(leaves.iter().map(|r| r.leaf_hash()).collect())
        .unwrap();
    let claim = relay_audit::Claim::from_root(claimed.clone(), EvidenceType::Relay, tree.root(), address);
    let entry = h.keeper.submit_claim(&h.chain, claim).unwrap();
    h.open_audit(&entry);

    let index = index_at(&h.chain, entry.lookahead_height, &claimed, 3).unwrap();
    let msg = ProofMsg {
        key: entry.key(),
        leaf: leaves[usize::try_from(index).unwrap()].clone(),
        proof: tree.proof(index).unwrap(),
    };
    assert!(matches!(
        h.prove(&msg),
        Err(Error::RecordBindingMismatch(_))
    ));
}

/// Inflating the record count only exposes the claimant: the audit lands
/// past the real records and no held record can answer it.
#[test]
fn test_inflated_count_cannot_be_answered() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    let servicer = h.servicer(0).unwrap().clone();
    let mut claim = servicer.build_claim(&session, EvidenceType::Relay).unwrap();
    claim.total_records = 1 << 40;
    let entry = h.keeper.submit_claim(&h.chain, claim).unwrap();
    h.open_audit(&entry);

    assert!(matches!(
        servicer.answer_audit(&h.chain, &entry),
        Err(Error::InvalidClaimParameters(_))
    ));

    let index = index_at(&h.chain, entry.lookahead_height, &session, 1 << 40).unwrap();
    assert!(index >= 5);
    let evidence = servicer
        .ledger()
        .get(&EvidenceKey::new(session.clone(), EvidenceType::Relay))
        .unwrap();
    for held in 0..5 {
        let (leaf, proof) = evidence.merkle_proof(held).unwrap();
        let msg = ProofMsg {
            key: entry.key(),
            leaf,
            proof,
        };
        assert!(matches!(
            h.prove(&msg),
            Err(Error::InvalidMerkleProof(_))
        ));
    }
}

/// Relay and challenge evidence for one session settle independently.
#[test]
fn test_relay_and_challenge_claims_are_independent() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 4).unwrap();
    h.serve(0, &session, EvidenceType::Challenge, 2).unwrap();

    let relays = h.commit(0, &session, EvidenceType::Relay).unwrap();
    let challenges = h.commit(0, &session, EvidenceType::Challenge).unwrap();
    assert_ne!(relays.key(), challenges.key());
    assert_eq!(h.keeper.pending_claims().unwrap().len(), 2);

    h.open_audit(&relays);
    for entry in [&relays, &challenges] {
        let msg = h.answer(0, entry).unwrap();
        h.prove(&msg).unwrap();
    }

    let address = h.servicer(0).unwrap().address();
    let totals: Vec<_> = h
        .keeper
        .receipts_for_servicer(&address)
        .unwrap()
        .into_iter()
        .map(|r| (r.evidence_type, r.total))
        .collect();
    assert_eq!(
        totals,
        vec![(EvidenceType::Relay, 4), (EvidenceType::Challenge, 2)]
    );
}

/// Claims keep the window they were submitted under when parameters change.
#[test]
fn test_parameter_change_does_not_move_stored_window() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.serve(0, &session, EvidenceType::Relay, 5).unwrap();
    let entry = h.commit(0, &session, EvidenceType::Relay).unwrap();

    let mut params = TEST_PARAMS;
    params.claim_submission_window = 10;
    h.chain.set_params(params);

    h.chain.advance_to(13);
    let msg = h.answer(0, &entry).unwrap();
    assert!(h.prove(&msg).is_ok());
}

/// After settlement the servicer can drop the session's evidence.
#[test]
fn test_servicer_releases_settled_evidence() {
    let mut h = TestHarness::setup(1);
    let session = header(1);
    h.settle(0, &session, EvidenceType::Relay, 3).unwrap();

    let servicer = h.servicer(0).unwrap();
    assert_eq!(
        servicer
            .ledger()
            .count(&EvidenceKey::new(session.clone(), EvidenceType::Relay)),
        3
    );
    assert!(servicer.release(&session, EvidenceType::Relay));
    assert!(servicer.ledger().is_empty());
    assert_eq!(h.height(), 13);
}
