//! Full trade lifecycle through the ledger.
//!
//! Every scenario drives the public `Ledger` surface the way an external
//! client would: one transaction per call, events observed on the log.

use std::sync::Arc;

use dvp_registry::{AttestationSigner, Ledger, ManualClock};
use dvp_types::*;

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

struct Harness {
    ledger: Ledger,
    clock: Arc<ManualClock>,
    admin: Address,
    oracle: Address,
    seller: Address,
    buyer: Address,
    seller_attestor: AttestationSigner,
    buyer_attestor: AttestationSigner,
}

impl Harness {
    fn new() -> Self {
        let admin = Address::random();
        let clock = Arc::new(ManualClock::new(START));
        let config = RegistryConfig::new(31_337, Address([0xD0; 20]), admin).unwrap();
        let ledger = Ledger::new(config, clock.clone());

        let seller_attestor = AttestationSigner::from_bytes(&[0x41; 32]).unwrap();
        let buyer_attestor = AttestationSigner::from_bytes(&[0x42; 32]).unwrap();
        let oracle = Address::random();
        ledger.add_attestor(admin, seller_attestor.address()).unwrap();
        ledger.add_attestor(admin, buyer_attestor.address()).unwrap();
        ledger.add_oracle(admin, oracle).unwrap();

        Self {
            ledger,
            clock,
            admin,
            oracle,
            seller: Address::random(),
            buyer: Address::random(),
            seller_attestor,
            buyer_attestor,
        }
    }

    fn terms(&self) -> TradeTerms {
        TradeTerms {
            seller: self.seller,
            buyer: self.buyer,
            security_id: SecurityId([0x5E; 32]),
            qty: 100,
            currency_code: "EUR".parse().unwrap(),
            amount: 1_000 * 10u128.pow(18),
            deadline: START + 7 * DAY,
        }
    }

    fn propose(&self) -> TradeId {
        self.ledger.propose(self.seller, self.terms()).unwrap()
    }

    fn attestation(&self, trade_id: TradeId, party: Party, nonce: u64) -> Attestation {
        let t = self.terms();
        Attestation {
            trade_id,
            security_id: t.security_id,
            qty: t.qty,
            currency_code: t.currency_code,
            amount: t.amount,
            expiry: START + DAY,
            party: party.flag(),
            nonce,
        }
    }

    fn sign(&self, signer: &AttestationSigner, attestation: Attestation) -> SignedAttestation {
        self.ledger
            .view(|r| signer.sign(r.verifier(), attestation))
            .unwrap()
            .unwrap()
    }

    fn seller_signed(&self, attestation: Attestation) -> SignedAttestation {
        self.sign(&self.seller_attestor, attestation)
    }

    fn buyer_signed(&self, attestation: Attestation) -> SignedAttestation {
        self.sign(&self.buyer_attestor, attestation)
    }

    fn pair(&self, trade_id: TradeId) -> (SignedAttestation, SignedAttestation) {
        (
            self.seller_signed(self.attestation(trade_id, Party::Seller, 1)),
            self.buyer_signed(self.attestation(trade_id, Party::Buyer, 1)),
        )
    }

    fn ready(&self) -> TradeId {
        let id = self.propose();
        let (s, b) = self.pair(id);
        self.ledger.submit_proofs(self.seller, &s, &b).unwrap();
        id
    }

    fn state(&self, id: &TradeId) -> Option<TradeState> {
        self.ledger.state_of(id).unwrap()
    }

    fn event_names(&self, from: u64) -> Vec<&'static str> {
        self.ledger
            .events_between(from, u64::MAX)
            .unwrap()
            .iter()
            .map(|r| r.event.name())
            .collect()
    }

    fn consumed(&self) -> usize {
        self.ledger.view(|r| r.store().consumed_len()).unwrap()
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn full_lifecycle_settles() {
    let h = Harness::new();
    let start_block = h.ledger.head().unwrap() + 1;

    let id = h.propose();
    assert_eq!(h.state(&id), Some(TradeState::Draft));

    let (s, b) = h.pair(id);
    h.ledger.submit_proofs(h.buyer, &s, &b).unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Ready));

    h.clock.advance(60);
    h.ledger.trigger(h.buyer, id).unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Triggered));

    let reg = ExternalRegId([0xAA; 32]);
    let receipt = h.ledger.confirm_registration(h.oracle, id, reg).unwrap();
    assert_eq!(receipt.events.len(), 2);

    let trade = h.ledger.get_trade(&id).unwrap();
    assert_eq!(trade.state, TradeState::Settled);
    assert_eq!(trade.external_reg_id, Some(reg));
    assert_eq!(trade.triggered_at, Some(START + 60));
    let proofs = trade.proofs.unwrap();
    assert_eq!(
        proofs.seller_proof_hash,
        h.ledger.attestation_digest(&s.attestation).unwrap()
    );

    assert_eq!(
        h.event_names(start_block),
        [
            "DealCreated",
            "ProofsAccepted",
            "Triggered",
            "Registered",
            "Settled"
        ]
    );
}

#[test]
fn proposals_with_identical_terms_get_unique_ids() {
    let h = Harness::new();
    let ids: std::collections::HashSet<_> = (0..10).map(|_| h.propose()).collect();
    assert_eq!(ids.len(), 10);
}

#[test]
fn unknown_trade_reads() {
    let h = Harness::new();
    let ghost = TradeId([0x99; 32]);
    assert_eq!(h.state(&ghost), None);
    assert!(matches!(
        h.ledger.get_trade(&ghost).unwrap_err(),
        DvpError::TradeNotFound(id) if id == ghost
    ));
}

// =============================================================================
// submitProofs rejections: each leaves the trade in Draft, consumes nothing
// =============================================================================

fn assert_untouched(h: &Harness, id: &TradeId, head_before: u64) {
    assert_eq!(h.state(id), Some(TradeState::Draft));
    assert_eq!(h.consumed(), 0);
    assert_eq!(h.ledger.head().unwrap(), head_before, "no block committed");
}

#[test]
fn mismatched_trade_ids_rejected() {
    let h = Harness::new();
    let a = h.propose();
    let b = h.propose();
    let head = h.ledger.head().unwrap();

    let s = h.seller_signed(h.attestation(a, Party::Seller, 1));
    let bu = h.buyer_signed(h.attestation(b, Party::Buyer, 1));
    let err = h.ledger.submit_proofs(h.seller, &s, &bu).unwrap_err();
    assert!(matches!(err, DvpError::AttestationMismatch { .. }));
    assert_untouched(&h, &a, head);
    assert_untouched(&h, &b, head);
}

#[test]
fn wrong_economics_rejected() {
    let h = Harness::new();
    let id = h.propose();
    let head = h.ledger.head().unwrap();

    type Tweak = Box<dyn Fn(&mut Attestation)>;
    let seller_tweaks: Vec<Tweak> = vec![
        Box::new(|a: &mut Attestation| a.security_id = SecurityId([0x01; 32])),
        Box::new(|a: &mut Attestation| a.currency_code = "USD".parse().unwrap()),
        Box::new(|a: &mut Attestation| a.qty = 99),
    ];
    for tweak in seller_tweaks {
        let mut att = h.attestation(id, Party::Seller, 1);
        tweak(&mut att);
        let s = h.seller_signed(att);
        let b = h.buyer_signed(h.attestation(id, Party::Buyer, 1));
        let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
        assert_untouched(&h, &id, head);
    }

    let mut short = h.attestation(id, Party::Buyer, 1);
    short.amount -= 1;
    let s = h.seller_signed(h.attestation(id, Party::Seller, 1));
    let b = h.buyer_signed(short);
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(err.to_string().contains("amount"));
    assert_untouched(&h, &id, head);
}

#[test]
fn over_attested_amounts_accepted() {
    let h = Harness::new();
    let id = h.propose();
    let mut s = h.attestation(id, Party::Seller, 1);
    s.qty = 150;
    let mut b = h.attestation(id, Party::Buyer, 1);
    b.amount *= 2;
    h.ledger
        .submit_proofs(h.seller, &h.seller_signed(s), &h.buyer_signed(b))
        .unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Ready));
}

#[test]
fn expired_attestation_rejected() {
    let h = Harness::new();
    let id = h.propose();
    let head = h.ledger.head().unwrap();

    let mut stale = h.attestation(id, Party::Buyer, 1);
    stale.expiry = START - 1;
    let s = h.seller_signed(h.attestation(id, Party::Seller, 1));
    let b = h.buyer_signed(stale);
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(err, DvpError::AttestationExpired { party: "buyer", .. }));
    assert_untouched(&h, &id, head);
}

#[test]
fn expiry_equal_to_now_is_still_valid() {
    let h = Harness::new();
    let id = h.propose();
    let mut s = h.attestation(id, Party::Seller, 1);
    s.expiry = START;
    let b = h.attestation(id, Party::Buyer, 1);
    h.ledger
        .submit_proofs(h.seller, &h.seller_signed(s), &h.buyer_signed(b))
        .unwrap();
}

#[test]
fn proofs_after_deadline_rejected() {
    let h = Harness::new();
    let id = h.propose();
    let (s, b) = h.pair(id);
    h.clock.set(START + 7 * DAY + 1);
    let head = h.ledger.head().unwrap();
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(err, DvpError::DeadlinePassed { .. }));
    assert_untouched(&h, &id, head);
}

#[test]
fn non_attestor_signature_rejects_whole_pair() {
    let h = Harness::new();
    let id = h.propose();
    let head = h.ledger.head().unwrap();

    let rogue = AttestationSigner::from_bytes(&[0x77; 32]).unwrap();
    let s = h.seller_signed(h.attestation(id, Party::Seller, 1));
    let b = h.sign(&rogue, h.attestation(id, Party::Buyer, 1));
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_untouched(&h, &id, head);

    // The valid seller half was not consumed and still works.
    let b = h.buyer_signed(h.attestation(id, Party::Buyer, 1));
    h.ledger.submit_proofs(h.seller, &s, &b).unwrap();
}

#[test]
fn malformed_signature_is_verification_failure() {
    let h = Harness::new();
    let id = h.propose();
    let head = h.ledger.head().unwrap();
    let (s, mut b) = h.pair(id);

    b.signature[64] = 5;
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(
        err,
        DvpError::InvalidSignature {
            party: "buyer",
            source: SignatureError::InvalidRecoveryId(5)
        }
    ));

    b.signature.push(0);
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(
        err,
        DvpError::InvalidSignature {
            source: SignatureError::InvalidLength(66),
            ..
        }
    ));
    assert_untouched(&h, &id, head);
}

#[test]
fn signature_for_another_registry_does_not_verify_as_attestor() {
    let h = Harness::new();
    let id = h.propose();
    let other = dvp_registry::AttestationVerifier::new(31_337, &Address([0xD1; 20]));
    let s = h
        .seller_attestor
        .sign(&other, h.attestation(id, Party::Seller, 1))
        .unwrap();
    let b = h.buyer_signed(h.attestation(id, Party::Buyer, 1));
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(err, DvpError::MissingRole { role: Role::Attestor, .. }));
}

#[test]
fn reused_attestation_is_replay_even_with_fresh_counterpart() {
    let h = Harness::new();
    let id = h.ready();
    let consumed = h.consumed();
    let head = h.ledger.head().unwrap();

    let reused = h.seller_signed(h.attestation(id, Party::Seller, 1));
    let fresh = h.buyer_signed(h.attestation(id, Party::Buyer, 2));
    let err = h.ledger.submit_proofs(h.buyer, &reused, &fresh).unwrap_err();
    assert!(matches!(err, DvpError::Replay(_)));
    assert_eq!(err.kind(), ErrorKind::Replay);

    assert_eq!(h.state(&id), Some(TradeState::Ready));
    assert_eq!(h.consumed(), consumed, "fresh half not consumed");
    assert_eq!(h.ledger.head().unwrap(), head);
}

// =============================================================================
// Post-proof transitions
// =============================================================================

#[test]
fn trigger_is_party_only_and_ready_only() {
    let h = Harness::new();
    let id = h.propose();
    assert!(matches!(
        h.ledger.trigger(h.seller, id).unwrap_err(),
        DvpError::InvalidState { .. }
    ));

    let (s, b) = h.pair(id);
    h.ledger.submit_proofs(h.seller, &s, &b).unwrap();
    assert!(matches!(
        h.ledger.trigger(h.oracle, id).unwrap_err(),
        DvpError::NotParty { .. }
    ));
    h.ledger.trigger(h.seller, id).unwrap();
    assert!(h.ledger.trigger(h.buyer, id).is_err(), "second trigger refused");
}

#[test]
fn reject_records_reason_and_blocks_later_confirm() {
    let h = Harness::new();
    let id = h.ready();
    h.ledger.trigger(h.buyer, id).unwrap();

    let receipt = h
        .ledger
        .reject(h.oracle, id, "registrar returned 503")
        .unwrap();
    assert_eq!(
        receipt.events,
        [RegistryEvent::Rejected {
            trade_id: id,
            reason: "registrar returned 503".to_string()
        }]
    );
    assert_eq!(h.state(&id), Some(TradeState::Rejected));

    let err = h
        .ledger
        .confirm_registration(h.oracle, id, ExternalRegId([1u8; 32]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn confirm_before_trigger_refused() {
    let h = Harness::new();
    let id = h.ready();
    let err = h
        .ledger
        .confirm_registration(h.oracle, id, ExternalRegId([1u8; 32]))
        .unwrap_err();
    assert!(matches!(
        err,
        DvpError::InvalidState {
            actual: TradeState::Ready,
            ..
        }
    ));
}

// =============================================================================
// Cancel / expire
// =============================================================================

#[test]
fn cancel_requires_both_parties() {
    let h = Harness::new();
    let id = h.ready();
    let from = h.ledger.head().unwrap() + 1;

    h.ledger.cancel(h.buyer, id).unwrap();
    h.ledger.cancel(h.buyer, id).unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Ready));

    h.ledger.cancel(h.seller, id).unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Canceled));
    assert_eq!(h.event_names(from), ["Canceled"]);

    assert!(h.ledger.trigger(h.seller, id).is_err());
}

#[test]
fn expire_at_deadline_boundary() {
    let h = Harness::new();
    let id = h.propose();
    let anyone = Address::random();

    h.clock.set(START + 7 * DAY);
    assert!(matches!(
        h.ledger.expire(anyone, id).unwrap_err(),
        DvpError::DeadlineNotReached { .. }
    ));

    h.clock.advance(1);
    h.ledger.expire(anyone, id).unwrap();
    assert_eq!(h.state(&id), Some(TradeState::Expired));
    assert!(h.ledger.cancel(h.seller, id).is_err());
}

#[test]
fn triggered_trade_cannot_expire() {
    let h = Harness::new();
    let id = h.ready();
    h.ledger.trigger(h.seller, id).unwrap();
    h.clock.set(START + 30 * DAY);
    let err = h.ledger.expire(h.seller, id).unwrap_err();
    assert!(matches!(
        err,
        DvpError::InvalidState {
            actual: TradeState::Triggered,
            ..
        }
    ));
}

// =============================================================================
// Roles
// =============================================================================

#[test]
fn revoking_attestor_blocks_future_proofs_only() {
    let h = Harness::new();
    let settled_earlier = h.ready();
    let pending = h.propose();

    h.ledger
        .remove_attestor(h.admin, h.buyer_attestor.address())
        .unwrap();
    assert!(!h.ledger.is_attestor(&h.buyer_attestor.address()).unwrap());

    let (s, b) = h.pair(pending);
    let err = h.ledger.submit_proofs(h.seller, &s, &b).unwrap_err();
    assert!(matches!(err, DvpError::MissingRole { .. }));

    let trade = h.ledger.get_trade(&settled_earlier).unwrap();
    assert_eq!(trade.state, TradeState::Ready);
    assert_eq!(
        trade.proofs.unwrap().buyer_attestor,
        h.buyer_attestor.address()
    );
}

#[test]
fn only_admin_manages_roles() {
    let h = Harness::new();
    let err = h.ledger.add_oracle(h.seller, h.seller).unwrap_err();
    assert!(matches!(err, DvpError::NotAdmin { .. }));
    assert!(!h.ledger.is_oracle(&h.seller).unwrap());

    let err = h.ledger.add_attestor(h.admin, Address::ZERO).unwrap_err();
    assert!(matches!(err, DvpError::InvalidInput { .. }));
}
