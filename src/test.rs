use bls12_381::{G2Affine, Scalar};
use group::Curve;
use rand_core::OsRng;

use crate::{
    channel::{self, ShareBroadcast, TransportKey},
    config::{ProtocolConfig, Session},
    curve,
    dispute::{self, Verdict},
    keyshare,
    ledger::{GpkjSubmission, Ledger, LedgerError, LocalLedger, ValidatorSet},
    math::Polynomial,
    participants::ParticipantIndex,
    protocol::{Phase, PhaseSchedule, ProtocolError},
    sign,
    validator::Validator,
};

fn idx(i: u32) -> ParticipantIndex {
    ParticipantIndex::new(i).unwrap()
}

fn session() -> Session {
    let mut config = ProtocolConfig::with_threshold(4, 1);
    config.schedule = PhaseSchedule {
        start_height: 1000,
        phase_length: 20,
    };
    Session::new(config).unwrap()
}

const SECRETS: [u64; 4] = [100, 101, 102, 103];

fn setup(session: &Session) -> (LocalLedger, Vec<Validator>) {
    let mut ledger = LocalLedger::new(session.clone());
    let mut validators: Vec<_> = SECRETS
        .iter()
        .map(|s| Validator::with_secret(session.clone(), &mut OsRng, &Scalar::from(*s)).unwrap())
        .collect();
    for (i, v) in validators.iter_mut().enumerate() {
        assert_eq!(v.register(&mut ledger).unwrap(), idx(i as u32 + 1));
    }
    (ledger, validators)
}

/// Run every phase after registration, with everybody behaving.
fn run_after_registration(
    ledger: &mut LocalLedger,
    validators: &mut [Validator],
) -> ValidatorSet {
    ledger.advance_to_phase(Phase::ShareDistribution);
    for v in validators.iter_mut() {
        v.distribute_shares(ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::Dispute);
    for v in validators.iter_mut() {
        assert!(v.dispute_shares(&mut OsRng, ledger).unwrap().is_empty());
    }

    ledger.advance_to_phase(Phase::KeyShareSubmission);
    for v in validators.iter_mut() {
        v.submit_key_share(&mut OsRng, ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::MpkSubmission);
    for v in validators.iter_mut() {
        v.submit_master_public_key(ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::GpkjSubmission);
    for v in validators.iter_mut() {
        v.submit_gpkj(ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::GpkjDispute);
    assert!(validators[0].accuse_gpkj(ledger).unwrap().is_empty());

    ledger.advance_to_phase(Phase::Complete);
    validators[0].complete(ledger).unwrap()
}

#[test]
fn test_e2e() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);
    let set = run_after_registration(&mut ledger, &mut validators);

    let expected_mpk = (curve::g2() * Scalar::from(406u64)).to_affine();
    assert_eq!(set.mpk, expected_mpk);
    assert_eq!(ledger.master_public_key(), expected_mpk);
    assert_eq!(set.gpkjs.len(), 4);
    assert!(ledger.malicious().is_empty());

    // The gpkjs interpolate to the same key.
    assert_eq!(
        keyshare::master_public_key_from_portions(session.params(), &set.gpkjs[2..]).unwrap(),
        expected_mpk
    );

    // Any two partial signatures give the group signature.
    let msg = session.initial_message();
    let partials: Vec<_> = validators
        .iter()
        .map(|v| (v.index().unwrap(), v.partial_sign(msg).unwrap()))
        .collect();
    for (p, partial) in &partials {
        let gpkj = set.gpkjs.iter().find(|(q, _)| q == p).unwrap().1;
        assert!(sign::verify(&session, msg, partial, &gpkj));
    }
    let a = sign::aggregate(&partials[..2], 1).unwrap();
    let b = sign::aggregate(&[partials[3], partials[1]], 1).unwrap();
    assert_eq!(a, b);
    assert!(sign::verify(&session, msg, &a, &set.mpk));
    assert_eq!(
        a,
        sign::sign(&session, msg, &Scalar::from(406u64)).unwrap()
    );
}

#[test]
fn test_invalid_master_public_key_is_rejected() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);

    ledger.advance_to_phase(Phase::ShareDistribution);
    for v in validators.iter_mut() {
        v.distribute_shares(&mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::KeyShareSubmission);
    for v in validators.iter_mut() {
        v.submit_key_share(&mut OsRng, &mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::MpkSubmission);

    let wrong = (curve::g2() * Scalar::from(405u64)).to_affine();
    assert_eq!(
        ledger.submit_master_public_key(idx(1), wrong),
        Err(LedgerError::InvalidMasterPublicKey)
    );
    assert_eq!(ledger.master_public_key(), G2Affine::identity());

    // An honest submission still goes through afterwards.
    validators[0].submit_master_public_key(&mut ledger).unwrap();
    assert_eq!(
        ledger.master_public_key(),
        (curve::g2() * Scalar::from(406u64)).to_affine()
    );
}

#[test]
fn test_corrupted_share_excludes_dealer() {
    let session = session();
    let mut ledger = LocalLedger::new(session.clone());

    let keys: Vec<_> = (0..4)
        .map(|_| TransportKey::generate(&mut OsRng).unwrap())
        .collect();
    let polys: Vec<_> = SECRETS
        .iter()
        .map(|s| Polynomial::extend_random(&mut OsRng, 1, &Scalar::from(*s)).unwrap())
        .collect();
    let mut validators: Vec<_> = keys
        .iter()
        .zip(polys.iter())
        .map(|(k, f)| Validator::with_key(session.clone(), k.clone(), f.clone()))
        .collect();
    for v in validators.iter_mut() {
        v.register(&mut ledger).unwrap();
    }

    // Participant 2 sends a bad share to participant 3.
    ledger.advance_to_phase(Phase::ShareDistribution);
    let peers = ledger.transport_keys();
    let mut bad = ShareBroadcast::new(&polys[1], &keys[1], idx(2), &peers);
    let position = channel::share_position(idx(2), idx(3)).unwrap();
    bad.encrypted_shares[position] += Scalar::one();
    ledger.distribute_shares(idx(2), bad).unwrap();
    for i in [0, 2, 3] {
        validators[i].distribute_shares(&mut ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::Dispute);
    assert!(validators[0].dispute_shares(&mut OsRng, &mut ledger).unwrap().is_empty());
    assert_eq!(
        validators[2].dispute_shares(&mut OsRng, &mut ledger).unwrap(),
        vec![Verdict::IssuerMalicious(idx(2))]
    );
    assert!(ledger.malicious().is_flagged(idx(2)));
    assert_eq!(ledger.qualified_dealers(), vec![idx(1), idx(3), idx(4)]);

    // The same accusation can't be settled twice.
    let broadcast = ledger.share_broadcast(idx(2)).unwrap().clone();
    let again = dispute::build_accusation(
        &mut OsRng,
        &session,
        idx(2),
        idx(3),
        &broadcast,
        &keys[2],
        &keys[1].public(),
    )
    .unwrap();
    assert_eq!(
        ledger.submit_dispute(again),
        Err(LedgerError::AlreadySubmitted {
            sender: idx(3),
            phase: Phase::Dispute
        })
    );

    ledger.advance_to_phase(Phase::KeyShareSubmission);
    let honest = [0, 2, 3];
    for i in honest {
        validators[i].submit_key_share(&mut OsRng, &mut ledger).unwrap();
    }
    assert!(matches!(
        validators[1].submit_key_share(&mut OsRng, &mut ledger),
        Err(ProtocolError::Ledger(LedgerError::Rejected(_)))
    ));

    ledger.advance_to_phase(Phase::MpkSubmission);
    assert!(ledger.accuse_missing(Phase::KeyShareSubmission).unwrap().is_empty());
    for i in honest {
        validators[i].submit_master_public_key(&mut ledger).unwrap();
    }
    let expected_mpk = (curve::g2() * Scalar::from(100u64 + 102 + 103)).to_affine();
    assert_eq!(ledger.master_public_key(), expected_mpk);

    ledger.advance_to_phase(Phase::GpkjSubmission);
    for i in honest {
        validators[i].submit_gpkj(&mut ledger).unwrap();
    }

    ledger.advance_to_phase(Phase::GpkjDispute);
    assert_eq!(ledger.accuse_missing(Phase::GpkjSubmission).unwrap(), vec![]);
    assert!(validators[3].accuse_gpkj(&mut ledger).unwrap().is_empty());

    ledger.advance_to_phase(Phase::Complete);
    let set = validators[0].complete(&mut ledger).unwrap();
    assert_eq!(set.mpk, expected_mpk);
    assert_eq!(
        set.gpkjs.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        vec![idx(1), idx(3), idx(4)]
    );

    let msg = b"after the dispute";
    let partials = [
        (idx(4), validators[3].partial_sign(msg).unwrap()),
        (idx(1), validators[0].partial_sign(msg).unwrap()),
    ];
    let signature = sign::aggregate(&partials, 1).unwrap();
    assert!(sign::verify(&session, msg, &signature, &set.mpk));
}

#[test]
fn test_inconsistent_gpkj_is_flagged() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);

    ledger.advance_to_phase(Phase::ShareDistribution);
    for v in validators.iter_mut() {
        v.distribute_shares(&mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::KeyShareSubmission);
    for v in validators.iter_mut() {
        v.submit_key_share(&mut OsRng, &mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::GpkjSubmission);
    for v in validators.iter_mut().take(3) {
        v.submit_gpkj(&mut ledger).unwrap();
    }

    // A gpkj with a valid signature, for the wrong secret.
    let x = Scalar::from(5u64);
    let forged = GpkjSubmission {
        gpkj: keyshare::group_public_key_portion(&x),
        signature: sign::sign(&session, session.initial_message(), &x).unwrap(),
    };
    ledger.submit_gpkj(idx(4), forged).unwrap();

    // Signatures which don't verify never make it in.
    let mut unsigned = forged;
    unsigned.signature = sign::sign(&session, b"something else", &x).unwrap();
    assert!(matches!(
        ledger.submit_gpkj(idx(4), unsigned),
        Err(LedgerError::Rejected(_))
    ));

    ledger.advance_to_phase(Phase::GpkjDispute);
    assert_eq!(validators[0].accuse_gpkj(&mut ledger).unwrap(), vec![idx(4)]);
    assert!(matches!(
        validators[0].accuse_gpkj(&mut ledger),
        Err(ProtocolError::AlreadySubmitted(Phase::GpkjDispute))
    ));
    assert!(validators[1].accuse_gpkj(&mut ledger).unwrap().is_empty());
}

#[test]
fn test_actions_respect_phases() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);

    assert!(matches!(
        validators[0].distribute_shares(&mut ledger),
        Err(ProtocolError::WrongPhase {
            requested: Phase::ShareDistribution,
            current: Phase::Registration
        })
    ));

    // Jumping ahead walks through the skipped phases.
    ledger.advance_to_phase(Phase::KeyShareSubmission);
    assert!(matches!(
        validators[0].distribute_shares(&mut ledger),
        Err(ProtocolError::WrongPhase {
            current: Phase::KeyShareSubmission,
            ..
        })
    ));
    assert_eq!(validators[0].phase(), Phase::KeyShareSubmission);

    ledger.advance_to(u64::MAX);
    assert!(matches!(
        validators[1].submit_gpkj(&mut ledger),
        Err(ProtocolError::SessionComplete)
    ));
}

#[test]
fn test_second_distribution_is_rejected() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);
    ledger.advance_to_phase(Phase::ShareDistribution);
    validators[0].distribute_shares(&mut ledger).unwrap();
    assert!(matches!(
        validators[0].distribute_shares(&mut ledger),
        Err(ProtocolError::AlreadySubmitted(Phase::ShareDistribution))
    ));
}

#[test]
fn test_missing_gpkj_can_only_be_accused_during_its_dispute() {
    let session = session();
    let (mut ledger, mut validators) = setup(&session);

    ledger.advance_to_phase(Phase::ShareDistribution);
    for v in validators.iter_mut() {
        v.distribute_shares(&mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::KeyShareSubmission);
    for v in validators.iter_mut() {
        v.submit_key_share(&mut OsRng, &mut ledger).unwrap();
    }
    ledger.advance_to_phase(Phase::MpkSubmission);
    validators[0].submit_master_public_key(&mut ledger).unwrap();
    ledger.advance_to_phase(Phase::GpkjSubmission);
    for v in validators.iter_mut().take(3) {
        v.submit_gpkj(&mut ledger).unwrap();
    }

    // Windows which have already passed stay closed.
    ledger.advance_to_phase(Phase::GpkjDispute);
    assert_eq!(
        ledger.accuse_missing(Phase::ShareDistribution),
        Err(LedgerError::WrongPhase {
            requested: Phase::ShareDistribution,
            current: Phase::GpkjDispute
        })
    );

    ledger.advance_to_phase(Phase::Complete);
    let set = ledger.successful_completion().unwrap();
    assert_eq!(
        ledger.accuse_missing(Phase::GpkjSubmission),
        Err(LedgerError::WrongPhase {
            requested: Phase::GpkjSubmission,
            current: Phase::Complete
        })
    );
    assert!(ledger.malicious().is_empty());
    assert_eq!(ledger.successful_completion().unwrap(), set);
    assert_eq!(set.gpkjs.len(), 3);
}
