//! Aggregating keys once shares are settled.
//!
//! Each qualified dealer publishes a key share `(s * H1, s * G2)` for its
//! secret `s`, along with a proof tying `s * H1` to its public commitment
//! `s * G1`. Summing the G2 halves gives the master public key. Separately,
//! each participant sums the shares it received into its group secret share
//! `gskj`, whose public counterpart `gpkj` lives in G2.
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use group::Curve;
use magikitten::Transcript;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::Session,
    curve,
    math::interpolate_at_zero,
    participants::{MaliciousSet, ParticipantIndex, ParticipantMap, ThresholdParams},
    proofs::dlogeq::{self, Proof},
    protocol::ProtocolError,
    serde::{deserialize_g1, deserialize_g2, serialize_g1, serialize_g2},
};

const KEY_SHARE_LABEL: &[u8] = b"key share";

/// A dealer's secret, lifted into both groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// `s * H1`
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub g1: G1Affine,
    /// `s * G2`
    #[serde(serialize_with = "serialize_g2", deserialize_with = "deserialize_g2")]
    pub g2: G2Affine,
    /// Proves that `g1` and the dealer's commitment to `s` share a discrete log.
    pub proof: Proof,
}

fn key_share_transcript(session: &Session, dealer: ParticipantIndex) -> Transcript {
    session.transcript().forked(KEY_SHARE_LABEL, &dealer.bytes())
}

/// Lift our secret into a key share.
///
/// `commitment` is our own published commitment to `secret`, i.e. `secret * G1`.
/// The result is checked before being returned.
pub fn generate_key_share(
    rng: &mut impl CryptoRngCore,
    session: &Session,
    dealer: ParticipantIndex,
    secret: &Scalar,
    commitment: &G1Projective,
) -> Result<KeyShare, ProtocolError> {
    let h1 = session.h1();
    let g1_part = h1 * secret;
    let g = curve::g1();
    let proof = dlogeq::prove(
        rng,
        &mut key_share_transcript(session, dealer),
        dlogeq::Statement {
            base0: &h1,
            public0: &g1_part,
            base1: &g,
            public1: commitment,
        },
        dlogeq::Witness { x: secret },
    );
    let share = KeyShare {
        g1: g1_part.to_affine(),
        g2: (curve::g2() * secret).to_affine(),
        proof,
    };
    verify_key_share(session, dealer, &share, commitment)?;
    Ok(share)
}

/// Check a dealer's key share against its commitment to its secret.
///
/// This checks the proof, and then that both halves hold the same secret,
/// via `e(g1, -G2) * e(H1, g2) = 1`.
pub fn verify_key_share(
    session: &Session,
    dealer: ParticipantIndex,
    share: &KeyShare,
    commitment: &G1Projective,
) -> Result<(), ProtocolError> {
    let h1 = session.h1();
    let g1_part = G1Projective::from(share.g1);
    let g = curve::g1();
    dlogeq::verify(
        &mut key_share_transcript(session, dealer),
        dlogeq::Statement {
            base0: &h1,
            public0: &g1_part,
            base1: &g,
            public1: commitment,
        },
        &share.proof,
    )?;
    if !curve::pairing_check(&[(share.g1, curve::neg_g2()), (h1.to_affine(), share.g2)]) {
        return Err(ProtocolError::InvalidKeyShare);
    }
    Ok(())
}

/// Sum the shares we received from honest dealers, our own evaluation included.
pub fn group_secret_share(
    own_evaluation: &Scalar,
    peer_shares: &[(ParticipantIndex, Scalar)],
    malicious: &MaliciousSet,
) -> Scalar {
    peer_shares
        .iter()
        .filter(|(p, _)| !malicious.is_flagged(*p))
        .fold(*own_evaluation, |acc, (_, s)| acc + s)
}

/// The public counterpart of a group secret share.
pub fn group_public_key_portion(gskj: &Scalar) -> G2Affine {
    (curve::g2() * gskj).to_affine()
}

/// Check a master public key against the sum of the key shares' G1 halves.
#[must_use]
pub fn check_master_public_key(session: &Session, g1_sum: &G1Affine, mpk: &G2Affine) -> bool {
    curve::pairing_check(&[(*g1_sum, curve::neg_g2()), (session.h1().to_affine(), *mpk)])
}

/// Sum the key shares of every honest dealer into the master public key.
pub fn master_public_key(
    session: &Session,
    key_shares: &ParticipantMap<KeyShare>,
    malicious: &MaliciousSet,
) -> Result<G2Affine, ProtocolError> {
    let mut g1_sum = G1Projective::identity();
    let mut mpk = G2Projective::identity();
    let mut count = 0usize;
    for (dealer, share) in key_shares.iter() {
        if malicious.is_flagged(dealer) {
            continue;
        }
        g1_sum += share.g1;
        mpk += share.g2;
        count += 1;
    }
    if count == 0 {
        return Err(ProtocolError::MissingData("key shares"));
    }
    let mpk = mpk.to_affine();
    if !check_master_public_key(session, &g1_sum.to_affine(), &mpk) {
        return Err(ProtocolError::InvalidMasterPublicKey);
    }
    debug!(dealers = count, "derived master public key");
    Ok(mpk)
}

/// Recover the master public key from enough group public key portions.
///
/// Every qualified participant's `gpkj` is a point on the same polynomial in
/// G2, whose value at zero is the master public key.
pub fn master_public_key_from_portions(
    params: ThresholdParams,
    portions: &[(ParticipantIndex, G2Affine)],
) -> Result<G2Affine, ProtocolError> {
    if portions.len() < params.required() {
        return Err(ProtocolError::InsufficientShares {
            needed: params.required(),
            found: portions.len(),
        });
    }
    let points: Vec<_> = portions
        .iter()
        .map(|(p, q)| (*p, G2Projective::from(q)))
        .collect();
    Ok(interpolate_at_zero(&points)?.to_affine())
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::{config::ProtocolConfig, math::Polynomial};

    fn idx(i: u32) -> ParticipantIndex {
        ParticipantIndex::new(i).unwrap()
    }

    fn session() -> Session {
        Session::new(ProtocolConfig::with_threshold(4, 1)).unwrap()
    }

    #[test]
    fn test_key_share_verifies() {
        let session = session();
        let secret = Scalar::from(100u64);
        let commitment = curve::g1() * secret;
        let share = generate_key_share(&mut OsRng, &session, idx(1), &secret, &commitment).unwrap();
        assert!(verify_key_share(&session, idx(1), &share, &commitment).is_ok());
        // Bound to the dealer.
        assert!(verify_key_share(&session, idx(2), &share, &commitment).is_err());
    }

    #[test]
    fn test_mismatched_key_share_fails() {
        let session = session();
        let secret = Scalar::from(100u64);
        let commitment = curve::g1() * secret;
        let mut share =
            generate_key_share(&mut OsRng, &session, idx(1), &secret, &commitment).unwrap();
        share.g2 = (curve::g2() * Scalar::from(101u64)).to_affine();
        assert!(matches!(
            verify_key_share(&session, idx(1), &share, &commitment),
            Err(ProtocolError::InvalidKeyShare)
        ));
        let other = curve::g1() * Scalar::from(7u64);
        assert!(matches!(
            generate_key_share(&mut OsRng, &session, idx(1), &secret, &other),
            Err(ProtocolError::Proof(_))
        ));
    }

    #[test]
    fn test_master_public_key_matches_portions() {
        let session = session();
        let polys: Vec<_> = (100u64..104)
            .map(|s| Polynomial::extend_random(&mut OsRng, 1, &Scalar::from(s)).unwrap())
            .collect();
        let mut key_shares = ParticipantMap::new();
        for (i, f) in polys.iter().enumerate() {
            let dealer = idx(i as u32 + 1);
            let commitment = f.commit().evaluate_zero();
            let share =
                generate_key_share(&mut OsRng, &session, dealer, &f.secret(), &commitment).unwrap();
            key_shares.put(dealer, share);
        }
        let mpk = master_public_key(&session, &key_shares, &MaliciousSet::new()).unwrap();
        assert_eq!(mpk, (curve::g2() * Scalar::from(406u64)).to_affine());

        let portions: Vec<_> = session
            .params()
            .indices()
            .map(|j| {
                let own = polys[j.get() as usize - 1].evaluate(j);
                let peers: Vec<_> = polys
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (idx(i as u32 + 1), f.evaluate(j)))
                    .filter(|(p, _)| *p != j)
                    .collect();
                let gskj = group_secret_share(&own, &peers, &MaliciousSet::new());
                (j, group_public_key_portion(&gskj))
            })
            .collect();
        assert_eq!(
            master_public_key_from_portions(session.params(), &portions[1..3]).unwrap(),
            mpk
        );
        assert_eq!(
            master_public_key_from_portions(session.params(), &portions).unwrap(),
            mpk
        );
        assert!(matches!(
            master_public_key_from_portions(session.params(), &portions[..1]),
            Err(ProtocolError::InsufficientShares { needed: 2, found: 1 })
        ));
    }

    #[test]
    fn test_malicious_dealers_are_excluded() {
        let session = session();
        let mut key_shares = ParticipantMap::new();
        for (i, s) in [5u64, 6, 7].into_iter().enumerate() {
            let secret = Scalar::from(s);
            let dealer = idx(i as u32 + 1);
            let share =
                generate_key_share(&mut OsRng, &session, dealer, &secret, &(curve::g1() * secret))
                    .unwrap();
            key_shares.put(dealer, share);
        }
        let mut malicious = MaliciousSet::new();
        malicious.flag(idx(2));
        let mpk = master_public_key(&session, &key_shares, &malicious).unwrap();
        assert_eq!(mpk, (curve::g2() * Scalar::from(12u64)).to_affine());

        let gskj = group_secret_share(
            &Scalar::from(1u64),
            &[(idx(2), Scalar::from(10u64)), (idx(3), Scalar::from(100u64))],
            &malicious,
        );
        assert_eq!(gskj, Scalar::from(101u64));
    }

    #[test]
    fn test_master_public_key_check() {
        let session = session();
        let secret = Scalar::from(9u64);
        let g1_sum = (session.h1() * secret).to_affine();
        assert!(check_master_public_key(&session, &g1_sum, &(curve::g2() * secret).to_affine()));
        assert!(!check_master_public_key(&session, &g1_sum, &G2Affine::identity()));
    }
}
