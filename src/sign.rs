//! Threshold BLS signatures.
//!
//! A signature on `m` under secret `x` is `x * H(m)` in G1, checked against
//! `x * G2`. Participants sign with their group secret share, and any `t + 1`
//! partial signatures interpolate to the unique signature under the master
//! secret, which nobody knows.
use bls12_381::{G1Affine, G1Projective, G2Affine, Scalar};
use group::Curve;
use tracing::debug;

use crate::{
    config::Session, curve, math::interpolate_at_zero, participants::ParticipantIndex,
    protocol::ProtocolError,
};

/// Sign a message with a secret key, or a share of one.
pub fn sign(session: &Session, msg: &[u8], secret: &Scalar) -> Result<G1Affine, ProtocolError> {
    let point = session.hash_to_g1(msg)?;
    Ok((point * secret).to_affine())
}

/// Check a signature under a public key, or a group public key portion.
///
/// This is `e(sig, -G2) * e(H(m), pk) = 1`.
#[must_use]
pub fn verify(session: &Session, msg: &[u8], signature: &G1Affine, public: &G2Affine) -> bool {
    let Ok(point) = session.hash_to_g1(msg) else {
        return false;
    };
    curve::pairing_check(&[
        (*signature, curve::neg_g2()),
        (point.to_affine(), *public),
    ])
}

/// Combine partial signatures into the group signature.
///
/// At least `threshold + 1` partials are needed. Every supplied partial is
/// used, so the caller should only pass partials it has verified; any valid
/// subset of the right size yields the same signature.
pub fn aggregate(
    partials: &[(ParticipantIndex, G1Affine)],
    threshold: u32,
) -> Result<G1Affine, ProtocolError> {
    let needed = threshold as usize + 1;
    if partials.len() < needed {
        return Err(ProtocolError::InsufficientShares {
            needed,
            found: partials.len(),
        });
    }
    let points: Vec<_> = partials
        .iter()
        .map(|(p, sig)| (*p, G1Projective::from(sig)))
        .collect();
    let signature = interpolate_at_zero(&points)?;
    debug!(partials = partials.len(), "aggregated group signature");
    Ok(signature.to_affine())
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
    fn test_signature_verifies() {
        let session = session();
        let x = Scalar::from(77u64);
        let pk = (curve::g2() * x).to_affine();
        let sig = sign(&session, b"hello", &x).unwrap();
        assert!(verify(&session, b"hello", &sig, &pk));
        assert!(!verify(&session, b"goodbye", &sig, &pk));
        let other = (curve::g2() * Scalar::from(78u64)).to_affine();
        assert!(!verify(&session, b"hello", &sig, &other));
    }

    #[test]
    fn test_aggregate_is_subset_and_order_independent() {
        let session = session();
        let f = Polynomial::generate(&mut OsRng, 1).unwrap();
        let msg = session.initial_message().to_vec();
        let partial = |i: u32| (idx(i), sign(&session, &msg, &f.evaluate(idx(i))).unwrap());

        let expected = sign(&session, &msg, &f.secret()).unwrap();
        let a = aggregate(&[partial(1), partial(2), partial(3)], 1).unwrap();
        let b = aggregate(&[partial(1), partial(2), partial(3), partial(4)], 1).unwrap();
        let c = aggregate(&[partial(3), partial(2), partial(1), partial(4)], 1).unwrap();
        let d = aggregate(&[partial(4), partial(2)], 1).unwrap();
        assert_eq!(a, expected);
        assert_eq!(b, expected);
        assert_eq!(c, expected);
        assert_eq!(d, expected);

        let mpk = (curve::g2() * f.secret()).to_affine();
        assert!(verify(&session, &msg, &a, &mpk));
    }

    #[test]
    fn test_aggregate_rejects_bad_input() {
        let session = session();
        let sig = sign(&session, b"m", &Scalar::from(3u64)).unwrap();
        assert!(matches!(
            aggregate(&[(idx(1), sig)], 1),
            Err(ProtocolError::InsufficientShares { needed: 2, found: 1 })
        ));
        assert!(matches!(
            aggregate(&[(idx(1), sig), (idx(1), sig)], 1),
            Err(ProtocolError::DuplicateIndex(_))
        ));
    }
}
