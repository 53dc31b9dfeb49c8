//! The handful of curve operations the protocol needs on top of `bls12_381`.
//!
//! Secrets live in the scalar field, commitments and signatures in G1, and
//! public keys in G2. Everything else is a pairing check.
use bls12_381::{
    hash_to_curve::{ExpandMsgXmd, HashToCurve},
    multi_miller_loop, G1Affine, G1Projective, G2Affine, G2Prepared, G2Projective,
};
use group::{Curve, Group};

/// The standard generator of G1.
pub fn g1() -> G1Projective {
    G1Projective::generator()
}

/// The standard generator of G2.
pub fn g2() -> G2Projective {
    G2Projective::generator()
}

/// The negation of the G2 generator, used on the left of every pairing check.
pub fn neg_g2() -> G2Affine {
    (-G2Projective::generator()).to_affine()
}

/// Hash a message onto G1, with a domain separation tag.
pub fn hash_to_g1(msg: &[u8], dst: &[u8]) -> G1Projective {
    <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(msg, dst)
}

/// Check that a product of pairings is the identity of the target group.
///
/// An empty product is trivially the identity.
#[must_use]
pub fn pairing_check(terms: &[(G1Affine, G2Affine)]) -> bool {
    let prepared: Vec<(G1Affine, G2Prepared)> = terms
        .iter()
        .map(|(p, q)| (*p, G2Prepared::from(*q)))
        .collect();
    let refs: Vec<(&G1Affine, &G2Prepared)> = prepared.iter().map(|(p, q)| (p, q)).collect();
    bool::from(multi_miller_loop(&refs).final_exponentiation().is_identity())
}

/// Check whether a point has a publicly known discrete logarithm in `{-1, 0, 1}`.
///
/// Signing such a point would hand out the secret key, or nothing at all.
pub fn is_dangerous(point: &G1Projective) -> bool {
    let g = g1();
    bool::from(point.is_identity()) || *point == g || *point == -g
}
