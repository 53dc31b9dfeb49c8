use bls12_381::{G1Projective, Scalar};
use ff::Field;
use group::Curve;
use magikitten::Transcript;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::serde::{
    deserialize_scalar, g1_to_bytes, scalar_from_bytes, scalar_to_bytes, serialize_scalar,
    EncodingError, SCALAR_LEN,
};

/// The label we use for hashing the statement.
const STATEMENT_LABEL: &[u8] = b"dlogeq proof statement";
/// The label we use for hashing the first prover message.
const COMMITMENT_LABEL: &[u8] = b"dlogeq proof commitment";
/// The label we use for generating the challenge.
const CHALLENGE_LABEL: &[u8] = b"dlogeq proof challenge";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("discrete log equality proof did not verify")]
    InvalidProof,
}

/// The public statement for this proof.
///
/// This statement claims knowledge of a scalar `x` such that
/// `public0 = x * base0` and `public1 = x * base1`.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub base0: &'a G1Projective,
    pub public0: &'a G1Projective,
    pub base1: &'a G1Projective,
    pub public1: &'a G1Projective,
}

impl<'a> Statement<'a> {
    /// Calculate the homomorphism we want to prove things about.
    fn phi(&self, x: &Scalar) -> (G1Projective, G1Projective) {
        (*self.base0 * x, *self.base1 * x)
    }

    fn encode(&self) -> Vec<u8> {
        encode_points(&[*self.base0, *self.public0, *self.base1, *self.public1])
    }
}

fn encode_points(points: &[G1Projective]) -> Vec<u8> {
    points
        .iter()
        .flat_map(|p| g1_to_bytes(&p.to_affine()))
        .collect()
}

/// The private witness for this proof.
///
/// This holds the scalar the prover needs to know.
#[derive(Clone, Copy)]
pub struct Witness<'a> {
    pub x: &'a Scalar,
}

/// Represents a proof of the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    e: Scalar,
    #[serde(
        serialize_with = "serialize_scalar",
        deserialize_with = "deserialize_scalar"
    )]
    s: Scalar,
}

impl Proof {
    pub fn e(&self) -> Scalar {
        self.e
    }

    pub fn s(&self) -> Scalar {
        self.s
    }

    /// The wire encoding, `e || s`.
    pub fn to_bytes(&self) -> [u8; 2 * SCALAR_LEN] {
        let mut out = [0u8; 2 * SCALAR_LEN];
        out[..SCALAR_LEN].copy_from_slice(&scalar_to_bytes(&self.e));
        out[SCALAR_LEN..].copy_from_slice(&scalar_to_bytes(&self.s));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != 2 * SCALAR_LEN {
            return Err(EncodingError::InvalidLength {
                expected: 2 * SCALAR_LEN,
                found: bytes.len(),
            });
        }
        Ok(Self {
            e: scalar_from_bytes(&bytes[..SCALAR_LEN])?,
            s: scalar_from_bytes(&bytes[SCALAR_LEN..])?,
        })
    }

    #[cfg(test)]
    pub(crate) fn tweak_response(&mut self) {
        self.s += Scalar::one();
    }
}

/// Prove that a witness satisfies a given statement.
///
/// We need some randomness for the proof, and also a transcript, which is
/// used for the Fiat-Shamir transform.
pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Proof {
    transcript.message(STATEMENT_LABEL, &statement.encode());

    let k = Scalar::random(&mut *rng);
    let big_k = statement.phi(&k);

    transcript.message(COMMITMENT_LABEL, &encode_points(&[big_k.0, big_k.1]));

    let e = Scalar::random(&mut transcript.challenge(CHALLENGE_LABEL));

    let s = k - e * witness.x;
    Proof { e, s }
}

/// Verify a proof attesting to the validity of some statement.
///
/// We use a transcript in order to verify the Fiat-Shamir transformation.
/// Statements with an identity base are rejected outright.
pub fn verify(
    transcript: &mut Transcript,
    statement: Statement<'_>,
    proof: &Proof,
) -> Result<(), ProofError> {
    if bool::from(statement.base0.is_identity() | statement.base1.is_identity()) {
        return Err(ProofError::InvalidProof);
    }

    transcript.message(STATEMENT_LABEL, &statement.encode());

    let (phi0, phi1) = statement.phi(&proof.s);
    let big_k0 = phi0 + *statement.public0 * proof.e;
    let big_k1 = phi1 + *statement.public1 * proof.e;

    transcript.message(COMMITMENT_LABEL, &encode_points(&[big_k0, big_k1]));

    let e = Scalar::random(&mut transcript.challenge(CHALLENGE_LABEL));

    if bool::from(e.ct_eq(&proof.e)) {
        Ok(())
    } else {
        Err(ProofError::InvalidProof)
    }
}
