use std::{fmt, ops::AddAssign};

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Group;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    curve,
    participants::{ParticipantIndex, ParticipantList},
    protocol::ProtocolError,
    serde::SerializableG1,
};

/// Sample a uniform scalar, surfacing failures of the randomness source.
pub(crate) fn random_scalar(rng: &mut impl CryptoRngCore) -> Result<Scalar, ProtocolError> {
    let mut wide = [0u8; 64];
    rng.try_fill_bytes(&mut wide)
        .map_err(|e| ProtocolError::InsufficientEntropy(e.to_string()))?;
    Ok(Scalar::from_bytes_wide(&wide))
}

/// Represents a polynomial with coefficients in the scalar field of the curve.
///
/// This is the private sharing polynomial of a dealer, and never leaves the
/// process that generated it.
#[derive(Clone)]
pub struct Polynomial {
    /// The coefficients of our polynomial, from 0..size-1.
    coefficients: Vec<Scalar>,
}

impl fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &self.degree())
            .finish_non_exhaustive()
    }
}

impl Polynomial {
    /// Generate a random polynomial of degree `threshold`.
    pub fn generate(rng: &mut impl CryptoRngCore, threshold: u32) -> Result<Self, ProtocolError> {
        let coefficients = (0..=threshold)
            .map(|_| random_scalar(&mut *rng))
            .collect::<Result<_, _>>()?;
        Ok(Self { coefficients })
    }

    /// Extend a constant to a random polynomial of degree `threshold`.
    ///
    /// This is useful if you want the polynomial to have a certain secret, but
    /// otherwise be random.
    pub fn extend_random(
        rng: &mut impl CryptoRngCore,
        threshold: u32,
        constant: &Scalar,
    ) -> Result<Self, ProtocolError> {
        let mut coefficients = Vec::with_capacity(threshold as usize + 1);
        coefficients.push(*constant);
        for _ in 0..threshold {
            coefficients.push(random_scalar(&mut *rng)?);
        }
        Ok(Self { coefficients })
    }

    /// Build a polynomial from its coefficients, constant term first.
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Self {
        Self { coefficients }
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// The shared secret, i.e. the constant term.
    pub fn secret(&self) -> Scalar {
        self.coefficients.first().copied().unwrap_or(Scalar::zero())
    }

    /// Commit to every coefficient in G1.
    pub fn commit(&self) -> GroupPolynomial {
        let g = curve::g1();
        GroupPolynomial {
            coefficients: self.coefficients.iter().map(|c| g * c).collect(),
        }
    }

    /// The share of a participant.
    pub fn evaluate(&self, index: ParticipantIndex) -> Scalar {
        self.evaluate_at(&index.scalar())
    }

    /// Evaluate at an arbitrary point, zero included.
    pub(crate) fn evaluate_at(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::zero(), |acc, c| acc * x + c)
    }
}

/// A polynomial with coefficients in G1.
///
/// These are the public commitments `C_k = a_k * G1` to a dealer's polynomial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPolynomial {
    coefficients: Vec<G1Projective>,
}

impl GroupPolynomial {
    pub fn from_coefficients(coefficients: Vec<G1Projective>) -> Self {
        Self { coefficients }
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &G1Projective> {
        self.coefficients.iter()
    }

    /// The commitment to the secret.
    pub fn evaluate_zero(&self) -> G1Projective {
        self.coefficients
            .first()
            .copied()
            .unwrap_or(G1Projective::identity())
    }

    /// Evaluate in the exponent, giving the commitment to a participant's share.
    pub fn evaluate(&self, index: ParticipantIndex) -> G1Projective {
        let x = index.scalar();
        self.coefficients
            .iter()
            .rev()
            .fold(G1Projective::identity(), |acc, c| acc * x + c)
    }
}

impl AddAssign<&GroupPolynomial> for GroupPolynomial {
    fn add_assign(&mut self, rhs: &GroupPolynomial) {
        if self.coefficients.len() < rhs.coefficients.len() {
            self.coefficients
                .resize(rhs.coefficients.len(), G1Projective::identity());
        }
        for (a, b) in self.coefficients.iter_mut().zip(rhs.coefficients.iter()) {
            *a += b;
        }
    }
}

impl Serialize for GroupPolynomial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut affine = vec![G1Affine::identity(); self.coefficients.len()];
        G1Projective::batch_normalize(&self.coefficients, &mut affine);
        serializer.collect_seq(affine.into_iter().map(SerializableG1))
    }
}

impl<'de> Deserialize<'de> for GroupPolynomial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<SerializableG1> = Deserialize::deserialize(deserializer)?;
        Ok(Self {
            coefficients: raw.into_iter().map(|p| G1Projective::from(p.0)).collect(),
        })
    }
}

/// Check a share against a dealer's commitments.
///
/// This is the Feldman check `share * G1 == sum_k C_k * index^k`. An empty
/// commitment never verifies.
#[must_use]
pub fn verify_share(share: &Scalar, index: ParticipantIndex, commitment: &GroupPolynomial) -> bool {
    if commitment.is_empty() {
        return false;
    }
    curve::g1() * share == commitment.evaluate(index)
}

/// Interpolate values at zero, using their Lagrange coefficients.
///
/// Works for anything a scalar can multiply: scalars, G1 points, or G2 points.
pub fn interpolate_at_zero<G>(points: &[(ParticipantIndex, G)]) -> Result<G, ProtocolError>
where
    G: Group<Scalar = Scalar>,
{
    let indices: Vec<_> = points.iter().map(|(i, _)| *i).collect();
    let list = ParticipantList::new(&indices)?;
    Ok(points
        .iter()
        .map(|(i, p)| *p * list.lagrange(*i))
        .fold(G::identity(), |acc, x| acc + x))
}

/// Interpolate scalars at zero.
pub fn interpolate_scalars_at_zero(
    points: &[(ParticipantIndex, Scalar)],
) -> Result<Scalar, ProtocolError> {
    let indices: Vec<_> = points.iter().map(|(i, _)| *i).collect();
    let list = ParticipantList::new(&indices)?;
    Ok(points.iter().map(|(i, s)| s * list.lagrange(*i)).sum())
}
