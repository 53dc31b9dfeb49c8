//! Pairwise encryption of shares.
//!
//! Every participant registers a transport key `pk = sk * G1`. Two
//! participants share the Diffie-Hellman point `sk_a * pk_b = sk_b * pk_a`,
//! and a share sent from one to the other is masked additively with a scalar
//! derived from that point and the receiver's index. Revealing the shared
//! point later, together with a proof of its correctness, lets anybody
//! decrypt that single share and nothing else.
use std::fmt;

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Curve;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, Digest},
    curve,
    math::{random_scalar, GroupPolynomial, Polynomial},
    participants::ParticipantIndex,
    protocol::ProtocolError,
    serde::{deserialize_scalars, g1_to_bytes, serialize_scalars},
};

const MASK_LABEL: &[u8] = b"tdkg share mask";

/// A participant's long term key for share encryption.
#[derive(Clone)]
pub struct TransportKey {
    secret: Scalar,
    public: G1Affine,
}

impl fmt::Debug for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl TransportKey {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Result<Self, ProtocolError> {
        loop {
            let secret = random_scalar(&mut *rng)?;
            if let Some(key) = Self::from_secret(secret) {
                return Ok(key);
            }
        }
    }

    /// Build a key from a secret scalar, returning None for zero.
    pub fn from_secret(secret: Scalar) -> Option<Self> {
        if secret == Scalar::zero() {
            return None;
        }
        let public = (curve::g1() * secret).to_affine();
        Some(Self { secret, public })
    }

    pub fn public(&self) -> G1Affine {
        self.public
    }

    pub(crate) fn secret(&self) -> &Scalar {
        &self.secret
    }

    /// The Diffie-Hellman point shared with the owner of another key.
    pub fn shared_secret(&self, their_public: &G1Affine) -> G1Affine {
        shared_secret(&self.secret, their_public)
    }
}

pub fn shared_secret(secret: &Scalar, their_public: &G1Affine) -> G1Affine {
    (G1Projective::from(their_public) * secret).to_affine()
}

/// The mask hiding the share addressed to `receiver`.
pub fn share_mask(shared_secret: &G1Affine, receiver: ParticipantIndex) -> Scalar {
    crypto::hash_to_scalar(
        MASK_LABEL,
        &[&g1_to_bytes(shared_secret), &receiver.bytes()],
    )
}

pub fn encrypt_share(
    share: &Scalar,
    sender_secret: &Scalar,
    receiver_public: &G1Affine,
    receiver: ParticipantIndex,
) -> Scalar {
    share + share_mask(&shared_secret(sender_secret, receiver_public), receiver)
}

pub fn decrypt_share(
    encrypted: &Scalar,
    receiver_secret: &Scalar,
    sender_public: &G1Affine,
    receiver: ParticipantIndex,
) -> Scalar {
    decrypt_with_shared_secret(encrypted, &shared_secret(receiver_secret, sender_public), receiver)
}

/// Decrypt a share knowing only the shared point, as a dispute does.
pub fn decrypt_with_shared_secret(
    encrypted: &Scalar,
    shared_secret: &G1Affine,
    receiver: ParticipantIndex,
) -> Scalar {
    encrypted - share_mask(shared_secret, receiver)
}

/// The position of the share for `receiver` in the array published by `issuer`.
///
/// The array skips the issuer itself, so it has `n - 1` entries in index
/// order. Returns None when both are the same participant.
pub fn share_position(issuer: ParticipantIndex, receiver: ParticipantIndex) -> Option<usize> {
    if issuer == receiver {
        return None;
    }
    let mut position = receiver.get() as usize - 1;
    if receiver > issuer {
        position -= 1;
    }
    Some(position)
}

/// What a dealer publishes during share distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareBroadcast {
    #[serde(
        serialize_with = "serialize_scalars",
        deserialize_with = "deserialize_scalars"
    )]
    pub encrypted_shares: Vec<Scalar>,
    pub commitments: GroupPolynomial,
}

impl ShareBroadcast {
    /// Encrypt a share of `polynomial` for every other participant.
    ///
    /// `peers` holds the transport key of every registered participant, the
    /// sender included, in index order.
    pub fn new(
        polynomial: &Polynomial,
        key: &TransportKey,
        sender: ParticipantIndex,
        peers: &[(ParticipantIndex, G1Affine)],
    ) -> Self {
        let encrypted_shares = peers
            .iter()
            .filter(|(j, _)| *j != sender)
            .map(|(j, pk)| encrypt_share(&polynomial.evaluate(*j), key.secret(), pk, *j))
            .collect();
        Self {
            encrypted_shares,
            commitments: polynomial.commit(),
        }
    }

    /// The digest binding this broadcast, as recorded by the ledger.
    pub fn digest(&self) -> Digest {
        crypto::digest(self)
    }

    /// The encrypted share addressed to `receiver`, if present.
    pub fn share_for(
        &self,
        issuer: ParticipantIndex,
        receiver: ParticipantIndex,
    ) -> Option<&Scalar> {
        share_position(issuer, receiver).and_then(|i| self.encrypted_shares.get(i))
    }
}

/// Pick out the shares addressed to one participant.
///
/// `holder_public` identifies the participant by its transport key, and
/// `all_publics` lists every participant's transport key in index order.
/// Each row is a peer's full encrypted share array; the holder's own row
/// is skipped. Every other row must have exactly `n - 1` entries.
pub fn condense(
    holder_public: &G1Affine,
    rows: &[(ParticipantIndex, &[Scalar])],
    all_publics: &[G1Affine],
) -> Result<Vec<(ParticipantIndex, Scalar)>, ProtocolError> {
    let holder = all_publics
        .iter()
        .position(|pk| pk == holder_public)
        .and_then(|i| u32::try_from(i + 1).ok())
        .and_then(ParticipantIndex::new)
        .ok_or(ProtocolError::MissingData("holder transport key"))?;
    let expected = all_publics.len().saturating_sub(1);

    let mut out = Vec::with_capacity(rows.len());
    for (issuer, row) in rows {
        if *issuer == holder {
            continue;
        }
        if row.len() != expected {
            return Err(ProtocolError::MalformedShareSet {
                expected,
                found: row.len(),
            });
        }
        let position = share_position(*issuer, holder)
            .ok_or(ProtocolError::MissingData("share position"))?;
        out.push((*issuer, row[position]));
    }
    Ok(out)
}
