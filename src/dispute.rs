//! Assigning blame.
//!
//! A participant who receives a share failing the Feldman check accuses the
//! dealer by revealing the Diffie-Hellman point they share, with a proof that
//! it's the right one. Anybody can then decrypt that one share and check it.
//! Every accusation blames exactly one party: either the dealer sent a bad
//! share, or the accuser lied.
//!
//! Group public key portions get the same treatment later on, except that no
//! accusation is needed: the expected portion of each participant follows
//! from the public commitments alone.
use std::collections::BTreeSet;

use bls12_381::{G1Affine, G1Projective, G2Affine};
use group::Curve;
use magikitten::Transcript;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    channel::{self, ShareBroadcast, TransportKey},
    config::Session,
    crypto::Digest,
    curve,
    math::{verify_share, GroupPolynomial},
    participants::ParticipantIndex,
    proofs::dlogeq::{self, Proof},
    protocol::ProtocolError,
    serde::{deserialize_g1, serialize_g1},
};

const DISPUTE_LABEL: &[u8] = b"share dispute";

/// A claim that `issuer` sent `disputer` an invalid share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accusation {
    pub issuer: ParticipantIndex,
    pub disputer: ParticipantIndex,
    /// The issuer's broadcast, exactly as published.
    pub broadcast: ShareBroadcast,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub shared_secret: G1Affine,
    pub proof: Proof,
}

/// Why a disputer was found at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blame {
    /// The accusation doesn't match what the issuer published.
    DigestMismatch,
    /// The revealed shared secret isn't proven correct.
    InvalidProof,
    /// The disputed share verifies after all.
    ShareValid,
    /// The accusation is structurally broken.
    Malformed,
}

/// The outcome of checking an accusation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    IssuerMalicious(ParticipantIndex),
    DisputerMalicious {
        disputer: ParticipantIndex,
        reason: Blame,
    },
}

impl Verdict {
    /// The participant this verdict flags.
    pub fn malicious(&self) -> ParticipantIndex {
        match self {
            Verdict::IssuerMalicious(p) => *p,
            Verdict::DisputerMalicious { disputer, .. } => *disputer,
        }
    }
}

fn dispute_transcript(
    session: &Session,
    issuer: ParticipantIndex,
    disputer: ParticipantIndex,
) -> Transcript {
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&issuer.bytes());
    data[4..].copy_from_slice(&disputer.bytes());
    session.transcript().forked(DISPUTE_LABEL, &data)
}

/// Accuse `issuer` of sending us a bad share.
///
/// Fails with [`ProtocolError::ShareIsValid`] if the share actually verifies.
pub fn build_accusation(
    rng: &mut impl CryptoRngCore,
    session: &Session,
    issuer: ParticipantIndex,
    disputer: ParticipantIndex,
    broadcast: &ShareBroadcast,
    key: &TransportKey,
    issuer_public: &G1Affine,
) -> Result<Accusation, ProtocolError> {
    let encrypted = broadcast
        .share_for(issuer, disputer)
        .ok_or(ProtocolError::MalformedShareSet {
            expected: session.params().n() as usize - 1,
            found: broadcast.encrypted_shares.len(),
        })?;
    let share = channel::decrypt_share(encrypted, key.secret(), issuer_public, disputer);
    if verify_share(&share, disputer, &broadcast.commitments) {
        return Err(ProtocolError::ShareIsValid(issuer));
    }
    Ok(assemble_accusation(
        rng,
        session,
        issuer,
        disputer,
        broadcast,
        key,
        issuer_public,
    ))
}

/// Build an accusation without checking that it's warranted.
pub(crate) fn assemble_accusation(
    rng: &mut impl CryptoRngCore,
    session: &Session,
    issuer: ParticipantIndex,
    disputer: ParticipantIndex,
    broadcast: &ShareBroadcast,
    key: &TransportKey,
    issuer_public: &G1Affine,
) -> Accusation {
    let shared_secret = key.shared_secret(issuer_public);
    let g = curve::g1();
    let disputer_public = G1Projective::from(key.public());
    let issuer_public = G1Projective::from(issuer_public);
    let shared = G1Projective::from(shared_secret);
    let proof = dlogeq::prove(
        rng,
        &mut dispute_transcript(session, issuer, disputer),
        dlogeq::Statement {
            base0: &g,
            public0: &disputer_public,
            base1: &issuer_public,
            public1: &shared,
        },
        dlogeq::Witness { x: key.secret() },
    );
    Accusation {
        issuer,
        disputer,
        broadcast: broadcast.clone(),
        shared_secret,
        proof,
    }
}

/// Decide who is at fault in an accusation.
///
/// The checks run in order: structure, then the digest recorded when the
/// issuer published, then the proof of the shared secret, and finally the
/// share itself.
pub fn check_accusation(
    session: &Session,
    accusation: &Accusation,
    recorded: &Digest,
    issuer_public: &G1Affine,
    disputer_public: &G1Affine,
) -> Verdict {
    let Accusation {
        issuer,
        disputer,
        broadcast,
        shared_secret,
        proof,
    } = accusation;
    let (issuer, disputer) = (*issuer, *disputer);
    let blame = |reason| {
        warn!(%issuer, %disputer, ?reason, "accusation rejected");
        Verdict::DisputerMalicious { disputer, reason }
    };

    let params = session.params();
    if issuer == disputer || !params.contains(issuer) || !params.contains(disputer) {
        return blame(Blame::Malformed);
    }
    let Some(encrypted) = broadcast.share_for(issuer, disputer) else {
        return blame(Blame::Malformed);
    };

    if broadcast.digest() != *recorded {
        return blame(Blame::DigestMismatch);
    }

    let g = curve::g1();
    let disputer_point = G1Projective::from(disputer_public);
    let issuer_point = G1Projective::from(issuer_public);
    let shared = G1Projective::from(shared_secret);
    let statement = dlogeq::Statement {
        base0: &g,
        public0: &disputer_point,
        base1: &issuer_point,
        public1: &shared,
    };
    if dlogeq::verify(
        &mut dispute_transcript(session, issuer, disputer),
        statement,
        proof,
    )
    .is_err()
    {
        return blame(Blame::InvalidProof);
    }

    let share = channel::decrypt_with_shared_secret(encrypted, shared_secret, disputer);
    if verify_share(&share, disputer, &broadcast.commitments) {
        return blame(Blame::ShareValid);
    }

    debug!(%issuer, %disputer, "accusation upheld");
    Verdict::IssuerMalicious(issuer)
}

/// Participants sorted by how their group public key portion checks out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerCategories {
    pub honest: BTreeSet<ParticipantIndex>,
    pub dishonest: BTreeSet<ParticipantIndex>,
    pub missing: BTreeSet<ParticipantIndex>,
}

/// Sort participants by whether their published gpkj matches the commitments.
///
/// The gpkj of participant `j` must be `gskj * G2`, and `gskj * G1` is public:
/// it's the sum of every qualified dealer's commitments, evaluated at `j`.
/// Comparing the two takes one pairing check per participant.
pub fn categorize_group_signers(
    participants: impl IntoIterator<Item = ParticipantIndex>,
    commitments: &[&GroupPolynomial],
    gpkjs: &[(ParticipantIndex, G2Affine)],
) -> SignerCategories {
    let mut combined = GroupPolynomial::from_coefficients(vec![]);
    for c in commitments {
        combined += *c;
    }

    let neg_g2 = curve::neg_g2();
    let g1 = G1Affine::generator();
    let mut out = SignerCategories::default();
    for j in participants {
        let Some((_, gpkj)) = gpkjs.iter().find(|(p, _)| *p == j) else {
            out.missing.insert(j);
            continue;
        };
        let expected = combined.evaluate(j).to_affine();
        if curve::pairing_check(&[(expected, neg_g2), (g1, *gpkj)]) {
            out.honest.insert(j);
        } else {
            out.dishonest.insert(j);
        }
    }
    out
}
