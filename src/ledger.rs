//! The shared ledger every participant reads from and writes to.
//!
//! In production this is a contract on a chain. [`Ledger`] captures the calls
//! participants make, and [`LocalLedger`] is an in-memory model of the same
//! checks, suitable for tests and simulations. Records are keyed by phase and
//! sender, and each sender gets one write per phase.
use std::collections::BTreeSet;

use bls12_381::{G1Affine, G1Projective, G2Affine};
use group::Curve;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    channel::ShareBroadcast,
    config::Session,
    crypto::Digest,
    dispute::{self, Accusation, Verdict},
    keyshare::{self, KeyShare},
    participants::{MaliciousSet, ParticipantIndex, ParticipantMap},
    protocol::Phase,
    serde::{deserialize_g1, deserialize_g2, serialize_g1, serialize_g2},
    sign,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("cannot act in {requested} while in {current}")]
    WrongPhase { requested: Phase, current: Phase },
    #[error("participant {sender} already submitted during {phase}")]
    AlreadySubmitted {
        sender: ParticipantIndex,
        phase: Phase,
    },
    #[error("participant {0} is not registered")]
    UnknownParticipant(ParticipantIndex),
    #[error("transport key is already registered")]
    AlreadyRegistered,
    #[error("submission rejected: {0}")]
    Rejected(&'static str),
    #[error("master public key failed the pairing check")]
    InvalidMasterPublicKey,
    #[error("session has not completed")]
    NotComplete,
}

/// A participant's group public key portion, with its signature on the
/// session's initial message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpkjSubmission {
    #[serde(serialize_with = "serialize_g2", deserialize_with = "deserialize_g2")]
    pub gpkj: G2Affine,
    #[serde(serialize_with = "serialize_g1", deserialize_with = "deserialize_g1")]
    pub signature: G1Affine,
}

/// The outcome of a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    pub mpk: G2Affine,
    /// The portions of every participant in good standing, in index order.
    pub gpkjs: Vec<(ParticipantIndex, G2Affine)>,
}

/// The calls participants make against the shared ledger.
///
/// The sender of each write is authenticated by the ledger itself, so it's
/// passed explicitly here.
pub trait Ledger {
    fn block_height(&self) -> u64;

    fn phase(&self) -> Phase;

    /// Every registered transport key, in index order.
    fn transport_keys(&self) -> Vec<(ParticipantIndex, G1Affine)>;

    fn share_broadcast(&self, dealer: ParticipantIndex) -> Option<&ShareBroadcast>;

    fn key_share(&self, dealer: ParticipantIndex) -> Option<&KeyShare>;

    fn gpkj(&self, participant: ParticipantIndex) -> Option<&GpkjSubmission>;

    fn malicious(&self) -> &MaliciousSet;

    /// Dealers whose shares count: they distributed, and survived disputes.
    fn qualified_dealers(&self) -> Vec<ParticipantIndex>;

    /// The accepted master public key, or the identity if there is none.
    fn master_public_key(&self) -> G2Affine;

    fn register(&mut self, transport_key: G1Affine) -> Result<ParticipantIndex, LedgerError>;

    fn distribute_shares(
        &mut self,
        sender: ParticipantIndex,
        broadcast: ShareBroadcast,
    ) -> Result<(), LedgerError>;

    fn submit_dispute(&mut self, accusation: Accusation) -> Result<Verdict, LedgerError>;

    fn submit_key_share(
        &mut self,
        sender: ParticipantIndex,
        share: KeyShare,
    ) -> Result<(), LedgerError>;

    fn submit_master_public_key(
        &mut self,
        sender: ParticipantIndex,
        mpk: G2Affine,
    ) -> Result<(), LedgerError>;

    fn submit_gpkj(
        &mut self,
        sender: ParticipantIndex,
        submission: GpkjSubmission,
    ) -> Result<(), LedgerError>;

    /// Flag every participant whose gpkj doesn't match the commitments.
    fn accuse_gpkj(&mut self, sender: ParticipantIndex)
        -> Result<Vec<ParticipantIndex>, LedgerError>;

    /// Flag every participant who owed a submission in `phase`, and never
    /// made it. Only allowed in the phase directly following `phase`.
    fn accuse_missing(&mut self, phase: Phase) -> Result<Vec<ParticipantIndex>, LedgerError>;

    fn successful_completion(&mut self) -> Result<ValidatorSet, LedgerError>;
}

/// An in-memory ledger, advanced by hand.
#[derive(Debug, Clone)]
pub struct LocalLedger {
    session: Session,
    height: u64,
    transport_keys: ParticipantMap<G1Affine>,
    broadcasts: ParticipantMap<ShareBroadcast>,
    digests: ParticipantMap<Digest>,
    settled_disputes: BTreeSet<(ParticipantIndex, ParticipantIndex)>,
    share_faults: MaliciousSet,
    key_shares: ParticipantMap<KeyShare>,
    mpk_submissions: ParticipantMap<G2Affine>,
    mpk: G2Affine,
    gpkjs: ParticipantMap<GpkjSubmission>,
    gpkj_accusers: BTreeSet<ParticipantIndex>,
    malicious: MaliciousSet,
    completed: Option<ValidatorSet>,
}

impl LocalLedger {
    pub fn new(session: Session) -> Self {
        let height = session.schedule().start_height;
        Self {
            session,
            height,
            transport_keys: ParticipantMap::new(),
            broadcasts: ParticipantMap::new(),
            digests: ParticipantMap::new(),
            settled_disputes: BTreeSet::new(),
            share_faults: MaliciousSet::new(),
            key_shares: ParticipantMap::new(),
            mpk_submissions: ParticipantMap::new(),
            mpk: G2Affine::identity(),
            gpkjs: ParticipantMap::new(),
            gpkj_accusers: BTreeSet::new(),
            malicious: MaliciousSet::new(),
            completed: None,
        }
    }

    /// Move to a given height. The ledger never goes backwards.
    pub fn advance_to(&mut self, height: u64) {
        self.height = self.height.max(height);
    }

    pub fn mine(&mut self, blocks: u64) {
        self.height = self.height.saturating_add(blocks);
    }

    /// Move to the first block of a phase.
    pub fn advance_to_phase(&mut self, phase: Phase) {
        self.advance_to(self.session.schedule().start_of(phase));
    }

    fn require(&self, phase: Phase) -> Result<(), LedgerError> {
        let current = self.phase();
        if current != phase {
            return Err(LedgerError::WrongPhase {
                requested: phase,
                current,
            });
        }
        Ok(())
    }

    fn require_registered(&self, participant: ParticipantIndex) -> Result<&G1Affine, LedgerError> {
        self.transport_keys
            .get(participant)
            .ok_or(LedgerError::UnknownParticipant(participant))
    }

    fn flag(&mut self, participant: ParticipantIndex, why: &'static str) {
        if self.malicious.flag(participant) {
            warn!(%participant, why, "participant flagged as malicious");
        }
    }
}

fn write_once<T>(
    map: &mut ParticipantMap<T>,
    sender: ParticipantIndex,
    phase: Phase,
    data: T,
) -> Result<(), LedgerError> {
    if !map.put(sender, data) {
        return Err(LedgerError::AlreadySubmitted { sender, phase });
    }
    Ok(())
}

impl Ledger for LocalLedger {
    fn block_height(&self) -> u64 {
        self.height
    }

    fn phase(&self) -> Phase {
        self.session.schedule().phase_at(self.height)
    }

    fn transport_keys(&self) -> Vec<(ParticipantIndex, G1Affine)> {
        self.transport_keys.iter().map(|(p, pk)| (p, *pk)).collect()
    }

    fn share_broadcast(&self, dealer: ParticipantIndex) -> Option<&ShareBroadcast> {
        self.broadcasts.get(dealer)
    }

    fn key_share(&self, dealer: ParticipantIndex) -> Option<&KeyShare> {
        self.key_shares.get(dealer)
    }

    fn gpkj(&self, participant: ParticipantIndex) -> Option<&GpkjSubmission> {
        self.gpkjs.get(participant)
    }

    fn malicious(&self) -> &MaliciousSet {
        &self.malicious
    }

    fn qualified_dealers(&self) -> Vec<ParticipantIndex> {
        self.broadcasts
            .participants()
            .filter(|p| !self.share_faults.is_flagged(*p))
            .collect()
    }

    fn master_public_key(&self) -> G2Affine {
        self.mpk
    }

    fn register(&mut self, transport_key: G1Affine) -> Result<ParticipantIndex, LedgerError> {
        self.require(Phase::Registration)?;
        if bool::from(transport_key.is_identity()) {
            return Err(LedgerError::Rejected("transport key is the identity"));
        }
        if self.transport_keys.iter().any(|(_, pk)| *pk == transport_key) {
            return Err(LedgerError::AlreadyRegistered);
        }
        let next = self.transport_keys.len() as u32 + 1;
        let index = ParticipantIndex::new(next)
            .filter(|p| self.session.params().contains(*p))
            .ok_or(LedgerError::Rejected("registration is full"))?;
        self.transport_keys.put(index, transport_key);
        info!(participant = %index, "registered participant");
        Ok(index)
    }

    fn distribute_shares(
        &mut self,
        sender: ParticipantIndex,
        broadcast: ShareBroadcast,
    ) -> Result<(), LedgerError> {
        self.require(Phase::ShareDistribution)?;
        self.require_registered(sender)?;
        if broadcast.encrypted_shares.len() + 1 != self.transport_keys.len() {
            return Err(LedgerError::Rejected("wrong number of encrypted shares"));
        }
        if broadcast.commitments.len() != self.session.params().required() {
            return Err(LedgerError::Rejected("wrong number of commitments"));
        }
        if bool::from(broadcast.commitments.evaluate_zero().is_identity()) {
            return Err(LedgerError::Rejected("commitment to a zero secret"));
        }
        let digest = broadcast.digest();
        write_once(&mut self.digests, sender, Phase::ShareDistribution, digest)?;
        self.broadcasts.put(sender, broadcast);
        debug!(participant = %sender, "recorded share broadcast");
        Ok(())
    }

    fn submit_dispute(&mut self, accusation: Accusation) -> Result<Verdict, LedgerError> {
        self.require(Phase::Dispute)?;
        let issuer_public = *self.require_registered(accusation.issuer)?;
        let disputer_public = *self.require_registered(accusation.disputer)?;
        let recorded = *self
            .digests
            .get(accusation.issuer)
            .ok_or(LedgerError::Rejected("issuer distributed no shares"))?;
        if !self
            .settled_disputes
            .insert((accusation.issuer, accusation.disputer))
        {
            return Err(LedgerError::AlreadySubmitted {
                sender: accusation.disputer,
                phase: Phase::Dispute,
            });
        }

        let verdict = dispute::check_accusation(
            &self.session,
            &accusation,
            &recorded,
            &issuer_public,
            &disputer_public,
        );
        let culprit = verdict.malicious();
        self.share_faults.flag(culprit);
        self.flag(culprit, "share dispute");
        Ok(verdict)
    }

    fn submit_key_share(
        &mut self,
        sender: ParticipantIndex,
        share: KeyShare,
    ) -> Result<(), LedgerError> {
        self.require(Phase::KeyShareSubmission)?;
        self.require_registered(sender)?;
        if self.share_faults.is_flagged(sender) {
            return Err(LedgerError::Rejected("not a qualified dealer"));
        }
        let commitment = self
            .broadcasts
            .get(sender)
            .map(|b| b.commitments.evaluate_zero())
            .ok_or(LedgerError::Rejected("not a qualified dealer"))?;
        if let Err(e) = keyshare::verify_key_share(&self.session, sender, &share, &commitment) {
            debug!(participant = %sender, error = %e, "key share rejected");
            return Err(LedgerError::Rejected("invalid key share"));
        }
        write_once(&mut self.key_shares, sender, Phase::KeyShareSubmission, share)
    }

    fn submit_master_public_key(
        &mut self,
        sender: ParticipantIndex,
        mpk: G2Affine,
    ) -> Result<(), LedgerError> {
        self.require(Phase::MpkSubmission)?;
        self.require_registered(sender)?;
        if self.mpk_submissions.contains(sender) {
            return Err(LedgerError::AlreadySubmitted {
                sender,
                phase: Phase::MpkSubmission,
            });
        }

        let mut g1_sum = G1Projective::identity();
        for dealer in self.qualified_dealers() {
            let share = self
                .key_shares
                .get(dealer)
                .ok_or(LedgerError::Rejected("missing key shares"))?;
            g1_sum += share.g1;
        }
        if !keyshare::check_master_public_key(&self.session, &g1_sum.to_affine(), &mpk) {
            warn!(participant = %sender, "master public key rejected");
            return Err(LedgerError::InvalidMasterPublicKey);
        }

        self.mpk_submissions.put(sender, mpk);
        if bool::from(self.mpk.is_identity()) {
            self.mpk = mpk;
            info!(participant = %sender, "master public key accepted");
        }
        Ok(())
    }

    fn submit_gpkj(
        &mut self,
        sender: ParticipantIndex,
        submission: GpkjSubmission,
    ) -> Result<(), LedgerError> {
        self.require(Phase::GpkjSubmission)?;
        self.require_registered(sender)?;
        if !sign::verify(
            &self.session,
            self.session.initial_message(),
            &submission.signature,
            &submission.gpkj,
        ) {
            return Err(LedgerError::Rejected("initial signature does not verify"));
        }
        write_once(&mut self.gpkjs, sender, Phase::GpkjSubmission, submission)?;
        debug!(participant = %sender, "recorded gpkj");
        Ok(())
    }

    fn accuse_gpkj(
        &mut self,
        sender: ParticipantIndex,
    ) -> Result<Vec<ParticipantIndex>, LedgerError> {
        self.require(Phase::GpkjDispute)?;
        self.require_registered(sender)?;
        if !self.gpkj_accusers.insert(sender) {
            return Err(LedgerError::AlreadySubmitted {
                sender,
                phase: Phase::GpkjDispute,
            });
        }

        let qualified = self.qualified_dealers();
        let commitments: Vec<_> = qualified
            .iter()
            .filter_map(|d| self.broadcasts.get(*d))
            .map(|b| &b.commitments)
            .collect();
        let gpkjs: Vec<_> = self.gpkjs.iter().map(|(p, s)| (p, s.gpkj)).collect();
        let categories =
            dispute::categorize_group_signers(self.gpkjs.participants(), &commitments, &gpkjs);

        let mut flagged = Vec::new();
        for p in categories.dishonest {
            if !self.malicious.is_flagged(p) {
                flagged.push(p);
            }
            self.flag(p, "gpkj dispute");
        }
        Ok(flagged)
    }

    fn accuse_missing(&mut self, phase: Phase) -> Result<Vec<ParticipantIndex>, LedgerError> {
        let owed: Vec<ParticipantIndex> = match phase {
            Phase::ShareDistribution => self
                .transport_keys
                .participants()
                .filter(|p| !self.broadcasts.contains(*p))
                .collect(),
            Phase::KeyShareSubmission => self
                .qualified_dealers()
                .into_iter()
                .filter(|p| !self.key_shares.contains(*p))
                .collect(),
            Phase::GpkjSubmission => self
                .transport_keys
                .participants()
                .filter(|p| !self.gpkjs.contains(*p))
                .collect(),
            _ => return Err(LedgerError::Rejected("phase has no required submission")),
        };
        let current = self.phase();
        if phase.next() != Some(current) {
            return Err(LedgerError::WrongPhase {
                requested: phase,
                current,
            });
        }

        let mut flagged = Vec::new();
        for p in owed {
            if !self.malicious.is_flagged(p) {
                flagged.push(p);
            }
            self.flag(p, "missing submission");
        }
        Ok(flagged)
    }

    fn successful_completion(&mut self) -> Result<ValidatorSet, LedgerError> {
        self.require(Phase::Complete)?;
        if let Some(done) = &self.completed {
            return Ok(done.clone());
        }
        if bool::from(self.mpk.is_identity()) {
            return Err(LedgerError::NotComplete);
        }
        let gpkjs = self
            .gpkjs
            .iter()
            .filter(|(p, _)| !self.malicious.is_flagged(*p))
            .map(|(p, s)| (p, s.gpkj))
            .collect();
        let set = ValidatorSet {
            mpk: self.mpk,
            gpkjs,
        };
        info!(validators = set.gpkjs.len(), "session completed");
        self.completed = Some(set.clone());
        Ok(set)
    }
}
