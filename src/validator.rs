//! A single participant, driven through every phase of a session.
//!
//! A [`Validator`] owns its secrets: its transport key, its sharing
//! polynomial, and eventually its group secret share. Each action first syncs
//! the phase with the ledger's block height, and refuses to run outside its
//! phase or twice within it.
use bls12_381::{G1Affine, Scalar};
use rand_core::CryptoRngCore;
use tracing::{debug, info};

use crate::{
    channel::{self, ShareBroadcast, TransportKey},
    config::Session,
    dispute::{self, Verdict},
    keyshare::{self, KeyShare},
    ledger::{GpkjSubmission, Ledger, ValidatorSet},
    math::Polynomial,
    participants::{ParticipantIndex, ParticipantMap},
    protocol::{Phase, PhaseCoordinator, ProtocolError},
    sign,
};

#[derive(Debug)]
pub struct Validator {
    session: Session,
    key: TransportKey,
    polynomial: Polynomial,
    coordinator: PhaseCoordinator,
    index: Option<ParticipantIndex>,
    gskj: Option<Scalar>,
}

impl Validator {
    /// A validator with a fresh transport key and a random secret.
    pub fn new(session: Session, rng: &mut impl CryptoRngCore) -> Result<Self, ProtocolError> {
        let key = TransportKey::generate(&mut *rng)?;
        let polynomial = Polynomial::generate(&mut *rng, session.params().t())?;
        Ok(Self::with_key(session, key, polynomial))
    }

    /// A validator with a fresh transport key, contributing a chosen secret.
    pub fn with_secret(
        session: Session,
        rng: &mut impl CryptoRngCore,
        secret: &Scalar,
    ) -> Result<Self, ProtocolError> {
        let key = TransportKey::generate(&mut *rng)?;
        let polynomial = Polynomial::extend_random(&mut *rng, session.params().t(), secret)?;
        Ok(Self::with_key(session, key, polynomial))
    }

    pub fn with_key(session: Session, key: TransportKey, polynomial: Polynomial) -> Self {
        let coordinator = PhaseCoordinator::new(session.schedule());
        Self {
            session,
            key,
            polynomial,
            coordinator,
            index: None,
            gskj: None,
        }
    }

    pub fn index(&self) -> Result<ParticipantIndex, ProtocolError> {
        self.index.ok_or(ProtocolError::MissingData("registration"))
    }

    pub fn transport_key(&self) -> G1Affine {
        self.key.public()
    }

    pub fn phase(&self) -> Phase {
        self.coordinator.current()
    }

    /// Our group secret share, once derived.
    pub fn group_secret_share(&self) -> Option<&Scalar> {
        self.gskj.as_ref()
    }

    fn begin<L: Ledger + ?Sized>(&mut self, ledger: &L, phase: Phase) -> Result<(), ProtocolError> {
        self.coordinator.observe_height(ledger.block_height());
        self.coordinator.ensure_fresh(phase)
    }

    fn finish(&mut self, phase: Phase) -> Result<(), ProtocolError> {
        self.coordinator.record_submission(phase)
    }

    pub fn register<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
    ) -> Result<ParticipantIndex, ProtocolError> {
        self.begin(&*ledger, Phase::Registration)?;
        let index = ledger.register(self.key.public())?;
        self.index = Some(index);
        self.finish(Phase::Registration)?;
        Ok(index)
    }

    /// Publish encrypted shares of our polynomial, with its commitments.
    pub fn distribute_shares<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
    ) -> Result<(), ProtocolError> {
        self.begin(&*ledger, Phase::ShareDistribution)?;
        let me = self.index()?;
        let peers = ledger.transport_keys();
        let broadcast = ShareBroadcast::new(&self.polynomial, &self.key, me, &peers);
        ledger.distribute_shares(me, broadcast)?;
        info!(participant = %me, "distributed shares");
        self.finish(Phase::ShareDistribution)
    }

    /// Check every share addressed to us, accusing the dealer of any bad one.
    pub fn dispute_shares<L: Ledger + ?Sized>(
        &mut self,
        rng: &mut impl CryptoRngCore,
        ledger: &mut L,
    ) -> Result<Vec<Verdict>, ProtocolError> {
        self.begin(&*ledger, Phase::Dispute)?;
        let me = self.index()?;
        let mut verdicts = Vec::new();
        for (issuer, issuer_public) in ledger.transport_keys() {
            if issuer == me {
                continue;
            }
            let Some(broadcast) = ledger.share_broadcast(issuer) else {
                continue;
            };
            let accusation = match dispute::build_accusation(
                &mut *rng,
                &self.session,
                issuer,
                me,
                broadcast,
                &self.key,
                &issuer_public,
            ) {
                Ok(accusation) => accusation,
                Err(ProtocolError::ShareIsValid(_)) => continue,
                Err(e) => return Err(e),
            };
            debug!(participant = %me, %issuer, "accusing dealer");
            verdicts.push(ledger.submit_dispute(accusation)?);
        }
        self.finish(Phase::Dispute)?;
        Ok(verdicts)
    }

    /// Derive our group secret share from the qualified dealers' shares.
    fn derive_group_secret<L: Ledger + ?Sized>(
        &mut self,
        ledger: &L,
    ) -> Result<Scalar, ProtocolError> {
        if let Some(gskj) = self.gskj {
            return Ok(gskj);
        }
        let me = self.index()?;
        let keys = ledger.transport_keys();
        let publics: Vec<_> = keys.iter().map(|(_, pk)| *pk).collect();
        let qualified = ledger.qualified_dealers();
        let rows: Vec<_> = qualified
            .iter()
            .filter_map(|d| {
                ledger
                    .share_broadcast(*d)
                    .map(|b| (*d, b.encrypted_shares.as_slice()))
            })
            .collect();

        let mut shares = Vec::with_capacity(rows.len());
        for (issuer, encrypted) in channel::condense(&self.key.public(), &rows, &publics)? {
            let issuer_public = keys
                .iter()
                .find(|(p, _)| *p == issuer)
                .map(|(_, pk)| pk)
                .ok_or(ProtocolError::UnknownParticipant(issuer))?;
            let share = channel::decrypt_share(&encrypted, self.key.secret(), issuer_public, me);
            shares.push((issuer, share));
        }

        let own = if qualified.contains(&me) {
            self.polynomial.evaluate(me)
        } else {
            Scalar::zero()
        };
        let gskj = keyshare::group_secret_share(&own, &shares, ledger.malicious());
        self.gskj = Some(gskj);
        Ok(gskj)
    }

    /// Publish our secret lifted into both groups.
    pub fn submit_key_share<L: Ledger + ?Sized>(
        &mut self,
        rng: &mut impl CryptoRngCore,
        ledger: &mut L,
    ) -> Result<KeyShare, ProtocolError> {
        self.begin(&*ledger, Phase::KeyShareSubmission)?;
        let me = self.index()?;
        self.derive_group_secret(&*ledger)?;
        let share = keyshare::generate_key_share(
            rng,
            &self.session,
            me,
            &self.polynomial.secret(),
            &self.polynomial.commit().evaluate_zero(),
        )?;
        ledger.submit_key_share(me, share)?;
        self.finish(Phase::KeyShareSubmission)?;
        Ok(share)
    }

    /// Sum the qualified dealers' key shares, and publish the result.
    pub fn submit_master_public_key<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
    ) -> Result<(), ProtocolError> {
        self.begin(&*ledger, Phase::MpkSubmission)?;
        let me = self.index()?;
        let mut key_shares = ParticipantMap::new();
        for dealer in ledger.qualified_dealers() {
            let share = ledger
                .key_share(dealer)
                .ok_or(ProtocolError::MissingData("key share"))?;
            key_shares.put(dealer, *share);
        }
        let mpk = keyshare::master_public_key(&self.session, &key_shares, ledger.malicious())?;
        ledger.submit_master_public_key(me, mpk)?;
        self.finish(Phase::MpkSubmission)
    }

    /// Publish our group public key portion, with a signature proving it works.
    pub fn submit_gpkj<L: Ledger + ?Sized>(&mut self, ledger: &mut L) -> Result<(), ProtocolError> {
        self.begin(&*ledger, Phase::GpkjSubmission)?;
        let me = self.index()?;
        let gskj = self.derive_group_secret(&*ledger)?;
        let submission = GpkjSubmission {
            gpkj: keyshare::group_public_key_portion(&gskj),
            signature: sign::sign(&self.session, self.session.initial_message(), &gskj)?,
        };
        ledger.submit_gpkj(me, submission)?;
        self.finish(Phase::GpkjSubmission)
    }

    /// Ask the ledger to flag every inconsistent gpkj.
    pub fn accuse_gpkj<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
    ) -> Result<Vec<ParticipantIndex>, ProtocolError> {
        self.begin(&*ledger, Phase::GpkjDispute)?;
        let me = self.index()?;
        let flagged = ledger.accuse_gpkj(me)?;
        self.finish(Phase::GpkjDispute)?;
        Ok(flagged)
    }

    pub fn complete<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
    ) -> Result<ValidatorSet, ProtocolError> {
        self.coordinator.observe_height(ledger.block_height());
        self.coordinator.ensure(Phase::Complete)?;
        Ok(ledger.successful_completion()?)
    }

    /// Sign a message with our group secret share.
    pub fn partial_sign(&self, msg: &[u8]) -> Result<G1Affine, ProtocolError> {
        let gskj = self
            .gskj
            .as_ref()
            .ok_or(ProtocolError::MissingData("group secret share"))?;
        sign::sign(&self.session, msg, gskj)
    }
}
