//! This module provides the error types shared by every protocol step, along
//! with the phase machinery sequencing those steps.
//!
//! Errors come in a few flavors. Input validation errors (bad encodings, bad
//! lengths, duplicate indices) mean the caller handed us something malformed.
//! Sequencing errors ([`ProtocolError::WrongPhase`], [`ProtocolError::AlreadySubmitted`])
//! mean an action was requested at the wrong time. Cryptographic failures in
//! other participants' data are *not* errors: they surface as verdicts, so that
//! blame can be assigned.
use thiserror::Error;

use crate::{
    ledger::LedgerError, participants::ParticipantIndex, proofs::dlogeq::ProofError,
    serde::EncodingError,
};

pub mod phase;

pub use phase::{Phase, PhaseCoordinator, PhaseSchedule};

/// Represents an error which can happen when running a protocol step.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The local randomness source could not produce output.
    #[error("insufficient entropy: {0}")]
    InsufficientEntropy(String),
    /// A set of encrypted shares didn't have the expected shape.
    #[error("malformed share set: expected {expected} entries, found {found}")]
    MalformedShareSet { expected: usize, found: usize },
    /// Not enough contributions to reach the threshold.
    #[error("insufficient shares: need {needed}, found {found}")]
    InsufficientShares { needed: usize, found: usize },
    #[error("participant {0} appears more than once")]
    DuplicateIndex(ParticipantIndex),
    #[error("participant {0} is not part of this session")]
    UnknownParticipant(ParticipantIndex),
    /// An action was requested outside of its phase.
    #[error("cannot act in {requested} while in {current}")]
    WrongPhase { requested: Phase, current: Phase },
    /// This participant already submitted during this phase.
    #[error("already submitted during {0}")]
    AlreadySubmitted(Phase),
    /// The session reached its terminal phase.
    #[error("session is complete")]
    SessionComplete,
    /// A dispute was requested against a share which verifies.
    #[error("share from participant {0} is valid")]
    ShareIsValid(ParticipantIndex),
    #[error("missing {0}")]
    MissingData(&'static str),
    #[error("key share failed verification")]
    InvalidKeyShare,
    #[error("master public key failed the pairing check")]
    InvalidMasterPublicKey,
    /// A message hashed to a point whose discrete log is known.
    #[error("message hashed to a dangerous point")]
    DangerousHash,
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Represents an error which can happen when *initializing* a session.
///
/// These are related to bad parameters for the protocol, and things like that.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("bad parameters: {0}")]
    BadParameters(String),
}
