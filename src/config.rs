//! Session configuration.
//!
//! A [`ProtocolConfig`] is plain data, meant to be deserialized from whatever
//! format the embedding application uses. Turning it into a [`Session`]
//! validates it and derives the constants every participant must agree on.
use bls12_381::G1Projective;
use magikitten::Transcript;
use serde::{Deserialize, Serialize};

use crate::{
    curve,
    participants::ThresholdParams,
    protocol::{InitializationError, PhaseSchedule, ProtocolError},
};

const SESSION_LABEL: &[u8] = b"tdkg v0.1.0 session";

/// The message every participant signs with its group key share, proving
/// the share is usable before the session completes.
pub const DEFAULT_INITIAL_MESSAGE: &str = "Cryptography is great";
/// The message hashed to obtain the second G1 base point.
pub const DEFAULT_H1_BASE_MESSAGE: &str = "MadHive Rocks!";
pub const DEFAULT_HASH_TO_CURVE_DST: &str = "TDKG-V01-CS01-with-BLS12381G1_XMD:SHA-256_SSWU_RO_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// The number of participants, `n`.
    pub participants: u32,
    /// The degree of the sharing polynomials, `t`.
    ///
    /// When absent, this follows [`ThresholdParams::for_participant_count`].
    pub threshold: Option<u32>,
    pub initial_message: String,
    pub h1_base_message: String,
    pub hash_to_curve_dst: String,
    pub schedule: PhaseSchedule,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            participants: 4,
            threshold: None,
            initial_message: DEFAULT_INITIAL_MESSAGE.to_string(),
            h1_base_message: DEFAULT_H1_BASE_MESSAGE.to_string(),
            hash_to_curve_dst: DEFAULT_HASH_TO_CURVE_DST.to_string(),
            schedule: PhaseSchedule::default(),
        }
    }
}

impl ProtocolConfig {
    /// A default configuration for `n` participants and threshold `t`.
    pub fn with_threshold(n: u32, t: u32) -> Self {
        Self {
            participants: n,
            threshold: Some(t),
            ..Default::default()
        }
    }
}

/// The validated, immutable parameters of one key generation session.
///
/// Every participant of a session must hold an equal `Session`. It's cheap to
/// clone, and nothing in it ever changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    config: ProtocolConfig,
    params: ThresholdParams,
    h1: G1Projective,
}

impl Session {
    pub fn new(config: ProtocolConfig) -> Result<Self, InitializationError> {
        let params = match config.threshold {
            Some(t) => ThresholdParams::new(config.participants, t)?,
            None => ThresholdParams::for_participant_count(config.participants)?,
        };
        if config.schedule.phase_length == 0 {
            return Err(InitializationError::BadParameters(
                "phase length must be at least one block".to_string(),
            ));
        }
        if config.hash_to_curve_dst.is_empty() {
            return Err(InitializationError::BadParameters(
                "hash to curve domain separation tag cannot be empty".to_string(),
            ));
        }
        let h1 = curve::hash_to_g1(
            config.h1_base_message.as_bytes(),
            config.hash_to_curve_dst.as_bytes(),
        );
        if curve::is_dangerous(&h1) {
            return Err(InitializationError::BadParameters(
                "second base point has a known discrete logarithm".to_string(),
            ));
        }
        Ok(Self { config, params, h1 })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn params(&self) -> ThresholdParams {
        self.params
    }

    pub fn schedule(&self) -> PhaseSchedule {
        self.config.schedule
    }

    /// The second G1 base point, with no known discrete log relative to G1.
    pub fn h1(&self) -> G1Projective {
        self.h1
    }

    pub fn initial_message(&self) -> &[u8] {
        self.config.initial_message.as_bytes()
    }

    /// Hash a message to G1 under this session's domain separation tag.
    ///
    /// Fails if the result is a point anybody knows the discrete log of.
    pub fn hash_to_g1(&self, msg: &[u8]) -> Result<G1Projective, ProtocolError> {
        let point = curve::hash_to_g1(msg, self.config.hash_to_curve_dst.as_bytes());
        if curve::is_dangerous(&point) {
            return Err(ProtocolError::DangerousHash);
        }
        Ok(point)
    }

    /// A fresh transcript bound to this session's parameters.
    pub fn transcript(&self) -> Transcript {
        let mut transcript = Transcript::new(SESSION_LABEL);
        transcript.message(b"n", &self.params.n().to_be_bytes());
        transcript.message(b"t", &self.params.t().to_be_bytes());
        transcript.message(b"dst", self.config.hash_to_curve_dst.as_bytes());
        transcript
    }
}
