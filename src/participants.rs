//! This module holds some utilities for working with participants.
//!
//! Every participant is identified by a 1-based index, which doubles as the
//! evaluation point of every polynomial in the protocol. Often you need to
//! store one item per participant, get the Lagrange coefficient of some index,
//! or remember which participants misbehaved; this module provides the data
//! structures for doing that.

use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    fmt,
    num::NonZeroU32,
};

use bls12_381::Scalar;
use ff::Field;
use serde::{Deserialize, Serialize};

use crate::protocol::{InitializationError, ProtocolError};

/// Represents the index of a participant in a session.
///
/// Indices live in `[1, n]` and never change during a session. The zero index
/// is unrepresentable, since evaluating a sharing polynomial at zero would
/// reveal the dealer's secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ParticipantIndex(NonZeroU32);

impl ParticipantIndex {
    /// Create an index, returning None for zero.
    pub fn new(index: u32) -> Option<Self> {
        NonZeroU32::new(index).map(Self)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Return this index as big endian bytes.
    pub fn bytes(&self) -> [u8; 4] {
        self.0.get().to_be_bytes()
    }

    /// Return the scalar associated with this participant.
    pub fn scalar(&self) -> Scalar {
        Scalar::from(u64::from(self.0.get()))
    }
}

impl fmt::Display for ParticipantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for ParticipantIndex {
    type Error = InitializationError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::new(index).ok_or_else(|| {
            InitializationError::BadParameters("participant index cannot be 0".to_string())
        })
    }
}

impl From<ParticipantIndex> for u32 {
    fn from(p: ParticipantIndex) -> Self {
        p.get()
    }
}

/// The size of a session, and the degree of its sharing polynomials.
///
/// A group signature needs `t + 1` valid shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParams {
    n: u32,
    t: u32,
}

impl ThresholdParams {
    pub fn new(n: u32, t: u32) -> Result<Self, InitializationError> {
        if t < 1 {
            return Err(InitializationError::BadParameters(
                "threshold must be at least 1".to_string(),
            ));
        }
        if t >= n {
            return Err(InitializationError::BadParameters(format!(
                "threshold must be < participant count, found t = {t}, n = {n}"
            )));
        }
        Ok(Self { n, t })
    }

    /// The threshold rule used by the validator network for `n` participants.
    ///
    /// This is `2 * floor(n / 3)`, plus one more when `n mod 3 == 2`.
    pub fn for_participant_count(n: u32) -> Result<Self, InitializationError> {
        let k = n / 3;
        let mut t = 2 * k;
        if n - 3 * k == 2 {
            t += 1;
        }
        Self::new(n, t)
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn t(&self) -> u32 {
        self.t
    }

    /// The number of shares needed to reconstruct, i.e. `t + 1`.
    pub fn required(&self) -> usize {
        self.t as usize + 1
    }

    /// Check if an index belongs to this session.
    pub fn contains(&self, index: ParticipantIndex) -> bool {
        index.get() <= self.n
    }

    /// Iterate over every index in the session, in order.
    pub fn indices(&self) -> impl Iterator<Item = ParticipantIndex> {
        (1..=self.n).filter_map(ParticipantIndex::new)
    }
}

/// Represents a sorted list of participants.
///
/// This is the evaluation domain used for Lagrange interpolation: everybody
/// agrees on its order, and it can't contain duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantList {
    participants: Vec<ParticipantIndex>,
}

impl ParticipantList {
    /// Create a participant list from a slice of participants.
    ///
    /// This will fail if the participants have duplicates.
    pub fn new(participants: &[ParticipantIndex]) -> Result<Self, ProtocolError> {
        let mut out = participants.to_owned();
        out.sort();
        if let Some(w) = out.windows(2).find(|w| w[0] == w[1]) {
            return Err(ProtocolError::DuplicateIndex(w[0]));
        }
        Ok(Self { participants: out })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Check if this list has a given participant.
    pub fn contains(&self, participant: ParticipantIndex) -> bool {
        self.participants.binary_search(&participant).is_ok()
    }

    /// Iterate over the other participants
    pub fn others(&self, me: ParticipantIndex) -> impl Iterator<Item = ParticipantIndex> + '_ {
        self.participants.iter().copied().filter(move |x| *x != me)
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticipantIndex> + '_ {
        self.participants.iter().copied()
    }

    /// Get the lagrange coefficient for a participant, relative to this list,
    /// for interpolating at zero.
    ///
    /// This is `prod_{j != i} x_j / (x_j - x_i)`.
    pub fn lagrange(&self, p: ParticipantIndex) -> Scalar {
        let p_scalar = p.scalar();

        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for q in self.others(p) {
            let q_scalar = q.scalar();
            numerator *= q_scalar;
            denominator *= q_scalar - p_scalar;
        }

        // Indices are distinct and far below the group order, so this never vanishes.
        numerator * denominator.invert().unwrap_or(Scalar::ZERO)
    }
}

/// A map from participants to elements.
///
/// Entries are write-once: the first value put for a participant wins, and
/// later attempts are refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantMap<T> {
    data: BTreeMap<ParticipantIndex, T>,
}

impl<T> Default for ParticipantMap<T> {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }
}

impl<T> ParticipantMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if this map contains data from a specific participant.
    pub fn contains(&self, participant: ParticipantIndex) -> bool {
        self.data.contains_key(&participant)
    }

    /// Place the data for a participant in this map.
    ///
    /// Returns false, leaving the existing entry untouched, if that participant
    /// already has data.
    pub fn put(&mut self, participant: ParticipantIndex, data: T) -> bool {
        match self.data.entry(participant) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(v) => {
                v.insert(data);
                true
            }
        }
    }

    pub fn get(&self, participant: ParticipantIndex) -> Option<&T> {
        self.data.get(&participant)
    }

    /// The participants with data, in order.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantIndex> + '_ {
        self.data.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantIndex, &T)> + '_ {
        self.data.iter().map(|(p, t)| (*p, t))
    }
}

/// The set of participants proven to have misbehaved.
///
/// Flags are sticky: nothing ever removes a participant from this set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaliciousSet(BTreeSet<ParticipantIndex>);

impl MaliciousSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a participant, returning true if they weren't flagged already.
    pub fn flag(&mut self, participant: ParticipantIndex) -> bool {
        self.0.insert(participant)
    }

    pub fn is_flagged(&self, participant: ParticipantIndex) -> bool {
        self.0.contains(&participant)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParticipantIndex> + '_ {
        self.0.iter().copied()
    }
}
