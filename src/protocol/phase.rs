use std::{collections::BTreeSet, fmt, ops::Range};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProtocolError;

/// The phases of a key generation session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Registration,
    ShareDistribution,
    Dispute,
    KeyShareSubmission,
    MpkSubmission,
    GpkjSubmission,
    GpkjDispute,
    Complete,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Registration,
        Phase::ShareDistribution,
        Phase::Dispute,
        Phase::KeyShareSubmission,
        Phase::MpkSubmission,
        Phase::GpkjSubmission,
        Phase::GpkjDispute,
        Phase::Complete,
    ];

    fn ordinal(self) -> usize {
        self as usize
    }

    /// The phase following this one, if any.
    pub fn next(self) -> Option<Phase> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Registration => "registration",
            Phase::ShareDistribution => "share distribution",
            Phase::Dispute => "share dispute",
            Phase::KeyShareSubmission => "key share submission",
            Phase::MpkSubmission => "master public key submission",
            Phase::GpkjSubmission => "gpkj submission",
            Phase::GpkjDispute => "gpkj dispute",
            Phase::Complete => "completion",
        };
        f.write_str(name)
    }
}

/// Maps block heights to phases.
///
/// Every phase before [`Phase::Complete`] owns a half-open window of
/// `phase_length` blocks, back to back, starting at `start_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSchedule {
    pub start_height: u64,
    pub phase_length: u64,
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self {
            start_height: 0,
            phase_length: 40,
        }
    }
}

impl PhaseSchedule {
    /// The block window of a phase.
    ///
    /// The window of [`Phase::Complete`] is open ended, so it has none.
    pub fn window(&self, phase: Phase) -> Option<Range<u64>> {
        if phase == Phase::Complete {
            return None;
        }
        let start = self.start_of(phase);
        Some(start..start + self.phase_length)
    }

    /// The first height of a phase.
    pub fn start_of(&self, phase: Phase) -> u64 {
        self.start_height + self.phase_length * phase.ordinal() as u64
    }

    /// The phase active at a given height.
    ///
    /// Heights before the schedule starts belong to registration.
    pub fn phase_at(&self, height: u64) -> Phase {
        if self.phase_length == 0 {
            return Phase::Complete;
        }
        let elapsed = height.saturating_sub(self.start_height) / self.phase_length;
        usize::try_from(elapsed)
            .ok()
            .and_then(|i| Phase::ALL.get(i).copied())
            .unwrap_or(Phase::Complete)
    }
}

/// Tracks which phase a single participant is in, and what it submitted.
///
/// Phases only ever move forward, one at a time. Jumping several windows
/// ahead still walks through every intermediate phase, closing each in turn.
#[derive(Debug, Clone)]
pub struct PhaseCoordinator {
    schedule: PhaseSchedule,
    current: Phase,
    submitted: BTreeSet<Phase>,
}

impl PhaseCoordinator {
    pub fn new(schedule: PhaseSchedule) -> Self {
        Self {
            schedule,
            current: Phase::Registration,
            submitted: BTreeSet::new(),
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Advance according to a newly observed block height.
    ///
    /// Heights belonging to an earlier phase are ignored.
    pub fn observe_height(&mut self, height: u64) -> Phase {
        let target = self.schedule.phase_at(height);
        while self.current < target {
            let Some(next) = self.current.next() else {
                break;
            };
            debug!(closed = %self.current, opened = %next, height, "phase window closed");
            self.current = next;
        }
        self.current
    }

    /// Check that we're currently in a given phase.
    pub fn ensure(&self, phase: Phase) -> Result<(), ProtocolError> {
        if self.current == Phase::Complete && phase != Phase::Complete {
            return Err(ProtocolError::SessionComplete);
        }
        if self.current != phase {
            return Err(ProtocolError::WrongPhase {
                requested: phase,
                current: self.current,
            });
        }
        Ok(())
    }

    /// Check that we can still make the single submission of a phase.
    pub fn ensure_fresh(&self, phase: Phase) -> Result<(), ProtocolError> {
        self.ensure(phase)?;
        if self.submitted.contains(&phase) {
            return Err(ProtocolError::AlreadySubmitted(phase));
        }
        Ok(())
    }

    /// Record the single submission of a phase.
    pub fn record_submission(&mut self, phase: Phase) -> Result<(), ProtocolError> {
        self.ensure_fresh(phase)?;
        self.submitted.insert(phase);
        Ok(())
    }

    pub fn has_submitted(&self, phase: Phase) -> bool {
        self.submitted.contains(&phase)
    }
}
