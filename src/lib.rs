//! Distributed key generation for threshold BLS signatures.
//!
//! A set of `n` validators, who don't trust each other, jointly produce a
//! master public key on BLS12-381 such that any `t + 1` of them can produce a
//! group signature under it, while nobody ever learns the master secret.
//!
//! # Warning
//!
//! This is experimental cryptographic software. It has not been audited.
//!
//! # Design
//!
//! The protocol is a Pedersen style DKG built out of Feldman verifiable
//! secret sharing, run in lockstep over a shared ledger:
//!
//! 1. Every validator registers a transport key.
//! 2. Every validator deals a random polynomial of degree `t`, publishing its
//!    commitments and one encrypted share per peer. Shares are masked with a
//!    scalar derived from the pairwise Diffie-Hellman point.
//! 3. A validator receiving a share that fails the Feldman check accuses the
//!    dealer, revealing the Diffie-Hellman point along with a proof of
//!    discrete log equality. The ledger decides who was at fault.
//! 4. The dealers who survived publish their secret lifted into both groups,
//!    from which the master public key is summed.
//! 5. Every validator sums its shares into a group secret share `gskj`, and
//!    publishes `gpkj = gskj * G2` along with a signature on a fixed message.
//! 6. Published `gpkj`s are checked against the commitments, and the session
//!    completes.
//!
//! Afterwards, partial signatures from any `t + 1` validators are combined by
//! Lagrange interpolation in G1, via [`sign::aggregate`].
//!
//! Each step enforces its phase: a [`protocol::PhaseCoordinator`] maps block
//! heights to phases, and every participant gets one submission per phase.
//!
//! ## API Design
//!
//! The cryptographic building blocks live in their own modules, and are
//! usable on their own. On top of them, [`validator::Validator`] drives one
//! participant against anything implementing [`ledger::Ledger`]; the crate
//! ships [`ledger::LocalLedger`] as an in-memory model of the contract.
//!
//! All of the constants participants must agree on come from a
//! [`config::Session`], built from a serializable [`config::ProtocolConfig`].
//!
//! Logging goes through `tracing`. Installing a subscriber is left to the
//! application.
pub mod channel;
pub mod config;
mod crypto;
pub mod curve;
pub mod dispute;
pub mod keyshare;
pub mod ledger;
pub mod math;
pub mod participants;
pub mod proofs;
pub mod protocol;
pub mod serde;
pub mod sign;
#[cfg(test)]
mod test;
pub mod validator;

pub use config::{ProtocolConfig, Session};
pub use crypto::Digest;
pub use participants::{ParticipantIndex, ThresholdParams};
pub use protocol::{InitializationError, Phase, ProtocolError};
pub use validator::Validator;
