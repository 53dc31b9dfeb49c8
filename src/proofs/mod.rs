//! Zero knowledge proofs used by the protocol.
//!
//! There's only one kind so far: a proof that two points share a discrete
//! logarithm relative to two bases.
pub mod dlogeq;
