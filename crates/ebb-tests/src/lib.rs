//! Scenario and adversarial test suite for the Ebb stabilizer engines.
//!
//! The integration tests under `tests/` drive complete engines against
//! in-memory tokens and oracles through the [`helpers::World`] harness,
//! covering each gating policy end to end and the invariants that must
//! hold under arbitrary call sequences.

pub mod helpers;
