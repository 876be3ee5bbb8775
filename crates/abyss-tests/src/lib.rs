//! End-to-end test suite for the abyss curse engine.
//!
//! Scenarios in `tests/` drive a full [`abyss_node_lib::Node`] the way a
//! host would (join, move, sample, die, quit, rejoin) with a manual clock
//! and deterministic random draws.

pub mod helpers;
